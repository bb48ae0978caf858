//! Byte-pattern scanning over bounded buffers.
//!
//! Matching is a plain forward compare at every offset. Buffers are chunk
//! sized (see [`chunk_spans`]), never a whole module, so the naive search
//! stays cheap and single reads stay bounded.

mod chunk;
mod pattern;

pub use chunk::{ChunkSpan, chunk_spans};
pub use pattern::{BytePattern, Endian, IntWidth};

/// A pattern occurrence inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMatch {
    pub offset: usize,
    pub pattern_index: usize,
}

/// Lazily report every occurrence of every pattern in `buffer`.
///
/// Matches come out ordered by offset, then by pattern index. Overlapping
/// matches and several patterns matching at one offset are all reported.
pub fn scan<'a>(buffer: &'a [u8], patterns: &'a [BytePattern]) -> Scan<'a> {
    Scan {
        buffer,
        patterns,
        offset: 0,
        pattern_index: 0,
    }
}

pub struct Scan<'a> {
    buffer: &'a [u8],
    patterns: &'a [BytePattern],
    offset: usize,
    pattern_index: usize,
}

impl Iterator for Scan<'_> {
    type Item = ScanMatch;

    fn next(&mut self) -> Option<ScanMatch> {
        while self.offset < self.buffer.len() {
            let rest = &self.buffer[self.offset..];
            while self.pattern_index < self.patterns.len() {
                let index = self.pattern_index;
                self.pattern_index += 1;
                if rest.starts_with(self.patterns[index].as_bytes()) {
                    return Some(ScanMatch {
                        offset: self.offset,
                        pattern_index: index,
                    });
                }
            }
            self.offset += 1;
            self.pattern_index = 0;
        }
        None
    }
}
