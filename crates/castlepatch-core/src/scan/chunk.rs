//! Splitting a module image into bounded, overlapping reads.

use std::ops::Range;

use crate::address::Address;
use crate::module::ModuleImage;

/// One bounded read of the module.
///
/// `owned` is the part of the read this chunk is responsible for; the
/// bytes around it are context shared with neighbouring chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub start: Address,
    pub len: usize,
    pub owned: Range<usize>,
}

/// Iterate over `module` in `chunk_size` steps.
///
/// Each read extends `lead` bytes before and `trail` bytes after its owned
/// span, clipped to the module bounds.
pub fn chunk_spans(
    module: &ModuleImage,
    chunk_size: usize,
    lead: usize,
    trail: usize,
) -> impl Iterator<Item = ChunkSpan> + '_ {
    let chunk_size = chunk_size.max(1);
    (0..module.size).step_by(chunk_size).map(move |owned_start| {
        let owned_end = (owned_start + chunk_size).min(module.size);
        let read_start = owned_start.saturating_sub(lead);
        let read_end = owned_end.saturating_add(trail).min(module.size);
        ChunkSpan {
            start: module.base.add(read_start),
            len: read_end - read_start,
            owned: (owned_start - read_start)..(owned_end - read_start),
        }
    })
}
