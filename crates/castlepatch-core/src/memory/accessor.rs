//! Read and write regions of the target process.
//!
//! Writes go through a protection guard: protection is switched to
//! `EXECUTE_READ_WRITE` for the write and the previous value is restored on
//! every exit path, including a failed write.

use tracing::{debug, warn};

use super::backend::{MemoryBackend, Protection};
use crate::address::Address;
use crate::error::{Error, Result};

pub struct ProcessMemoryAccessor<B> {
    backend: B,
}

impl<B: MemoryBackend> ProcessMemoryAccessor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn pid(&self) -> u32 {
        self.backend.pid()
    }

    pub fn is_alive(&self) -> bool {
        self.backend.is_alive()
    }

    /// Read exactly `len` bytes at `address`.
    ///
    /// A short read is reported as `ReadFault`; callers never see a
    /// truncated buffer.
    pub fn read_region(&self, address: Address, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let read = self.backend.read_into(address, &mut buffer)?;
        if read < len {
            return Err(Error::ReadFault {
                address,
                requested: len,
                message: format!("short read ({} of {} bytes)", read, len),
            });
        }
        Ok(buffer)
    }

    /// Write `bytes` at `address` with temporary `EXECUTE_READ_WRITE` protection.
    pub fn write_region(&self, address: Address, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        let guard = ProtectionGuard::acquire(
            &self.backend,
            address,
            bytes.len(),
            Protection::EXECUTE_READ_WRITE,
        )?;

        let written = self.backend.write_from(address, bytes);

        if let Err(e) = guard.release() {
            warn!("Failed to restore protection at {}: {}", address, e);
        }

        match written {
            Ok(n) if n == bytes.len() => Ok(()),
            Ok(n) => Err(Error::WriteFault {
                address,
                len: bytes.len(),
                message: format!("short write ({} of {} bytes)", n, bytes.len()),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Holds a changed page protection until released or dropped.
struct ProtectionGuard<'a, B: MemoryBackend> {
    backend: &'a B,
    address: Address,
    len: usize,
    previous: Protection,
    released: bool,
}

impl<'a, B: MemoryBackend> ProtectionGuard<'a, B> {
    fn acquire(
        backend: &'a B,
        address: Address,
        len: usize,
        protection: Protection,
    ) -> Result<Self> {
        let previous = backend
            .protect(address, len, protection)
            .map_err(|e| match e {
                Error::Timeout { .. } => e,
                other => Error::WriteFault {
                    address,
                    len,
                    message: format!("protection change failed: {}", other),
                },
            })?;
        debug!(
            "Protection at {} changed 0x{:X} -> 0x{:X}",
            address, previous.0, protection.0
        );
        Ok(Self {
            backend,
            address,
            len,
            previous,
            released: false,
        })
    }

    fn release(mut self) -> Result<()> {
        self.released = true;
        self.restore()
    }

    fn restore(&self) -> Result<()> {
        self.backend
            .protect(self.address, self.len, self.previous)
            .map(|_| ())
    }
}

impl<B: MemoryBackend> Drop for ProtectionGuard<'_, B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.restore() {
            warn!("Failed to restore protection at {}: {}", self.address, e);
        }
    }
}
