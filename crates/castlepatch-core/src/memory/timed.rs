//! Deadline-bounded OS calls.
//!
//! Each primitive runs on a short-lived helper thread while the caller waits
//! on a channel with a timeout. A call that outlives its deadline is
//! abandoned: the caller gets `Error::Timeout` and the helper finishes (or
//! stays blocked) on its own without holding any caller state.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

use super::backend::{MemoryBackend, Protection};
use crate::address::Address;
use crate::error::{Error, Result};
use crate::module::ModuleImage;

pub struct TimedBackend<B> {
    inner: Arc<B>,
    timeout: Duration,
}

impl<B> TimedBackend<B>
where
    B: MemoryBackend + Send + Sync + 'static,
{
    pub fn new(inner: B, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&B) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name(format!("castlepatch-{}", operation))
            .spawn(move || {
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(f(&inner));
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{} on process {} exceeded {:?}",
                    operation,
                    self.inner.pid(),
                    self.timeout
                );
                Err(Error::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::other(
                format!("{} worker exited without a result", operation),
            ))),
        }
    }
}

impl<B> MemoryBackend for TimedBackend<B>
where
    B: MemoryBackend + Send + Sync + 'static,
{
    fn pid(&self) -> u32 {
        self.inner.pid()
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        let data = self.call("read", move |b| {
            let mut tmp = vec![0u8; len];
            let read = b.read_into(address, &mut tmp)?;
            tmp.truncate(read);
            Ok(tmp)
        })?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn write_from(&self, address: Address, bytes: &[u8]) -> Result<usize> {
        let owned = bytes.to_vec();
        self.call("write", move |b| b.write_from(address, &owned))
    }

    fn protect(&self, address: Address, len: usize, protection: Protection) -> Result<Protection> {
        self.call("protect", move |b| b.protect(address, len, protection))
    }

    fn is_alive(&self) -> bool {
        self.call("liveness", |b| Ok(b.is_alive())).unwrap_or(false)
    }

    fn primary_module(&self) -> Result<ModuleImage> {
        self.call("primary-module", |b| b.primary_module())
    }

    fn modules(&self) -> Result<Vec<ModuleImage>> {
        self.call("modules", |b| b.modules())
    }
}
