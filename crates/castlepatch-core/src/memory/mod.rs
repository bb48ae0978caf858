mod accessor;
mod backend;
mod timed;
#[cfg(target_os = "windows")]
pub(crate) mod win32;

#[cfg(test)]
pub mod mock;

pub use accessor::ProcessMemoryAccessor;
pub use backend::{MemoryBackend, Protection};
pub use timed::TimedBackend;
#[cfg(target_os = "windows")]
pub use win32::WindowsProcess;

#[cfg(test)]
pub use mock::{MockProcess, MockProcessBuilder};
