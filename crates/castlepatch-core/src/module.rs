//! Resolution of the target's main executable module.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::memory::{MemoryBackend, ProcessMemoryAccessor};

/// In-memory span of a loaded module.
///
/// A snapshot: it goes stale if the target unloads or relocates the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleImage {
    pub name: String,
    pub base: Address,
    pub size: usize,
}

impl ModuleImage {
    pub fn new(name: impl Into<String>, base: Address, size: usize) -> Self {
        Self {
            name: name.into(),
            base,
            size,
        }
    }

    pub fn end(&self) -> Address {
        self.base.add(self.size)
    }
}

/// Find the module to scan.
///
/// Prefers the process's primary module and falls back to the first entry of
/// the module list. One attempt only; a failure is terminal for the session.
pub fn locate_main_module<B: MemoryBackend>(
    accessor: &ProcessMemoryAccessor<B>,
) -> Result<ModuleImage> {
    let backend = accessor.backend();

    let primary_error = match backend.primary_module() {
        Ok(module) if module.size > 0 => {
            debug!(
                "Primary module {} at {} ({} bytes)",
                module.name, module.base, module.size
            );
            return Ok(module);
        }
        Ok(module) => format!("primary module {} reports zero size", module.name),
        Err(e) => e.to_string(),
    };
    warn!(
        "Primary module unavailable ({}), falling back to module list",
        primary_error
    );

    let modules = backend.modules()?;
    match modules.into_iter().find(|m| m.size > 0) {
        Some(module) => {
            debug!(
                "Fallback module {} at {} ({} bytes)",
                module.name, module.base, module.size
            );
            Ok(module)
        }
        None => Err(Error::ModuleNotFound(format!(
            "process {} has no loaded modules ({})",
            backend.pid(),
            primary_error
        ))),
    }
}
