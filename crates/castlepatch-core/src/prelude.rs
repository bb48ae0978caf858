//! Prelude module for convenient imports
//!
//! ```ignore
//! use castlepatch_core::prelude::*;
//! ```

// Session entry points
pub use crate::session::{
    PatchSession, PatchSessionResult, SessionContext, run_patch_session, spawn_delayed_session,
};

// Configuration
pub use crate::config::PatchConfig;

// Error handling
pub use crate::error::{Error, Result};

// Memory access
pub use crate::memory::{MemoryBackend, ProcessMemoryAccessor};

// Patch results
pub use crate::patch::{PatchRecord, RejectReason, Rejection};
