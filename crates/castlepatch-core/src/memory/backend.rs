use crate::address::Address;
use crate::error::Result;
use crate::module::ModuleImage;

/// Page protection flags, using the Win32 `PAGE_*` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protection(pub u32);

impl Protection {
    pub const READ_ONLY: Protection = Protection(0x02);
    pub const READ_WRITE: Protection = Protection(0x04);
    /// Protection applied for the duration of every patch write
    pub const EXECUTE_READ_WRITE: Protection = Protection(0x40);

    pub fn is_writable(self) -> bool {
        self == Self::READ_WRITE || self == Self::EXECUTE_READ_WRITE
    }
}

/// OS primitives over one opened target process.
///
/// Implementations never touch the caller's own memory; every call acts on
/// the target's address space or handle table.
pub trait MemoryBackend {
    /// Process identifier of the target
    fn pid(&self) -> u32;

    /// Copy bytes starting at `address` into `buf`, returning how many were read
    fn read_into(&self, address: Address, buf: &mut [u8]) -> Result<usize>;

    /// Copy `bytes` to `address`, returning how many were written
    fn write_from(&self, address: Address, bytes: &[u8]) -> Result<usize>;

    /// Change page protection for `len` bytes at `address`, returning the previous value
    fn protect(&self, address: Address, len: usize, protection: Protection) -> Result<Protection>;

    /// Whether the target is still running
    fn is_alive(&self) -> bool;

    /// The module backing the process's own executable image
    fn primary_module(&self) -> Result<ModuleImage>;

    /// All loaded modules in load order
    fn modules(&self) -> Result<Vec<ModuleImage>>;
}
