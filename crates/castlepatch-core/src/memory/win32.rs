//! Win32 implementation of [`MemoryBackend`].

use std::ffi::c_void;
use std::mem;
use std::path::{Path, PathBuf};

use tracing::debug;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, HANDLE,
};
use windows::Win32::System::Diagnostics::Debug::{
    FlushInstructionCache, ReadProcessMemory, WriteProcessMemory,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, TH32CS_SNAPMODULE,
    TH32CS_SNAPMODULE32,
};
use windows::Win32::System::Memory::{PAGE_PROTECTION_FLAGS, VirtualProtectEx};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE, QueryFullProcessImageNameW,
};
use windows::core::PWSTR;

use super::backend::{MemoryBackend, Protection};
use crate::address::Address;
use crate::error::{Error, Result};
use crate::module::ModuleImage;

/// `GetExitCodeProcess` value for a process that has not exited
const STILL_ACTIVE: u32 = 259;

/// Handle to a live target process opened for patching.
///
/// The handle is closed by [`WindowsProcess::close`] or on drop, whichever
/// comes first.
pub struct WindowsProcess {
    pid: u32,
    handle: Option<HANDLE>,
}

// SAFETY: a process handle is a kernel object reference, valid from any thread.
// All calls through it are independent syscalls with no thread affinity.
unsafe impl Send for WindowsProcess {}
// SAFETY: see above; the handle is never mutated while shared.
unsafe impl Sync for WindowsProcess {}

impl WindowsProcess {
    /// Open `pid` with read, write, query and VM-operation rights.
    pub fn open(pid: u32) -> Result<Self> {
        let access =
            PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;

        // SAFETY: OpenProcess has no memory-safety preconditions.
        let handle = unsafe { OpenProcess(access, false, pid) }.map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                Error::AccessDenied {
                    pid,
                    message: e.message().to_string(),
                }
            } else if e.code() == ERROR_INVALID_PARAMETER.to_hresult() {
                Error::ProcessNotFound(format!("no process with pid {}", pid))
            } else {
                Error::AccessDenied {
                    pid,
                    message: e.to_string(),
                }
            }
        })?;

        if handle.is_invalid() {
            return Err(Error::AccessDenied {
                pid,
                message: "OpenProcess returned an invalid handle".to_string(),
            });
        }

        debug!("Opened process {}", pid);
        Ok(Self {
            pid,
            handle: Some(handle),
        })
    }

    /// Close the process handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            // SAFETY: the handle came from OpenProcess and is closed exactly once.
            let _ = unsafe { CloseHandle(handle) };
            debug!("Closed process {}", self.pid);
        }
    }

    fn handle(&self) -> Result<HANDLE> {
        self.handle.ok_or(Error::AccessDenied {
            pid: self.pid,
            message: "process handle is closed".to_string(),
        })
    }

    fn image_path(&self) -> Result<PathBuf> {
        query_image_path(self.handle()?).ok_or_else(|| {
            Error::ModuleNotFound(format!("image path of process {} unavailable", self.pid))
        })
    }
}

impl Drop for WindowsProcess {
    fn drop(&mut self) {
        self.close();
    }
}

impl MemoryBackend for WindowsProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> Result<usize> {
        let handle = self.handle()?;
        let mut read = 0usize;
        // SAFETY: buf is a live, writable buffer of buf.len() bytes.
        unsafe {
            ReadProcessMemory(
                handle,
                address.as_u64() as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut read),
            )
        }
        .map_err(|e| Error::ReadFault {
            address,
            requested: buf.len(),
            message: e.to_string(),
        })?;
        Ok(read)
    }

    fn write_from(&self, address: Address, bytes: &[u8]) -> Result<usize> {
        let handle = self.handle()?;
        let mut written = 0usize;
        // SAFETY: bytes is a live buffer of bytes.len() bytes; only the target is written.
        unsafe {
            WriteProcessMemory(
                handle,
                address.as_u64() as *const c_void,
                bytes.as_ptr().cast(),
                bytes.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| Error::WriteFault {
            address,
            len: bytes.len(),
            message: e.to_string(),
        })?;

        // SAFETY: flushing the target's instruction cache for the written span.
        let _ = unsafe {
            FlushInstructionCache(handle, Some(address.as_u64() as *const c_void), bytes.len())
        };
        Ok(written)
    }

    fn protect(&self, address: Address, len: usize, protection: Protection) -> Result<Protection> {
        let handle = self.handle()?;
        let mut previous = PAGE_PROTECTION_FLAGS(0);
        // SAFETY: previous is a valid out-pointer; the call acts on the target only.
        unsafe {
            VirtualProtectEx(
                handle,
                address.as_u64() as *const c_void,
                len,
                PAGE_PROTECTION_FLAGS(protection.0),
                &mut previous,
            )
        }
        .map_err(|e| Error::WriteFault {
            address,
            len,
            message: format!("VirtualProtectEx: {}", e),
        })?;
        Ok(Protection(previous.0))
    }

    fn is_alive(&self) -> bool {
        let Ok(handle) = self.handle() else {
            return false;
        };
        let mut code = 0u32;
        // SAFETY: code is a valid out-pointer.
        match unsafe { GetExitCodeProcess(handle, &mut code) } {
            Ok(()) => code == STILL_ACTIVE,
            Err(_) => false,
        }
    }

    fn primary_module(&self) -> Result<ModuleImage> {
        let image = self.image_path()?;
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.modules()?
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| {
                Error::ModuleNotFound(format!("{} not in module list of {}", name, self.pid))
            })
    }

    fn modules(&self) -> Result<Vec<ModuleImage>> {
        // SAFETY: CreateToolhelp32Snapshot has no memory-safety preconditions.
        let snapshot = unsafe {
            CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.pid)
        }
        .map(Snapshot)
        .map_err(|e| Error::ModuleNotFound(format!("module snapshot failed: {}", e)))?;

        let mut entry = MODULEENTRY32W {
            dwSize: mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        let mut modules = Vec::new();
        // SAFETY: entry is properly sized and initialised for the toolhelp API.
        if unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_err() {
            return Ok(modules);
        }
        loop {
            modules.push(ModuleImage::new(
                wide_to_string(&entry.szModule),
                Address::new(entry.modBaseAddr as u64),
                entry.modBaseSize as usize,
            ));
            // SAFETY: as above.
            if unsafe { Module32NextW(snapshot.0, &mut entry) }.is_err() {
                break;
            }
        }
        Ok(modules)
    }
}

/// Toolhelp snapshot handle closed on drop
pub(crate) struct Snapshot(pub(crate) HANDLE);

impl Drop for Snapshot {
    fn drop(&mut self) {
        // SAFETY: the snapshot handle is owned and closed exactly once.
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// Full Win32 path of the executable behind `handle`
pub(crate) fn query_image_path(handle: HANDLE) -> Option<PathBuf> {
    let mut buffer = [0u16; 1024];
    let mut size = buffer.len() as u32;
    // SAFETY: buffer and size describe a valid writable UTF-16 buffer.
    unsafe {
        QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buffer.as_mut_ptr()),
            &mut size,
        )
    }
    .ok()?;
    Some(Path::new(&String::from_utf16_lossy(&buffer[..size as usize])).to_path_buf())
}

pub(crate) fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}
