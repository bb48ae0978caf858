//! In-process stand-in for a target process, used by unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::backend::{MemoryBackend, Protection};
use crate::address::Address;
use crate::error::{Error, Result};
use crate::module::ModuleImage;

pub const MOCK_IMAGE_NAME: &str = "Castle Story.exe";

pub struct MockProcess {
    pid: u32,
    base: u64,
    memory: Mutex<Vec<u8>>,
    protection: Mutex<Protection>,
    protection_log: Mutex<Vec<Protection>>,
    writes: Mutex<Vec<(Address, Vec<u8>)>>,
    alive: AtomicBool,
    fail_open: bool,
    read_faults: HashSet<u64>,
    write_faults: HashSet<u64>,
    protect_faults: HashSet<u64>,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
    protect_delay: Option<Duration>,
    reads: AtomicUsize,
    kill_after_reads: Option<usize>,
    primary: bool,
    modules: bool,
    extra_modules: Vec<ModuleImage>,
}

impl MockProcess {
    pub fn builder() -> MockProcessBuilder {
        MockProcessBuilder::default()
    }

    /// Simulate `open` for this process
    pub fn open(self) -> Result<Self> {
        if self.fail_open {
            return Err(Error::AccessDenied {
                pid: self.pid,
                message: "simulated access denial".to_string(),
            });
        }
        Ok(self)
    }

    pub fn bytes_at(&self, address: u64, len: usize) -> Vec<u8> {
        let start = (address - self.base) as usize;
        self.memory.lock().unwrap()[start..start + len].to_vec()
    }

    pub fn poke(&self, address: u64, bytes: &[u8]) {
        let start = (address - self.base) as usize;
        self.memory.lock().unwrap()[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn protection_changes(&self) -> Vec<Protection> {
        self.protection_log.lock().unwrap().clone()
    }

    pub fn current_protection(&self) -> Protection {
        *self.protection.lock().unwrap()
    }

    pub fn writes(&self) -> Vec<(Address, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    fn hits(faults: &HashSet<u64>, address: Address, len: usize) -> bool {
        let start = address.as_u64();
        let end = start + len.max(1) as u64;
        faults.iter().any(|&f| f >= start && f < end)
    }

    fn image(&self) -> ModuleImage {
        let size = self.memory.lock().unwrap().len();
        ModuleImage::new(MOCK_IMAGE_NAME, Address::new(self.base), size)
    }
}

impl MemoryBackend for MockProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn read_into(&self, address: Address, buf: &mut [u8]) -> Result<usize> {
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        if !self.is_alive() || Self::hits(&self.read_faults, address, buf.len()) {
            return Err(Error::ReadFault {
                address,
                requested: buf.len(),
                message: "simulated read fault".to_string(),
            });
        }

        let memory = self.memory.lock().unwrap();
        let Some(start) = address
            .offset_from(Address::new(self.base))
            .filter(|&s| s < memory.len())
        else {
            return Err(Error::ReadFault {
                address,
                requested: buf.len(),
                message: "address not mapped".to_string(),
            });
        };

        let available = (memory.len() - start).min(buf.len());
        buf[..available].copy_from_slice(&memory[start..start + available]);
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.kill_after_reads == Some(reads) {
            self.kill();
        }
        Ok(available)
    }

    fn write_from(&self, address: Address, bytes: &[u8]) -> Result<usize> {
        let fault = |message: &str| Error::WriteFault {
            address,
            len: bytes.len(),
            message: message.to_string(),
        };
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }
        if !self.is_alive() || Self::hits(&self.write_faults, address, bytes.len()) {
            return Err(fault("simulated write fault"));
        }
        if !self.current_protection().is_writable() {
            return Err(fault("page is not writable"));
        }

        let mut memory = self.memory.lock().unwrap();
        let start = address
            .offset_from(Address::new(self.base))
            .filter(|&s| s + bytes.len() <= memory.len())
            .ok_or_else(|| fault("address not mapped"))?;
        memory[start..start + bytes.len()].copy_from_slice(bytes);
        self.writes.lock().unwrap().push((address, bytes.to_vec()));
        Ok(bytes.len())
    }

    fn protect(&self, address: Address, len: usize, protection: Protection) -> Result<Protection> {
        if let Some(delay) = self.protect_delay {
            std::thread::sleep(delay);
        }
        if Self::hits(&self.protect_faults, address, len) {
            return Err(Error::WriteFault {
                address,
                len,
                message: "simulated protection fault".to_string(),
            });
        }
        let mut current = self.protection.lock().unwrap();
        let previous = *current;
        *current = protection;
        self.protection_log.lock().unwrap().push(protection);
        Ok(previous)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn primary_module(&self) -> Result<ModuleImage> {
        if self.primary {
            Ok(self.image())
        } else {
            Err(Error::ModuleNotFound("primary module unavailable".to_string()))
        }
    }

    fn modules(&self) -> Result<Vec<ModuleImage>> {
        if !self.modules {
            return Ok(Vec::new());
        }
        let mut modules = vec![self.image()];
        modules.extend(self.extra_modules.iter().cloned());
        Ok(modules)
    }
}

/// Builder for [`MockProcess`]
pub struct MockProcessBuilder {
    pid: u32,
    base: u64,
    memory: Vec<u8>,
    alive: bool,
    fail_open: bool,
    read_faults: HashSet<u64>,
    write_faults: HashSet<u64>,
    protect_faults: HashSet<u64>,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
    protect_delay: Option<Duration>,
    kill_after_reads: Option<usize>,
    primary: bool,
    modules: bool,
    extra_modules: Vec<ModuleImage>,
}

impl Default for MockProcessBuilder {
    fn default() -> Self {
        Self {
            pid: 4242,
            base: 0x1_4000_0000,
            memory: Vec::new(),
            alive: true,
            fail_open: false,
            read_faults: HashSet::new(),
            write_faults: HashSet::new(),
            protect_faults: HashSet::new(),
            read_delay: None,
            write_delay: None,
            protect_delay: None,
            kill_after_reads: None,
            primary: true,
            modules: true,
            extra_modules: Vec::new(),
        }
    }
}

impl MockProcessBuilder {
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub fn memory(mut self, memory: Vec<u8>) -> Self {
        self.memory = memory;
        self
    }

    pub fn dead(mut self) -> Self {
        self.alive = false;
        self
    }

    pub fn deny_access(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn fail_read_at(mut self, address: u64) -> Self {
        self.read_faults.insert(address);
        self
    }

    pub fn fail_write_at(mut self, address: u64) -> Self {
        self.write_faults.insert(address);
        self
    }

    pub fn fail_protect_at(mut self, address: u64) -> Self {
        self.protect_faults.insert(address);
        self
    }

    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn protect_delay(mut self, delay: Duration) -> Self {
        self.protect_delay = Some(delay);
        self
    }

    /// The process exits right after its `reads`-th successful read
    pub fn kill_after_reads(mut self, reads: usize) -> Self {
        self.kill_after_reads = Some(reads);
        self
    }

    pub fn without_primary_module(mut self) -> Self {
        self.primary = false;
        self
    }

    pub fn without_modules(mut self) -> Self {
        self.modules = false;
        self
    }

    pub fn extra_module(mut self, module: ModuleImage) -> Self {
        self.extra_modules.push(module);
        self
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            pid: self.pid,
            base: self.base,
            memory: Mutex::new(self.memory),
            protection: Mutex::new(Protection::READ_ONLY),
            protection_log: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            alive: AtomicBool::new(self.alive),
            fail_open: self.fail_open,
            read_faults: self.read_faults,
            write_faults: self.write_faults,
            protect_faults: self.protect_faults,
            read_delay: self.read_delay,
            write_delay: self.write_delay,
            protect_delay: self.protect_delay,
            reads: AtomicUsize::new(0),
            kill_after_reads: self.kill_after_reads,
            primary: self.primary,
            modules: self.modules,
            extra_modules: self.extra_modules,
        }
    }
}
