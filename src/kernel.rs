//! The kernel instance: the mounted filesystem, the device switch, and
//! process bookkeeping, tied together so each subsystem can reach its
//! collaborators.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::drivers::{DevId, DevSwitch, NullDev, Tty, ZeroDev, DISK_MAJOR, MEM_MAJOR, TTY_MAJOR};
use crate::error::{KernelError, Result};
use crate::fs::s5::S5Fs;
use crate::fs::Vnode;
use crate::hal::{BlockDevice, Mmu, NoWait, NullMmu};
use crate::proc::Proc;

pub struct Kernel {
    fs: Arc<S5Fs>,
    devices: DevSwitch,
    mmu: Arc<dyn Mmu>,
    next_pid: AtomicUsize,
}

impl Kernel {
    /// Bring the kernel up on the named root disk: resolve `fsdev`
    /// ("disk0", "disk1", ...) through the device switch and mount it.
    pub fn new(devices: DevSwitch, fsdev: &[u8], mmu: Arc<dyn Mmu>) -> Result<Arc<Kernel>> {
        let disk = devices.blk(parse_diskname(fsdev)?)?;
        let fs = S5Fs::mount(disk)?;
        Ok(Arc::new(Kernel {
            fs,
            devices,
            mmu,
            next_pid: AtomicUsize::new(0),
        }))
    }

    /// Hosted bring-up: register `disk` as disk0 together with the
    /// memory devices and a terminal, and mount it.
    pub fn boot(disk: Arc<dyn BlockDevice>) -> Result<Arc<Kernel>> {
        let devices = DevSwitch::new();
        devices.register_blk(DevId::new(DISK_MAJOR, 0), disk);
        devices.register_chr(DevId::new(MEM_MAJOR, 0), Arc::new(NullDev));
        devices.register_chr(DevId::new(MEM_MAJOR, 1), Arc::new(ZeroDev));
        devices.register_chr(DevId::new(TTY_MAJOR, 0), Tty::new(Arc::new(NoWait)));
        Self::new(devices, b"disk0", Arc::new(NullMmu))
    }

    pub fn fs(&self) -> &Arc<S5Fs> {
        &self.fs
    }

    pub fn devices(&self) -> &DevSwitch {
        &self.devices
    }

    pub fn mmu(&self) -> &Arc<dyn Mmu> {
        &self.mmu
    }

    pub fn root(&self) -> Arc<dyn Vnode> {
        self.fs.root()
    }

    pub(crate) fn alloc_pid(&self) -> usize {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }

    /// The first process, cwd at the root.
    pub fn spawn_init(self: &Arc<Self>) -> Arc<Proc> {
        Proc::new_root(self.clone())
    }

    /// Shut down: unmount the filesystem, flushing everything. Every
    /// process must have exited and released its files first.
    pub fn halt(&self) -> Result<()> {
        self.fs.unmount()
    }
}

fn parse_diskname(name: &[u8]) -> Result<DevId> {
    let digits = name
        .strip_prefix(b"disk")
        .ok_or(KernelError::InvalidArgument)?;
    if digits.is_empty() || !digits.iter().all(|ch| ch.is_ascii_digit()) {
        return Err(KernelError::InvalidArgument);
    }
    let mut minor: u32 = 0;
    for ch in digits {
        minor = minor
            .checked_mul(10)
            .and_then(|m| m.checked_add((ch - b'0') as u32))
            .ok_or(KernelError::InvalidArgument)?;
    }
    if minor > u16::MAX as u32 {
        return Err(KernelError::InvalidArgument);
    }
    Ok(DevId::new(DISK_MAJOR, minor as u16))
}
