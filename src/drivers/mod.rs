//! Device identifiers and the device switch.
//!
//! Character major 1 holds the memory devices (`null`, `zero`),
//! character major 2 the terminals. Block major 1 holds the disks the
//! filesystem mounts by name ("disk0", "disk1", ...).

mod memdev;
mod tty;

pub use memdev::{NullDev, ZeroDev};
pub use tty::{LineDiscipline, Tty};

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use crate::error::{KernelError, Result};
use crate::hal::BlockDevice;
use crate::lock::SpinLock;

/// Character major of the memory devices.
pub const MEM_MAJOR: u16 = 1;
/// Character major of the terminals.
pub const TTY_MAJOR: u16 = 2;
/// Block major of the disks.
pub const DISK_MAJOR: u16 = 1;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct DevId(u32);

impl DevId {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self(((major as u32) << 16) | minor as u32)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub const fn minor(self) -> u16 {
        self.0 as u16
    }
}

/// A byte-at-a-time device behind a character special file.
pub trait CharDevice: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> Result<usize>;
    fn write(&self, buf: &[u8]) -> Result<usize>;
}

/// Maps device ids to drivers.
pub struct DevSwitch {
    chr: SpinLock<BTreeMap<DevId, Arc<dyn CharDevice>>>,
    blk: SpinLock<BTreeMap<DevId, Arc<dyn BlockDevice>>>,
}

impl DevSwitch {
    pub fn new() -> Self {
        Self {
            chr: SpinLock::new(BTreeMap::new()),
            blk: SpinLock::new(BTreeMap::new()),
        }
    }

    pub fn register_chr(&self, devid: DevId, dev: Arc<dyn CharDevice>) {
        let _ = self.chr.lock().insert(devid, dev);
    }

    pub fn register_blk(&self, devid: DevId, dev: Arc<dyn BlockDevice>) {
        let _ = self.blk.lock().insert(devid, dev);
    }

    /// The character device behind `devid`; `NoEntry` when no such
    /// device exists.
    pub fn chr(&self, devid: DevId) -> Result<Arc<dyn CharDevice>> {
        self.chr
            .lock()
            .get(&devid)
            .cloned()
            .ok_or(KernelError::NoEntry)
    }

    pub fn blk(&self, devid: DevId) -> Result<Arc<dyn BlockDevice>> {
        self.blk
            .lock()
            .get(&devid)
            .cloned()
            .ok_or(KernelError::NoEntry)
    }
}

impl Default for DevSwitch {
    fn default() -> Self {
        Self::new()
    }
}
