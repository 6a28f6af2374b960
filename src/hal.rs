//! Interfaces to the collaborators the core does not own.
//!
//! The block-device driver, the MMU/page tables, and the scheduler's
//! wait queues all live outside this crate. Each is a trait here, with
//! an in-memory implementation that the hosted tests (and the mkfs
//! tooling) plug in.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{KernelError, Result};
use crate::lock::SpinLock;
use crate::page::Page;
use crate::pframe::PFrame;

/// A fixed-size array of blocks, one page each.
pub trait BlockDevice: Send + Sync {
    fn block_count(&self) -> usize;
    fn read_block(&self, blockno: usize, buf: &mut Page) -> Result<()>;
    fn write_block(&self, blockno: usize, buf: &Page) -> Result<()>;
    /// Push any device-side buffering to stable storage.
    fn flush(&self) -> Result<()>;
}

/// The hardware mapping interface. The fault handler installs pages
/// here; fork and munmap shoot ranges down.
pub trait Mmu: Send + Sync {
    fn map_page(&self, vpn: usize, frame: &Arc<PFrame>);
    fn unmap_range(&self, lo_vpn: usize, hi_vpn: usize);
    fn flush_tlb(&self);
}

/// A place for a thread to wait for a condition. `sleep` returns
/// `Err(Interrupted)` when the sleeper was cancelled; callers must then
/// back out without mutating shared state.
pub trait WaitQueue: Send + Sync {
    fn sleep(&self) -> Result<()>;
    fn wake_all(&self);
}

/// An in-memory disk.
pub struct MemDisk {
    blocks: SpinLock<Vec<Box<Page>>>,
}

impl MemDisk {
    pub fn new(nblocks: usize) -> Arc<Self> {
        let mut blocks = Vec::with_capacity(nblocks);
        for _ in 0..nblocks {
            blocks.push(Page::new_zeroed());
        }
        Arc::new(Self {
            blocks: SpinLock::new(blocks),
        })
    }
}

impl BlockDevice for MemDisk {
    fn block_count(&self) -> usize {
        self.blocks.lock().len()
    }

    fn read_block(&self, blockno: usize, buf: &mut Page) -> Result<()> {
        let blocks = self.blocks.lock();
        let src = blocks.get(blockno).ok_or(KernelError::InvalidArgument)?;
        buf.0.copy_from_slice(&src.0);
        Ok(())
    }

    fn write_block(&self, blockno: usize, buf: &Page) -> Result<()> {
        let mut blocks = self.blocks.lock();
        let dst = blocks
            .get_mut(blockno)
            .ok_or(KernelError::InvalidArgument)?;
        dst.0.copy_from_slice(&buf.0);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// An MMU that forgets every mapping immediately. Hosted runs reach
/// memory through `VmMap::read`/`write`, which re-fault on demand, so
/// nothing needs to be remembered.
pub struct NullMmu;

impl Mmu for NullMmu {
    fn map_page(&self, _vpn: usize, _frame: &Arc<PFrame>) {}

    fn unmap_range(&self, _lo_vpn: usize, _hi_vpn: usize) {}

    fn flush_tlb(&self) {}
}

/// A wait queue with nobody to do the waking: sleeping on it reports
/// cancellation. Hosted tests arrange for conditions to hold before
/// they would block.
pub struct NoWait;

impl WaitQueue for NoWait {
    fn sleep(&self) -> Result<()> {
        Err(KernelError::Interrupted)
    }

    fn wake_all(&self) {}
}
