//! Anonymous memory: process-private pages filled with zeros on demand.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::pframe::{FrameSet, PFrame};
use crate::vm::mmobj::MemObj;

pub struct AnonObj {
    frames: FrameSet,
    /// VMAs mapping (through) this object, maintained by the vmmap.
    vma_refs: AtomicUsize,
}

impl AnonObj {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: FrameSet::new(),
            vma_refs: AtomicUsize::new(0),
        })
    }

    pub fn vma_refs(&self) -> usize {
        self.vma_refs.load(Ordering::Relaxed)
    }
}

impl MemObj for AnonObj {
    fn lookup_page(&self, pageno: usize, _for_write: bool) -> Result<Arc<PFrame>> {
        // Frames start zeroed; anonymous pages are pinned for their whole
        // life, since they have no backing store to page out to.
        self.frames.get_or_fill(pageno, |frame| {
            frame.pin();
            Ok(())
        })
    }

    fn resident(&self, pageno: usize) -> Option<Arc<PFrame>> {
        self.frames.resident(pageno)
    }

    fn dirty_page(&self, _frame: &PFrame) -> Result<()> {
        Ok(())
    }

    fn clean_page(&self, _frame: &PFrame) -> Result<()> {
        Ok(())
    }

    fn bottom(self: Arc<Self>) -> Arc<dyn MemObj> {
        self
    }

    fn attach_vma(&self) {
        let _ = self.vma_refs.fetch_add(1, Ordering::Relaxed);
    }

    fn detach_vma(&self) {
        let old = self.vma_refs.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(old > 0, "anon object detached more than attached");
    }

    fn nres(&self) -> usize {
        self.frames.len()
    }
}

impl Drop for AnonObj {
    fn drop(&mut self) {
        for frame in self.frames.drain() {
            frame.unpin();
        }
    }
}
