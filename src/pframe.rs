//! Page frames and per-object residency.
//!
//! A `PFrame` is one cached page of some memory object, carrying the pin
//! count and dirty state the rest of the kernel keys off. Each memory
//! object owns a `FrameSet`, the object's slice of the system-wide
//! (object, page-number) cache. A pinned frame stays resident; every pin
//! is matched by an unpin on every exit path.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::Result;
use crate::lock::SpinLock;
use crate::page::Page;

#[derive(Debug)]
pub struct PFrame {
    pageno: usize,
    data: SpinLock<alloc::boxed::Box<Page>>,
    dirty: AtomicBool,
    pins: AtomicUsize,
}

impl PFrame {
    pub fn new(pageno: usize) -> Arc<Self> {
        Arc::new(Self {
            pageno,
            data: SpinLock::new(Page::new_zeroed()),
            dirty: AtomicBool::new(false),
            pins: AtomicUsize::new(0),
        })
    }

    pub fn pageno(&self) -> usize {
        self.pageno
    }

    pub fn with_data<R>(&self, f: impl FnOnce(&Page) -> R) -> R {
        f(&self.data.lock())
    }

    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        f(&mut self.data.lock())
    }

    pub fn pin(&self) {
        let _ = self.pins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unpin(&self) {
        let old = self.pins.fetch_sub(1, Ordering::Relaxed);
        assert!(old > 0, "unpin of unpinned frame");
    }

    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::Relaxed)
    }

    pub fn set_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }
}

/// The resident pages of one memory object, keyed by object page number.
pub struct FrameSet {
    frames: SpinLock<BTreeMap<usize, Arc<PFrame>>>,
}

impl FrameSet {
    pub fn new() -> Self {
        Self {
            frames: SpinLock::new(BTreeMap::new()),
        }
    }

    pub fn resident(&self, pageno: usize) -> Option<Arc<PFrame>> {
        self.frames.lock().get(&pageno).cloned()
    }

    /// The resident frame for `pageno`, or a fresh one initialised by
    /// `fill`. The set lock is held across the fill: on the cooperative
    /// single-CPU model nobody else runs unless the fill suspends, and
    /// fills of this object are serialised either way.
    pub fn get_or_fill(
        &self,
        pageno: usize,
        fill: impl FnOnce(&Arc<PFrame>) -> Result<()>,
    ) -> Result<Arc<PFrame>> {
        let mut frames = self.frames.lock();
        if let Some(frame) = frames.get(&pageno) {
            return Ok(frame.clone());
        }
        let frame = PFrame::new(pageno);
        fill(&frame)?;
        let _ = frames.insert(pageno, frame.clone());
        Ok(frame)
    }

    pub fn remove(&self, pageno: usize) -> Option<Arc<PFrame>> {
        self.frames.lock().remove(&pageno)
    }

    /// Number of resident pages.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Snapshot of the resident frames, for flush walks.
    pub fn snapshot(&self) -> Vec<Arc<PFrame>> {
        self.frames.lock().values().cloned().collect()
    }

    /// Empty the set, handing every frame to the caller for teardown.
    pub fn drain(&self) -> Vec<Arc<PFrame>> {
        let mut frames = self.frames.lock();
        let drained = frames.values().cloned().collect();
        frames.clear();
        drained
    }
}

impl Default for FrameSet {
    fn default() -> Self {
        Self::new()
    }
}
