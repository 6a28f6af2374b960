//! Shadow objects: copy-on-write overlays.
//!
//! A shadow sits in front of another object (a further shadow, or the
//! non-shadow "bottom" at the tail of the chain). Reads search down the
//! chain for the nearest copy of a page; the first write to a page
//! copies it into this shadow, where it masks every older copy below.

use alloc::sync::Arc;

use crate::error::Result;
use crate::lock::SpinLock;
use crate::pframe::{FrameSet, PFrame};
use crate::vm::mmobj::MemObj;

pub struct ShadowObj {
    /// The immediately shadowed object. `None` only transiently, while
    /// a chain teardown is stealing parents.
    shadowed: SpinLock<Option<Arc<dyn MemObj>>>,
    /// The non-shadow object at the tail; each shadow in a chain holds
    /// its own reference to it.
    bottom: Arc<dyn MemObj>,
    frames: FrameSet,
}

impl ShadowObj {
    /// A fresh shadow in front of `shadowed`. Chains are acyclic by
    /// construction: the shadowed object exists before its shadow.
    pub fn new(shadowed: Arc<dyn MemObj>) -> Arc<Self> {
        let bottom = shadowed.clone().bottom();
        debug_assert!(bottom.shadowed().is_none(), "bottom object is a shadow");
        Arc::new(Self {
            shadowed: SpinLock::new(Some(shadowed)),
            bottom,
            frames: FrameSet::new(),
        })
    }

    fn parent(&self) -> Arc<dyn MemObj> {
        self.shadowed.lock().clone().expect("shadow chain broken")
    }

    /// The page a fresh copy must be filled from: the nearest resident
    /// copy in the chain below this shadow, else whatever the bottom
    /// produces. Iterative on purpose; chains grow one link per fork
    /// and a recursive walk could exhaust the kernel stack.
    fn source_frame(&self, pageno: usize) -> Result<Arc<PFrame>> {
        let mut cur = self.parent();
        loop {
            match cur.shadowed() {
                Some(next) => {
                    if let Some(frame) = cur.resident(pageno) {
                        return Ok(frame);
                    }
                    cur = next;
                }
                None => return cur.lookup_page(pageno, false),
            }
        }
    }
}

impl MemObj for ShadowObj {
    fn lookup_page(&self, pageno: usize, for_write: bool) -> Result<Arc<PFrame>> {
        if !for_write {
            if let Some(frame) = self.frames.resident(pageno) {
                return Ok(frame);
            }
            return self.source_frame(pageno);
        }
        self.frames.get_or_fill(pageno, |frame| {
            let src = self.source_frame(pageno)?;
            debug_assert!(!core::ptr::eq(&**frame, &*src));
            frame.with_data_mut(|dst| src.with_data(|s| dst.0.copy_from_slice(&s.0)));
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

    fn shadowed(&self) -> Option<Arc<dyn MemObj>> {
        Some(self.parent())
    }

    fn bottom(self: Arc<Self>) -> Arc<dyn MemObj> {
        self.bottom.clone()
    }

    fn nres(&self) -> usize {
        self.frames.len()
    }

    fn as_shadow(&self) -> Option<&ShadowObj> {
        Some(self)
    }
}

impl Drop for ShadowObj {
    fn drop(&mut self) {
        for frame in self.frames.drain() {
            frame.unpin();
        }
        // Collapse the rest of the chain iteratively. Dropping the
        // parent `Arc` naively would recurse once per link.
        let mut next = self.shadowed.get_mut().take();
        while let Some(obj) = next {
            next = match obj.as_shadow() {
                Some(shadow) if Arc::strong_count(&obj) == 1 => {
                    for frame in shadow.frames.drain() {
                        frame.unpin();
                    }
                    shadow.shadowed.lock().take()
                }
                _ => None,
            };
            drop(obj);
        }
    }
}
