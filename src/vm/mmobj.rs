//! The memory-object interface.

use alloc::sync::Arc;

use crate::error::Result;
use crate::pframe::PFrame;
use crate::vm::shadow::ShadowObj;

/// A source of pages for virtual mappings.
///
/// Reference counting is the `Arc` itself: every place the C tradition
/// would call `ref`/`put` is a clone or a drop here, and final teardown
/// (unpin and release resident frames, write back what needs writing,
/// release the shadowed and bottom objects) lives in each variant's
/// `Drop`.
pub trait MemObj: Send + Sync {
    /// The frame backing object page `pageno`, materialising it if
    /// necessary. For shadows, `for_write` decides between finding the
    /// nearest copy in the chain and making a private copy here.
    fn lookup_page(&self, pageno: usize, for_write: bool) -> Result<Arc<PFrame>>;

    /// The frame for `pageno` only if it is already resident in this
    /// object (not in ancestors).
    fn resident(&self, pageno: usize) -> Option<Arc<PFrame>>;

    /// Hook run before a page of this object is written. File-backed
    /// objects allocate the backing block here.
    fn dirty_page(&self, frame: &PFrame) -> Result<()>;

    /// Write one page back to its backing store.
    fn clean_page(&self, frame: &PFrame) -> Result<()>;

    /// The immediately shadowed object; `None` exactly for bottoms.
    fn shadowed(&self) -> Option<Arc<dyn MemObj>> {
        None
    }

    /// The non-shadow object at the tail of the shadow chain.
    fn bottom(self: Arc<Self>) -> Arc<dyn MemObj>;

    /// Cross-reference bookkeeping: a VMA now maps (through) this
    /// bottom object.
    fn attach_vma(&self) {}

    fn detach_vma(&self) {}

    /// Resident-page count.
    fn nres(&self) -> usize;

    fn as_shadow(&self) -> Option<&ShadowObj> {
        None
    }
}
