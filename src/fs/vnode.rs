//! Vnodes: the in-memory face of a file object.
//!
//! `Vnode` is the operations table every filesystem object carries; the
//! S5 node in `fs::s5` is the implementation behind it. `FileObj` is the
//! memory object a vnode supplies for mappings and for its own
//! read/write paths, so file pages live in one place no matter how they
//! are reached.

use alloc::sync::Arc;
use core::any::Any;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::drivers::DevId;
use crate::error::Result;
use crate::page::Page;
use crate::param::NAME_LEN;
use crate::pframe::{FrameSet, PFrame};
use crate::vm::MemObj;

use super::path::FileName;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Regular,
    Directory,
    CharDev,
    BlockDev,
}

#[derive(Clone, Copy, Debug)]
pub struct Stat {
    pub ino: u32,
    pub mode: Mode,
    /// On-disk links, excluding the reference the VFS itself holds.
    pub nlink: u32,
    pub size: usize,
    pub blksize: usize,
    /// Blocks actually allocated, indirect block included; sparse
    /// holes are not counted.
    pub blocks: usize,
}

/// One directory entry as `getdent` reports it.
#[derive(Clone, Copy)]
pub struct DirEntry {
    pub ino: u32,
    pub name: [u8; NAME_LEN],
}

impl DirEntry {
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|ch| *ch == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..len]
    }
}

/// The vnode operations table. Directory operations fail with
/// `NotADirectory` on non-directories; callers gate reads and writes of
/// directories at the syscall layer.
pub trait Vnode: Send + Sync {
    fn ino(&self) -> u32;
    fn mode(&self) -> Mode;
    fn len(&self) -> usize;
    /// Device id, for device special files.
    fn devid(&self) -> Option<DevId>;

    fn read(&self, off: usize, buf: &mut [u8]) -> Result<usize>;
    fn write(&self, off: usize, buf: &[u8]) -> Result<usize>;

    /// Resolve one component. The returned vnode's reference is the
    /// caller's to release.
    fn lookup(&self, name: &FileName) -> Result<Arc<dyn Vnode>>;
    fn create(&self, name: &FileName) -> Result<Arc<dyn Vnode>>;
    fn mknod(&self, name: &FileName, mode: Mode, devid: DevId) -> Result<()>;
    fn link(&self, child: &dyn Vnode, name: &FileName) -> Result<()>;
    fn unlink(&self, name: &FileName) -> Result<()>;
    fn mkdir(&self, name: &FileName) -> Result<()>;
    fn rmdir(&self, name: &FileName) -> Result<()>;
    /// The entry at byte offset `off` and the number of bytes the
    /// caller's cursor should advance, or `None` at the end.
    fn readdir(&self, off: usize) -> Result<Option<(DirEntry, usize)>>;
    fn stat(&self) -> Result<Stat>;

    /// The memory object serving this vnode's pages.
    fn mmobj(&self) -> Result<Arc<dyn MemObj>>;

    /// Read page `pageno` of the file into `page`; sparse pages read as
    /// zeros without allocating.
    fn fill_page(&self, pageno: usize, page: &mut Page) -> Result<()>;
    /// A page is about to be written: make sure backing exists.
    fn dirty_page(&self, pageno: usize) -> Result<()>;
    /// Write page `pageno` back to disk.
    fn clean_page(&self, pageno: usize, page: &Page) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// The file-backed memory object. It owns the vnode reference — a live
/// mapping keeps the file alive after its last descriptor closes — and
/// the vnode caches a weak pointer back, so the pair stays acyclic.
pub struct FileObj {
    vnode: Arc<dyn Vnode>,
    frames: FrameSet,
    vma_refs: AtomicUsize,
}

impl FileObj {
    pub(crate) fn new(vnode: Arc<dyn Vnode>) -> Arc<Self> {
        Arc::new(Self {
            vnode,
            frames: FrameSet::new(),
            vma_refs: AtomicUsize::new(0),
        })
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }
}

impl MemObj for FileObj {
    fn lookup_page(&self, pageno: usize, _for_write: bool) -> Result<Arc<PFrame>> {
        self.frames
            .get_or_fill(pageno, |frame| {
                frame.with_data_mut(|page| self.vnode.fill_page(pageno, page))
            })
    }

    fn resident(&self, pageno: usize) -> Option<Arc<PFrame>> {
        self.frames.resident(pageno)
    }

    fn dirty_page(&self, frame: &PFrame) -> Result<()> {
        self.vnode.dirty_page(frame.pageno())
    }

    fn clean_page(&self, frame: &PFrame) -> Result<()> {
        frame.with_data(|page| self.vnode.clean_page(frame.pageno(), page))?;
        frame.clear_dirty();
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
        debug_assert!(old > 0, "file object detached more than attached");
    }

    fn nres(&self) -> usize {
        self.frames.len()
    }
}

impl Drop for FileObj {
    fn drop(&mut self) {
        // Last reference: nothing maps the file and no descriptor is
        // mid-operation, so push the dirty pages out before the vnode
        // reference goes away. Failed writeback with no journal is not
        // recoverable.
        for frame in self.frames.drain() {
            if frame.is_dirty() {
                frame
                    .with_data(|page| self.vnode.clean_page(frame.pageno(), page))
                    .expect("file page writeback");
                frame.clear_dirty();
            }
        }
    }
}
