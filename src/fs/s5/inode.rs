//! S5 inodes and the vnode built on them.
//!
//! An inode owns up to `NDIRECT` direct blocks and one indirect block
//! of further block numbers. Block number 0 means "sparse": the data
//! reads as zeros and nothing is allocated until somebody dirties a
//! page over the hole. Files and directories are addressed identically;
//! a directory is a file whose bytes happen to be a contiguous array of
//! fixed-size entries.
//!
//! The in-memory `S5Node` keeps a cached copy of its on-disk inode and
//! writes it through to the (pinned) inode-table page on every
//! mutation. The vnode mutex (`iolock`) serialises whole operations on
//! one file; the inode copy itself sits under a short spin lock so the
//! page-fill and writeback hooks, which run without the vnode mutex,
//! can read block pointers safely.

use alloc::sync::{Arc, Weak};
use core::any::Any;
use core::cmp;
use core::mem;

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::drivers::DevId;
use crate::error::{KernelError, Result};
use crate::fs::path::FileName;
use crate::fs::vnode::{DirEntry, FileObj, Mode, Stat, Vnode};
use crate::lock::{SleepLock, SleepLockGuard, SpinLock};
use crate::page::Page;
use crate::param::{BLOCK_SIZE, MAX_FILE_BLOCKS, MAX_FILE_SIZE, NAME_LEN, NDIRECT};
use crate::vm::MemObj;

use super::S5Fs;

pub const S5_TYPE_FREE: u32 = 0;
pub const S5_TYPE_DATA: u32 = 1;
pub const S5_TYPE_DIR: u32 = 2;
pub const S5_TYPE_CHR: u32 = 3;
pub const S5_TYPE_BLK: u32 = 4;

pub const INODE_SIZE: usize = 128;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// On-disk inode.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct RawInode {
    pub number: u32,
    /// Next inode on the free list; meaningful only when `typ` is
    /// `S5_TYPE_FREE`.
    pub next_free: u32,
    pub typ: u32,
    pub linkcount: u32,
    pub size: u32,
    /// Indirect block number — or the device id, for device inodes.
    pub indirect: u32,
    pub direct: [u32; NDIRECT],
}

const_assert_eq!(mem::size_of::<RawInode>(), INODE_SIZE);

/// Block of the inode table holding inode `ino`.
pub(crate) const fn inode_block(ino: u32) -> usize {
    1 + ino as usize / INODES_PER_BLOCK
}

/// Byte offset of inode `ino` within its table block.
pub(crate) const fn inode_offset(ino: u32) -> usize {
    (ino as usize % INODES_PER_BLOCK) * INODE_SIZE
}

/// On-disk directory entry: a fixed-size name (NUL-terminated when
/// shorter than `NAME_LEN`) and an inode number.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct RawDirent {
    pub ino: u32,
    pub name: [u8; NAME_LEN],
}

pub const DIRENT_SIZE: usize = mem::size_of::<RawDirent>();

const_assert_eq!(DIRENT_SIZE, 32);
const_assert_eq!(BLOCK_SIZE % DIRENT_SIZE, 0);

impl RawDirent {
    pub fn new(ino: u32, name: &[u8]) -> Self {
        debug_assert!(!name.is_empty() && name.len() <= NAME_LEN);
        let mut de = Self {
            ino,
            name: [0; NAME_LEN],
        };
        de.name[..name.len()].copy_from_slice(name);
        de
    }

    /// The name, without the NUL padding.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|ch| *ch == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..len]
    }
}

/// The in-memory vnode for one S5 inode. At most one exists per inode
/// number; the filesystem's table enforces it.
pub struct S5Node {
    fs: Arc<S5Fs>,
    ino: u32,
    self_ref: Weak<S5Node>,
    /// Cached on-disk inode, written through on every mutation.
    inode: SpinLock<RawInode>,
    /// The vnode mutex: one whole file operation at a time.
    iolock: SleepLock<()>,
    /// Cached file-backed memory object; the object owns the vnode
    /// reference, we only remember it weakly.
    mmobj: SpinLock<Weak<FileObj>>,
}

impl S5Node {
    pub(crate) fn new(fs: Arc<S5Fs>, ino: u32, inode: RawInode) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            fs,
            ino,
            self_ref: weak.clone(),
            inode: SpinLock::new(inode),
            iolock: SleepLock::new(()),
            mmobj: SpinLock::new(Weak::new()),
        })
    }

    pub(crate) fn mode(&self) -> Mode {
        Self::mode_of(self.inode.lock().typ, self.ino)
    }

    pub(crate) fn size(&self) -> usize {
        self.inode.lock().size as usize
    }

    /// Lock the vnode for one whole operation.
    pub(crate) fn lock(&self) -> NodeGuard<'_> {
        NodeGuard {
            node: self,
            obj: self.mmobj_arc(),
            _io: self.iolock.lock(),
        }
    }

    /// The memory object serving this file's pages, shared between
    /// mappings and the read/write paths.
    pub(crate) fn mmobj_arc(&self) -> Arc<FileObj> {
        let mut cached = self.mmobj.lock();
        if let Some(obj) = cached.upgrade() {
            return obj;
        }
        let node = self.self_ref.upgrade().expect("vnode is alive");
        let obj = FileObj::new(node);
        *cached = Arc::downgrade(&obj);
        obj
    }

    /// Write the cached inode through to its table page.
    fn dirty_inode(&self, inode: &RawInode) {
        self.fs
            .write_raw_inode(self.ino, inode)
            .expect("inode page is resident");
    }

    fn inc_link(&self) {
        let mut inode = self.inode.lock();
        inode.linkcount += 1;
        self.dirty_inode(&inode);
    }

    fn dec_link(&self) {
        let mut inode = self.inode.lock();
        assert!(inode.linkcount > 0, "linkcount underflow on {}", self.ino);
        inode.linkcount -= 1;
        self.dirty_inode(&inode);
    }

    /// The disk block backing byte offset `seek`, or 0 for a sparse
    /// hole when `alloc` is false. With `alloc` set, holes (and a
    /// missing indirect block) are allocated; the indirect block is
    /// allocated and zeroed before the data block, and any allocation
    /// followed by a later failure is undone.
    pub(crate) fn seek_to_block(&self, seek: usize, alloc: bool) -> Result<u32> {
        let b = seek / BLOCK_SIZE;
        if b >= MAX_FILE_BLOCKS {
            return Err(KernelError::InvalidArgument);
        }

        if b < NDIRECT {
            let cur = self.inode.lock().direct[b];
            if cur != 0 || !alloc {
                return Ok(cur);
            }
            let blockno = self.fs.alloc_block()?;
            let mut inode = self.inode.lock();
            inode.direct[b] = blockno;
            self.dirty_inode(&inode);
            return Ok(blockno);
        }

        let idx = b - NDIRECT;
        let (typ, indirect) = {
            let inode = self.inode.lock();
            (inode.typ, inode.indirect)
        };
        if typ != S5_TYPE_DATA && typ != S5_TYPE_DIR {
            return Err(KernelError::InvalidArgument);
        }

        if indirect != 0 {
            let frame = self.fs.disk().page(indirect as usize)?;
            let cur = frame.with_data(|page| page.read_u32(idx * 4));
            if cur != 0 || !alloc {
                return Ok(cur);
            }
            let blockno = self.fs.alloc_block()?;
            frame.with_data_mut(|page| page.write_u32(idx * 4, blockno));
            frame.set_dirty();
            return Ok(blockno);
        }

        if !alloc {
            return Ok(0);
        }

        let iblock = self.fs.alloc_block()?;
        let undo = scopeguard::guard((), |_| self.fs.free_block(iblock));
        let frame = self.fs.disk().page(iblock as usize)?;
        frame.with_data_mut(|page| page.zero());
        frame.set_dirty();
        let blockno = self.fs.alloc_block()?;
        frame.with_data_mut(|page| page.write_u32(idx * 4, blockno));
        frame.set_dirty();
        {
            let mut inode = self.inode.lock();
            inode.indirect = iblock;
            self.dirty_inode(&inode);
        }
        let _ = scopeguard::ScopeGuard::into_inner(undo);
        Ok(blockno)
    }

    /// One directory entry, locking the vnode for just that entry;
    /// diagnostic walks use this.
    pub(crate) fn dir_entry_at(&self, off: usize) -> Result<Option<(DirEntry, usize)>> {
        self.readdir_inner(&self.lock(), off)
    }

    /// Does any on-disk link besides the one the VFS itself holds still
    /// name this inode?
    pub fn other_links(&self) -> bool {
        self.fs.query_vnode(&self.inode.lock())
    }

    fn readdir_inner(
        &self,
        guard: &NodeGuard<'_>,
        off: usize,
    ) -> Result<Option<(DirEntry, usize)>> {
        if self.mode() != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        if off % DIRENT_SIZE != 0 {
            return Err(KernelError::InvalidArgument);
        }
        if off >= self.size() {
            return Ok(None);
        }
        let de = guard.dirent_at(off)?;
        Ok(Some((
            DirEntry {
                ino: de.ino,
                name: de.name,
            },
            DIRENT_SIZE,
        )))
    }
}

impl Drop for S5Node {
    fn drop(&mut self) {
        self.fs.forget_vnode(self.ino, self.inode.get_mut());
    }
}

/// A locked vnode. Multi-step operations (directory edits, file I/O)
/// run against the guard so the vnode mutex provably spans them.
pub(crate) struct NodeGuard<'a> {
    node: &'a S5Node,
    /// The file's memory object, held for the duration so page frames
    /// survive from step to step.
    obj: Arc<FileObj>,
    _io: SleepLockGuard<'a, ()>,
}

impl NodeGuard<'_> {
    /// Read up to `buf.len()` bytes at `seek`. Short reads happen only
    /// at end of file; sparse holes read as zeros without allocating.
    pub(crate) fn read_file(&self, seek: usize, buf: &mut [u8]) -> Result<usize> {
        let size = self.node.size();
        if buf.is_empty() || seek >= size {
            return Ok(0);
        }
        let n = cmp::min(buf.len(), size - seek);
        let mut done = 0;
        let mut off = seek;
        while done < n {
            let po = off % BLOCK_SIZE;
            let m = cmp::min(BLOCK_SIZE - po, n - done);
            let frame = self.obj.lookup_page(off / BLOCK_SIZE, false)?;
            frame.with_data(|page| buf[done..done + m].copy_from_slice(&page.0[po..po + m]));
            done += m;
            off += m;
        }
        Ok(n)
    }

    /// Write `buf` at `seek`, allocating over any sparse holes touched
    /// and extending the file length past old end-of-file. Writes are
    /// clamped to the maximum file size; writing at or past it is an
    /// error.
    pub(crate) fn write_file(&self, seek: usize, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if seek >= MAX_FILE_SIZE {
            return Err(KernelError::InvalidArgument);
        }
        let n = cmp::min(buf.len(), MAX_FILE_SIZE - seek);
        let mut done = 0;
        let mut off = seek;
        while done < n {
            let po = off % BLOCK_SIZE;
            let m = cmp::min(BLOCK_SIZE - po, n - done);
            let frame = self.obj.lookup_page(off / BLOCK_SIZE, true)?;
            // Back the page before the bytes land in it.
            if let Err(err) = self.obj.dirty_page(&frame) {
                if done == 0 {
                    return Err(err);
                }
                break;
            }
            frame.with_data_mut(|page| page.0[po..po + m].copy_from_slice(&buf[done..done + m]));
            frame.set_dirty();
            done += m;
            off += m;
        }

        let end = seek + done;
        let mut inode = self.node.inode.lock();
        if end > inode.size as usize {
            inode.size = end as u32;
        }
        self.node.dirty_inode(&inode);
        Ok(done)
    }

    fn dirent_at(&self, off: usize) -> Result<RawDirent> {
        let mut de = RawDirent::new_zeroed();
        let n = self.read_file(off, de.as_bytes_mut())?;
        assert_eq!(n, DIRENT_SIZE, "directory truncated mid-entry");
        Ok(de)
    }

    /// Scan for `name`, returning the inode number and entry offset.
    pub(crate) fn find_dirent(&self, name: &FileName) -> Result<(u32, usize)> {
        let size = self.node.size();
        debug_assert_eq!(size % DIRENT_SIZE, 0);
        for off in (0..size).step_by(DIRENT_SIZE) {
            let de = self.dirent_at(off)?;
            if de.name_bytes() == name.as_bytes() {
                return Ok((de.ino, off));
            }
        }
        Err(KernelError::NoEntry)
    }

    /// Append an entry naming `child`. The "." self-link is
    /// deliberately not counted in the child's linkcount.
    pub(crate) fn link_dirent(&self, child: &S5Node, name: &FileName) -> Result<()> {
        match self.find_dirent(name) {
            Ok(_) => return Err(KernelError::AlreadyExists),
            Err(KernelError::NoEntry) => {}
            Err(err) => return Err(err),
        }
        let de = RawDirent::new(child.ino, name.as_bytes());
        let n = self.write_file(self.node.size(), de.as_bytes())?;
        assert_eq!(n, DIRENT_SIZE);
        if !name.is_dot() {
            child.inc_link();
        }
        Ok(())
    }

    /// Remove the entry for `name`, sliding the last entry into its
    /// slot so the entry array stays contiguous, and drop the named
    /// inode's link. Reclamation, if this was the last link, happens
    /// when the last in-memory reference goes away.
    pub(crate) fn remove_dirent(&self, name: &FileName) -> Result<()> {
        let (ino, off) = self.find_dirent(name)?;
        let size = self.node.size();
        let last = self.dirent_at(size - DIRENT_SIZE)?;
        let n = self.write_file(off, last.as_bytes())?;
        assert_eq!(n, DIRENT_SIZE);
        {
            let mut inode = self.node.inode.lock();
            inode.size -= DIRENT_SIZE as u32;
            self.node.dirty_inode(&inode);
        }
        let child = self.node.fs.vget(ino)?;
        child.dec_link();
        Ok(())
    }
}

impl Vnode for S5Node {
    fn ino(&self) -> u32 {
        self.ino
    }

    fn mode(&self) -> Mode {
        S5Node::mode(self)
    }

    fn len(&self) -> usize {
        self.size()
    }

    fn devid(&self) -> Option<DevId> {
        let inode = self.inode.lock();
        match inode.typ {
            S5_TYPE_CHR | S5_TYPE_BLK => Some(DevId::from_raw(inode.indirect)),
            _ => None,
        }
    }

    fn read(&self, off: usize, buf: &mut [u8]) -> Result<usize> {
        self.lock().read_file(off, buf)
    }

    fn write(&self, off: usize, buf: &[u8]) -> Result<usize> {
        self.lock().write_file(off, buf)
    }

    fn lookup(&self, name: &FileName) -> Result<Arc<dyn Vnode>> {
        if S5Node::mode(self) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        let (ino, _) = self.lock().find_dirent(name)?;
        Ok(self.fs.vget(ino)?)
    }

    fn create(&self, name: &FileName) -> Result<Arc<dyn Vnode>> {
        if S5Node::mode(self) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        let guard = self.lock();
        match guard.find_dirent(name) {
            Ok(_) => return Err(KernelError::AlreadyExists),
            Err(KernelError::NoEntry) => {}
            Err(err) => return Err(err),
        }
        let ino = self.fs.alloc_inode(S5_TYPE_DATA, 0)?;
        let child = self.fs.vget(ino)?;
        // A failed link drops the fresh vnode, whose last reference
        // reclaims the never-named inode.
        guard.link_dirent(&child, name)?;
        Ok(child)
    }

    fn mknod(&self, name: &FileName, mode: Mode, devid: DevId) -> Result<()> {
        if S5Node::mode(self) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        let typ = match mode {
            Mode::CharDev => S5_TYPE_CHR,
            Mode::BlockDev => S5_TYPE_BLK,
            _ => return Err(KernelError::InvalidArgument),
        };
        let guard = self.lock();
        match guard.find_dirent(name) {
            Ok(_) => return Err(KernelError::AlreadyExists),
            Err(KernelError::NoEntry) => {}
            Err(err) => return Err(err),
        }
        let ino = self.fs.alloc_inode(typ, devid.raw())?;
        let child = self.fs.vget(ino)?;
        guard.link_dirent(&child, name)?;
        Ok(())
    }

    fn link(&self, child: &dyn Vnode, name: &FileName) -> Result<()> {
        if S5Node::mode(self) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        let child = child
            .as_any()
            .downcast_ref::<S5Node>()
            .ok_or(KernelError::InvalidArgument)?;
        if !Arc::ptr_eq(&self.fs, &child.fs) {
            return Err(KernelError::InvalidArgument);
        }
        if S5Node::mode(child) == Mode::Directory {
            return Err(KernelError::Permission);
        }
        self.lock().link_dirent(child, name)
    }

    fn unlink(&self, name: &FileName) -> Result<()> {
        if S5Node::mode(self) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        self.lock().remove_dirent(name)
    }

    fn mkdir(&self, name: &FileName) -> Result<()> {
        if S5Node::mode(self) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        let guard = self.lock();
        match guard.find_dirent(name) {
            Ok(_) => return Err(KernelError::AlreadyExists),
            Err(KernelError::NoEntry) => {}
            Err(err) => return Err(err),
        }
        let ino = self.fs.alloc_inode(S5_TYPE_DIR, 0)?;
        let child = self.fs.vget(ino)?;
        guard.link_dirent(&child, name)?;
        {
            let cguard = child.lock();
            // "." names the child itself and is not counted.
            if let Err(err) = cguard.link_dirent(&child, FileName::dot()) {
                drop(cguard);
                guard
                    .remove_dirent(name)
                    .expect("mkdir rollback left the parent corrupt");
                return Err(err);
            }
            // ".." takes a link on the parent.
            if let Err(err) = cguard.link_dirent(self, FileName::dotdot()) {
                drop(cguard);
                guard
                    .remove_dirent(name)
                    .expect("mkdir rollback left the parent corrupt");
                return Err(err);
            }
        }
        Ok(())
    }

    fn rmdir(&self, name: &FileName) -> Result<()> {
        if S5Node::mode(self) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        debug_assert!(!name.is_dot() && !name.is_dotdot());
        let guard = self.lock();
        let (ino, _) = guard.find_dirent(name)?;
        let child = self.fs.vget(ino)?;
        if S5Node::mode(&child) != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        let cguard = child.lock();
        // Empty means exactly "." and "..".
        if child.size() != 2 * DIRENT_SIZE {
            return Err(KernelError::NotEmpty);
        }
        if cguard.find_dirent(FileName::dot()).is_err()
            || cguard.find_dirent(FileName::dotdot()).is_err()
        {
            return Err(KernelError::NotEmpty);
        }
        // ".." goes first (dropping the parent's link); if the name
        // removal then fails, ".." is restored.
        cguard.remove_dirent(FileName::dotdot())?;
        if let Err(err) = guard.remove_dirent(name) {
            cguard
                .link_dirent(self, FileName::dotdot())
                .expect("rmdir rollback left the directory corrupt");
            return Err(err);
        }
        Ok(())
    }

    fn readdir(&self, off: usize) -> Result<Option<(DirEntry, usize)>> {
        self.readdir_inner(&self.lock(), off)
    }

    fn stat(&self) -> Result<Stat> {
        let inode = self.inode.lock();
        Ok(Stat {
            ino: self.ino,
            mode: S5Node::mode_of(inode.typ, self.ino),
            nlink: inode.linkcount - 1,
            size: inode.size as usize,
            blksize: BLOCK_SIZE,
            blocks: self.fs.inode_blocks(&inode)?,
        })
    }

    fn mmobj(&self) -> Result<Arc<dyn MemObj>> {
        Ok(self.mmobj_arc())
    }

    fn fill_page(&self, pageno: usize, page: &mut Page) -> Result<()> {
        match self.seek_to_block(pageno * BLOCK_SIZE, false)? {
            0 => {
                page.zero();
                Ok(())
            }
            blockno => self.fs.device().read_block(blockno as usize, page),
        }
    }

    fn dirty_page(&self, pageno: usize) -> Result<()> {
        let off = pageno * BLOCK_SIZE;
        if self.seek_to_block(off, false)? == 0 {
            let blockno = self.seek_to_block(off, true)?;
            assert_ne!(blockno, 0);
        }
        Ok(())
    }

    fn clean_page(&self, pageno: usize, page: &Page) -> Result<()> {
        let blockno = self.seek_to_block(pageno * BLOCK_SIZE, false)?;
        assert_ne!(blockno, 0, "writeback of a sparse page");
        self.fs.device().write_block(blockno as usize, page)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl S5Node {
    fn mode_of(typ: u32, ino: u32) -> Mode {
        match typ {
            S5_TYPE_DATA => Mode::Regular,
            S5_TYPE_DIR => Mode::Directory,
            S5_TYPE_CHR => Mode::CharDev,
            S5_TYPE_BLK => Mode::BlockDev,
            typ => panic!("inode {} has invalid type {}", ino, typ),
        }
    }
}
