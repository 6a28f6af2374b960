//! The S5 on-disk filesystem.
//!
//! Layers, bottom up:
//!   + `DiskObj`: page frames over the raw block device, through which
//!     every piece of metadata (superblock, inode table, indirect and
//!     free-list blocks) is read and written.
//!   + Free lists: a batched free-block cache in the superblock chained
//!     through continuation blocks, and a free-inode list threaded
//!     through the inode table. One filesystem-wide mutex serialises
//!     both.
//!   + `S5Node` (`inode.rs`): the vnode implementation — block
//!     addressing with sparse holes and one indirect block, uniform
//!     file/directory I/O, directory entries kept contiguous.
//!
//! While a vnode is alive the filesystem holds one extra on-disk link
//! for it, so a linkcount of zero can only be observed when the last
//! in-memory reference goes away; that is when the inode is reclaimed.

mod inode;
mod superblock;

pub use inode::{
    RawDirent, RawInode, S5Node, DIRENT_SIZE, INODES_PER_BLOCK, S5_TYPE_BLK, S5_TYPE_CHR,
    S5_TYPE_DATA, S5_TYPE_DIR, S5_TYPE_FREE,
};
pub use superblock::{RawSuper, S5_MAGIC, S5_VERSION, SENTINEL, SUPER_BLOCK, SUPER_SIZE};

use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use zerocopy::{AsBytes, FromBytes};

use crate::error::{KernelError, Result};
use crate::hal::BlockDevice;
use crate::lock::SpinLock;
use crate::page::Page;
use crate::param::NBLKS_PER_FNODE;
use crate::pframe::{FrameSet, PFrame};

use inode::{inode_block, inode_offset, INODE_SIZE};

/// Page frames over the raw device, keyed by block number. Everything
/// the filesystem knows about itself flows through here; file contents
/// flow through each vnode's own memory object instead.
pub(crate) struct DiskObj {
    dev: Arc<dyn BlockDevice>,
    frames: FrameSet,
}

impl DiskObj {
    fn new(dev: Arc<dyn BlockDevice>) -> Self {
        Self {
            dev,
            frames: FrameSet::new(),
        }
    }

    /// The resident frame for `blockno`, read from the device on first
    /// touch.
    pub(crate) fn page(&self, blockno: usize) -> Result<Arc<PFrame>> {
        self.frames.get_or_fill(blockno, |frame| {
            frame.with_data_mut(|page| self.dev.read_block(blockno, page))
        })
    }

    /// Forget the cached frame for a block whose identity is changing
    /// (it left or joined the free list); a stale dirty frame would
    /// otherwise clobber the block's next life.
    fn invalidate(&self, blockno: usize) {
        let _ = self.frames.remove(blockno);
    }

    /// Write every dirty frame back to the device.
    fn flush(&self) -> Result<()> {
        for frame in self.frames.snapshot() {
            if frame.is_dirty() {
                frame.with_data(|page| self.dev.write_block(frame.pageno(), page))?;
                frame.clear_dirty();
            }
        }
        Ok(())
    }
}

pub struct S5Fs {
    dev: Arc<dyn BlockDevice>,
    disk: DiskObj,
    /// In-memory superblock; the lock doubles as the filesystem-wide
    /// mutex around free-list manipulation.
    superb: SpinLock<RawSuper>,
    /// At most one vnode per inode number.
    vnodes: SpinLock<BTreeMap<u32, Weak<S5Node>>>,
    root: SpinLock<Option<Arc<S5Node>>>,
    unmounted: AtomicBool,
}

impl S5Fs {
    /// Mount the filesystem on `dev`: check the superblock, pin its
    /// page, and materialise the root vnode.
    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Arc<S5Fs>> {
        let disk = DiskObj::new(dev.clone());
        let sb_frame = disk.page(SUPER_BLOCK)?;
        let mut raw = RawSuper::new_zeroed();
        sb_frame.with_data(|page| raw.as_bytes_mut().copy_from_slice(&page.0[..SUPER_SIZE]));
        raw.check(dev.block_count())?;
        // The superblock page stays pinned for the life of the mount.
        sb_frame.pin();

        let fs = Arc::new(S5Fs {
            dev,
            disk,
            superb: SpinLock::new(raw),
            vnodes: SpinLock::new(BTreeMap::new()),
            root: SpinLock::new(None),
            unmounted: AtomicBool::new(false),
        });
        let root = fs.vget(raw.root_inode)?;
        *fs.root.lock() = Some(root);
        kdbg!("s5: mounted, root inode {}", raw.root_inode);
        Ok(fs)
    }

    pub fn root(&self) -> Arc<S5Node> {
        self.root.lock().clone().expect("filesystem is mounted")
    }

    /// Unmount: release the root, flush everything, unpin the
    /// superblock. Any vnode still alive at this point is a leak; it is
    /// reported, not reclaimed.
    pub fn unmount(&self) -> Result<()> {
        let root = self.root.lock().take();
        drop(root);
        let alive = self
            .vnodes
            .lock()
            .values()
            .filter(|weak| weak.upgrade().is_some())
            .count();
        if alive != 0 {
            kdbg!("s5: unmount with {} vnodes still alive", alive);
        }
        self.unmounted.store(true, Ordering::Relaxed);
        let sb_frame = self.disk.page(SUPER_BLOCK)?;
        sb_frame.unpin();
        self.disk.flush()?;
        self.dev.flush()
    }

    pub(crate) fn disk(&self) -> &DiskObj {
        &self.disk
    }

    pub(crate) fn device(&self) -> &Arc<dyn BlockDevice> {
        &self.dev
    }

    /// The vnode for inode `ino`, materialising it if none is alive.
    /// Materialisation takes the VFS's on-disk link and pins the
    /// inode's page.
    pub(crate) fn vget(self: &Arc<Self>, ino: u32) -> Result<Arc<S5Node>> {
        let mut table = self.vnodes.lock();
        if let Some(weak) = table.get(&ino) {
            if let Some(node) = weak.upgrade() {
                return Ok(node);
            }
        }
        let mut inode = self.read_raw_inode(ino)?;
        assert_eq!(inode.number, ino, "inode table corrupt at {}", ino);
        assert_ne!(inode.typ, S5_TYPE_FREE, "vget of free inode {}", ino);
        inode.linkcount += 1;
        self.write_raw_inode(ino, &inode)?;
        self.disk.page(inode_block(ino))?.pin();

        let node = S5Node::new(self.clone(), ino, inode);
        let _ = table.insert(ino, Arc::downgrade(&node));
        Ok(node)
    }

    /// Drop-side of `vget`, run by the vnode itself: give back the
    /// VFS's link and reclaim the inode if nothing on disk names it.
    pub(crate) fn forget_vnode(&self, ino: u32, inode: &mut RawInode) {
        let _ = self.vnodes.lock().remove(&ino);
        assert!(inode.linkcount > 0);
        inode.linkcount -= 1;
        if inode.linkcount == 0 && !self.unmounted.load(Ordering::Relaxed) {
            self.free_inode(ino, inode);
        } else {
            self.write_raw_inode(ino, inode)
                .expect("inode page is resident");
        }
        let frame = self.disk.page(inode_block(ino)).expect("inode page is resident");
        frame.unpin();
    }

    /// Does any on-disk link beyond the VFS's own still name this
    /// inode?
    pub(crate) fn query_vnode(&self, inode: &RawInode) -> bool {
        assert!(inode.linkcount > 0);
        inode.linkcount > 1
    }

    pub(crate) fn read_raw_inode(&self, ino: u32) -> Result<RawInode> {
        if ino >= self.superb.lock().num_inodes {
            return Err(KernelError::InvalidArgument);
        }
        let frame = self.disk.page(inode_block(ino))?;
        let mut inode = RawInode::new_zeroed();
        let off = inode_offset(ino);
        frame.with_data(|page| {
            inode
                .as_bytes_mut()
                .copy_from_slice(&page.0[off..off + INODE_SIZE])
        });
        Ok(inode)
    }

    pub(crate) fn write_raw_inode(&self, ino: u32, inode: &RawInode) -> Result<()> {
        let frame = self.disk.page(inode_block(ino))?;
        let off = inode_offset(ino);
        frame.with_data_mut(|page| {
            page.0[off..off + INODE_SIZE].copy_from_slice(inode.as_bytes())
        });
        frame.set_dirty();
        Ok(())
    }

    /// Copy the in-memory superblock into its pinned page.
    fn dirty_super(&self, superb: &RawSuper) {
        let frame = self
            .disk
            .page(SUPER_BLOCK)
            .expect("superblock page is pinned resident");
        frame.with_data_mut(|page| page.0[..SUPER_SIZE].copy_from_slice(superb.as_bytes()));
        frame.set_dirty();
    }

    /// Pop a block off the free list. Contents of the returned block
    /// are undefined. When the in-superblock batch runs out, the chain
    /// block holding the next batch is loaded and itself becomes the
    /// allocated block.
    pub(crate) fn alloc_block(&self) -> Result<u32> {
        let mut sb = self.superb.lock();
        let blockno;
        if sb.nfree == 0 {
            let chain = sb.free_blocks[NBLKS_PER_FNODE - 1];
            if chain == SENTINEL {
                return Err(KernelError::NoSpace);
            }
            let frame = self.disk.page(chain as usize)?;
            frame.with_data(|page| {
                for (i, slot) in sb.free_blocks.iter_mut().enumerate() {
                    *slot = page.read_u32(i * 4);
                }
            });
            sb.nfree = (NBLKS_PER_FNODE - 1) as u32;
            blockno = chain;
        } else {
            sb.nfree -= 1;
            blockno = sb.free_blocks[sb.nfree as usize];
        }
        self.dirty_super(&sb);
        // The block is data now; drop any metadata-cache identity.
        self.disk.invalidate(blockno as usize);
        Ok(blockno)
    }

    /// Push a block onto the free list. With the batch array full, the
    /// freed block absorbs the current batch and becomes the new chain
    /// link.
    pub(crate) fn free_block(&self, blockno: u32) {
        let mut sb = self.superb.lock();
        assert!((sb.nfree as usize) < NBLKS_PER_FNODE);
        self.disk.invalidate(blockno as usize);
        if sb.nfree as usize == NBLKS_PER_FNODE - 1 {
            let frame = self
                .disk
                .page(blockno as usize)
                .expect("freed block is readable");
            frame.with_data_mut(|page| {
                for (i, slot) in sb.free_blocks.iter().enumerate() {
                    page.write_u32(i * 4, *slot);
                }
            });
            frame.set_dirty();
            sb.nfree = 0;
            sb.free_blocks[NBLKS_PER_FNODE - 1] = blockno;
        } else {
            let n = sb.nfree as usize;
            sb.free_blocks[n] = blockno;
            sb.nfree += 1;
        }
        self.dirty_super(&sb);
    }

    /// Pop an inode off the free list and initialise it. Device inodes
    /// store their device id in the indirect-block slot.
    pub(crate) fn alloc_inode(&self, typ: u32, devid: u32) -> Result<u32> {
        assert!(
            typ == S5_TYPE_DATA || typ == S5_TYPE_DIR || typ == S5_TYPE_CHR || typ == S5_TYPE_BLK
        );
        let ino;
        {
            let mut sb = self.superb.lock();
            if sb.free_inode == SENTINEL {
                return Err(KernelError::NoSpace);
            }
            ino = sb.free_inode;
            let inode = self.read_raw_inode(ino)?;
            assert_eq!(inode.number, ino, "free-inode list corrupt at {}", ino);
            assert_eq!(inode.typ, S5_TYPE_FREE);
            sb.free_inode = inode.next_free;
            self.dirty_super(&sb);
        }
        let mut inode = RawInode::new_zeroed();
        inode.number = ino;
        inode.typ = typ;
        inode.indirect = if typ == S5_TYPE_CHR || typ == S5_TYPE_BLK {
            devid
        } else {
            0
        };
        self.write_raw_inode(ino, &inode)?;
        kdbg!("s5: allocated inode {} type {}", ino, typ);
        Ok(ino)
    }

    /// Free an inode: give back its blocks (indirect block included),
    /// mark it free, and push it onto the free-inode list.
    pub(crate) fn free_inode(&self, ino: u32, inode: &mut RawInode) {
        assert!(
            inode.typ == S5_TYPE_DATA
                || inode.typ == S5_TYPE_DIR
                || inode.typ == S5_TYPE_CHR
                || inode.typ == S5_TYPE_BLK
        );
        for slot in inode.direct.iter_mut() {
            if *slot != 0 {
                self.free_block(*slot);
                *slot = 0;
            }
        }
        if (inode.typ == S5_TYPE_DATA || inode.typ == S5_TYPE_DIR) && inode.indirect != 0 {
            let frame = self
                .disk
                .page(inode.indirect as usize)
                .expect("indirect block is readable");
            let entries: Vec<u32> = frame.with_data(|page| {
                (0..crate::param::NINDIRECT)
                    .map(|i| page.read_u32(i * 4))
                    .collect()
            });
            for entry in entries {
                assert_ne!(entry, inode.indirect, "indirect block references itself");
                if entry != 0 {
                    self.free_block(entry);
                }
            }
            self.free_block(inode.indirect);
        }

        inode.indirect = 0;
        inode.size = 0;
        inode.typ = S5_TYPE_FREE;
        {
            let mut sb = self.superb.lock();
            inode.next_free = sb.free_inode;
            sb.free_inode = ino;
            self.dirty_super(&sb);
        }
        self.write_raw_inode(ino, inode)
            .expect("inode page is resident");
        kdbg!("s5: freed inode {}", ino);
    }

    /// Blocks currently on the free list (batch array plus every
    /// continuation block). A test-support walk; the chain is read but
    /// not modified.
    pub fn count_free_blocks(&self) -> Result<usize> {
        let sb = self.superb.lock();
        let mut count = sb.nfree as usize;
        let mut chain = sb.free_blocks[NBLKS_PER_FNODE - 1];
        while chain != SENTINEL {
            // The chain block itself is allocatable once its batch is
            // loaded.
            count += 1;
            let frame = self.disk.page(chain as usize)?;
            count += NBLKS_PER_FNODE - 1;
            chain = frame.with_data(|page| page.read_u32((NBLKS_PER_FNODE - 1) * 4));
        }
        Ok(count)
    }

    /// Inodes currently on the free list.
    pub fn count_free_inodes(&self) -> Result<usize> {
        let mut count = 0;
        let mut ino = self.superb.lock().free_inode;
        while ino != SENTINEL {
            count += 1;
            ino = self.read_raw_inode(ino)?.next_free;
        }
        Ok(count)
    }

    /// Verify the disk link-count invariant: for every reachable inode,
    /// the number of directory entries naming it (the "." self-link
    /// excluded) plus one for a live vnode equals its linkcount.
    /// Returns `true` when consistent.
    pub fn check_refcounts(self: &Arc<Self>) -> Result<bool> {
        let num_inodes = self.superb.lock().num_inodes;
        let mut names: BTreeMap<u32, u32> = BTreeMap::new();
        let mut stack: Vec<u32> = Vec::new();
        let mut seen: BTreeMap<u32, ()> = BTreeMap::new();

        let root_ino = self.superb.lock().root_inode;
        // Root's ".." names itself; its own tree walk finds it.
        stack.push(root_ino);
        let _ = seen.insert(root_ino, ());
        while let Some(ino) = stack.pop() {
            let node = self.vget(ino)?;
            let mut off = 0;
            while let Some((entry, advance)) = node.dir_entry_at(off)? {
                off += advance;
                if entry.name_bytes() == b"." {
                    continue;
                }
                *names.entry(entry.ino).or_insert(0) += 1;
                if seen.insert(entry.ino, ()).is_none() {
                    let child = self.vget(entry.ino)?;
                    if child.mode() == crate::fs::Mode::Directory {
                        stack.push(entry.ino);
                    }
                }
            }
        }

        let mut ok = true;
        for (ino, count) in names {
            assert!(ino < num_inodes);
            let live = self
                .vnodes
                .lock()
                .get(&ino)
                .and_then(|w| w.upgrade())
                .is_some();
            let expect = count + if live { 1 } else { 0 };
            let actual = self.read_raw_inode(ino)?.linkcount;
            if expect != actual {
                kdbg!(
                    "s5: inode {} expecting linkcount {}, found {}",
                    ino,
                    expect,
                    actual
                );
                ok = false;
            }
        }
        Ok(ok)
    }

    /// Write a fresh filesystem onto `dev`: superblock, inode table
    /// with the free-inode chain threaded through it, the root
    /// directory, and the chained free-block list over every remaining
    /// block.
    pub fn format(dev: &Arc<dyn BlockDevice>, ninodes: u32) -> Result<()> {
        let nblocks = dev.block_count();
        let itable_blocks =
            (ninodes as usize + INODES_PER_BLOCK - 1) / INODES_PER_BLOCK;
        let root_data = 1 + itable_blocks;
        if ninodes == 0 || nblocks <= root_data + 1 {
            return Err(KernelError::InvalidArgument);
        }

        // Inode table. Inode 0 is the root directory; the rest chain
        // into the free list.
        let mut ino: u32 = 0;
        for tb in 0..itable_blocks {
            let mut page = Page::new_zeroed();
            for slot in 0..INODES_PER_BLOCK {
                if ino >= ninodes {
                    break;
                }
                let mut inode = RawInode::new_zeroed();
                inode.number = ino;
                if ino == 0 {
                    inode.typ = S5_TYPE_DIR;
                    // One link: the ".." entry (the "." self-link is
                    // never counted).
                    inode.linkcount = 1;
                    inode.size = (2 * DIRENT_SIZE) as u32;
                    inode.direct[0] = root_data as u32;
                } else {
                    inode.typ = S5_TYPE_FREE;
                    inode.next_free = if ino + 1 < ninodes { ino + 1 } else { SENTINEL };
                }
                let off = slot * INODE_SIZE;
                page.0[off..off + INODE_SIZE].copy_from_slice(inode.as_bytes());
                ino += 1;
            }
            dev.write_block(1 + tb, &page)?;
        }

        // Root directory: "." and ".." both name the root.
        {
            let mut page = Page::new_zeroed();
            let dot = RawDirent::new(0, b".");
            let dotdot = RawDirent::new(0, b"..");
            page.0[..DIRENT_SIZE].copy_from_slice(dot.as_bytes());
            page.0[DIRENT_SIZE..2 * DIRENT_SIZE].copy_from_slice(dotdot.as_bytes());
            dev.write_block(root_data, &page)?;
        }

        // Free-block list, built with the same batching the runtime
        // uses: fill the array, then spill it into the next freed block
        // and chain through it.
        let mut superb = RawSuper::new_zeroed();
        superb.magic = S5_MAGIC;
        superb.version = S5_VERSION;
        superb.num_inodes = ninodes;
        superb.root_inode = 0;
        superb.free_inode = if ninodes > 1 { 1 } else { SENTINEL };
        superb.free_blocks = [SENTINEL; NBLKS_PER_FNODE];
        superb.nfree = 0;
        for blockno in (root_data + 1)..nblocks {
            if superb.nfree as usize == NBLKS_PER_FNODE - 1 {
                let mut page = Page::new_zeroed();
                for (i, slot) in superb.free_blocks.iter().enumerate() {
                    page.write_u32(i * 4, *slot);
                }
                dev.write_block(blockno, &page)?;
                superb.nfree = 0;
                superb.free_blocks[NBLKS_PER_FNODE - 1] = blockno as u32;
            } else {
                let n = superb.nfree as usize;
                superb.free_blocks[n] = blockno as u32;
                superb.nfree += 1;
            }
        }

        let mut page = Page::new_zeroed();
        page.0[..SUPER_SIZE].copy_from_slice(superb.as_bytes());
        dev.write_block(SUPER_BLOCK, &page)?;
        dev.flush()
    }

    /// Count direct slots still referenced by `ino`'s inode plus the
    /// indirect block and its entries. Stat support.
    pub(crate) fn inode_blocks(&self, inode: &RawInode) -> Result<usize> {
        let mut blocks = inode.direct.iter().filter(|b| **b != 0).count();
        if (inode.typ == S5_TYPE_DATA || inode.typ == S5_TYPE_DIR) && inode.indirect != 0 {
            blocks += 1;
            let frame = self.disk.page(inode.indirect as usize)?;
            blocks += frame.with_data(|page| {
                (0..crate::param::NINDIRECT)
                    .filter(|i| page.read_u32(i * 4) != 0)
                    .count()
            });
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileName, Vnode};
    use crate::hal::MemDisk;
    use crate::KernelError;

    fn fresh_fs(nblocks: usize, ninodes: u32) -> Arc<S5Fs> {
        let disk: Arc<dyn BlockDevice> = MemDisk::new(nblocks);
        S5Fs::format(&disk, ninodes).unwrap();
        S5Fs::mount(disk).unwrap()
    }

    #[test]
    fn format_then_mount() {
        let fs = fresh_fs(128, 32);
        let root = fs.root();
        assert_eq!(root.mode(), crate::fs::Mode::Directory);
        assert_eq!(Vnode::len(&*root), 2 * DIRENT_SIZE);
        assert!(fs.check_refcounts().unwrap());
    }

    #[test]
    fn mount_rejects_garbage() {
        let disk: Arc<dyn BlockDevice> = MemDisk::new(16);
        assert_eq!(
            S5Fs::mount(disk).map(|_| ()).unwrap_err(),
            KernelError::InvalidArgument
        );
    }

    #[test]
    fn block_free_list_drains_and_refills() {
        // Enough blocks to force the batch array through several
        // continuation blocks.
        let fs = fresh_fs(16 + NBLKS_PER_FNODE * 3, 16);
        let total = fs.count_free_blocks().unwrap();
        assert!(total > NBLKS_PER_FNODE);

        let mut held = alloc::vec::Vec::new();
        loop {
            match fs.alloc_block() {
                Ok(blockno) => held.push(blockno),
                Err(KernelError::NoSpace) => break,
                Err(err) => panic!("alloc_block: {:?}", err),
            }
        }
        assert_eq!(held.len(), total);
        assert_eq!(fs.count_free_blocks().unwrap(), 0);
        // No block handed out twice.
        let mut sorted = held.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), held.len());

        for blockno in held {
            fs.free_block(blockno);
        }
        assert_eq!(fs.count_free_blocks().unwrap(), total);
    }

    #[test]
    fn inode_free_list_roundtrip() {
        let fs = fresh_fs(64, 8);
        let before = fs.count_free_inodes().unwrap();
        assert_eq!(before, 7);

        let ino = fs.alloc_inode(S5_TYPE_DATA, 0).unwrap();
        assert_eq!(fs.count_free_inodes().unwrap(), before - 1);
        let mut inode = fs.read_raw_inode(ino).unwrap();
        assert_eq!(inode.typ, S5_TYPE_DATA);
        assert_eq!(inode.linkcount, 0);

        fs.free_inode(ino, &mut inode);
        assert_eq!(fs.count_free_inodes().unwrap(), before);
        assert_eq!(fs.read_raw_inode(ino).unwrap().typ, S5_TYPE_FREE);
    }

    #[test]
    fn inode_exhaustion_reports_no_space() {
        let fs = fresh_fs(64, 4);
        let mut held = alloc::vec::Vec::new();
        for _ in 0..3 {
            held.push(fs.alloc_inode(S5_TYPE_DATA, 0).unwrap());
        }
        assert_eq!(
            fs.alloc_inode(S5_TYPE_DATA, 0).unwrap_err(),
            KernelError::NoSpace
        );
    }

    #[test]
    fn data_survives_remount() {
        let disk: Arc<dyn BlockDevice> = MemDisk::new(128);
        S5Fs::format(&disk, 32).unwrap();
        {
            let fs = S5Fs::mount(disk.clone()).unwrap();
            let root = fs.root();
            let name = FileName::new(b"persist").unwrap();
            let file = root.create(name).unwrap();
            assert_eq!(file.write(0, b"written before unmount").unwrap(), 22);
            drop(file);
            drop(root);
            fs.unmount().unwrap();
        }
        let fs = S5Fs::mount(disk).unwrap();
        let root = fs.root();
        let file = root.lookup(FileName::new(b"persist").unwrap()).unwrap();
        let mut buf = [0u8; 22];
        assert_eq!(file.read(0, &mut buf).unwrap(), 22);
        assert_eq!(&buf, b"written before unmount");
    }

    #[test]
    fn link_query_tracks_on_disk_names() {
        let fs = fresh_fs(64, 8);
        let root = fs.root();
        let file = root.create(FileName::new(b"one").unwrap()).unwrap();
        let node = fs.vget(file.ino()).unwrap();
        // Beyond the VFS's own link, the name "one" still exists.
        assert!(node.other_links());
        root.link(&*file, FileName::new(b"two").unwrap()).unwrap();
        assert!(node.other_links());
        root.unlink(FileName::new(b"one").unwrap()).unwrap();
        root.unlink(FileName::new(b"two").unwrap()).unwrap();
        // Only the live vnode keeps the inode around now.
        assert!(!node.other_links());
    }

    #[test]
    fn device_inode_keeps_devid() {
        let fs = fresh_fs(64, 8);
        let root = fs.root();
        let name = FileName::new(b"tty0").unwrap();
        root.mknod(
            name,
            crate::fs::Mode::CharDev,
            crate::drivers::DevId::new(2, 0),
        )
        .unwrap();
        let node = root.lookup(name).unwrap();
        assert_eq!(node.mode(), crate::fs::Mode::CharDev);
        assert_eq!(node.devid(), Some(crate::drivers::DevId::new(2, 0)));
    }
}
