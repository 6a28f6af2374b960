//! The per-process address-space map: ordered, disjoint virtual-memory
//! areas, each backed by a memory object.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp;

use crate::error::{KernelError, Result};
use crate::fs::Vnode;
use crate::page::{addr_to_pn, page_offset, PAGE_SIZE};
use crate::param::{USER_PAGE_HIGH, USER_PAGE_LOW};
use crate::vm::anon::AnonObj;
use crate::vm::mmobj::MemObj;
use crate::vm::shadow::ShadowObj;

bitflags::bitflags! {
    pub struct Prot: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXEC = 0x4;
    }
}

bitflags::bitflags! {
    pub struct MapFlags: u32 {
        const SHARED = 0x1;
        const PRIVATE = 0x2;
        const FIXED = 0x4;
        const ANON = 0x8;
    }
}

/// Search direction for `find_range`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    LoHi,
    HiLo,
}

/// One contiguous mapping: virtual pages `[start, end)` backed by
/// `obj`, at page offset `off` into it.
pub struct VmArea {
    start: usize,
    end: usize,
    off: usize,
    prot: Prot,
    flags: MapFlags,
    obj: Arc<dyn MemObj>,
}

impl VmArea {
    fn new(
        start: usize,
        end: usize,
        off: usize,
        prot: Prot,
        flags: MapFlags,
        obj: Arc<dyn MemObj>,
    ) -> Self {
        debug_assert!(start < end);
        obj.clone().bottom().attach_vma();
        Self {
            start,
            end,
            off,
            prot,
            flags,
            obj,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn npages(&self) -> usize {
        self.end - self.start
    }

    pub fn off(&self) -> usize {
        self.off
    }

    pub fn prot(&self) -> Prot {
        self.prot
    }

    pub fn flags(&self) -> MapFlags {
        self.flags
    }

    pub fn obj(&self) -> &Arc<dyn MemObj> {
        &self.obj
    }

    /// The object page backing virtual page `vpn`.
    pub fn obj_page(&self, vpn: usize) -> usize {
        debug_assert!(vpn >= self.start && vpn < self.end);
        vpn - self.start + self.off
    }

    /// Swap in a new backing object (fork's shadow wiring). The
    /// cross-reference on the bottom moves with it.
    pub(crate) fn replace_obj(&mut self, obj: Arc<dyn MemObj>) {
        obj.clone().bottom().attach_vma();
        let old = core::mem::replace(&mut self.obj, obj);
        old.clone().bottom().detach_vma();
        drop(old);
    }

    /// A structural copy holding its own reference on the same object.
    fn duplicate(&self) -> Self {
        Self::new(
            self.start,
            self.end,
            self.off,
            self.prot,
            self.flags,
            self.obj.clone(),
        )
    }
}

impl Drop for VmArea {
    fn drop(&mut self) {
        self.obj.clone().bottom().detach_vma();
    }
}

/// An address-space map. Areas are kept sorted by start page and are
/// always disjoint; both are invariants every operation preserves.
pub struct VmMap {
    areas: BTreeMap<usize, VmArea>,
}

impl VmMap {
    pub fn new() -> Self {
        Self {
            areas: BTreeMap::new(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VmArea> {
        self.areas.values()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Insert an area at the unique position preserving order. The
    /// caller guarantees no overlap exists.
    pub fn insert(&mut self, area: VmArea) {
        debug_assert!(self.is_range_empty(area.start, area.npages()));
        let _ = self.areas.insert(area.start, area);
    }

    /// The area containing virtual page `vpn`, if any.
    pub fn lookup(&self, vpn: usize) -> Option<&VmArea> {
        self.areas
            .range(..=vpn)
            .next_back()
            .map(|(_, area)| area)
            .filter(|area| vpn < area.end)
    }

    /// First-fit search for `npages` of unmapped space inside the user
    /// page range. `LoHi` prefers low addresses, `HiLo` high ones.
    /// Returns the starting page, without altering the map.
    pub fn find_range(&self, npages: usize, dir: Dir) -> Option<usize> {
        debug_assert!(npages > 0);
        match dir {
            Dir::LoHi => {
                let mut prev_end = USER_PAGE_LOW;
                for area in self.areas.values() {
                    if area.start.saturating_sub(prev_end) >= npages {
                        return Some(prev_end);
                    }
                    prev_end = area.end;
                }
                if USER_PAGE_HIGH.saturating_sub(prev_end) >= npages {
                    Some(prev_end)
                } else {
                    None
                }
            }
            Dir::HiLo => {
                let mut next_start = USER_PAGE_HIGH;
                for area in self.areas.values().rev() {
                    if next_start.saturating_sub(area.end) >= npages {
                        return Some(next_start - npages);
                    }
                    next_start = area.start;
                }
                if next_start.saturating_sub(USER_PAGE_LOW) >= npages {
                    Some(next_start - npages)
                } else {
                    None
                }
            }
        }
    }

    /// True when no area intersects `[startvfn, startvfn + npages)`.
    pub fn is_range_empty(&self, startvfn: usize, npages: usize) -> bool {
        let hi = startvfn + npages;
        match self.areas.range(..hi).next_back() {
            Some((_, area)) => area.end <= startvfn,
            None => true,
        }
    }

    /// Insert a mapping of `npages` pages. With `lopage == 0` a range
    /// is chosen by `find_range`; otherwise the caller's range is used
    /// and any overlap is evicted — but only after every allocation for
    /// the new area has succeeded, so a failure leaves the map intact.
    pub fn map(
        &mut self,
        file: Option<Arc<dyn Vnode>>,
        lopage: usize,
        npages: usize,
        prot: Prot,
        flags: MapFlags,
        off: usize,
        dir: Dir,
    ) -> Result<usize> {
        if npages == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let start = if lopage == 0 {
            self.find_range(npages, dir)
                .ok_or(KernelError::OutOfMemory)?
        } else {
            lopage
        };

        let obj: Arc<dyn MemObj> = match file {
            Some(vnode) if !flags.contains(MapFlags::ANON) => vnode.mmobj()?,
            _ => AnonObj::new(),
        };
        let obj: Arc<dyn MemObj> = if flags.contains(MapFlags::PRIVATE) {
            ShadowObj::new(obj)
        } else {
            obj
        };

        if lopage != 0 && !self.is_range_empty(start, npages) {
            self.remove(start, npages);
        }
        self.insert(VmArea::new(start, start + npages, off, prot, flags, obj));
        kdbg!("vmmap: mapped [{:#x}, {:#x})", start, start + npages);
        Ok(start)
    }

    /// Unmap `[lopage, lopage + npages)`. Each intersecting area takes
    /// one of four shapes: fully inside the range (drop it), sticking
    /// out both sides (split in two), or sticking out one side (trim).
    pub fn remove(&mut self, lopage: usize, npages: usize) {
        let hipage = lopage + npages;
        let keys: Vec<usize> = self
            .areas
            .range(..hipage)
            .map(|(start, _)| *start)
            .collect();
        for key in keys {
            let (start, end) = {
                let area = &self.areas[&key];
                (area.start, area.end)
            };
            if end <= lopage {
                continue;
            }
            if start < lopage && end > hipage {
                // Range inside the area: keep the left piece, grow a
                // right piece holding a second reference on the object.
                let right = {
                    let area = self.areas.get_mut(&key).expect("vmmap entry");
                    let right = VmArea::new(
                        hipage,
                        end,
                        area.off + (hipage - start),
                        area.prot,
                        area.flags,
                        area.obj.clone(),
                    );
                    area.end = lopage;
                    right
                };
                self.insert(right);
            } else if start < lopage {
                // Overlaps the right end: shorten.
                self.areas.get_mut(&key).expect("vmmap entry").end = lopage;
            } else if end > hipage {
                // Overlaps the left end: advance start and offset.
                let mut area = self.areas.remove(&key).expect("vmmap entry");
                area.off += hipage - area.start;
                area.start = hipage;
                let _ = self.areas.insert(area.start, area);
            } else {
                // Fully covered: drop the area and its reference.
                let _ = self.areas.remove(&key);
            }
        }
    }

    /// Copy bytes out of the address space. Callers have validated the
    /// addresses; an unmapped page still reports `Fault` rather than
    /// touching the map.
    pub fn read(&self, vaddr: usize, buf: &mut [u8]) -> Result<()> {
        let mut addr = vaddr;
        let mut done = 0;
        while done < buf.len() {
            let vpn = addr_to_pn(addr);
            let off = page_offset(addr);
            let area = self.lookup(vpn).ok_or(KernelError::Fault)?;
            let frame = area.obj.lookup_page(area.obj_page(vpn), false)?;
            let n = cmp::min(PAGE_SIZE - off, buf.len() - done);
            frame.with_data(|page| buf[done..done + n].copy_from_slice(&page.0[off..off + n]));
            done += n;
            addr += n;
        }
        Ok(())
    }

    /// Copy bytes into the address space, dirtying each frame touched.
    pub fn write(&self, vaddr: usize, buf: &[u8]) -> Result<()> {
        let mut addr = vaddr;
        let mut done = 0;
        while done < buf.len() {
            let vpn = addr_to_pn(addr);
            let off = page_offset(addr);
            let area = self.lookup(vpn).ok_or(KernelError::Fault)?;
            let frame = area.obj.lookup_page(area.obj_page(vpn), true)?;
            let n = cmp::min(PAGE_SIZE - off, buf.len() - done);
            frame.with_data_mut(|page| page.0[off..off + n].copy_from_slice(&buf[done..done + n]));
            area.obj.dirty_page(&frame)?;
            frame.set_dirty();
            done += n;
            addr += n;
        }
        Ok(())
    }

    /// A structurally identical map in which every area holds the same
    /// object as its source, with the reference counts bumped. Shadow
    /// wiring for copy-on-write is fork's job, afterwards.
    pub fn clone_map(&self) -> Self {
        Self {
            areas: self
                .areas
                .iter()
                .map(|(start, area)| (*start, area.duplicate()))
                .collect(),
        }
    }

    /// Fork's copy-on-write wiring. For each corresponding pair of
    /// private areas in `self` (the parent) and `child`, interpose two
    /// fresh shadows over the object the pair currently shares, one per
    /// side. Shared areas keep sharing.
    pub fn fork_shadow(&mut self, child: &mut Self) {
        debug_assert_eq!(self.areas.len(), child.areas.len());
        for (parent_area, child_area) in itertools::izip!(
            self.areas.values_mut(),
            child.areas.values_mut()
        ) {
            debug_assert_eq!(parent_area.start, child_area.start);
            if !parent_area.flags.contains(MapFlags::PRIVATE) {
                continue;
            }
            let shared = parent_area.obj.clone();
            parent_area.replace_obj(ShadowObj::new(shared.clone()));
            child_area.replace_obj(ShadowObj::new(shared));
        }
    }

    /// Drop every mapping.
    pub fn clear(&mut self) {
        self.areas.clear();
    }
}

impl Default for VmMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anon_map(map: &mut VmMap, lopage: usize, npages: usize) -> usize {
        map.map(
            None,
            lopage,
            npages,
            Prot::READ | Prot::WRITE,
            MapFlags::PRIVATE | MapFlags::ANON,
            0,
            Dir::LoHi,
        )
        .unwrap()
    }

    #[test]
    fn find_range_first_fit_both_directions() {
        let mut map = VmMap::new();
        assert_eq!(map.find_range(4, Dir::LoHi), Some(USER_PAGE_LOW));
        assert_eq!(map.find_range(4, Dir::HiLo), Some(USER_PAGE_HIGH - 4));

        let lo = anon_map(&mut map, 0, 4);
        assert_eq!(lo, USER_PAGE_LOW);
        let hi = anon_map(&mut map, USER_PAGE_HIGH - 4, 4);
        assert_eq!(map.find_range(2, Dir::LoHi), Some(lo + 4));
        assert_eq!(map.find_range(2, Dir::HiLo), Some(hi - 2));
        assert!(map
            .find_range(USER_PAGE_HIGH - USER_PAGE_LOW, Dir::LoHi)
            .is_none());
    }

    #[test]
    fn lookup_and_range_emptiness() {
        let mut map = VmMap::new();
        let start = anon_map(&mut map, 0x100, 8);
        assert_eq!(start, 0x100);
        assert!(map.lookup(0x100).is_some());
        assert!(map.lookup(0x107).is_some());
        assert!(map.lookup(0x108).is_none());
        assert!(map.lookup(0xff).is_none());
        assert!(!map.is_range_empty(0x104, 1));
        assert!(map.is_range_empty(0x108, 4));
    }

    #[test]
    fn remove_shapes() {
        // Fully inside: split in two, second reference on the object.
        let mut map = VmMap::new();
        let _ = anon_map(&mut map, 0x100, 0x10);
        map.remove(0x104, 0x4);
        assert_eq!(map.len(), 2);
        let left = map.lookup(0x100).unwrap();
        assert_eq!((left.start(), left.end(), left.off()), (0x100, 0x104, 0));
        let right = map.lookup(0x108).unwrap();
        assert_eq!((right.start(), right.end(), right.off()), (0x108, 0x110, 0x8));
        assert!(map.lookup(0x104).is_none());

        // Overlap at the right end: shorten.
        let mut map = VmMap::new();
        let _ = anon_map(&mut map, 0x100, 0x10);
        map.remove(0x108, 0x10);
        let area = map.lookup(0x100).unwrap();
        assert_eq!((area.start(), area.end()), (0x100, 0x108));

        // Overlap at the left end: advance start and offset.
        let mut map = VmMap::new();
        let _ = anon_map(&mut map, 0x100, 0x10);
        map.remove(0xf8, 0x10);
        let area = map.lookup(0x10c).unwrap();
        assert_eq!((area.start(), area.end(), area.off()), (0x108, 0x110, 0x8));

        // Fully covered: gone.
        let mut map = VmMap::new();
        let _ = anon_map(&mut map, 0x100, 0x10);
        map.remove(0x100, 0x10);
        assert!(map.is_empty());
    }

    #[test]
    fn areas_stay_sorted_and_disjoint() {
        let mut map = VmMap::new();
        let _ = anon_map(&mut map, 0x300, 4);
        let _ = anon_map(&mut map, 0x100, 4);
        let _ = anon_map(&mut map, 0x200, 4);
        let starts: Vec<usize> = map.iter().map(|a| a.start()).collect();
        assert_eq!(starts, [0x100, 0x200, 0x300]);
        for pair in starts.windows(2) {
            assert!(map.lookup(pair[0]).unwrap().end() <= pair[1]);
        }
    }

    #[test]
    fn clone_shares_objects() {
        let mut map = VmMap::new();
        let _ = anon_map(&mut map, 0x100, 4);
        let clone = map.clone_map();
        let a = map.lookup(0x100).unwrap();
        let b = clone.lookup(0x100).unwrap();
        assert!(Arc::ptr_eq(a.obj(), b.obj()));
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut map = VmMap::new();
        let start = anon_map(&mut map, 0, 2);
        let addr = crate::page::pn_to_addr(start) + 100;
        map.write(addr, b"copy-on-write").unwrap();
        let mut buf = [0u8; 13];
        map.read(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"copy-on-write");
        // Straddle a page boundary.
        let edge = crate::page::pn_to_addr(start) + PAGE_SIZE - 3;
        map.write(edge, b"abcdef").unwrap();
        let mut buf = [0u8; 6];
        map.read(edge, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn fork_shadow_interposes_two_shadows() {
        let mut parent = VmMap::new();
        let start = anon_map(&mut parent, 0, 1);
        let addr = crate::page::pn_to_addr(start);
        parent.write(addr, b"P").unwrap();

        let shared = parent.lookup(start).unwrap().obj().clone();
        let mut child = parent.clone_map();
        parent.fork_shadow(&mut child);

        let pobj = parent.lookup(start).unwrap().obj().clone();
        let cobj = child.lookup(start).unwrap().obj().clone();
        assert!(!Arc::ptr_eq(&pobj, &cobj));
        assert!(Arc::ptr_eq(
            &pobj.shadowed().unwrap(),
            &cobj.shadowed().unwrap()
        ));

        child.write(addr, b"C").unwrap();
        let mut buf = [0u8; 1];
        parent.read(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"P");
        child.read(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"C");

        // The child's private copies die with its map.
        drop(child);
        parent.read(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"P");
        let _ = shared;
    }

    #[test]
    fn shadow_chains_stay_bounded_on_repeated_forks() {
        let mut parent = VmMap::new();
        let start = anon_map(&mut parent, 0, 1);
        let addr = crate::page::pn_to_addr(start);
        parent.write(addr, b"x").unwrap();
        // Fork a few generations; every chain must still reach a
        // non-shadow bottom in finitely many hops.
        let mut maps = Vec::new();
        for _ in 0..16 {
            let mut child = parent.clone_map();
            parent.fork_shadow(&mut child);
            maps.push(child);
        }
        let mut hops = 0;
        let mut cur = parent.lookup(start).unwrap().obj().clone();
        while let Some(next) = cur.shadowed() {
            cur = next;
            hops += 1;
            assert!(hops <= 17);
        }
        let mut buf = [0u8; 1];
        parent.read(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"x");
    }
}
