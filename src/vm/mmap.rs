//! The mmap/munmap system-call surface.

use crate::error::{KernelError, Result};
use crate::fs::{FMode, Mode};
use crate::page::{addr_to_pn, len_to_pages, page_aligned, pn_to_addr};
use crate::param::{USER_PAGE_HIGH, USER_PAGE_LOW};
use crate::proc::Proc;
use crate::vm::vmmap::{Dir, MapFlags, Prot};

impl Proc {
    /// Add a mapping to this process's address space and return its
    /// address. Only SHARED, PRIVATE, FIXED and ANON are supported;
    /// address, length and offset must be page-aligned, and `addr == 0`
    /// (with FIXED clear) asks the kernel to pick a range.
    pub fn mmap(
        &self,
        addr: usize,
        len: usize,
        prot: Prot,
        flags: MapFlags,
        fd: usize,
        off: usize,
    ) -> Result<usize> {
        if !page_aligned(addr) || !page_aligned(off) || len == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if addr.checked_add(len).is_none() {
            return Err(KernelError::InvalidArgument);
        }
        if flags.contains(MapFlags::SHARED) == flags.contains(MapFlags::PRIVATE) {
            return Err(KernelError::InvalidArgument);
        }
        let npages = len_to_pages(len);
        if addr == 0 {
            if flags.contains(MapFlags::FIXED) {
                return Err(KernelError::InvalidArgument);
            }
        } else {
            let lo = addr_to_pn(addr);
            if lo < USER_PAGE_LOW || lo + npages > USER_PAGE_HIGH {
                return Err(KernelError::InvalidArgument);
            }
        }

        let file = if flags.contains(MapFlags::ANON) {
            None
        } else {
            let file = self.fget(fd)?;
            if file.vnode().mode() != Mode::Regular {
                return Err(KernelError::Permission);
            }
            if flags.contains(MapFlags::PRIVATE) && !file.fmode().contains(FMode::READ) {
                return Err(KernelError::Permission);
            }
            if flags.contains(MapFlags::SHARED)
                && prot.contains(Prot::WRITE)
                && !file.fmode().contains(FMode::READ | FMode::WRITE)
            {
                return Err(KernelError::Permission);
            }
            Some(file.vnode().clone())
        };

        let start = self.vmmap().lock().map(
            file,
            addr_to_pn(addr),
            npages,
            prot,
            flags,
            addr_to_pn(off),
            Dir::HiLo,
        )?;
        self.mmu().flush_tlb();
        Ok(pn_to_addr(start))
    }

    /// Remove every mapping intersecting `[addr, addr + len)`.
    pub fn munmap(&self, addr: usize, len: usize) -> Result<()> {
        if !page_aligned(addr) || len == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let lopage = addr_to_pn(addr);
        let npages = len_to_pages(len);
        self.vmmap().lock().remove(lopage, npages);
        self.mmu().unmap_range(lopage, lopage + npages);
        self.mmu().flush_tlb();
        Ok(())
    }
}
