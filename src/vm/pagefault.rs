//! The page-fault handler.

use crate::error::{KernelError, Result};
use crate::hal::Mmu;
use crate::page::addr_to_pn;
use crate::vm::vmmap::{Prot, VmMap};

bitflags::bitflags! {
    /// What the faulting access was doing. Empty means a plain read.
    pub struct FaultCause: u32 {
        const WRITE = 0x1;
        const EXEC = 0x2;
    }
}

/// Resolve a user fault at `vaddr`: find the area, check the access
/// against its protections, pull the page through the area's object
/// (copying through the shadow chain on a write), and install the
/// mapping. `Err(Fault)` means the access was bad and the process must
/// die with a fault status; any other error is an I/O-level failure.
pub fn handle_pagefault(
    map: &VmMap,
    mmu: &dyn Mmu,
    vaddr: usize,
    cause: FaultCause,
) -> Result<()> {
    let vpn = addr_to_pn(vaddr);
    let area = map.lookup(vpn).ok_or(KernelError::Fault)?;

    let forwrite = cause.contains(FaultCause::WRITE);
    if forwrite && !area.prot().contains(Prot::WRITE) {
        return Err(KernelError::Fault);
    }
    if cause.contains(FaultCause::EXEC) && !area.prot().contains(Prot::EXEC) {
        return Err(KernelError::Fault);
    }
    if !forwrite && !area.prot().contains(Prot::READ) {
        return Err(KernelError::Fault);
    }

    let frame = area.obj().lookup_page(area.obj_page(vpn), forwrite)?;
    if forwrite {
        area.obj().dirty_page(&frame)?;
        frame.set_dirty();
    }
    mmu.map_page(vpn, &frame);
    Ok(())
}
