//! Virtual memory: memory objects and per-process address-space maps.
//!
//! A memory object (`MemObj`) is a polymorphic source of pages. The
//! variants are anonymous memory (`AnonObj`), file contents (the
//! vnode-supplied object in `fs`), and copy-on-write overlays
//! (`ShadowObj`). A `VmMap` is the ordered set of areas a process has
//! mapped; the fault handler resolves a faulting address through the
//! area's object, walking the shadow chain as needed.

mod anon;
mod mmap;
mod mmobj;
mod pagefault;
mod shadow;
mod vmmap;

pub use anon::AnonObj;
pub use mmobj::MemObj;
pub use pagefault::{handle_pagefault, FaultCause};
pub use shadow::ShadowObj;
pub use vmmap::{Dir, MapFlags, Prot, VmArea, VmMap};
