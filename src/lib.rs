//! wren: the core of a teaching Unix-like kernel.
//!
//! The crate covers the four subsystems that cooperate to manage a
//! process's view of the world:
//!   + `fs`: the virtual filesystem (vnodes, path resolution, open files,
//!     the system-call surface) and the S5 on-disk filesystem.
//!   + `vm`: memory objects (anonymous, file-backed, copy-on-write
//!     shadows) and the per-process address-space map.
//!   + `proc`: processes, the file-descriptor table, and fork.
//!   + `drivers`: the device switch, memory devices, and the terminal
//!     line discipline.
//!
//! Everything the core does not own (the block device, the MMU, wait
//! queues) is reached through the traits in `hal`, so the whole kernel
//! core runs hosted against in-memory implementations.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_must_use)]

extern crate alloc;

#[macro_use]
mod dbg;

pub mod drivers;
pub mod error;
pub mod fs;
pub mod hal;
pub mod kernel;
pub mod lock;
pub mod page;
pub mod param;
pub mod pframe;
pub mod proc;
pub mod vm;

pub use error::{KernelError, Result};
