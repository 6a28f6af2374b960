//! The filesystem layers.
//!
//! `vnode` is the polymorphic surface every file object exposes; `namev`
//! resolves paths over it; `file` and `syscall` are the open-file layer
//! and the system-call surface; `s5` is the on-disk filesystem behind
//! it all.

pub mod file;
pub mod namev;
pub mod path;
pub mod s5;
pub mod syscall;
pub mod vnode;

pub use file::{FMode, OFlags, OpenFile, Whence};
pub use namev::{dir_namev, lookup, open_namev};
pub use path::{FileName, NameBuf, Path};
pub use vnode::{DirEntry, FileObj, Mode, Stat, Vnode};
