//! Open files: what a file descriptor points at.

use alloc::sync::Arc;

use crate::lock::SpinLock;

use super::vnode::Vnode;

bitflags::bitflags! {
    /// open(2) flags. Read-only is the absence of both write bits.
    pub struct OFlags: u32 {
        const WRONLY = 0x1;
        const RDWR = 0x2;
        const CREATE = 0x100;
        const APPEND = 0x400;
    }
}

bitflags::bitflags! {
    /// An open file's access mode.
    pub struct FMode: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const APPEND = 0x4;
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// One open file: a vnode reference, a byte offset, and a mode. `dup`,
/// `dup2` and `fork` share the object itself (and therefore the
/// offset), each holder owning one reference; the vnode reference drops
/// with the last holder.
pub struct OpenFile {
    vnode: Arc<dyn Vnode>,
    pos: SpinLock<usize>,
    fmode: FMode,
}

impl OpenFile {
    pub fn new(vnode: Arc<dyn Vnode>, fmode: FMode) -> Self {
        Self {
            vnode,
            pos: SpinLock::new(0),
            fmode,
        }
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    pub fn fmode(&self) -> FMode {
        self.fmode
    }

    pub fn pos(&self) -> usize {
        *self.pos.lock()
    }

    pub fn set_pos(&self, pos: usize) {
        *self.pos.lock() = pos;
    }

    pub fn advance(&self, n: usize) {
        *self.pos.lock() += n;
    }
}
