//! The on-disk superblock.

use core::mem;

use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use crate::error::{KernelError, Result};
use crate::param::{BLOCK_SIZE, NBLKS_PER_FNODE};

pub const S5_MAGIC: u32 = 0x5335_6673;
pub const S5_VERSION: u32 = 1;

/// Terminates both free lists ("-1" in the on-disk tradition).
pub const SENTINEL: u32 = u32::MAX;

/// Block number of the superblock.
pub const SUPER_BLOCK: usize = 0;

/// Disk layout:
/// [ superblock | inode table | root directory and data blocks ]
///
/// The free-block cache is the batching trick: `free_blocks` holds up
/// to `NBLKS_PER_FNODE - 1` allocatable block numbers counted by
/// `nfree`, and the designated last slot chains to a disk block holding
/// the next full batch (`SENTINEL` ends the chain).
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct RawSuper {
    pub magic: u32,
    pub version: u32,
    /// Head of the free-inode list threaded through the inode table.
    pub free_inode: u32,
    pub num_inodes: u32,
    pub root_inode: u32,
    pub nfree: u32,
    pub free_blocks: [u32; NBLKS_PER_FNODE],
}

pub const SUPER_SIZE: usize = mem::size_of::<RawSuper>();

const_assert!(SUPER_SIZE <= BLOCK_SIZE);

impl RawSuper {
    /// Sanity-check a superblock fresh off the disk.
    pub fn check(&self, nblocks: usize) -> Result<()> {
        if self.magic != S5_MAGIC {
            kdbg!("s5: bad magic {:#x}", self.magic);
            return Err(KernelError::InvalidArgument);
        }
        if self.version != S5_VERSION {
            kdbg!(
                "s5: filesystem is version {}; only version {} is supported",
                self.version,
                S5_VERSION
            );
            return Err(KernelError::InvalidArgument);
        }
        if self.root_inode >= self.num_inodes {
            return Err(KernelError::InvalidArgument);
        }
        if self.free_inode != SENTINEL && self.free_inode >= self.num_inodes {
            return Err(KernelError::InvalidArgument);
        }
        if self.nfree as usize >= NBLKS_PER_FNODE {
            return Err(KernelError::InvalidArgument);
        }
        let itable_blocks = (self.num_inodes as usize + super::INODES_PER_BLOCK - 1)
            / super::INODES_PER_BLOCK;
        if 1 + itable_blocks >= nblocks {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }
}
