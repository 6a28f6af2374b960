/// Block size of the on-disk filesystem; equal to the page size so one
/// page frame backs exactly one disk block.
pub const BLOCK_SIZE: usize = 4096;

/// Number of direct block slots in an inode.
pub const NDIRECT: usize = 26;

/// Block numbers per indirect block.
pub const NINDIRECT: usize = BLOCK_SIZE / 4;

/// Largest file, in blocks.
pub const MAX_FILE_BLOCKS: usize = NDIRECT + NINDIRECT;

/// Largest file, in bytes.
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

/// Maximum length of one path component.
pub const NAME_LEN: usize = 28;

/// Open files per process.
pub const NFILES: usize = 32;

/// Capacity of the superblock's free-block array. The last slot chains
/// to the next batch on disk.
pub const NBLKS_PER_FNODE: usize = 32;

/// Maximum file path name.
pub const MAXPATH: usize = 1024;

/// Lowest user-mappable virtual page.
pub const USER_PAGE_LOW: usize = 0x10;

/// One past the highest user-mappable virtual page.
pub const USER_PAGE_HIGH: usize = 0xc0000;

/// Terminal input ring capacity.
pub const TTY_BUF_SIZE: usize = 128;
