//! The closed set of kernel error kinds.
//!
//! Every fallible operation in the core returns one of these, propagated
//! unchanged across layers unless a higher layer explicitly reinterprets
//! (e.g. `open_namev` turning `NoEntry` into a `create`).

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Not a valid open file descriptor, or wrong mode for the request.
    BadFd,
    /// The process file table is full.
    TooManyFiles,
    OutOfMemory,
    /// A path component exceeds `NAME_LEN`.
    NameTooLong,
    NoEntry,
    IsDirectory,
    NotADirectory,
    AlreadyExists,
    NotEmpty,
    /// The filesystem is out of free blocks or free inodes.
    NoSpace,
    InvalidArgument,
    NoChild,
    /// Access outside the address space or against area protections.
    Fault,
    /// A blocked operation was cancelled; no shared state was mutated.
    Interrupted,
    Permission,
}

impl KernelError {
    /// The Unix errno for this kind, for the `-errno` syscall convention.
    pub const fn errno(self) -> i32 {
        match self {
            KernelError::BadFd => 9,
            KernelError::TooManyFiles => 24,
            KernelError::OutOfMemory => 12,
            KernelError::NameTooLong => 36,
            KernelError::NoEntry => 2,
            KernelError::IsDirectory => 21,
            KernelError::NotADirectory => 20,
            KernelError::AlreadyExists => 17,
            KernelError::NotEmpty => 39,
            KernelError::NoSpace => 28,
            KernelError::InvalidArgument => 22,
            KernelError::NoChild => 10,
            KernelError::Fault => 14,
            KernelError::Interrupted => 4,
            KernelError::Permission => 1,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;

/// Collapses a syscall result into the user-visible `value | -errno` form.
pub fn as_isize(r: Result<usize>) -> isize {
    match r {
        Ok(v) => v as isize,
        Err(e) => -(e.errno() as isize),
    }
}
