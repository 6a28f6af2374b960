//! The file-system system-call surface. Mostly capability checking and
//! reference bookkeeping; the real work happens behind the vnode
//! operations. Every vnode acquired here is released on every exit path
//! — with `Arc` handles that is the structure of the code, not a
//! convention.

use alloc::sync::Arc;

use crate::error::{KernelError, Result};
use crate::proc::Proc;

use super::file::{FMode, OFlags, OpenFile, Whence};
use super::namev::{dir_namev, lookup, open_namev};
use super::path::Path;
use super::vnode::{DirEntry, Mode, Stat, Vnode};

impl Proc {
    /// Open `path`, returning the new file descriptor.
    pub fn open(&self, path: &[u8], flags: OFlags) -> Result<usize> {
        if flags.contains(OFlags::WRONLY | OFlags::RDWR) {
            return Err(KernelError::InvalidArgument);
        }
        let mut fmode = if flags.contains(OFlags::WRONLY) {
            FMode::WRITE
        } else if flags.contains(OFlags::RDWR) {
            FMode::READ | FMode::WRITE
        } else {
            FMode::READ
        };
        if flags.contains(OFlags::APPEND) {
            fmode |= FMode::APPEND;
        }

        // Claim a descriptor before resolving, so a full table reports
        // `TooManyFiles` rather than a resolution error.
        let fd = self.next_fd()?;

        let root = self.kernel().root();
        let vnode = open_namev(Path::new(path), flags, &self.cwd(), &root)?;
        if vnode.mode() == Mode::Directory && fmode.contains(FMode::WRITE) {
            return Err(KernelError::IsDirectory);
        }

        self.set_fd(fd, Arc::new(OpenFile::new(vnode, fmode)));
        Ok(fd)
    }

    /// Read from `fd` at its current offset, advancing it.
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let file = self.fget(fd)?;
        if !file.fmode().contains(FMode::READ) {
            return Err(KernelError::BadFd);
        }
        let n = match file.vnode().mode() {
            Mode::Directory => return Err(KernelError::IsDirectory),
            Mode::CharDev => self.chr_device(file.vnode())?.read(buf)?,
            Mode::BlockDev => return Err(KernelError::InvalidArgument),
            Mode::Regular => file.vnode().read(file.pos(), buf)?,
        };
        file.advance(n);
        Ok(n)
    }

    /// Write to `fd` at its current offset (end of file first, in
    /// append mode), advancing it.
    pub fn write(&self, fd: usize, buf: &[u8]) -> Result<usize> {
        let file = self.fget(fd)?;
        if !file.fmode().contains(FMode::WRITE) {
            return Err(KernelError::BadFd);
        }
        let n = match file.vnode().mode() {
            Mode::Directory => return Err(KernelError::IsDirectory),
            Mode::CharDev => self.chr_device(file.vnode())?.write(buf)?,
            Mode::BlockDev => return Err(KernelError::InvalidArgument),
            Mode::Regular => {
                if file.fmode().contains(FMode::APPEND) {
                    file.set_pos(file.vnode().len());
                }
                file.vnode().write(file.pos(), buf)?
            }
        };
        file.advance(n);
        Ok(n)
    }

    /// Release descriptor `fd`.
    pub fn close(&self, fd: usize) -> Result<()> {
        let file = self.take_fd(fd)?;
        drop(file);
        Ok(())
    }

    /// A new descriptor sharing `fd`'s open file (and offset).
    pub fn dup(&self, fd: usize) -> Result<usize> {
        let file = self.fget(fd)?;
        let newfd = self.next_fd()?;
        self.set_fd(newfd, file);
        Ok(newfd)
    }

    /// Like `dup`, into the caller's chosen slot; whatever was open
    /// there is closed first. `dup2(fd, fd)` is a no-op.
    pub fn dup2(&self, ofd: usize, nfd: usize) -> Result<usize> {
        let file = self.fget(ofd)?;
        self.check_fd(nfd)?;
        if ofd == nfd {
            return Ok(nfd);
        }
        self.set_fd(nfd, file);
        Ok(nfd)
    }

    /// Reposition `fd`'s offset. The resulting offset may not be
    /// negative.
    pub fn lseek(&self, fd: usize, offset: isize, whence: Whence) -> Result<usize> {
        let file = self.fget(fd)?;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => file.pos() as isize,
            Whence::End => file.vnode().len() as isize,
        };
        let pos = base + offset;
        if pos < 0 {
            return Err(KernelError::InvalidArgument);
        }
        file.set_pos(pos as usize);
        Ok(pos as usize)
    }

    /// The next directory entry of `fd`, advancing its offset; `None`
    /// at the end. Offsets remembered across directory modification are
    /// invalidated by the entry compaction `unlink` performs.
    pub fn getdent(&self, fd: usize) -> Result<Option<DirEntry>> {
        let file = self.fget(fd)?;
        if file.vnode().mode() != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        match file.vnode().readdir(file.pos())? {
            Some((entry, advance)) => {
                file.advance(advance);
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    pub fn stat(&self, path: &[u8]) -> Result<Stat> {
        let root = self.kernel().root();
        let vnode = open_namev(Path::new(path), OFlags::empty(), &self.cwd(), &root)?;
        vnode.stat()
    }

    /// Make `path` the current working directory.
    pub fn chdir(&self, path: &[u8]) -> Result<()> {
        let root = self.kernel().root();
        let vnode = open_namev(Path::new(path), OFlags::empty(), &self.cwd(), &root)?;
        if vnode.mode() != Mode::Directory {
            return Err(KernelError::NotADirectory);
        }
        // The old cwd's reference drops with the swap.
        self.set_cwd(vnode);
        Ok(())
    }

    pub fn mkdir(&self, path: &[u8]) -> Result<()> {
        let root = self.kernel().root();
        let (parent, name) = dir_namev(Path::new(path), &self.cwd(), &root)?;
        match lookup(&parent, name.as_name()) {
            Ok(_existing) => Err(KernelError::AlreadyExists),
            Err(KernelError::NoEntry) => parent.mkdir(name.as_name()),
            Err(err) => Err(err),
        }
    }

    /// Remove an empty directory. A final component of "." is invalid;
    /// ".." reports the directory as non-empty, as tradition demands.
    pub fn rmdir(&self, path: &[u8]) -> Result<()> {
        let root = self.kernel().root();
        let (parent, name) = dir_namev(Path::new(path), &self.cwd(), &root)?;
        if name.as_name().is_dot() {
            return Err(KernelError::InvalidArgument);
        }
        if name.as_name().is_dotdot() {
            return Err(KernelError::NotEmpty);
        }
        parent.rmdir(name.as_name())
    }

    /// Remove a name. Directories go through `rmdir` instead.
    pub fn unlink(&self, path: &[u8]) -> Result<()> {
        let root = self.kernel().root();
        let (parent, name) = dir_namev(Path::new(path), &self.cwd(), &root)?;
        let child = lookup(&parent, name.as_name())?;
        if child.mode() == Mode::Directory {
            return Err(KernelError::Permission);
        }
        drop(child);
        parent.unlink(name.as_name())
    }

    /// Make `to` a new name for the file at `from`.
    pub fn link(&self, from: &[u8], to: &[u8]) -> Result<()> {
        let root = self.kernel().root();
        let vnode = open_namev(Path::new(from), OFlags::empty(), &self.cwd(), &root)?;
        if vnode.mode() == Mode::Directory {
            return Err(KernelError::Permission);
        }
        let (todir, name) = dir_namev(Path::new(to), &self.cwd(), &root)?;
        match lookup(&todir, name.as_name()) {
            Ok(_existing) => Err(KernelError::AlreadyExists),
            Err(KernelError::NoEntry) => todir.link(&*vnode, name.as_name()),
            Err(err) => Err(err),
        }
    }

    /// Rename by link-then-unlink. Not atomic: a failure after the link
    /// leaves the file reachable under both names.
    pub fn rename(&self, oldpath: &[u8], newpath: &[u8]) -> Result<()> {
        self.link(oldpath, newpath)?;
        self.unlink(oldpath)
    }

    /// Create a device special file. Only character and block devices
    /// can be made this way.
    pub fn mknod(&self, path: &[u8], mode: Mode, devid: crate::drivers::DevId) -> Result<()> {
        if mode != Mode::CharDev && mode != Mode::BlockDev {
            return Err(KernelError::InvalidArgument);
        }
        let root = self.kernel().root();
        let (parent, name) = dir_namev(Path::new(path), &self.cwd(), &root)?;
        match lookup(&parent, name.as_name()) {
            Ok(_existing) => Err(KernelError::AlreadyExists),
            Err(KernelError::NoEntry) => parent.mknod(name.as_name(), mode, devid),
            Err(err) => Err(err),
        }
    }

    fn chr_device(
        &self,
        vnode: &Arc<dyn Vnode>,
    ) -> Result<Arc<dyn crate::drivers::CharDevice>> {
        let devid = vnode.devid().ok_or(KernelError::NoEntry)?;
        self.kernel().devices().chr(devid)
    }
}
