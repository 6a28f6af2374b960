//! Path resolution: one-component lookup, parent resolution, and the
//! open-time variant that can create the final component.

use alloc::sync::Arc;

use crate::error::{KernelError, Result};

use super::file::OFlags;
use super::path::{FileName, NameBuf, Path};
use super::vnode::{Mode, Vnode};

/// Resolve `name` in `dir`. A vnode without lookup capability (anything
/// that is not a directory) fails with `NotADirectory`; "." and ".."
/// are ordinary entries resolved by the filesystem, and the root's ".."
/// names the root itself.
pub fn lookup(dir: &Arc<dyn Vnode>, name: &FileName) -> Result<Arc<dyn Vnode>> {
    if dir.mode() != Mode::Directory {
        return Err(KernelError::NotADirectory);
    }
    dir.lookup(name)
}

/// Split `path` into its parent directory and final component. An
/// absolute path resolves from `root`, anything else from `base` (the
/// caller passes the process cwd). Every intermediate vnode is released
/// as resolution moves past it; the returned parent is the caller's to
/// release.
///
/// A path with no components at all ("/", "///") resolves to the start
/// directory with "." as its name.
pub fn dir_namev(
    path: &Path,
    base: &Arc<dyn Vnode>,
    root: &Arc<dyn Vnode>,
) -> Result<(Arc<dyn Vnode>, NameBuf)> {
    if path.is_empty() {
        return Err(KernelError::InvalidArgument);
    }
    let mut cur = if path.is_absolute() {
        root.clone()
    } else {
        base.clone()
    };

    let mut components = path.components().peekable();
    while let Some(component) = components.next() {
        let name = FileName::new(component)?;
        if components.peek().is_none() {
            return Ok((cur, NameBuf::from_name(name)));
        }
        // Intermediate component; the old `cur` reference drops here.
        cur = lookup(&cur, name)?;
    }
    Ok((cur, NameBuf::dot()))
}

/// Resolve a whole path for `open`. When the final component is missing
/// and `CREATE` is set, the parent's create operation makes it.
pub fn open_namev(
    path: &Path,
    flags: OFlags,
    base: &Arc<dyn Vnode>,
    root: &Arc<dyn Vnode>,
) -> Result<Arc<dyn Vnode>> {
    let (parent, name) = dir_namev(path, base, root)?;
    match lookup(&parent, name.as_name()) {
        Ok(vnode) => Ok(vnode),
        Err(KernelError::NoEntry) if flags.contains(OFlags::CREATE) => {
            parent.create(name.as_name())
        }
        Err(err) => Err(err),
    }
}
