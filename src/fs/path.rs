//! Path and file-name newtypes.

use arrayvec::ArrayVec;

use crate::error::{KernelError, Result};
use crate::param::NAME_LEN;

#[repr(transparent)]
pub struct Path {
    // Invariant: arbitrary bytes; components are the runs between '/'.
    inner: [u8],
}

impl Path {
    pub fn new(bytes: &[u8]) -> &Self {
        // SAFETY: `&Path` is layout-compatible with `[u8]` because of
        // its attribute `#[repr(transparent)]`.
        unsafe { &*(bytes as *const [u8] as *const Self) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns `true` if the path begins with `'/'`.
    pub fn is_absolute(&self) -> bool {
        !self.inner.is_empty() && self.inner[0] == b'/'
    }

    /// The path's components, with empty runs (repeated or trailing
    /// slashes) skipped.
    pub fn components(&self) -> impl Iterator<Item = &[u8]> {
        self.inner.split(|ch| *ch == b'/').filter(|c| !c.is_empty())
    }
}

#[repr(transparent)]
#[derive(PartialEq, Debug)]
pub struct FileName {
    // Invariant:
    // - Nonempty, at most NAME_LEN bytes.
    // - Contains no '/' and no NUL.
    inner: [u8],
}

impl FileName {
    /// Validate one path component.
    pub fn new(bytes: &[u8]) -> Result<&Self> {
        if bytes.is_empty() || bytes.contains(&b'/') || bytes.contains(&0) {
            return Err(KernelError::InvalidArgument);
        }
        if bytes.len() > NAME_LEN {
            return Err(KernelError::NameTooLong);
        }
        // SAFETY: `&FileName` is layout-compatible with `[u8]` because
        // of its attribute `#[repr(transparent)]`, and the checks above
        // establish the invariant.
        Ok(unsafe { &*(bytes as *const [u8] as *const Self) })
    }

    /// The name ".".
    pub fn dot() -> &'static Self {
        // SAFETY: "." satisfies every FileName invariant.
        unsafe { &*(b"." as &[u8] as *const [u8] as *const Self) }
    }

    /// The name "..".
    pub fn dotdot() -> &'static Self {
        // SAFETY: ".." satisfies every FileName invariant.
        unsafe { &*(b".." as &[u8] as *const [u8] as *const Self) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    pub fn is_dot(&self) -> bool {
        &self.inner == b"."
    }

    pub fn is_dotdot(&self) -> bool {
        &self.inner == b".."
    }
}

/// An owned component buffer, sized for the longest legal name. Path
/// resolution writes the final component here so the parent lookup and
/// the final operation see the same bytes.
#[derive(Clone)]
pub struct NameBuf {
    buf: ArrayVec<u8, { NAME_LEN + 1 }>,
}

impl NameBuf {
    pub fn from_name(name: &FileName) -> Self {
        let mut buf = ArrayVec::new();
        buf.try_extend_from_slice(name.as_bytes())
            .expect("component fits the name buffer");
        Self { buf }
    }

    /// The name ".", for paths that resolve to their starting directory.
    pub fn dot() -> Self {
        let mut buf = ArrayVec::new();
        buf.push(b'.');
        Self { buf }
    }

    pub fn as_name(&self) -> &FileName {
        FileName::new(&self.buf).expect("name buffer holds a valid component")
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_skip_slash_runs() {
        let path = Path::new(b"//usr///bin/ls/");
        let comps: Vec<&[u8]> = path.components().collect();
        assert_eq!(comps, [&b"usr"[..], b"bin", b"ls"]);
        assert!(path.is_absolute());
        assert!(Path::new(b"a/b").components().eq([&b"a"[..], b"b"]));
        assert!(!Path::new(b"a/b").is_absolute());
        assert_eq!(Path::new(b"///").components().count(), 0);
    }

    #[test]
    fn name_validation() {
        assert!(FileName::new(b"ls").is_ok());
        assert_eq!(
            FileName::new(b"").unwrap_err(),
            crate::KernelError::InvalidArgument
        );
        assert_eq!(
            FileName::new(b"a/b").unwrap_err(),
            crate::KernelError::InvalidArgument
        );
        let long = [b'x'; crate::param::NAME_LEN + 1];
        assert_eq!(
            FileName::new(&long).unwrap_err(),
            crate::KernelError::NameTooLong
        );
        let exact = [b'x'; crate::param::NAME_LEN];
        assert!(FileName::new(&exact).is_ok());
    }

    #[test]
    fn dot_names() {
        assert!(FileName::dot().is_dot());
        assert!(FileName::dotdot().is_dotdot());
        assert_eq!(NameBuf::dot().as_bytes(), b".");
        let name = FileName::new(b"kernel").unwrap();
        assert_eq!(NameBuf::from_name(name).as_name().as_bytes(), b"kernel");
    }
}
