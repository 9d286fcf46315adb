//! Bucket addressing
//!
//! A bucket is addressed by the names leading to it from the store root,
//! e.g. root → `settings` → `ldap_config`. The empty path is the root bucket
//! itself, which holds the top-level buckets.

use std::fmt;

/// Path of bucket names from the store root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketPath {
    segments: Vec<Vec<u8>>,
}

impl BucketPath {
    /// The root bucket
    pub fn root() -> Self {
        Self::default()
    }

    /// Path of a top-level bucket
    pub fn top_level(name: &[u8]) -> Self {
        Self::root().child(name)
    }

    /// Builds a path from name segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            segments: segments.into_iter().map(|s| s.as_ref().to_vec()).collect(),
        }
    }

    /// Returns this path extended by `name`.
    pub fn child(&self, name: &[u8]) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_vec());
        Self { segments }
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Last name on the path; `None` for the root.
    pub fn name(&self) -> Option<&[u8]> {
        self.segments.last().map(Vec::as_slice)
    }

    /// Nesting depth: 0 for the root, 1 for a top-level bucket.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Renders a byte name as a quoted string, escaping non-printable bytes.
pub fn display_name(name: &[u8]) -> String {
    format!("\"{}\"", name.escape_ascii())
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", display_name(segment))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(BucketPath::root().to_string(), "<root>");
        let path = BucketPath::top_level(b"settings").child(b"ldap_config");
        assert_eq!(path.to_string(), "\"settings\"/\"ldap_config\"");
    }

    #[test]
    fn test_display_escapes_binary_names() {
        let path = BucketPath::top_level(&[0x00, b'a', 0xFF]);
        assert_eq!(path.to_string(), "\"\\x00a\\xff\"");
    }

    #[test]
    fn test_depth_and_name() {
        let path = BucketPath::from_segments(["a", "b"]);
        assert_eq!(path.depth(), 2);
        assert_eq!(path.name(), Some(&b"b"[..]));
        assert!(BucketPath::root().name().is_none());
    }
}
