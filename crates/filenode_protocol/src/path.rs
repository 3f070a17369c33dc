//! Root-relative file paths.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A normalized path relative to the managed root.
///
/// Always uses `/` as separator, has no empty, `.` or `..` segments, and can
/// never resolve outside the directory it is joined onto. Backslashes are
/// treated as separators so inventories produced on Windows hosts compare
/// equal to ones produced elsewhere.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Validates and normalizes a path received from the wire or a user.
    pub fn new(raw: &str) -> ProtocolResult<Self> {
        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') {
            return Err(ProtocolError::invalid_path(raw, "absolute path"));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(ProtocolError::invalid_path(raw, "parent traversal")),
                s if s.contains('\0') => {
                    return Err(ProtocolError::invalid_path(raw, "contains NUL byte"))
                }
                s => segments.push(s),
            }
        }

        match segments.first() {
            None => Err(ProtocolError::invalid_path(raw, "empty path")),
            Some(first) if is_drive_prefix(first) => {
                Err(ProtocolError::invalid_path(raw, "drive-qualified path"))
            }
            Some(_) => Ok(Self(segments.join("/"))),
        }
    }

    /// Builds the relative path of `full`, which must live under `root`.
    pub fn from_fs_path(root: &Path, full: &Path) -> ProtocolResult<Self> {
        let display = full.display().to_string();
        let relative = full
            .strip_prefix(root)
            .map_err(|_| ProtocolError::invalid_path(display.clone(), "outside root"))?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(os) => {
                    let s = os
                        .to_str()
                        .ok_or_else(|| ProtocolError::invalid_path(display.clone(), "not UTF-8"))?;
                    segments.push(s);
                }
                Component::CurDir => {}
                _ => return Err(ProtocolError::invalid_path(display, "not a plain relative path")),
            }
        }
        Self::new(&segments.join("/"))
    }

    /// Returns the normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Returns the final segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Resolves this path under `root`.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }
}

/// `C:` anywhere, and `C:name` on Windows where it is drive-relative.
fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    drive && (bytes.len() == 2 || cfg!(windows))
}

impl TryFrom<String> for RelativePath {
    type Error = ProtocolError;

    fn try_from(value: String) -> ProtocolResult<Self> {
        Self::new(&value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_separators_and_dots() {
        assert_eq!(RelativePath::new("a/b.txt").unwrap().as_str(), "a/b.txt");
        assert_eq!(RelativePath::new("a\\b\\c").unwrap().as_str(), "a/b/c");
        assert_eq!(RelativePath::new("./a//b/./c").unwrap().as_str(), "a/b/c");
        assert_eq!(RelativePath::new("dir/").unwrap().as_str(), "dir");
    }

    #[test]
    fn rejects_escaping_paths() {
        for raw in ["", ".", "/etc/passwd", "\\\\server\\share", "../x", "a/../../b", "C:\\x", "a\0b"] {
            assert!(RelativePath::new(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn colon_names_are_plain_files_off_windows() {
        assert_eq!(RelativePath::new("x:notes.txt").unwrap().as_str(), "x:notes.txt");
        assert_eq!(RelativePath::new("d/c:1").unwrap().as_str(), "d/c:1");
        assert!(RelativePath::new("x:").is_err());
        assert!(RelativePath::new("x:/notes.txt").is_err());
    }

    #[test]
    fn from_fs_path_strips_root() {
        let root = Path::new("/srv/files");
        let rel = RelativePath::from_fs_path(root, Path::new("/srv/files/x/y.bin")).unwrap();
        assert_eq!(rel.as_str(), "x/y.bin");
        assert_eq!(rel.file_name(), "y.bin");
        assert!(RelativePath::from_fs_path(root, Path::new("/srv/other/y.bin")).is_err());
    }

    #[test]
    fn serde_validates() {
        let ok: RelativePath = serde_json::from_str("\"a\\\\b\"").unwrap();
        assert_eq!(ok.as_str(), "a/b");
        assert!(serde_json::from_str::<RelativePath>("\"../etc\"").is_err());
    }

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just(".".to_string()),
            Just("..".to_string()),
            "[a-z0-9_.-]{1,8}",
        ]
    }

    proptest! {
        #[test]
        fn accepted_paths_stay_under_root(
            segments in prop::collection::vec(segment(), 1..6),
            backslash in any::<bool>(),
        ) {
            let sep = if backslash { "\\" } else { "/" };
            let raw = segments.join(sep);
            if let Ok(rel) = RelativePath::new(&raw) {
                prop_assert!(!rel.as_str().starts_with('/'));
                prop_assert!(rel.segments().all(|s| !s.is_empty() && s != "." && s != ".."));
                let root = Path::new("/managed/root");
                let resolved = rel.to_fs_path(root);
                prop_assert!(resolved.starts_with(root));
                prop_assert!(resolved != root);
                prop_assert_eq!(RelativePath::new(rel.as_str()).unwrap(), rel);
            }
        }
    }
}
