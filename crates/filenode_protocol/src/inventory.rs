//! Inventories and download tasks.

use crate::digest::Digest;
use crate::path::RelativePath;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// Mapping from relative path to content digest.
///
/// One entry per regular file. Keys are kept sorted so that iteration order,
/// and everything derived from it, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    entries: BTreeMap<RelativePath, Digest>,
}

impl Inventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the digest it replaced.
    pub fn insert(&mut self, path: RelativePath, digest: Digest) -> Option<Digest> {
        self.entries.insert(path, digest)
    }

    /// Returns the digest recorded for `path`.
    pub fn get(&self, path: &RelativePath) -> Option<&Digest> {
        self.entries.get(path)
    }

    /// Returns true if `path` has an entry.
    pub fn contains(&self, path: &RelativePath) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> btree_map::Iter<'_, RelativePath, Digest> {
        self.entries.iter()
    }

    /// Iterates paths in order.
    pub fn paths(&self) -> btree_map::Keys<'_, RelativePath, Digest> {
        self.entries.keys()
    }
}

impl FromIterator<(RelativePath, Digest)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (RelativePath, Digest)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<(RelativePath, Digest)> for Inventory {
    fn extend<I: IntoIterator<Item = (RelativePath, Digest)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for Inventory {
    type Item = (RelativePath, Digest);
    type IntoIter = btree_map::IntoIter<RelativePath, Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = (&'a RelativePath, &'a Digest);
    type IntoIter = btree_map::Iter<'a, RelativePath, Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// One file that must be fetched and verified.
///
/// Tasks are immutable; the fetcher may retry a task internally but it is
/// never re-queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Destination relative to the managed root.
    pub path: RelativePath,
    /// Digest the downloaded bytes must have.
    pub expected: Digest,
}

impl DownloadTask {
    /// Creates a new download task.
    pub fn new(path: RelativePath, expected: Digest) -> Self {
        Self { path, expected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    #[test]
    fn iteration_is_sorted() {
        let inv: Inventory = [
            (rel("z.txt"), Digest::of(b"z")),
            (rel("a/b.txt"), Digest::of(b"b")),
            (rel("m.txt"), Digest::of(b"m")),
        ]
        .into_iter()
        .collect();

        let paths: Vec<&str> = inv.paths().map(|p| p.as_str()).collect();
        assert_eq!(paths, vec!["a/b.txt", "m.txt", "z.txt"]);
    }

    #[test]
    fn insert_replaces_duplicate_keys() {
        let mut inv = Inventory::new();
        assert!(inv.insert(rel("a"), Digest::of(b"1")).is_none());
        assert_eq!(inv.insert(rel("a"), Digest::of(b"2")), Some(Digest::of(b"1")));
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.get(&rel("a")), Some(&Digest::of(b"2")));
    }

    #[test]
    fn serializes_as_map() {
        let mut inv = Inventory::new();
        inv.insert(rel("dir/f"), Digest::of(b"abc"));
        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(
            json["dir/f"],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
