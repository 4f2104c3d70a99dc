// src/core/version_map.rs

//! The poller's private view of `username -> last-observed document version`.
//!
//! Owned exclusively by the poller (see `poller.rs`); no other component
//! reads or writes it. Versions are monotonically non-decreasing per key,
//! and the absence of a key means "unknown to the store as of the last poll."

use std::collections::{HashMap, HashSet};

/// `username -> last-observed document version`.
#[derive(Debug, Default)]
pub struct VersionMap {
    versions: HashMap<String, u64>,
}

impl VersionMap {
    pub fn new() -> Self {
        Self {
            versions: HashMap::new(),
        }
    }

    pub fn get(&self, username: &str) -> Option<u64> {
        self.versions.get(username).copied()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.versions.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Snapshots the current key set. Used by the poller at the start of an
    /// iteration to compute deletions by elimination.
    pub fn known_usernames(&self) -> HashSet<String> {
        self.versions.keys().cloned().collect()
    }

    /// Inserts a newly-observed username, recording its current version.
    /// Does not produce a change event -- first observation is not a change.
    pub fn insert_new(&mut self, username: String, version: u64) {
        self.versions.insert(username, version);
    }

    /// Updates the version for an already-known username.
    ///
    /// # Panics
    /// Panics if `new_version` is not greater than the previously recorded
    /// version -- version regressions would violate the monotonicity
    /// invariant and indicate a bug in the backing store or the caller.
    pub fn bump(&mut self, username: &str, new_version: u64) {
        let prev = self.versions.insert(username.to_string(), new_version);
        if let Some(prev) = prev {
            assert!(
                new_version > prev,
                "version map invariant violated: {username} version regressed from {prev} to {new_version}"
            );
        }
    }

    /// Removes a username that was observed deleted in the backing store.
    pub fn remove(&mut self, username: &str) -> Option<u64> {
        self.versions.remove(username)
    }

    /// Clears the entire map. Only valid as part of lifecycle `reset()`.
    pub fn clear(&mut self) {
        self.versions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_usernames_do_not_require_a_prior_entry() {
        let mut map = VersionMap::new();
        map.insert_new("alice".into(), 1);
        assert_eq!(map.get("alice"), Some(1));
    }

    #[test]
    fn bump_requires_strictly_increasing_versions() {
        let mut map = VersionMap::new();
        map.insert_new("alice".into(), 1);
        map.bump("alice", 2);
        assert_eq!(map.get("alice"), Some(2));
    }

    #[test]
    #[should_panic(expected = "version regressed")]
    fn bump_panics_on_version_regression() {
        let mut map = VersionMap::new();
        map.insert_new("alice".into(), 5);
        map.bump("alice", 3);
    }

    #[test]
    fn known_usernames_snapshot_is_independent_of_later_mutation() {
        let mut map = VersionMap::new();
        map.insert_new("alice".into(), 1);
        let snapshot = map.known_usernames();
        map.insert_new("bob".into(), 1);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("alice"));
    }

    #[test]
    fn remove_deletes_and_returns_prior_version() {
        let mut map = VersionMap::new();
        map.insert_new("alice".into(), 7);
        assert_eq!(map.remove("alice"), Some(7));
        assert!(!map.contains("alice"));
    }
}
