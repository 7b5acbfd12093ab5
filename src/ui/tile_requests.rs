use std::collections::HashSet;
use std::hash::Hash;

/// Tiles in flight plus tiles that already failed. A failed tile is not
/// asked for again until `clear`, which runs when its layer changes.
#[derive(Debug)]
pub struct TileRequests<K> {
    pending: HashSet<K>,
    failed: HashSet<K>,
}

impl<K> Default for TileRequests<K> {
    fn default() -> Self {
        Self {
            pending: HashSet::new(),
            failed: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Copy> TileRequests<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` as in flight. Returns false when it is already pending or
    /// has failed, in which case no fetch should start.
    pub fn begin(&mut self, key: K) -> bool {
        if self.pending.contains(&key) || self.failed.contains(&key) {
            return false;
        }
        self.pending.insert(key)
    }

    pub fn succeeded(&mut self, key: &K) {
        self.pending.remove(key);
    }

    pub fn failed(&mut self, key: K) {
        self.pending.remove(&key);
        self.failed.insert(key);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_tile_is_fetched_once() {
        let mut requests = TileRequests::new();
        assert!(requests.begin((3, 1, 2)));
        assert!(!requests.begin((3, 1, 2)));
    }

    #[test]
    fn failed_tile_is_not_requested_again() {
        let mut requests = TileRequests::new();
        let key = (0usize, 4, 12, 6);
        assert!(requests.begin(key));
        requests.failed(key);
        for _ in 0..3 {
            assert!(!requests.begin(key));
        }
    }

    #[test]
    fn evicted_tile_can_be_refetched_after_success() {
        let mut requests = TileRequests::new();
        assert!(requests.begin((2, 0, 0)));
        requests.succeeded(&(2, 0, 0));
        assert!(requests.begin((2, 0, 0)));
    }

    #[test]
    fn clearing_allows_failed_tiles_again() {
        let mut requests = TileRequests::new();
        requests.begin((1, 1, 1));
        requests.failed((1, 1, 1));
        requests.clear();
        assert!(requests.begin((1, 1, 1)));
    }
}
