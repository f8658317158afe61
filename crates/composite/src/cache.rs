//! Write-once cache of loaded parts.

use crate::scene::NodeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle to a loaded, attached part asset.
///
/// Cheap to clone; every clone refers to the same scene node.
pub struct AssetHandle<A> {
    part: Arc<str>,
    node: NodeId,
    asset: Arc<A>,
}

impl<A> AssetHandle<A> {
    pub fn new(part: &str, node: NodeId, asset: Arc<A>) -> Self {
        Self { part: Arc::from(part), node, asset }
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    /// Scene node the asset was attached as
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn asset(&self) -> &Arc<A> {
        &self.asset
    }

    /// True if both handles refer to the same loaded asset
    pub fn same_asset(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.asset, &other.asset)
    }
}

impl<A> Clone for AssetHandle<A> {
    fn clone(&self) -> Self {
        Self {
            part: self.part.clone(),
            node: self.node,
            asset: self.asset.clone(),
        }
    }
}

impl<A> fmt::Debug for AssetHandle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetHandle")
            .field("part", &self.part)
            .field("node", &self.node)
            .finish()
    }
}

/// Part id -> loaded handle. Entries are never replaced or evicted.
pub struct LoadedPartCache<A> {
    entries: HashMap<String, AssetHandle<A>>,
}

impl<A> Default for LoadedPartCache<A> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<A> LoadedPartCache<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, part: &str) -> Option<&AssetHandle<A>> {
        self.entries.get(part)
    }

    pub fn contains(&self, part: &str) -> bool {
        self.entries.contains_key(part)
    }

    /// Store `handle` unless the part is already cached.
    ///
    /// Returns the handle now in the cache, which is the existing one if
    /// there was one.
    pub fn insert_once(&mut self, handle: AssetHandle<A>) -> AssetHandle<A> {
        self.entries
            .entry(handle.part().to_string())
            .or_insert(handle)
            .clone()
    }

    /// Cached part ids, sorted
    pub fn parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = self.entries.keys().cloned().collect();
        parts.sort();
        parts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_write_once() {
        let mut cache = LoadedPartCache::new();
        let first = AssetHandle::new("roof1", NodeId(0), Arc::new("first"));
        let second = AssetHandle::new("roof1", NodeId(1), Arc::new("second"));

        let stored = cache.insert_once(first.clone());
        assert!(stored.same_asset(&first));

        let stored = cache.insert_once(second);
        assert!(stored.same_asset(&first));
        assert_eq!(stored.node(), NodeId(0));
        assert_eq!(**cache.get("roof1").unwrap().asset(), "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_parts_sorted() {
        let mut cache = LoadedPartCache::new();
        cache.insert_once(AssetHandle::new("roof2", NodeId(0), Arc::new(())));
        cache.insert_once(AssetHandle::new("floor", NodeId(1), Arc::new(())));

        assert_eq!(cache.parts(), vec!["floor", "roof2"]);
        assert!(cache.contains("floor"));
        assert!(!cache.contains("roof1"));
    }
}
