//! The bucketed item store: an ordered map from bucket key to item list,
//! plus the dimension the store is currently partitioned by.
//!
//! Re-partitioning is always a full rebuild (`rebucket`), never incremental.
//! Keys are discovered serially (the map is the only contended structure);
//! per-bucket sorting and dedup then run in parallel since buckets are
//! disjoint.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::dedup::{self, DedupePolicy};
use crate::item::{DatItem, Machine, ZERO_CRC, ZERO_MD5, ZERO_SHA1, ZERO_SHA256};
use crate::util::natural_cmp;

/// Which dimension the store is currently partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketDimension {
    /// Not partitioned yet (items keyed by machine name on insert).
    #[default]
    None,
    Crc,
    Md5,
    Sha1,
    Sha256,
    Game,
}

/// Ordered map from bucket key to item list.
#[derive(Debug, Clone, Default)]
pub struct ItemStore {
    buckets: BTreeMap<String, Vec<DatItem>>,
    sorted_by: BucketDimension,
    /// Prefix game keys with zero-padded system/source ids so identically
    /// named machines from different input catalogs stay apart.
    split_by_source: bool,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable cross-source disambiguation for game keys. Takes effect on the
    /// next rebucket.
    pub fn set_split_by_source(&mut self, split: bool) {
        if self.split_by_source != split {
            self.split_by_source = split;
            self.sorted_by = BucketDimension::None;
        }
    }

    pub fn sorted_by(&self) -> BucketDimension {
        self.sorted_by
    }

    /// Insert an item under the current dimension's key.
    pub fn insert(&mut self, item: DatItem) {
        let key = self.key_for(&item, self.sorted_by);
        self.buckets.entry(key).or_default().push(item);
    }

    /// Mark the current partition stale after external mutation. The next
    /// `rebucket` call for any dimension will do real work again.
    pub fn invalidate(&mut self) {
        self.sorted_by = BucketDimension::None;
    }

    /// Repartition the entire store by `dimension`.
    ///
    /// No-op when the store is already partitioned by `dimension` — callers
    /// that mutated items out-of-band must call [`invalidate`](Self::invalidate)
    /// first. After partitioning, each bucket is sorted (case-insensitive
    /// natural order by name, insertion order on ties) and passed through the
    /// deduplicator according to `dedupe`.
    pub fn rebucket(&mut self, dimension: BucketDimension, dedupe: DedupePolicy) {
        if self.sorted_by == dimension {
            return;
        }

        // Key discovery: serial insert phase, keys are unknown ahead of time.
        let old = std::mem::take(&mut self.buckets);
        let mut next: BTreeMap<String, Vec<DatItem>> = BTreeMap::new();
        for items in old.into_values() {
            for item in items {
                let key = self.key_for(&item, dimension);
                next.entry(key).or_default().push(item);
            }
        }

        // Per-bucket work is embarrassingly parallel once keys exist.
        let mut buckets: Vec<(String, Vec<DatItem>)> = next.into_iter().collect();
        buckets.par_iter_mut().for_each(|(_, items)| {
            sort_bucket(items);
            match dedupe {
                DedupePolicy::None => {}
                DedupePolicy::Standard => {
                    *items = dedup::merge(std::mem::take(items));
                }
                DedupePolicy::Collapse => {
                    *items = dedup::collapse(std::mem::take(items));
                }
            }
        });

        self.buckets = buckets.into_iter().collect();
        self.sorted_by = dimension;
    }

    /// Derive the bucket key for an item under a dimension. Hash dimensions
    /// fall back to the per-type zero sentinel when the item does not carry
    /// that hash (a disk never contributes to the CRC dimension).
    fn key_for(&self, item: &DatItem, dimension: BucketDimension) -> String {
        match dimension {
            BucketDimension::Crc => item.crc().unwrap_or(ZERO_CRC).to_string(),
            BucketDimension::Md5 => item.md5().unwrap_or(ZERO_MD5).to_string(),
            BucketDimension::Sha1 => item.sha1().unwrap_or(ZERO_SHA1).to_string(),
            BucketDimension::Sha256 => item.sha256().unwrap_or(ZERO_SHA256).to_string(),
            BucketDimension::Game | BucketDimension::None => {
                let name = item.machine_name().to_lowercase();
                if self.split_by_source {
                    format!("{:04}-{:04}-{name}", item.system_id, item.source_id)
                } else {
                    name
                }
            }
        }
    }

    /// The game-dimension key for a machine name, matching `key_for` when the
    /// store is bucketed by game without source splitting.
    pub fn game_key(name: &str) -> String {
        name.to_lowercase()
    }

    pub fn bucket(&self, key: &str) -> Option<&[DatItem]> {
        self.buckets.get(key).map(|v| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.buckets.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &[DatItem])> {
        self.buckets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn items(&self) -> impl Iterator<Item = &DatItem> {
        self.buckets.values().flatten()
    }

    /// Total item count across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Machine snapshot for a game bucket (the machine of its first item).
    pub fn machine(&self, key: &str) -> Option<Machine> {
        self.buckets
            .get(key)
            .and_then(|items| items.first())
            .map(|item| item.machine().clone())
    }

    pub(crate) fn remove_bucket(&mut self, key: &str) -> Option<Vec<DatItem>> {
        self.buckets.remove(key)
    }

    pub(crate) fn bucket_mut(&mut self, key: &str) -> Option<&mut Vec<DatItem>> {
        self.buckets.get_mut(key)
    }

    pub(crate) fn push_to_bucket(&mut self, key: String, item: DatItem) {
        self.buckets.entry(key).or_default().push(item);
    }

    /// Re-sort every bucket in place without changing the partition.
    pub(crate) fn resort(&mut self) {
        self.buckets
            .values_mut()
            .par_bridge()
            .for_each(|items| sort_bucket(items));
    }

    /// Drop buckets whose items were all removed.
    pub(crate) fn prune_empty(&mut self) {
        self.buckets.retain(|_, items| !items.is_empty());
    }
}

/// Deterministic in-bucket order: case-insensitive natural compare on name,
/// ties broken by insertion order (stable sort).
fn sort_bucket(items: &mut [DatItem]) {
    items.sort_by(|a, b| natural_cmp(&a.name, &b.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemKind, ItemStatus};

    fn store_with(items: Vec<DatItem>) -> ItemStore {
        let mut store = ItemStore::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    fn rom(machine: &str, name: &str, crc: &str) -> DatItem {
        DatItem::rom(name, Machine::named(machine), 1024, crc)
    }

    #[test]
    fn test_rebucket_by_crc() {
        let mut store = store_with(vec![
            rom("game a", "a.bin", "deadbeef"),
            rom("game b", "b.bin", "deadbeef"),
            rom("game c", "c.bin", "0badf00d"),
        ]);
        store.rebucket(BucketDimension::Crc, DedupePolicy::None);
        assert_eq!(store.bucket("deadbeef").map(<[_]>::len), Some(2));
        assert_eq!(store.bucket("0badf00d").map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_disk_never_contributes_to_crc() {
        let disk = DatItem::new(
            "cd1",
            Machine::named("game"),
            ItemKind::Disk {
                md5: None,
                sha1: Some("1111111111111111111111111111111111111111".into()),
                sha256: None,
                status: ItemStatus::None,
                merge_tag: None,
            },
        );
        let mut store = store_with(vec![disk]);
        store.rebucket(BucketDimension::Crc, DedupePolicy::None);
        // Disk lands under the zero sentinel, not under any CRC value.
        assert!(store.bucket(ZERO_CRC).is_some());

        store.rebucket(BucketDimension::Sha1, DedupePolicy::None);
        assert!(
            store
                .bucket("1111111111111111111111111111111111111111")
                .is_some()
        );
    }

    #[test]
    fn test_rebucket_idempotent() {
        let mut store = store_with(vec![
            rom("game", "rom10.bin", "deadbeef"),
            rom("game", "rom2.bin", "0badf00d"),
            rom("other", "z.bin", "cafebabe"),
        ]);
        store.rebucket(BucketDimension::Game, DedupePolicy::None);
        let snapshot: Vec<(String, Vec<String>)> = store
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().map(|i| i.name.clone()).collect()))
            .collect();

        // Once as a guaranteed no-op, once as a real re-partition.
        store.rebucket(BucketDimension::Game, DedupePolicy::None);
        store.invalidate();
        store.rebucket(BucketDimension::Game, DedupePolicy::None);
        let again: Vec<(String, Vec<String>)> = store
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().map(|i| i.name.clone()).collect()))
            .collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn test_bucket_natural_order() {
        let mut store = store_with(vec![
            rom("game", "rom10.bin", "00000001"),
            rom("game", "rom2.bin", "00000002"),
            rom("game", "ROM1.bin", "00000003"),
        ]);
        store.rebucket(BucketDimension::Game, DedupePolicy::None);
        let names: Vec<&str> = store.bucket("game").unwrap().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ROM1.bin", "rom2.bin", "rom10.bin"]);
    }

    #[test]
    fn test_game_key_case_folds() {
        let mut store = store_with(vec![
            rom("Game", "a.bin", "00000001"),
            rom("GAME", "b.bin", "00000002"),
        ]);
        store.rebucket(BucketDimension::Game, DedupePolicy::None);
        assert_eq!(store.bucket_count(), 1);
        assert!(store.bucket("game").is_some());
    }

    #[test]
    fn test_split_by_source_prefix() {
        let mut a = rom("game", "a.bin", "00000001");
        a.system_id = 1;
        let mut b = rom("game", "b.bin", "00000002");
        b.system_id = 2;
        let mut store = store_with(vec![a, b]);
        store.set_split_by_source(true);
        store.rebucket(BucketDimension::Game, DedupePolicy::None);
        assert_eq!(store.bucket_count(), 2);
        assert!(store.bucket("0001-0000-game").is_some());
        assert!(store.bucket("0002-0000-game").is_some());
    }

    #[test]
    fn test_rebucket_with_collapse() {
        let mut store = store_with(vec![
            rom("game a", "a.bin", "deadbeef"),
            rom("game b", "a.bin", "deadbeef"),
        ]);
        store.rebucket(BucketDimension::Crc, DedupePolicy::Collapse);
        assert_eq!(store.bucket("deadbeef").map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_noop_without_invalidate() {
        let mut store = store_with(vec![rom("game", "a.bin", "deadbeef")]);
        store.rebucket(BucketDimension::Crc, DedupePolicy::None);
        // Same dimension again: a no-op even with a different dedupe policy.
        store.rebucket(BucketDimension::Crc, DedupePolicy::Collapse);
        assert_eq!(store.len(), 1);

        store.invalidate();
        store.rebucket(BucketDimension::Crc, DedupePolicy::None);
        assert_eq!(store.bucket("deadbeef").map(<[_]>::len), Some(1));
    }
}
