//! Collection verification: check which catalog entries are present among
//! the scanned inputs and report the rest as missing.

use std::collections::HashMap;
use std::path::PathBuf;

use rayon::prelude::*;

use romforge_core::{BucketDimension, DatItem, DedupePolicy, ItemKind, ItemStatus, ItemStore};

use crate::archive;
use crate::hasher::{self, HashRecord};
use crate::scan;

/// Verification counters, serializable for machine-readable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct VerifyReport {
    /// Checkable catalog entries (ROMs with at least one hash; nodump and
    /// placeholder entries are not counted).
    pub total: usize,
    pub found: usize,
    pub missing: usize,
}

impl VerifyReport {
    pub fn complete(&self) -> bool {
        self.missing == 0
    }
}

/// Verify `inputs` against the store. The store is rebucketed by CRC.
/// Returns the missing items as a store suitable for writing a fix catalog,
/// alongside the counters.
pub fn verify(
    store: &mut ItemStore,
    inputs: &[PathBuf],
    quick_scan: bool,
) -> (ItemStore, VerifyReport) {
    store.rebucket(BucketDimension::Crc, DedupePolicy::None);

    let deep = !quick_scan;
    let files = scan::collect_inputs(inputs);
    let scans: Vec<Vec<HashRecord>> = files
        .par_iter()
        .map(|file| match scan_records(file, deep) {
            Ok(records) => records,
            Err(err) => {
                log::warn!("skipping unreadable candidate {}: {err}", file.display());
                Vec::new()
            }
        })
        .collect();

    let mut index: HashMap<String, Vec<HashRecord>> = HashMap::new();
    for record in scans.into_iter().flatten() {
        index
            .entry(record.crc_key().to_string())
            .or_default()
            .push(record);
    }

    let mut report = VerifyReport::default();
    let mut missing = ItemStore::new();
    for (key, items) in store.iter() {
        for item in items {
            if !is_checkable(item) {
                continue;
            }
            report.total += 1;
            let present = index
                .get(key)
                .is_some_and(|records| records.iter().any(|r| record_satisfies(r, item)));
            if present {
                report.found += 1;
            } else {
                report.missing += 1;
                missing.insert(item.clone());
            }
        }
    }

    (missing, report)
}

fn scan_records(path: &PathBuf, deep: bool) -> Result<Vec<HashRecord>, crate::RebuildError> {
    if archive::is_zip(path) {
        Ok(archive::list_zip_members(path, deep)?)
    } else {
        Ok(vec![hasher::hash_file(path, deep)?])
    }
}

/// Entries we can meaningfully look for: ROMs that carry at least one hash
/// and are not nodump or placeholder sentinels.
fn is_checkable(item: &DatItem) -> bool {
    matches!(item.kind, ItemKind::Rom { .. })
        && !item.is_placeholder()
        && item.status() != ItemStatus::Nodump
        && (item.crc().is_some()
            || item.md5().is_some()
            || item.sha1().is_some()
            || item.sha256().is_some())
}

fn record_satisfies(record: &HashRecord, item: &DatItem) -> bool {
    if let Some(size) = item.size() {
        if size != record.size {
            return false;
        }
    }
    let agree = |ours: Option<&str>, theirs: Option<&str>| match (ours, theirs) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    agree(record.crc.as_deref(), item.crc())
        && agree(record.md5.as_deref(), item.md5())
        && agree(record.sha1.as_deref(), item.sha1())
        && agree(record.sha256.as_deref(), item.sha256())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use romforge_core::Machine;

    fn rom(machine: &str, name: &str, bytes: &[u8]) -> DatItem {
        DatItem::rom(
            name,
            Machine::named(machine),
            bytes.len() as u64,
            &hasher::crc32_of(bytes),
        )
    }

    #[test]
    fn test_partial_collection() {
        let have = b"present bytes";
        let want = b"absent bytes";
        let mut store = ItemStore::new();
        store.insert(rom("game", "have.bin", have));
        store.insert(rom("game", "want.bin", want));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("have.bin"), have).unwrap();

        let (missing, report) = verify(&mut store, &[dir.path().to_path_buf()], false);
        assert_eq!(report.total, 2);
        assert_eq!(report.found, 1);
        assert_eq!(report.missing, 1);
        assert!(!report.complete());

        let names: Vec<&str> = missing.items().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["want.bin"]);
    }

    #[test]
    fn test_complete_collection_from_zip() {
        let content = b"zip member";
        let mut store = ItemStore::new();
        store.insert(rom("game", "a.bin", content));

        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("set.zip");
        let file = fs::File::create(&zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("a.bin", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut zip, content).unwrap();
        zip.finish().unwrap();

        let (missing, report) = verify(&mut store, &[dir.path().to_path_buf()], true);
        assert!(report.complete());
        assert_eq!(report.found, 1);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_nodump_and_placeholder_not_counted() {
        let mut store = ItemStore::new();
        let mut nodump = rom("game", "lost.bin", b"whatever");
        if let ItemKind::Rom { crc, status, .. } = &mut nodump.kind {
            *crc = None;
            *status = ItemStatus::Nodump;
        }
        store.insert(nodump);
        store.insert(DatItem::placeholder(Machine::named("empty game")));

        let (missing, report) = verify(&mut store, &[], false);
        assert_eq!(report.total, 0);
        assert!(report.complete());
        assert!(missing.is_empty());
    }
}
