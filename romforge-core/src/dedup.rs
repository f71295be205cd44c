//! Fuzzy hash-compatible duplicate detection and merge-with-unification.
//!
//! Equality here is intentionally weaker than full struct equality: a hash
//! absent on either side is "don't care", so early hash-incomplete scans
//! (CRC-only zip listings, for example) still pair up with fully hashed
//! catalog entries. The bucket key guarantees at least one shared dimension
//! when this runs inside a bucket.

use crate::item::{DatItem, DupeStatus, ItemKind};

/// How a rebucket pass should treat in-bucket duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupePolicy {
    /// Leave buckets as-is.
    #[default]
    None,
    /// Merge hash fields and flag duplicates, but retain them.
    Standard,
    /// Merge, then drop every item flagged as a duplicate.
    Collapse,
}

/// True iff `a` and `b` could be the same content.
///
/// Same variant required. For ROMs and disks, every hash populated on
/// **both** sides must match, and two known ROM sizes must agree. Metadata
/// variants (bios sets, releases, samples, archives) have no content
/// address, so they compare by name plus their own fields.
pub fn compatible(a: &DatItem, b: &DatItem) -> bool {
    match (&a.kind, &b.kind) {
        (
            ItemKind::Rom {
                size: sa,
                crc: ca,
                md5: ma,
                sha1: ha,
                sha256: xa,
                ..
            },
            ItemKind::Rom {
                size: sb,
                crc: cb,
                md5: mb,
                sha1: hb,
                sha256: xb,
                ..
            },
        ) => {
            if let (Some(sa), Some(sb)) = (sa, sb) {
                if sa != sb {
                    return false;
                }
            }
            hashes_agree(ca, cb) && hashes_agree(ma, mb) && hashes_agree(ha, hb) && hashes_agree(xa, xb)
        }
        (
            ItemKind::Disk {
                md5: ma,
                sha1: ha,
                sha256: xa,
                ..
            },
            ItemKind::Disk {
                md5: mb,
                sha1: hb,
                sha256: xb,
                ..
            },
        ) => hashes_agree(ma, mb) && hashes_agree(ha, hb) && hashes_agree(xa, xb),
        (
            ItemKind::BiosSet {
                description: da,
                is_default: fa,
            },
            ItemKind::BiosSet {
                description: db,
                is_default: fb,
            },
        ) => names_equal(a, b) && da == db && fa == fb,
        (
            ItemKind::Release {
                region: ra,
                language: la,
                date: ta,
                is_default: fa,
            },
            ItemKind::Release {
                region: rb,
                language: lb,
                date: tb,
                is_default: fb,
            },
        ) => names_equal(a, b) && ra == rb && la == lb && ta == tb && fa == fb,
        (ItemKind::Archive, ItemKind::Archive) => names_equal(a, b),
        (ItemKind::Sample, ItemKind::Sample) => names_equal(a, b),
        _ => false,
    }
}

/// Exact-match test used by the set resolver's remove/skip decisions:
/// same name (case-insensitive) plus hash compatibility.
pub fn exact(a: &DatItem, b: &DatItem) -> bool {
    names_equal(a, b) && compatible(a, b)
}

fn names_equal(a: &DatItem, b: &DatItem) -> bool {
    a.name.eq_ignore_ascii_case(&b.name)
}

fn hashes_agree(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Merge a bucket's worth of items.
///
/// The first-seen item of each duplicate cluster is canonical; later
/// compatible items fill in any hash fields the canonical is missing and are
/// flagged [`DupeStatus::Internal`] or [`DupeStatus::External`] depending on
/// whether they came from the same input catalog. Duplicates are retained —
/// use [`collapse`] (or [`DedupePolicy::Collapse`]) to drop them.
pub fn merge(items: Vec<DatItem>) -> Vec<DatItem> {
    let mut out: Vec<DatItem> = Vec::with_capacity(items.len());

    for mut item in items {
        let canonical = out
            .iter()
            .position(|seen| seen.dupe == DupeStatus::None && compatible(seen, &item));
        match canonical {
            Some(pos) => {
                unify_hashes(&mut out[pos], &item);
                item.dupe = if item.system_id == out[pos].system_id {
                    DupeStatus::Internal
                } else {
                    DupeStatus::External
                };
                out.push(item);
            }
            None => out.push(item),
        }
    }

    out
}

/// [`merge`], then drop every flagged duplicate.
pub fn collapse(items: Vec<DatItem>) -> Vec<DatItem> {
    let mut merged = merge(items);
    merged.retain(|item| item.dupe == DupeStatus::None);
    merged
}

/// Copy any hash field (or ROM size) absent on `canonical` from `other`.
fn unify_hashes(canonical: &mut DatItem, other: &DatItem) {
    match (&mut canonical.kind, &other.kind) {
        (
            ItemKind::Rom {
                size,
                crc,
                md5,
                sha1,
                sha256,
                date,
                ..
            },
            ItemKind::Rom {
                size: so,
                crc: co,
                md5: mo,
                sha1: ho,
                sha256: xo,
                date: do_,
                ..
            },
        ) => {
            if size.is_none() {
                *size = *so;
            }
            fill(crc, co);
            fill(md5, mo);
            fill(sha1, ho);
            fill(sha256, xo);
            fill(date, do_);
        }
        (
            ItemKind::Disk {
                md5, sha1, sha256, ..
            },
            ItemKind::Disk {
                md5: mo,
                sha1: ho,
                sha256: xo,
                ..
            },
        ) => {
            fill(md5, mo);
            fill(sha1, ho);
            fill(sha256, xo);
        }
        _ => {}
    }
}

fn fill(dst: &mut Option<String>, src: &Option<String>) {
    if dst.is_none() {
        *dst = src.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemStatus, Machine};

    fn rom_with(
        name: &str,
        system_id: u32,
        crc: Option<&str>,
        md5: Option<&str>,
        sha1: Option<&str>,
    ) -> DatItem {
        let mut item = DatItem::new(
            name,
            Machine::named("game"),
            ItemKind::Rom {
                size: Some(1024),
                crc: crc.map(Into::into),
                md5: md5.map(Into::into),
                sha1: sha1.map(Into::into),
                sha256: None,
                date: None,
                status: ItemStatus::None,
            },
        );
        item.system_id = system_id;
        item
    }

    #[test]
    fn test_fuzzy_merge_unifies_hashes() {
        // A has {crc, md5}, B has {md5, sha1}; md5 agrees, so they merge and
        // the canonical ends up exposing all three.
        let a = rom_with("a.bin", 0, Some("deadbeef"), Some("11112222"), None);
        let b = rom_with("a.bin", 0, None, Some("11112222"), Some("33334444"));

        let merged = merge(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].crc(), Some("deadbeef"));
        assert_eq!(merged[0].md5(), Some("11112222"));
        assert_eq!(merged[0].sha1(), Some("33334444"));
        assert_eq!(merged[1].dupe, DupeStatus::Internal);
    }

    #[test]
    fn test_overlapping_hash_mismatch_is_not_dupe() {
        let a = rom_with("a.bin", 0, Some("deadbeef"), Some("11112222"), None);
        let b = rom_with("a.bin", 0, None, Some("99990000"), None);
        let merged = merge(vec![a, b]);
        assert_eq!(merged[1].dupe, DupeStatus::None);
    }

    #[test]
    fn test_size_mismatch_is_not_dupe() {
        let a = rom_with("a.bin", 0, Some("deadbeef"), None, None);
        let mut b = rom_with("a.bin", 0, Some("deadbeef"), None, None);
        if let ItemKind::Rom { size, .. } = &mut b.kind {
            *size = Some(2048);
        }
        assert!(!compatible(&a, &b));
    }

    #[test]
    fn test_external_dupe_across_systems() {
        let a = rom_with("a.bin", 0, Some("deadbeef"), None, None);
        let b = rom_with("other name.bin", 1, Some("deadbeef"), None, None);
        let merged = merge(vec![a, b]);
        assert_eq!(merged[1].dupe, DupeStatus::External);
    }

    #[test]
    fn test_collapse_drops_duplicates() {
        let a = rom_with("a.bin", 0, Some("deadbeef"), None, None);
        let b = rom_with("a.bin", 0, Some("deadbeef"), None, None);
        let c = rom_with("c.bin", 0, Some("0badf00d"), None, None);
        let collapsed = collapse(vec![a, b, c]);
        assert_eq!(collapsed.len(), 2);
        assert!(collapsed.iter().all(|i| i.dupe == DupeStatus::None));
    }

    #[test]
    fn test_empty_input() {
        assert!(merge(Vec::new()).is_empty());
        assert!(collapse(Vec::new()).is_empty());
    }

    #[test]
    fn test_different_variants_never_compatible() {
        let rom = rom_with("a", 0, Some("deadbeef"), None, None);
        let sample = DatItem::new("a", Machine::named("game"), ItemKind::Sample);
        assert!(!compatible(&rom, &sample));
    }

    #[test]
    fn test_exact_requires_name() {
        let a = rom_with("a.bin", 0, Some("deadbeef"), None, None);
        let b = rom_with("b.bin", 0, Some("deadbeef"), None, None);
        assert!(compatible(&a, &b));
        assert!(!exact(&a, &b));
    }
}
