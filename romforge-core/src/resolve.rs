//! Parent/clone/device set flattening.
//!
//! A catalog's machines form a soft-reference graph through `clone_of`,
//! `rom_of` and `devices[]`. The five policies here flatten that graph into
//! the standard set layouts (non-merged, merged, split, plus device
//! expansion). Resolution is single-hop: a clone's parent is consulted, the
//! parent's own parent is not walked transitively. Re-running a policy is
//! safe (merged deletes its sources, the rest are copy/remove idempotent),
//! but multi-pass closure is not guaranteed.
//!
//! Dangling edges are never an error; they are skipped with a debug log.

use crate::dedup::{self, DedupePolicy};
use crate::item::{DatItem, ItemKind, Machine, MachineType};
use crate::store::{BucketDimension, ItemStore};

/// The five set-flattening policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Embed each machine's device dependencies into the machine itself.
    DeviceExpand,
    /// Every machine becomes fully self-contained (devices + parent + BIOS
    /// content); BIOS and device machines are then deleted.
    FullyNonMerged,
    /// Clones absorb their parent's content; BIOS content stays in the BIOS
    /// sets and is removed from children.
    NonMerged,
    /// Clones are absorbed into their parents and deleted.
    Merged,
    /// Clones keep only what their parent does not already have.
    Split,
}

/// Apply a flattening policy to the store.
///
/// The store is (re)bucketed by game first. All machine-tag mutation happens
/// through cloned machine snapshots, and the transform works over a snapshot
/// of the key list so bucket insertion/removal never races the walk.
pub fn resolve(store: &mut ItemStore, policy: MergePolicy) {
    store.rebucket(BucketDimension::Game, DedupePolicy::None);

    match policy {
        MergePolicy::DeviceExpand => {
            expand_devices(store);
            strip_tags(store);
        }
        MergePolicy::FullyNonMerged => {
            expand_devices(store);
            copy_parents(store, EdgeKind::CloneOf, false);
            copy_parents(store, EdgeKind::RomOf, false);
            strip_tags(store);
            delete_machine_types(store, &[MachineType::Bios, MachineType::Device]);
        }
        MergePolicy::NonMerged => {
            copy_parents(store, EdgeKind::CloneOf, true);
            remove_bios_items(store);
            strip_tags(store);
        }
        MergePolicy::Merged => {
            absorb_clones(store);
            strip_tags(store);
        }
        MergePolicy::Split => {
            split_clones(store);
            remove_bios_items(store);
            strip_tags(store);
        }
    }

    store.prune_empty();
    store.resort();
}

#[derive(Clone, Copy, PartialEq)]
enum EdgeKind {
    CloneOf,
    RomOf,
}

fn edge_target(machine: &Machine, edge: EdgeKind) -> Option<&str> {
    match edge {
        EdgeKind::CloneOf => machine.clone_of.as_deref(),
        EdgeKind::RomOf => machine.rom_of.as_deref(),
    }
}

/// Copy each `devices[]` target's items into the machine itself, skipping
/// items already present by name or exact value.
fn expand_devices(store: &mut ItemStore) {
    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        let Some(machine) = store.machine(&key) else {
            continue;
        };
        for device in &machine.devices {
            copy_items_into(store, &key, device);
        }
    }
}

/// For every machine with the given edge populated, copy the target's items
/// into the machine. With `adopt_rom_of`, following a `clone_of` edge also
/// replaces the machine's `rom_of` with the parent's, so the subsequent BIOS
/// pass sees the target the parent saw (NonMerged semantics).
fn copy_parents(store: &mut ItemStore, edge: EdgeKind, adopt_rom_of: bool) {
    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        let Some(machine) = store.machine(&key) else {
            continue;
        };
        let Some(target) = edge_target(&machine, edge) else {
            continue;
        };
        let target = target.to_string();
        copy_items_into(store, &key, &target);

        if adopt_rom_of && edge == EdgeKind::CloneOf {
            let parent_rom_of = store
                .machine(&ItemStore::game_key(&target))
                .and_then(|parent| parent.rom_of);
            if machine.rom_of != parent_rom_of {
                update_machine(store, &key, |m| m.rom_of = parent_rom_of.clone());
            }
        }
    }
}

/// Remove from every machine any item exactly present in its `rom_of`
/// target's items (the BIOS set keeps the only copy).
fn remove_bios_items(store: &mut ItemStore) {
    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        let Some(machine) = store.machine(&key) else {
            continue;
        };
        let Some(bios) = machine.rom_of.clone() else {
            continue;
        };
        remove_items_present_in(store, &key, &bios);
    }
}

/// Split: strip from each clone everything its parent already carries, then
/// adopt the parent's `rom_of` (present or not) so the BIOS pass sees
/// exactly the edge the parent saw.
fn split_clones(store: &mut ItemStore) {
    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        let Some(machine) = store.machine(&key) else {
            continue;
        };
        let Some(parent) = machine.clone_of.clone() else {
            continue;
        };
        remove_items_present_in(store, &key, &parent);

        // Unconditionally, so a clone's own stale edge is replaced even
        // when the parent has none.
        let parent_rom_of = store
            .machine(&ItemStore::game_key(&parent))
            .and_then(|p| p.rom_of);
        if machine.rom_of != parent_rom_of {
            update_machine(store, &key, |m| m.rom_of = parent_rom_of.clone());
        }
    }
}

/// Merged: move every clone's items into its parent and delete the clone.
///
/// Non-disk items are renamed to `"<clone>\<item>"` unless the parent
/// already holds an identical item. A disk is only moved when no parent item
/// shares its merge tag.
fn absorb_clones(store: &mut ItemStore) {
    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        let Some(machine) = store.machine(&key) else {
            continue;
        };
        let Some(parent_name) = machine.clone_of.clone() else {
            continue;
        };
        let parent_key = ItemStore::game_key(&parent_name);
        let Some(parent_machine) = store.machine(&parent_key) else {
            log::debug!(
                "merged: {} points at absent parent {parent_name}, skipping",
                machine.name
            );
            continue;
        };

        let Some(items) = store.remove_bucket(&key) else {
            continue;
        };
        for mut item in items {
            let parent_items = store.bucket(&parent_key).unwrap_or(&[]);

            match &item.kind {
                ItemKind::Disk { merge_tag, .. } => {
                    if let Some(tag) = merge_tag {
                        let tag_taken = parent_items.iter().any(|p| {
                            matches!(&p.kind, ItemKind::Disk { merge_tag: Some(t), .. } if t.eq_ignore_ascii_case(tag))
                        });
                        if tag_taken {
                            continue;
                        }
                    }
                    if parent_items.iter().any(|p| dedup::exact(p, &item)) {
                        continue;
                    }
                }
                _ => {
                    if parent_items.iter().any(|p| dedup::exact(p, &item)) {
                        continue;
                    }
                    item.name = format!("{}\\{}", machine.name, item.name);
                }
            }

            item.set_machine(&parent_machine);
            store.push_to_bucket(parent_key.clone(), item);
        }
    }
}

/// Copy `source_name`'s items into `dest_key`'s bucket, re-pointed at the
/// destination machine. Skips items already present by name or exact value.
/// A dangling source is a no-op.
fn copy_items_into(store: &mut ItemStore, dest_key: &str, source_name: &str) {
    let source_key = ItemStore::game_key(source_name);
    if source_key == *dest_key {
        return;
    }
    let Some(source_items) = store.bucket(&source_key).map(<[DatItem]>::to_vec) else {
        log::debug!("dangling reference to {source_name}, skipping");
        return;
    };
    let Some(dest_machine) = store.machine(dest_key) else {
        return;
    };

    for mut item in source_items {
        let present = store.bucket(dest_key).unwrap_or(&[]).iter().any(|existing| {
            existing.name.eq_ignore_ascii_case(&item.name) || dedup::exact(existing, &item)
        });
        if present || item.is_placeholder() {
            continue;
        }
        item.set_machine(&dest_machine);
        store.push_to_bucket(dest_key.to_string(), item);
    }
}

/// Remove from `dest_key` every item exactly present in `target_name`'s
/// bucket. A dangling target is a no-op.
fn remove_items_present_in(store: &mut ItemStore, dest_key: &str, target_name: &str) {
    let target_key = ItemStore::game_key(target_name);
    if target_key == *dest_key {
        return;
    }
    let Some(target_items) = store.bucket(&target_key).map(<[DatItem]>::to_vec) else {
        log::debug!("dangling reference to {target_name}, skipping");
        return;
    };
    if let Some(items) = store.bucket_mut(dest_key) {
        items.retain(|item| !target_items.iter().any(|t| dedup::exact(t, item)));
    }
}

/// Clear `clone_of`/`rom_of`/`sample_of` on every surviving machine.
fn strip_tags(store: &mut ItemStore) {
    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        update_machine(store, &key, |m| {
            m.clone_of = None;
            m.rom_of = None;
            m.sample_of = None;
        });
    }
}

/// Delete every machine of the given types (BIOS/device absorption cleanup).
fn delete_machine_types(store: &mut ItemStore, types: &[MachineType]) {
    let doomed: Vec<String> = store
        .keys()
        .filter(|key| {
            store
                .machine(key)
                .is_some_and(|m| types.contains(&m.machine_type))
        })
        .cloned()
        .collect();
    for key in doomed {
        store.remove_bucket(&key);
    }
}

/// Apply a machine edit via the copy-on-write boundary: clone the bucket's
/// machine, mutate the clone, re-point every item in the bucket at it.
fn update_machine(store: &mut ItemStore, key: &str, edit: impl FnOnce(&mut Machine)) {
    let Some(mut machine) = store.machine(key) else {
        return;
    };
    edit(&mut machine);
    if let Some(items) = store.bucket_mut(key) {
        for item in items {
            item.set_machine(&machine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{DatItem, ItemStatus, Machine};

    fn machine(name: &str) -> Machine {
        Machine::named(name)
    }

    fn clone_machine(name: &str, parent: &str) -> Machine {
        Machine {
            clone_of: Some(parent.to_string()),
            ..Machine::named(name)
        }
    }

    fn rom(m: &Machine, name: &str, crc: &str) -> DatItem {
        DatItem::rom(name, m.clone(), 1024, crc)
    }

    fn store_with(items: Vec<DatItem>) -> ItemStore {
        let mut store = ItemStore::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    fn names(store: &ItemStore, key: &str) -> Vec<String> {
        store
            .bucket(key)
            .map(|items| items.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }

    /// DAT from the concrete scenario: game{a.bin}, game2{cloneOf=game, b.bin}.
    fn parent_clone_store() -> ItemStore {
        let game = machine("game");
        let game2 = clone_machine("game2", "game");
        store_with(vec![
            rom(&game, "a.bin", "00000111"),
            rom(&game2, "b.bin", "00000222"),
        ])
    }

    #[test]
    fn test_fully_non_merged_scenario() {
        let mut store = parent_clone_store();
        resolve(&mut store, MergePolicy::FullyNonMerged);

        assert_eq!(names(&store, "game"), vec!["a.bin"]);
        assert_eq!(names(&store, "game2"), vec!["a.bin", "b.bin"]);
        // No BIOS/device machines present, so nothing was deleted.
        assert_eq!(store.bucket_count(), 2);
    }

    #[test]
    fn test_merged_scenario() {
        let mut store = parent_clone_store();
        resolve(&mut store, MergePolicy::Merged);

        assert!(store.bucket("game2").is_none());
        assert_eq!(names(&store, "game"), vec!["a.bin", "game2\\b.bin"]);
        // Moved items are re-pointed at the parent machine.
        assert!(
            store
                .bucket("game")
                .unwrap()
                .iter()
                .all(|i| i.machine_name() == "game")
        );
    }

    #[test]
    fn test_merged_strips_all_tags() {
        let mut store = parent_clone_store();
        resolve(&mut store, MergePolicy::Merged);
        for item in store.items() {
            assert!(item.machine().clone_of.is_none());
            assert!(item.machine().rom_of.is_none());
        }
    }

    #[test]
    fn test_merged_skips_identical_item() {
        let game = machine("game");
        let game2 = clone_machine("game2", "game");
        let mut store = store_with(vec![
            rom(&game, "a.bin", "00000111"),
            rom(&game2, "a.bin", "00000111"),
        ]);
        resolve(&mut store, MergePolicy::Merged);
        // Identical content is not duplicated under a renamed entry.
        assert_eq!(names(&store, "game"), vec!["a.bin"]);
    }

    #[test]
    fn test_split_and_non_merged_complementarity() {
        // parent{a}, clone{cloneOf=parent, items=[a, b]}
        let parent = machine("parent");
        let clone = clone_machine("clone", "parent");
        let build = || {
            store_with(vec![
                rom(&parent, "a", "00000aaa"),
                rom(&clone, "a", "00000aaa"),
                rom(&clone, "b", "00000bbb"),
            ])
        };

        let mut split = build();
        resolve(&mut split, MergePolicy::Split);
        assert_eq!(names(&split, "clone"), vec!["b"]);

        let mut non_merged = build();
        resolve(&mut non_merged, MergePolicy::NonMerged);
        assert_eq!(names(&non_merged, "clone"), vec!["a", "b"]);

        // Split(clone) ∪ parent items == NonMerged(clone) items.
        let mut union = names(&split, "clone");
        union.extend(names(&split, "parent"));
        union.sort();
        let mut nm = names(&non_merged, "clone");
        nm.sort();
        assert_eq!(union, nm);
    }

    #[test]
    fn test_device_expand() {
        let mut game = machine("game");
        game.devices = vec!["soundchip".to_string()];
        let mut dev = machine("soundchip");
        dev.machine_type = MachineType::Device;
        let mut store = store_with(vec![
            rom(&game, "main.bin", "00000111"),
            rom(&dev, "dsp.bin", "00000222"),
        ]);
        resolve(&mut store, MergePolicy::DeviceExpand);

        assert_eq!(names(&store, "game"), vec!["dsp.bin", "main.bin"]);
        // DeviceExpand keeps the device machine itself.
        assert_eq!(names(&store, "soundchip"), vec!["dsp.bin"]);
    }

    #[test]
    fn test_fully_non_merged_deletes_bios_and_devices() {
        let mut game = clone_machine("game", "parent");
        game.rom_of = Some("sysbios".to_string());
        let parent = machine("parent");
        let mut bios = machine("sysbios");
        bios.machine_type = MachineType::Bios;
        let mut dev = machine("chip");
        dev.machine_type = MachineType::Device;

        let mut store = store_with(vec![
            rom(&game, "g.bin", "00000001"),
            rom(&parent, "p.bin", "00000002"),
            rom(&bios, "bios.bin", "00000003"),
            rom(&dev, "chip.bin", "00000004"),
        ]);
        resolve(&mut store, MergePolicy::FullyNonMerged);

        assert!(store.bucket("sysbios").is_none());
        assert!(store.bucket("chip").is_none());
        // game absorbed parent and BIOS content before the deletion pass.
        assert_eq!(names(&store, "game"), vec!["bios.bin", "g.bin", "p.bin"]);
    }

    #[test]
    fn test_non_merged_removes_bios_items() {
        // Clone's parent rom_of's a BIOS; after absorbing the parent, the
        // clone adopts the BIOS edge and sheds the BIOS-owned content.
        let mut parent = machine("parent");
        parent.rom_of = Some("sysbios".to_string());
        let clone = clone_machine("clone", "parent");
        let mut bios = machine("sysbios");
        bios.machine_type = MachineType::Bios;

        let mut store = store_with(vec![
            rom(&parent, "p.bin", "00000001"),
            rom(&parent, "bios.bin", "000000ff"),
            rom(&clone, "c.bin", "00000002"),
            rom(&bios, "bios.bin", "000000ff"),
        ]);
        resolve(&mut store, MergePolicy::NonMerged);

        assert_eq!(names(&store, "clone"), vec!["c.bin", "p.bin"]);
        assert_eq!(names(&store, "parent"), vec!["p.bin"]);
        assert_eq!(names(&store, "sysbios"), vec!["bios.bin"]);
    }

    #[test]
    fn test_dangling_references_are_noops() {
        let orphan = clone_machine("orphan", "missing-parent");
        let mut store = store_with(vec![rom(&orphan, "o.bin", "00000001")]);

        for policy in [
            MergePolicy::DeviceExpand,
            MergePolicy::FullyNonMerged,
            MergePolicy::NonMerged,
            MergePolicy::Merged,
            MergePolicy::Split,
        ] {
            let mut s = store.clone();
            resolve(&mut s, policy);
            assert_eq!(names(&s, "orphan"), vec!["o.bin"], "{policy:?}");
        }
        // Original untouched (resolve consumed clones).
        store.rebucket(BucketDimension::Game, DedupePolicy::None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_no_policy_leaves_dangling_tags() {
        let game = machine("game");
        let game2 = clone_machine("game2", "game");
        for policy in [
            MergePolicy::DeviceExpand,
            MergePolicy::FullyNonMerged,
            MergePolicy::NonMerged,
            MergePolicy::Merged,
            MergePolicy::Split,
        ] {
            let mut store = store_with(vec![
                rom(&game, "a.bin", "00000111"),
                rom(&game2, "b.bin", "00000222"),
            ]);
            resolve(&mut store, policy);
            for item in store.items() {
                let m = item.machine();
                for tag in [&m.clone_of, &m.rom_of] {
                    if let Some(name) = tag {
                        assert!(
                            store.bucket(&ItemStore::game_key(name)).is_some(),
                            "{policy:?} left dangling tag {name}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_split_clone_sheds_stale_bios_edge() {
        // The parent has no rom_of, so the clone's own edge is cleared and
        // the BIOS pass must not strip the clone's content.
        let parent = machine("parent");
        let mut clone = clone_machine("clone", "parent");
        clone.rom_of = Some("sysbios".to_string());
        let mut bios = machine("sysbios");
        bios.machine_type = MachineType::Bios;

        let mut store = store_with(vec![
            rom(&parent, "p.bin", "00000001"),
            rom(&clone, "c.bin", "00000002"),
            rom(&clone, "shared.bin", "000000ff"),
            rom(&bios, "shared.bin", "000000ff"),
        ]);
        resolve(&mut store, MergePolicy::Split);

        assert_eq!(names(&store, "clone"), vec!["c.bin", "shared.bin"]);
        assert_eq!(names(&store, "sysbios"), vec!["shared.bin"]);
    }

    #[test]
    fn test_merged_disk_merge_tag() {
        let parent = machine("parent");
        let clone = clone_machine("clone", "parent");
        let disk = |m: &Machine, name: &str, tag: Option<&str>, sha1: &str| {
            DatItem::new(
                name,
                m.clone(),
                ItemKind::Disk {
                    md5: None,
                    sha1: Some(sha1.repeat(40)),
                    sha256: None,
                    status: ItemStatus::None,
                    merge_tag: tag.map(Into::into),
                },
            )
        };

        let mut store = store_with(vec![
            disk(&parent, "sys", Some("sys"), "a"),
            disk(&clone, "sys alt", Some("sys"), "b"),
            disk(&clone, "extra", None, "c"),
        ]);
        resolve(&mut store, MergePolicy::Merged);

        // "sys alt" shares the parent's merge tag and is dropped; "extra"
        // moves without a rename (disks are never renamed).
        assert_eq!(names(&store, "parent"), vec!["extra", "sys"]);
    }
}
