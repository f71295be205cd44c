//! Content-addressed rebuild: match candidate files and archive members
//! against a CRC-bucketed store and materialize the matched sets.
//!
//! Two strategies share one emission path:
//!
//! - **Streaming**: each candidate fans out to every DAT item sharing its
//!   key; one file may satisfy many entries. `inverse` flips polarity and
//!   reproduces only the candidates that match nothing.
//! - **Set-based**: a full candidate index is built first (in parallel),
//!   then each DAT item is mapped to at most one winning source, then each
//!   machine's complete item set is emitted into one output container —
//!   which may combine members sourced from different input archives.
//!
//! Unit failures (an unreadable candidate, one machine's emission) are
//! logged and counted, never fatal to the batch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use rayon::prelude::*;

use romforge_core::{BucketDimension, DatItem, DedupePolicy, ItemKind, ItemStatus, ItemStore};

use crate::archive::{self, OutputEntry, OutputFormat};
use crate::error::RebuildError;
use crate::hasher::{self, HashRecord};
use crate::scan;

/// Set name under which inverse-mode (unmatched) candidates are emitted.
const UNMATCHED_SET: &str = "unmatched";

#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Destination directory for rebuilt output.
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Whole-collection index/map/emit instead of streaming fan-out.
    pub use_sets: bool,
    /// Reproduce only candidates that match nothing in the catalog.
    pub inverse: bool,
    /// Use archive central-directory hashes instead of deep-scanning
    /// member bytes.
    pub quick_scan: bool,
}

/// Outcome counters for one rebuild run. Overall success is the logical AND
/// of all unit results: any failed unit makes the run unsuccessful, but
/// never aborts the remaining units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Candidates (files and archive members) scanned.
    pub scanned: usize,
    /// Output items materialized.
    pub rebuilt: usize,
    /// Unreadable candidates skipped.
    pub skipped: usize,
    /// Set emissions that failed.
    pub failed: usize,
}

impl RebuildSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// One candidate unit: a plain file, or one member of an archive.
#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    member: Option<String>,
    record: HashRecord,
}

/// One desired output: an item name inside a set, and where its bytes come
/// from.
#[derive(Debug, Clone)]
struct Emission {
    set_name: String,
    name: String,
    source_path: PathBuf,
    member: Option<String>,
    date: Option<String>,
}

/// Rebuild `inputs` against the store. The store is rebucketed by CRC.
pub fn rebuild(store: &mut ItemStore, inputs: &[PathBuf], opts: &RebuildOptions) -> RebuildSummary {
    store.rebucket(BucketDimension::Crc, DedupePolicy::None);

    let files = scan::collect_inputs(inputs);
    let mut summary = RebuildSummary::default();

    let emissions = if opts.use_sets && !opts.inverse {
        plan_set_rebuild(store, &files, opts, &mut summary)
    } else {
        plan_streaming(store, &files, opts, &mut summary)
    };

    // Group desired outputs by set and emit each set as one unit.
    let mut groups: BTreeMap<String, Vec<Emission>> = BTreeMap::new();
    for emission in emissions {
        groups.entry(emission.set_name.clone()).or_default().push(emission);
    }

    for (set_name, emissions) in groups {
        match emit_set(&set_name, &emissions, opts) {
            Ok(count) => summary.rebuilt += count,
            Err(err) => {
                log::warn!("failed to emit set {set_name}: {err}");
                summary.failed += 1;
            }
        }
    }

    summary
}

/// Scan one input path into candidate units. A zip contributes one candidate
/// per member (without extraction on quick scans); anything else is hashed
/// as a plain file.
fn scan_candidates(path: &PathBuf, deep: bool) -> Result<Vec<Candidate>, RebuildError> {
    if archive::is_zip(path) {
        let members = archive::list_zip_members(path, deep)?;
        Ok(members
            .into_iter()
            .map(|record| Candidate {
                path: path.clone(),
                member: Some(record.name.clone()),
                record,
            })
            .collect())
    } else {
        let record = hasher::hash_file(path, deep)?;
        Ok(vec![Candidate {
            path: path.clone(),
            member: None,
            record,
        }])
    }
}

/// Streaming plan: per candidate, fan out to every matching DAT item (or,
/// inverted, emit the candidates that match nothing).
fn plan_streaming(
    store: &ItemStore,
    files: &[PathBuf],
    opts: &RebuildOptions,
    summary: &mut RebuildSummary,
) -> Vec<Emission> {
    let deep = !opts.quick_scan;
    let mut emissions = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for file in files {
        let candidates = match scan_candidates(file, deep) {
            Ok(candidates) => candidates,
            Err(err) => {
                log::warn!("skipping unreadable candidate {}: {err}", file.display());
                summary.skipped += 1;
                continue;
            }
        };

        for candidate in candidates {
            summary.scanned += 1;
            let matches: Vec<&DatItem> = store
                .bucket(candidate.record.crc_key())
                .map(|items| {
                    items
                        .iter()
                        .filter(|item| record_matches_item(&candidate.record, item))
                        .collect()
                })
                .unwrap_or_default();

            if opts.inverse {
                if matches.is_empty() {
                    emissions.push(Emission {
                        set_name: UNMATCHED_SET.to_string(),
                        name: candidate.record.name.clone(),
                        source_path: candidate.path.clone(),
                        member: candidate.member.clone(),
                        date: None,
                    });
                }
                continue;
            }

            for item in matches {
                // One output per (set, item) even when several candidates
                // carry the same content.
                let dedupe_key = (
                    item.machine_name().to_lowercase(),
                    item.name.to_lowercase(),
                );
                if !seen.insert(dedupe_key) {
                    continue;
                }
                emissions.push(Emission {
                    set_name: item.machine_name().to_string(),
                    name: item.name.clone(),
                    source_path: candidate.path.clone(),
                    member: candidate.member.clone(),
                    date: rom_date(item),
                });
            }
        }
    }

    emissions
}

/// Set-based plan. Phase 1 indexes every candidate in parallel; phase 2 maps
/// each DAT item to its single best source (plain files beat archive
/// members); phase 3 (the shared emit path) groups by machine.
fn plan_set_rebuild(
    store: &ItemStore,
    files: &[PathBuf],
    opts: &RebuildOptions,
    summary: &mut RebuildSummary,
) -> Vec<Emission> {
    let deep = !opts.quick_scan;

    let scans: Vec<(PathBuf, Result<Vec<Candidate>, RebuildError>)> = files
        .par_iter()
        .map(|file| (file.clone(), scan_candidates(file, deep)))
        .collect();

    let mut index: HashMap<String, Candidate> = HashMap::new();
    for (path, result) in scans {
        let candidates = match result {
            Ok(candidates) => candidates,
            Err(err) => {
                log::warn!("skipping unreadable candidate {}: {err}", path.display());
                summary.skipped += 1;
                continue;
            }
        };
        for candidate in candidates {
            summary.scanned += 1;
            let key = candidate.record.crc_key().to_string();
            match index.get_mut(&key) {
                Some(existing) => {
                    if existing.member.is_some() && candidate.member.is_none() {
                        *existing = candidate;
                    }
                }
                None => {
                    index.insert(key, candidate);
                }
            }
        }
    }

    let mut emissions = Vec::new();
    for (key, items) in store.iter() {
        let Some(candidate) = index.get(key) else {
            continue;
        };
        for item in items {
            if !record_matches_item(&candidate.record, item) {
                continue;
            }
            emissions.push(Emission {
                set_name: item.machine_name().to_string(),
                name: item.name.clone(),
                source_path: candidate.path.clone(),
                member: candidate.member.clone(),
                date: rom_date(item),
            });
        }
    }

    emissions
}

/// True when a scanned candidate can satisfy a DAT item: ROM items only,
/// sizes must agree when the catalog knows one, and every hash known on
/// both sides must match. Nodump and placeholder entries never match.
fn record_matches_item(record: &HashRecord, item: &DatItem) -> bool {
    if !matches!(item.kind, ItemKind::Rom { .. })
        || item.is_placeholder()
        || item.status() == ItemStatus::Nodump
    {
        return false;
    }
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

fn rom_date(item: &DatItem) -> Option<String> {
    match &item.kind {
        ItemKind::Rom { date, .. } => date.clone(),
        _ => None,
    }
}

/// Materialize one set: stage archive-member sources into a per-task temp
/// directory (randomly named, cleaned up best-effort on drop), then write
/// the whole set into one container.
fn emit_set(
    set_name: &str,
    emissions: &[Emission],
    opts: &RebuildOptions,
) -> Result<usize, RebuildError> {
    let mut temp: Option<tempfile::TempDir> = None;
    let mut entries = Vec::with_capacity(emissions.len());

    for emission in emissions {
        let source = match &emission.member {
            Some(member) => {
                let dir = match &temp {
                    Some(dir) => dir.path().to_path_buf(),
                    None => {
                        let dir = tempfile::tempdir()?;
                        let path = dir.path().to_path_buf();
                        temp = Some(dir);
                        path
                    }
                };
                archive::extract_zip_member(&emission.source_path, member, &dir)?
            }
            None => emission.source_path.clone(),
        };
        entries.push(OutputEntry {
            name: emission.name.clone(),
            source,
            date: emission.date.clone(),
        });
    }

    let safe_name = set_name.replace(['/', '\\'], "_");
    archive::write_container(opts.format, &opts.output, &safe_name, &entries)?;
    Ok(entries.len())
}
