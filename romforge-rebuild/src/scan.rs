//! Input collection: walk the given paths and return every readable file.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Collect all files under the given inputs (files pass through, directories
/// are walked recursively). Unreadable entries are logged and skipped — a
/// bad input never aborts the batch.
pub fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
            continue;
        }
        collect_dir(input, &mut files);
    }
    files.sort();
    files
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(err) => {
                log::warn!("skipping unreadable entry under {}: {err}", dir.display());
            }
        }
    }
}
