//! Archive access: zip sniffing and member listing, member extraction, and
//! the output container writers (folder, zip, gzip-per-file, tar).

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

use crate::error::RebuildError;
use crate::hasher::{self, HashRecord};

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Output container formats for rebuilt sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One directory per set, plain file copies.
    Folder,
    /// One deflate zip per set, members sorted by name for deterministic
    /// output.
    Zip,
    /// One directory per set, each member individually gzipped.
    TorrentGz,
    /// One tar per set.
    Tar,
}

/// One member of an output container: the name it should have inside the
/// container and the on-disk file holding its bytes.
#[derive(Debug, Clone)]
pub struct OutputEntry {
    pub name: String,
    pub source: PathBuf,
    /// Catalog-recorded timestamp to restore, `YYYY-MM-DD HH:MM:SS`.
    pub date: Option<String>,
}

/// Sniff for a zip container by magic bytes, not extension.
pub fn is_zip(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    match File::open(path).and_then(|mut f| f.read_exact(&mut magic)) {
        Ok(()) => magic == ZIP_MAGIC,
        Err(_) => false,
    }
}

/// List a zip's members without extracting.
///
/// A shallow scan reads each member's CRC32 and size straight from the
/// central directory; a deep scan decompresses each member through the
/// hasher for the full hash set.
pub fn list_zip_members(path: &Path, deep: bool) -> Result<Vec<HashRecord>, RebuildError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    let mut records = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        if member.is_dir() {
            continue;
        }
        let record = if deep {
            let mut record = hasher::hash_reader(&mut member, true)?;
            record.name = member.name().to_string();
            record
        } else {
            HashRecord {
                name: member.name().to_string(),
                size: member.size(),
                crc: Some(format!("{:08x}", member.crc32())),
                md5: None,
                sha1: None,
                sha256: None,
            }
        };
        records.push(record);
    }
    Ok(records)
}

/// Extract one member to `dest_dir`, returning the extracted path.
pub fn extract_zip_member(
    path: &Path,
    member_name: &str,
    dest_dir: &Path,
) -> Result<PathBuf, RebuildError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut member = archive.by_name(member_name)?;

    // Flatten the member path; extraction targets are single staged files.
    let flat_name = member_name.replace(['/', '\\'], "_");
    let dest = dest_dir.join(flat_name);
    let mut out = File::create(&dest)?;
    io::copy(&mut member, &mut out)?;
    Ok(dest)
}

/// Write one set's entries into the chosen container format under `out_dir`.
pub fn write_container(
    format: OutputFormat,
    out_dir: &Path,
    set_name: &str,
    entries: &[OutputEntry],
) -> Result<(), RebuildError> {
    if entries.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(out_dir)?;

    // Deterministic member order regardless of scan order.
    let mut entries: Vec<&OutputEntry> = entries.iter().collect();
    entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    entries.dedup_by(|a, b| a.name.eq_ignore_ascii_case(&b.name));

    match format {
        OutputFormat::Folder => write_folder(out_dir, set_name, &entries),
        OutputFormat::Zip => write_zip(out_dir, set_name, &entries),
        OutputFormat::TorrentGz => write_torrent_gz(out_dir, set_name, &entries),
        OutputFormat::Tar => write_tar(out_dir, set_name, &entries),
    }
}

fn write_folder(
    out_dir: &Path,
    set_name: &str,
    entries: &[&OutputEntry],
) -> Result<(), RebuildError> {
    let set_dir = out_dir.join(set_name);
    for entry in entries {
        let dest = set_dir.join(container_member_name(&entry.name));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&entry.source, &dest)?;
    }
    Ok(())
}

fn write_zip(out_dir: &Path, set_name: &str, entries: &[&OutputEntry]) -> Result<(), RebuildError> {
    let dest = out_dir.join(format!("{set_name}.zip"));
    let file = File::create(&dest)?;
    let mut zip = zip::ZipWriter::new(file);

    for entry in entries {
        let mut options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        if let Some(dt) = entry.date.as_deref().and_then(parse_zip_datetime) {
            options = options.last_modified_time(dt);
        }
        zip.start_file(container_member_name(&entry.name), options)?;
        let mut source = File::open(&entry.source)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}

fn write_torrent_gz(
    out_dir: &Path,
    set_name: &str,
    entries: &[&OutputEntry],
) -> Result<(), RebuildError> {
    let set_dir = out_dir.join(set_name);
    fs::create_dir_all(&set_dir)?;
    for entry in entries {
        let dest = set_dir.join(format!("{}.gz", entry.name.replace(['/', '\\'], "_")));
        let mut encoder = GzEncoder::new(File::create(&dest)?, Compression::default());
        let mut source = File::open(&entry.source)?;
        io::copy(&mut source, &mut encoder)?;
        encoder.finish()?;
    }
    Ok(())
}

fn write_tar(out_dir: &Path, set_name: &str, entries: &[&OutputEntry]) -> Result<(), RebuildError> {
    let dest = out_dir.join(format!("{set_name}.tar"));
    let file = File::create(&dest)?;
    let mut builder = tar::Builder::new(file);
    for entry in entries {
        builder.append_path_with_name(&entry.source, container_member_name(&entry.name))?;
    }
    let mut file = builder.into_inner()?;
    file.flush()?;
    Ok(())
}

/// Item names may carry a `parent\child` prefix from set merging; containers
/// store them with forward slashes.
fn container_member_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Parse a catalog date attribute into a zip timestamp.
fn parse_zip_datetime(date: &str) -> Option<zip::DateTime> {
    let parsed = chrono::NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(date, "%Y/%m/%d %H:%M:%S"))
        .ok()?;
    use chrono::{Datelike, Timelike};
    zip::DateTime::from_date_and_time(
        parsed.year() as u16,
        parsed.month() as u8,
        parsed.day() as u8,
        parsed.hour() as u8,
        parsed.minute() as u8,
        parsed.second() as u8,
    )
    .ok()
}
