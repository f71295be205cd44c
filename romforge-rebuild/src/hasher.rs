//! Streaming multi-hash computation for candidate files and archive members.

use std::io::Read;
use std::path::Path;

use sha1::Digest;

use romforge_core::item::ZERO_CRC;

const CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Hashes and size observed for one candidate (a file or archive member).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashRecord {
    pub name: String,
    pub size: u64,
    /// CRC32, lowercase hex.
    pub crc: Option<String>,
    /// MD5, lowercase hex (deep scans only).
    pub md5: Option<String>,
    /// SHA1, lowercase hex (deep scans only).
    pub sha1: Option<String>,
    /// SHA256, lowercase hex (deep scans only).
    pub sha256: Option<String>,
}

impl HashRecord {
    /// The CRC bucket key this record lands in (zero sentinel if absent).
    pub fn crc_key(&self) -> &str {
        self.crc.as_deref().unwrap_or(ZERO_CRC)
    }
}

/// Hash a reader in 64KB chunks. A shallow scan computes CRC32 only; a deep
/// scan adds MD5, SHA1 and SHA256 in the same pass.
pub fn hash_reader<R: Read>(reader: &mut R, deep: bool) -> std::io::Result<HashRecord> {
    let mut crc = crc32fast::Hasher::new();
    let mut md5 = deep.then(md5::Context::new);
    let mut sha1 = deep.then(sha1::Sha1::new);
    let mut sha256 = deep.then(sha2::Sha256::new);

    let mut size: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        crc.update(&buf[..n]);
        if let Some(md5) = md5.as_mut() {
            md5.consume(&buf[..n]);
        }
        if let Some(sha1) = sha1.as_mut() {
            sha1.update(&buf[..n]);
        }
        if let Some(sha256) = sha256.as_mut() {
            sha256.update(&buf[..n]);
        }
    }

    Ok(HashRecord {
        name: String::new(),
        size,
        crc: Some(format!("{:08x}", crc.finalize())),
        md5: md5.map(|c| format!("{:x}", c.compute())),
        sha1: sha1.map(|s| format!("{:x}", s.finalize())),
        sha256: sha256.map(|s| format!("{:x}", s.finalize())),
    })
}

/// Hash a plain file on disk.
pub fn hash_file(path: &Path, deep: bool) -> std::io::Result<HashRecord> {
    let mut file = std::fs::File::open(path)?;
    let mut record = hash_reader(&mut file, deep)?;
    record.name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(record)
}

/// Compute just the CRC32 of a byte slice (test fixtures, key checks).
pub fn crc32_of(bytes: &[u8]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    format!("{:08x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_shallow_scan_crc_only() {
        let mut cursor = Cursor::new(b"Hello, World!".to_vec());
        let record = hash_reader(&mut cursor, false).unwrap();
        assert_eq!(record.size, 13);
        assert_eq!(record.crc.as_deref().map(str::len), Some(8));
        assert!(record.md5.is_none());
        assert!(record.sha1.is_none());
        assert!(record.sha256.is_none());
    }

    #[test]
    fn test_deep_scan_all_hashes() {
        let mut cursor = Cursor::new(b"Hello, World!".to_vec());
        let record = hash_reader(&mut cursor, true).unwrap();
        assert_eq!(record.md5.as_deref().map(str::len), Some(32));
        assert_eq!(record.sha1.as_deref().map(str::len), Some(40));
        assert_eq!(record.sha256.as_deref().map(str::len), Some(64));
    }

    #[test]
    fn test_known_empty_hashes() {
        let mut cursor = Cursor::new(Vec::new());
        let record = hash_reader(&mut cursor, true).unwrap();
        assert_eq!(record.size, 0);
        assert_eq!(record.crc.as_deref(), Some("00000000"));
        assert_eq!(
            record.md5.as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        assert_eq!(
            record.sha1.as_deref(),
            Some("da39a3ee5e6b4b0d3255bfef95601890afd80709")
        );
    }

    #[test]
    fn test_crc32_of_matches_reader() {
        let data = b"some rom content";
        let mut cursor = Cursor::new(data.to_vec());
        let record = hash_reader(&mut cursor, false).unwrap();
        assert_eq!(record.crc.as_deref(), Some(crc32_of(data).as_str()));
    }
}
