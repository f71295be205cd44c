//! Format detection and the unified parse/serialize entry points.

use std::io::{BufRead, Read, Write};
use std::path::Path;

use romforge_core::ItemStore;

use crate::clrmamepro;
use crate::error::DatError;
use crate::header::DatHeader;
use crate::logiqx;

/// Supported catalog serializations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// Logiqx XML (`datafile` documents).
    Logiqx,
    /// ClrMamePro text blocks.
    ClrMamePro,
}

/// Parse a catalog, auto-detecting the format from the first
/// non-whitespace byte (`<` means XML).
///
/// `system_id`/`source_id` stamp every produced item with its input
/// provenance, used later for cross-source bucketing and dupe
/// classification.
pub fn parse_catalog<R: BufRead>(
    mut reader: R,
    system_id: u32,
    source_id: u32,
) -> Result<(ItemStore, DatHeader), DatError> {
    // Peek at the first non-whitespace byte to detect the format.
    let mut first_bytes = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Err(DatError::invalid_dat("Empty DAT file"));
        }
        first_bytes.push(buf[0]);
        if !buf[0].is_ascii_whitespace() {
            break;
        }
    }

    let chain = std::io::Cursor::new(first_bytes).chain(reader);
    let buffered = std::io::BufReader::new(chain);

    if buf[0] == b'<' {
        logiqx::parse(buffered, system_id, source_id)
    } else {
        clrmamepro::parse(buffered, system_id, source_id)
    }
}

/// Parse a catalog from a file path.
pub fn parse_catalog_file(
    path: &Path,
    system_id: u32,
    source_id: u32,
) -> Result<(ItemStore, DatHeader), DatError> {
    let file = std::fs::File::open(path)?;
    parse_catalog(std::io::BufReader::new(file), system_id, source_id)
}

/// Serialize a store in the requested format. The store is rebucketed by
/// game as a side effect (machines are the serialization unit).
pub fn write_catalog<W: Write>(
    writer: W,
    store: &mut ItemStore,
    header: &DatHeader,
    format: CatalogFormat,
) -> Result<(), DatError> {
    match format {
        CatalogFormat::Logiqx => logiqx::write(writer, store, header),
        CatalogFormat::ClrMamePro => clrmamepro::write(writer, store, header),
    }
}

/// Serialize a store to a file path.
pub fn write_catalog_file(
    path: &Path,
    store: &mut ItemStore,
    header: &DatHeader,
    format: CatalogFormat,
) -> Result<(), DatError> {
    let file = std::fs::File::create(path)?;
    write_catalog(std::io::BufWriter::new(file), store, header, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autodetect_xml() {
        let xml = r#"<?xml version="1.0"?>
<datafile>
    <header><name>t</name><version>1</version></header>
    <game name="g"><rom name="g.bin" size="16" crc="deadbeef"/></game>
</datafile>"#;
        let (store, header) = parse_catalog(xml.as_bytes(), 0, 0).unwrap();
        assert_eq!(header.name, "t");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_autodetect_clrmamepro() {
        let text = "clrmamepro (\n\tname t\n\tversion 1\n)\n\ngame (\n\tname g\n\trom ( name g.bin size 16 crc deadbeef )\n)\n";
        let (store, header) = parse_catalog(text.as_bytes(), 0, 0).unwrap();
        assert_eq!(header.name, "t");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_catalog("".as_bytes(), 0, 0).is_err());
    }

    #[test]
    fn test_cross_format_conversion() {
        let text = "clrmamepro (\n\tname t\n\tversion 1\n)\n\ngame (\n\tname g\n\trom ( name g.bin size 16 crc deadbeef )\n)\n";
        let (mut store, header) = parse_catalog(text.as_bytes(), 0, 0).unwrap();

        let mut out = Vec::new();
        write_catalog(&mut out, &mut store, &header, CatalogFormat::Logiqx).unwrap();
        let (store2, _) = parse_catalog(out.as_slice(), 0, 0).unwrap();
        assert_eq!(store2.len(), 1);
        assert_eq!(store2.items().next().unwrap().crc(), Some("deadbeef"));
    }
}
