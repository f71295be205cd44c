//! Catalog (DAT) document codecs for the romforge model.
//!
//! Parses and writes Logiqx XML and ClrMamePro catalogs, auto-detecting the
//! input format. Parsing is permissive: malformed hashes and sizes degrade
//! per the core coercion rules, and only a structurally empty document is an
//! error.

pub mod clrmamepro;
pub mod codec;
pub mod error;
pub mod header;
pub mod logiqx;

pub use codec::{
    CatalogFormat, parse_catalog, parse_catalog_file, write_catalog, write_catalog_file,
};
pub use error::DatError;
pub use header::DatHeader;
