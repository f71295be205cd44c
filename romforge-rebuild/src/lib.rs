//! Content-addressed rebuild and verification for catalog stores.
//!
//! Candidates (loose files and zip archive members) are hashed in 64KB
//! chunks, matched against a CRC-bucketed [`romforge_core::ItemStore`], and
//! materialized into folder, zip, torrent-gz or tar containers.

pub mod archive;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod scan;
pub mod verify;

pub use archive::{OutputEntry, OutputFormat};
pub use engine::{rebuild, RebuildOptions, RebuildSummary};
pub use error::RebuildError;
pub use hasher::HashRecord;
pub use verify::{verify, VerifyReport};
