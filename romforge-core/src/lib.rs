//! Core data model and set-manipulation engine for DAT-based ROM auditing.
//!
//! A DAT catalog describes *machines* (games, BIOS sets, devices) and the
//! content-addressed files each machine needs. This crate holds the in-memory
//! model shared by the codecs and the rebuild engine:
//!
//! - [`ItemStore`] — the hash- or name-bucketed item collection
//! - [`dedup`] — fuzzy hash-compatible duplicate detection and merging
//! - [`resolve`] — parent/clone/device set flattening (merge/split policies)
//!
//! No I/O happens here; everything operates on the in-memory store.

pub mod dedup;
pub mod item;
pub mod resolve;
pub mod store;
pub mod util;

pub use dedup::DedupePolicy;
pub use item::{DatItem, DupeStatus, ItemKind, ItemStatus, Machine, MachineType};
pub use resolve::{MergePolicy, resolve};
pub use store::{BucketDimension, ItemStore};
