//! The polymorphic catalog item and the machine metadata it carries.
//!
//! Every item owns an immutable [`Machine`] snapshot. Re-pointing an item at
//! another machine always goes through [`DatItem::set_machine`], which stores
//! a fresh clone — two items never share a mutable machine, so renaming one
//! machine cannot leak into unrelated items.

use crate::util::normalize_hex;

/// All-zero CRC32 sentinel used for bucketing items without a CRC.
pub const ZERO_CRC: &str = "00000000";
/// All-zero MD5 sentinel.
pub const ZERO_MD5: &str = "00000000000000000000000000000000";
/// All-zero SHA1 sentinel.
pub const ZERO_SHA1: &str = "0000000000000000000000000000000000000000";
/// All-zero SHA256 sentinel.
pub const ZERO_SHA256: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Dump status recorded in the catalog for a ROM or disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemStatus {
    #[default]
    None,
    Good,
    BadDump,
    Nodump,
    Verified,
}

impl ItemStatus {
    /// Parse a status attribute. Unknown values fall back to `None` —
    /// catalogs are coerced, not validated.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "good" => Self::Good,
            "baddump" => Self::BadDump,
            "nodump" => Self::Nodump,
            "verified" => Self::Verified,
            _ => Self::None,
        }
    }

    /// Attribute spelling for serialization. `None` and `Good` are the
    /// implicit defaults and are not written.
    pub fn as_attr(self) -> Option<&'static str> {
        match self {
            Self::None | Self::Good => None,
            Self::BadDump => Some("baddump"),
            Self::Nodump => Some("nodump"),
            Self::Verified => Some("verified"),
        }
    }
}

/// Duplicate classification assigned by the deduplicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DupeStatus {
    /// Not (yet) known to duplicate anything.
    #[default]
    None,
    /// Duplicates an item from the same input catalog.
    Internal,
    /// Duplicates an item from a different input catalog.
    External,
}

/// Machine classification from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MachineType {
    #[default]
    None,
    Bios,
    Device,
    Mechanical,
}

/// One game/device entry from a catalog.
///
/// `clone_of`, `rom_of`, `sample_of` and `devices` are soft name-references:
/// they may point at machines that are absent from the store, and every
/// consumer treats a dangling reference as a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Machine {
    pub name: String,
    pub description: String,
    pub clone_of: Option<String>,
    pub rom_of: Option<String>,
    pub sample_of: Option<String>,
    pub devices: Vec<String>,
    pub machine_type: MachineType,
    pub runnable: Option<bool>,
}

impl Machine {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            ..Self::default()
        }
    }
}

/// Variant payload of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Rom {
        size: Option<u64>,
        crc: Option<String>,
        md5: Option<String>,
        sha1: Option<String>,
        sha256: Option<String>,
        date: Option<String>,
        status: ItemStatus,
    },
    Disk {
        md5: Option<String>,
        sha1: Option<String>,
        sha256: Option<String>,
        status: ItemStatus,
        merge_tag: Option<String>,
    },
    BiosSet {
        description: String,
        is_default: bool,
    },
    Release {
        region: String,
        language: Option<String>,
        date: Option<String>,
        is_default: bool,
    },
    Archive,
    Sample,
}

/// A single catalog item: a named piece of content owned by one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatItem {
    pub name: String,
    machine: Machine,
    /// Index of the input catalog that contributed this item.
    pub system_id: u32,
    /// Index of the input source (run) within that catalog.
    pub source_id: u32,
    pub dupe: DupeStatus,
    pub kind: ItemKind,
}

impl DatItem {
    pub fn new(name: impl Into<String>, machine: Machine, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            machine,
            system_id: 0,
            source_id: 0,
            dupe: DupeStatus::None,
            kind,
        }
    }

    /// Convenience constructor for a ROM with just a CRC, used heavily in
    /// tests and by the rebuild candidate scan.
    pub fn rom(name: impl Into<String>, machine: Machine, size: u64, crc: &str) -> Self {
        Self::new(
            name,
            machine,
            ItemKind::Rom {
                size: Some(size),
                crc: normalize_hex(crc, 8),
                md5: None,
                sha1: None,
                sha256: None,
                date: None,
                status: ItemStatus::None,
            },
        )
    }

    /// The machine snapshot this item belongs to.
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_name(&self) -> &str {
        &self.machine.name
    }

    /// Re-point this item at another machine. Always stores a clone — the
    /// copy-on-write boundary for machine metadata.
    pub fn set_machine(&mut self, machine: &Machine) {
        self.machine = machine.clone();
    }

    /// CRC32 if this item type carries one. Disks never contribute a CRC.
    pub fn crc(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Rom { crc, .. } => crc.as_deref(),
            _ => None,
        }
    }

    pub fn md5(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Rom { md5, .. } | ItemKind::Disk { md5, .. } => md5.as_deref(),
            _ => None,
        }
    }

    pub fn sha1(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Rom { sha1, .. } | ItemKind::Disk { sha1, .. } => sha1.as_deref(),
            _ => None,
        }
    }

    pub fn sha256(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Rom { sha256, .. } | ItemKind::Disk { sha256, .. } => sha256.as_deref(),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match &self.kind {
            ItemKind::Rom { size, .. } => *size,
            _ => None,
        }
    }

    pub fn status(&self) -> ItemStatus {
        match &self.kind {
            ItemKind::Rom { status, .. } | ItemKind::Disk { status, .. } => *status,
            _ => ItemStatus::None,
        }
    }

    /// True for the canonical "empty" sentinel: a zero-size ROM with no
    /// populated hashes. Used to keep item-less machines alive in the store.
    pub fn is_placeholder(&self) -> bool {
        match &self.kind {
            ItemKind::Rom {
                size,
                crc,
                md5,
                sha1,
                sha256,
                ..
            } => {
                size.unwrap_or(0) == 0
                    && crc.is_none()
                    && md5.is_none()
                    && sha1.is_none()
                    && sha256.is_none()
            }
            _ => false,
        }
    }

    /// The placeholder sentinel itself (empty name, zero size, no hashes).
    pub fn placeholder(machine: Machine) -> Self {
        Self::new(
            "",
            machine,
            ItemKind::Rom {
                size: Some(0),
                crc: None,
                md5: None,
                sha1: None,
                sha256: None,
                date: None,
                status: ItemStatus::None,
            },
        )
    }

    /// Permissive coercion applied after parsing or candidate scanning:
    /// hashes are normalized (malformed values dropped), and a positive-size
    /// ROM with no remaining hash is downgraded to `Nodump` rather than
    /// rejected.
    pub fn normalize(&mut self) {
        match &mut self.kind {
            ItemKind::Rom {
                size,
                crc,
                md5,
                sha1,
                sha256,
                status,
                ..
            } => {
                *crc = crc.take().and_then(|v| normalize_hex(&v, 8));
                *md5 = md5.take().and_then(|v| normalize_hex(&v, 32));
                *sha1 = sha1.take().and_then(|v| normalize_hex(&v, 40));
                *sha256 = sha256.take().and_then(|v| normalize_hex(&v, 64));

                let no_hashes =
                    crc.is_none() && md5.is_none() && sha1.is_none() && sha256.is_none();
                if no_hashes && size.unwrap_or(0) > 0 && *status == ItemStatus::None {
                    *status = ItemStatus::Nodump;
                }
            }
            ItemKind::Disk {
                md5, sha1, sha256, ..
            } => {
                *md5 = md5.take().and_then(|v| normalize_hex(&v, 32));
                *sha1 = sha1.take().and_then(|v| normalize_hex(&v, 40));
                *sha256 = sha256.take().and_then(|v| normalize_hex(&v, 64));
            }
            _ => {}
        }
    }
}
