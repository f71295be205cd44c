//! ClrMamePro text catalog parsing and writing.
//!
//! Format:
//! ```text
//! clrmamepro (
//!     name "System Name"
//!     version 20240101-000000
//! )
//!
//! game (
//!     name "Game Name (Region)"
//!     cloneof "Parent Name"
//!     rom ( name "Game Name (Region).ext" size 12345 crc AABBCCDD sha1 ... )
//! )
//! ```
//!
//! `resource` blocks are BIOS machines. Quoted tokens may contain spaces and
//! parentheses.

use std::io::{BufRead, Write};

use romforge_core::{
    BucketDimension, DatItem, DedupePolicy, ItemKind, ItemStatus, ItemStore, Machine, MachineType,
};

use crate::error::DatError;
use crate::header::DatHeader;

pub fn parse<R: BufRead>(
    reader: R,
    system_id: u32,
    source_id: u32,
) -> Result<(ItemStore, DatHeader), DatError> {
    let mut store = ItemStore::new();
    let mut header = DatHeader::default();

    let mut in_block: Option<String> = None;
    let mut current_machine: Option<Machine> = None;
    let mut pending_items: Vec<(String, ItemKind)> = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if in_block.is_none() {
            if let Some(block_type) = detect_block_start(trimmed) {
                match block_type.as_str() {
                    "game" | "machine" | "set" => {
                        current_machine = Some(Machine::default());
                        pending_items.clear();
                    }
                    "resource" => {
                        current_machine = Some(Machine {
                            machine_type: MachineType::Bios,
                            ..Machine::default()
                        });
                        pending_items.clear();
                    }
                    _ => {} // clrmamepro header block
                }
                in_block = Some(block_type);
            }
            continue;
        }

        if trimmed == ")" {
            let block_type = in_block.take().unwrap_or_default();
            if matches!(block_type.as_str(), "game" | "machine" | "set" | "resource") {
                if let Some(machine) = current_machine.take() {
                    finish_machine(
                        &mut store,
                        machine,
                        std::mem::take(&mut pending_items),
                        system_id,
                        source_id,
                    );
                }
            }
            continue;
        }

        let block_type = in_block.as_deref().unwrap_or_default();
        let Some((key, value)) = parse_kv(trimmed) else {
            continue;
        };

        if block_type == "clrmamepro" {
            match key.as_str() {
                "name" => header.name = value,
                "description" => header.description = value,
                "version" => header.version = value,
                "author" => header.author = Some(value),
                "date" => header.date = Some(value),
                "homepage" => header.homepage = Some(value),
                "url" => header.url = Some(value),
                "comment" => header.comment = Some(value),
                _ => {}
            }
        } else if let Some(machine) = current_machine.as_mut() {
            match key.as_str() {
                "name" => machine.name = value,
                "description" => machine.description = value,
                "cloneof" => machine.clone_of = Some(value),
                "romof" => machine.rom_of = Some(value),
                "sampleof" => machine.sample_of = Some(value),
                "rom" => {
                    if let Some(entry) = parse_inline_item(&value, false) {
                        pending_items.push(entry);
                    }
                }
                "disk" => {
                    if let Some(entry) = parse_inline_item(&value, true) {
                        pending_items.push(entry);
                    }
                }
                "sample" => pending_items.push((value, ItemKind::Sample)),
                "archive" => pending_items.push((value, ItemKind::Archive)),
                _ => {}
            }
        }
    }

    if header.name.is_empty() && store.is_empty() {
        return Err(DatError::invalid_dat(
            "No header or machines found in ClrMamePro DAT file",
        ));
    }

    Ok((store, header))
}

fn finish_machine(
    store: &mut ItemStore,
    mut machine: Machine,
    items: Vec<(String, ItemKind)>,
    system_id: u32,
    source_id: u32,
) {
    if machine.description.is_empty() {
        machine.description = machine.name.clone();
    }
    if items.is_empty() {
        let mut item = DatItem::placeholder(machine);
        item.system_id = system_id;
        item.source_id = source_id;
        store.insert(item);
        return;
    }
    for (name, kind) in items {
        let mut item = DatItem::new(name, machine.clone(), kind);
        item.system_id = system_id;
        item.source_id = source_id;
        item.normalize();
        store.insert(item);
    }
}

/// Detect a block start like `clrmamepro (` or `game (`.
fn detect_block_start(line: &str) -> Option<String> {
    let stripped = line.trim_end();
    if stripped.ends_with('(') {
        let block_type = stripped[..stripped.len() - 1].trim();
        if !block_type.is_empty() && block_type.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Some(block_type.to_lowercase());
        }
    }
    None
}

/// Parse a key-value line like `name "Some Value"`. For `rom ( ... )` and
/// `disk ( ... )` the value is the content inside the outer parens.
fn parse_kv(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();

    for inline in ["rom", "disk"] {
        if let Some(rest) = trimmed.strip_prefix(inline) {
            let rest = rest.trim();
            if rest.starts_with('(') && rest.ends_with(')') {
                let inner = rest[1..rest.len() - 1].trim();
                return Some((inline.to_string(), inner.to_string()));
            }
        }
    }

    let mut parts = trimmed.splitn(2, |c: char| c.is_ascii_whitespace());
    let key = parts.next()?.trim().to_string();
    let raw_value = parts.next()?.trim();

    let value = if raw_value.starts_with('"') && raw_value.ends_with('"') && raw_value.len() >= 2 {
        raw_value[1..raw_value.len() - 1].to_string()
    } else {
        raw_value.to_string()
    };

    Some((key, value))
}

/// Parse an inline entry like
/// `name "Game (Region).ext" size 12345 crc AABBCCDD md5 ... sha1 ...`.
fn parse_inline_item(inner: &str, is_disk: bool) -> Option<(String, ItemKind)> {
    let tokens = tokenize(inner);

    let mut name = String::new();
    let mut size: Option<u64> = None;
    let mut crc = None;
    let mut md5 = None;
    let mut sha1 = None;
    let mut sha256 = None;
    let mut date = None;
    let mut merge = None;
    let mut status = ItemStatus::None;

    let mut i = 0;
    while i < tokens.len() {
        let key = tokens[i].as_str();
        let value = tokens.get(i + 1);
        match (key, value) {
            ("name", Some(v)) => name = v.clone(),
            ("size", Some(v)) => size = v.parse().ok(),
            ("crc" | "crc32", Some(v)) => crc = Some(v.clone()),
            ("md5", Some(v)) => md5 = Some(v.clone()),
            ("sha1", Some(v)) => sha1 = Some(v.clone()),
            ("sha256", Some(v)) => sha256 = Some(v.clone()),
            ("date", Some(v)) => date = Some(v.clone()),
            ("merge", Some(v)) => merge = Some(v.clone()),
            ("status" | "flags", Some(v)) => status = ItemStatus::parse(v),
            _ => {
                // Unknown single token; advance by one, not two.
                i += 1;
                continue;
            }
        }
        i += 2;
    }

    if name.is_empty() {
        return None;
    }

    let kind = if is_disk {
        ItemKind::Disk {
            md5,
            sha1,
            sha256,
            status,
            merge_tag: merge,
        }
    } else {
        ItemKind::Rom {
            size,
            crc,
            md5,
            sha1,
            sha256,
            date,
            status,
        }
    };
    Some((name, kind))
}

/// Tokenize an inline item line, respecting quoted strings.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        if chars.peek() == Some(&'"') {
            chars.next();
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c == '"' {
                    chars.next();
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }

    tokens
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub fn write<W: Write>(
    mut writer: W,
    store: &mut ItemStore,
    header: &DatHeader,
) -> Result<(), DatError> {
    store.rebucket(BucketDimension::Game, DedupePolicy::None);

    writeln!(writer, "clrmamepro (")?;
    writeln!(writer, "\tname {}", quote(&header.name))?;
    writeln!(writer, "\tdescription {}", quote(&header.description))?;
    writeln!(writer, "\tversion {}", quote(&header.version))?;
    if let Some(author) = &header.author {
        writeln!(writer, "\tauthor {}", quote(author))?;
    }
    writeln!(writer, ")")?;

    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        let Some(machine) = store.machine(&key) else {
            continue;
        };
        let items = store.bucket(&key).unwrap_or(&[]).to_vec();
        write_machine(&mut writer, &machine, &items)?;
    }

    Ok(())
}

fn write_machine<W: Write>(
    writer: &mut W,
    machine: &Machine,
    items: &[DatItem],
) -> Result<(), DatError> {
    let block = if machine.machine_type == MachineType::Bios {
        "resource"
    } else {
        "game"
    };
    writeln!(writer)?;
    writeln!(writer, "{block} (")?;
    writeln!(writer, "\tname {}", quote(&machine.name))?;
    writeln!(writer, "\tdescription {}", quote(&machine.description))?;
    if let Some(parent) = &machine.clone_of {
        writeln!(writer, "\tcloneof {}", quote(parent))?;
    }
    if let Some(parent) = &machine.rom_of {
        writeln!(writer, "\tromof {}", quote(parent))?;
    }
    if let Some(parent) = &machine.sample_of {
        writeln!(writer, "\tsampleof {}", quote(parent))?;
    }

    for item in items {
        if item.is_placeholder() {
            continue;
        }
        write_item(writer, item)?;
    }

    writeln!(writer, ")")?;
    Ok(())
}

fn write_item<W: Write>(writer: &mut W, item: &DatItem) -> Result<(), DatError> {
    match &item.kind {
        ItemKind::Rom {
            size,
            crc,
            md5,
            sha1,
            sha256,
            date,
            status,
        } => {
            let mut line = format!("\trom ( name {}", quote(&item.name));
            if let Some(size) = size {
                line.push_str(&format!(" size {size}"));
            }
            push_field(&mut line, "crc", crc);
            push_field(&mut line, "md5", md5);
            push_field(&mut line, "sha1", sha1);
            push_field(&mut line, "sha256", sha256);
            push_field(&mut line, "date", date);
            if let Some(status) = status.as_attr() {
                line.push_str(&format!(" flags {status}"));
            }
            line.push_str(" )");
            writeln!(writer, "{line}")?;
        }
        ItemKind::Disk {
            md5,
            sha1,
            sha256,
            status,
            merge_tag,
        } => {
            let mut line = format!("\tdisk ( name {}", quote(&item.name));
            push_field(&mut line, "md5", md5);
            push_field(&mut line, "sha1", sha1);
            push_field(&mut line, "sha256", sha256);
            push_field(&mut line, "merge", merge_tag);
            if let Some(status) = status.as_attr() {
                line.push_str(&format!(" flags {status}"));
            }
            line.push_str(" )");
            writeln!(writer, "{line}")?;
        }
        ItemKind::Sample => {
            writeln!(writer, "\tsample {}", quote(&item.name))?;
        }
        ItemKind::Archive => {
            writeln!(writer, "\tarchive {}", quote(&item.name))?;
        }
        // BIOS sets and releases have no ClrMamePro spelling; they are
        // preserved by the XML codec only.
        ItemKind::BiosSet { .. } | ItemKind::Release { .. } => {}
    }
    Ok(())
}

fn push_field(line: &mut String, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        line.push_str(&format!(" {key} {}", quote(value)));
    }
}

/// Quote a value when it contains whitespace (or is empty).
fn quote(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_ascii_whitespace()) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}
