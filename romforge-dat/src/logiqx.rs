//! Logiqx XML catalog parsing and writing.
//!
//! Machines may appear as `<game>` or `<machine>` elements; items appear as
//! `<rom>`, `<disk>`, `<biosset>`, `<release>`, `<archive>` and `<sample>`.
//! Unknown elements and attributes are ignored; malformed hash and size
//! values degrade per the core coercion rules instead of failing the parse.

use std::io::{BufRead, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use romforge_core::{
    BucketDimension, DatItem, DedupePolicy, ItemKind, ItemStatus, ItemStore, Machine, MachineType,
};

use crate::error::DatError;
use crate::header::DatHeader;

const DOCTYPE: &str =
    " datafile SYSTEM \"http://www.logiqx.com/Dats/datafile.dtd\"";

pub fn parse<R: BufRead>(
    reader: R,
    system_id: u32,
    source_id: u32,
) -> Result<(ItemStore, DatHeader), DatError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut store = ItemStore::new();
    let mut header = DatHeader::default();

    let mut buf = Vec::new();
    let mut in_header = false;
    let mut current_tag = String::new();
    // Machine attrs arrive on the open tag, its description and items later;
    // items are materialized at the close tag once the machine is complete.
    let mut current_machine: Option<Machine> = None;
    let mut pending_items: Vec<(String, ItemKind)> = Vec::new();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "header" => in_header = true,
                    "game" | "machine" => {
                        current_machine = Some(parse_machine_attributes(e)?);
                        pending_items.clear();
                    }
                    _ => {
                        if current_machine.is_some() {
                            if let Some(entry) = parse_item_element(&tag, e)? {
                                pending_items.push(entry);
                            }
                        }
                        current_tag = tag;
                    }
                }
            }
            Event::Empty(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if let Some(machine) = current_machine.as_mut() {
                    if tag == "device_ref" {
                        if let Some(name) = attribute(e, b"name")? {
                            machine.devices.push(name);
                        }
                    } else if let Some(entry) = parse_item_element(&tag, e)? {
                        pending_items.push(entry);
                    }
                }
            }
            Event::Text(ref e) => {
                let text = e.unescape()?.to_string();
                if in_header {
                    match current_tag.as_str() {
                        "name" => header.name = text,
                        "description" => header.description = text,
                        "version" => header.version = text,
                        "author" => header.author = Some(text),
                        "date" => header.date = Some(text),
                        "homepage" => header.homepage = Some(text),
                        "url" => header.url = Some(text),
                        "comment" => header.comment = Some(text),
                        _ => {}
                    }
                } else if let Some(machine) = current_machine.as_mut() {
                    if current_tag == "description" {
                        machine.description = text;
                    }
                }
            }
            Event::End(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "header" => in_header = false,
                    "game" | "machine" => {
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
                    _ => current_tag.clear(),
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if header.name.is_empty() && store.is_empty() {
        return Err(DatError::invalid_dat(
            "No header or machines found in XML DAT file",
        ));
    }

    Ok((store, header))
}

/// Emit a machine's items into the store. A machine with no items gets the
/// placeholder sentinel so it survives bucketing and serialization.
fn finish_machine(
    store: &mut ItemStore,
    machine: Machine,
    items: Vec<(String, ItemKind)>,
    system_id: u32,
    source_id: u32,
) {
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

fn parse_machine_attributes(e: &BytesStart<'_>) -> Result<Machine, DatError> {
    let mut machine = Machine::default();
    for attr in e.attributes() {
        let attr = attr?;
        let value = String::from_utf8_lossy(&attr.value).to_string();
        match attr.key.as_ref() {
            b"name" => machine.name = value,
            b"cloneof" => machine.clone_of = Some(value),
            b"romof" => machine.rom_of = Some(value),
            b"sampleof" => machine.sample_of = Some(value),
            b"isbios" if yes(&value) => machine.machine_type = MachineType::Bios,
            b"isdevice" if yes(&value) => machine.machine_type = MachineType::Device,
            b"ismechanical" if yes(&value) => machine.machine_type = MachineType::Mechanical,
            b"runnable" => machine.runnable = Some(yes(&value)),
            _ => {}
        }
    }
    if machine.description.is_empty() {
        machine.description = machine.name.clone();
    }
    Ok(machine)
}

fn yes(value: &str) -> bool {
    value.eq_ignore_ascii_case("yes")
}

/// Parse one item element into `(name, kind)`, or `None` for elements that
/// are not items.
fn parse_item_element(
    tag: &str,
    e: &BytesStart<'_>,
) -> Result<Option<(String, ItemKind)>, DatError> {
    let kind = match tag {
        "rom" => ItemKind::Rom {
            size: attribute(e, b"size")?.and_then(|v| v.parse().ok()),
            crc: attribute(e, b"crc")?,
            md5: attribute(e, b"md5")?,
            sha1: attribute(e, b"sha1")?,
            sha256: attribute(e, b"sha256")?,
            date: attribute(e, b"date")?,
            status: status_attribute(e)?,
        },
        "disk" => ItemKind::Disk {
            md5: attribute(e, b"md5")?,
            sha1: attribute(e, b"sha1")?,
            sha256: attribute(e, b"sha256")?,
            status: status_attribute(e)?,
            merge_tag: attribute(e, b"merge")?,
        },
        "biosset" => ItemKind::BiosSet {
            description: attribute(e, b"description")?.unwrap_or_default(),
            is_default: attribute(e, b"default")?.is_some_and(|v| yes(&v)),
        },
        "release" => ItemKind::Release {
            region: attribute(e, b"region")?.unwrap_or_default(),
            language: attribute(e, b"language")?,
            date: attribute(e, b"date")?,
            is_default: attribute(e, b"default")?.is_some_and(|v| yes(&v)),
        },
        "archive" => ItemKind::Archive,
        "sample" => ItemKind::Sample,
        _ => return Ok(None),
    };
    let name = attribute(e, b"name")?.unwrap_or_default();
    Ok(Some((name, kind)))
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, DatError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(String::from_utf8_lossy(&attr.value).to_string()));
        }
    }
    Ok(None)
}

fn status_attribute(e: &BytesStart<'_>) -> Result<ItemStatus, DatError> {
    Ok(attribute(e, b"status")?
        .map(|v| ItemStatus::parse(&v))
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

pub fn write<W: Write>(
    writer: W,
    store: &mut ItemStore,
    header: &DatHeader,
) -> Result<(), DatError> {
    store.rebucket(BucketDimension::Game, DedupePolicy::None);

    let mut xml = Writer::new_with_indent(writer, b' ', 4);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml.write_event(Event::DocType(BytesText::from_escaped(DOCTYPE)))?;

    xml.write_event(Event::Start(BytesStart::new("datafile")))?;
    write_header(&mut xml, header)?;

    let keys: Vec<String> = store.keys().cloned().collect();
    for key in keys {
        let Some(machine) = store.machine(&key) else {
            continue;
        };
        let items = store.bucket(&key).unwrap_or(&[]).to_vec();
        write_machine(&mut xml, &machine, &items)?;
    }

    xml.write_event(Event::End(BytesEnd::new("datafile")))?;
    Ok(())
}

fn write_header<W: Write>(xml: &mut Writer<W>, header: &DatHeader) -> Result<(), DatError> {
    xml.write_event(Event::Start(BytesStart::new("header")))?;
    write_text_element(xml, "name", &header.name)?;
    write_text_element(xml, "description", &header.description)?;
    write_text_element(xml, "version", &header.version)?;
    for (tag, value) in [
        ("author", &header.author),
        ("date", &header.date),
        ("homepage", &header.homepage),
        ("url", &header.url),
        ("comment", &header.comment),
    ] {
        if let Some(value) = value {
            write_text_element(xml, tag, value)?;
        }
    }
    xml.write_event(Event::End(BytesEnd::new("header")))?;
    Ok(())
}

fn write_text_element<W: Write>(
    xml: &mut Writer<W>,
    tag: &str,
    text: &str,
) -> Result<(), DatError> {
    xml.write_event(Event::Start(BytesStart::new(tag)))?;
    xml.write_event(Event::Text(BytesText::new(text)))?;
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn write_machine<W: Write>(
    xml: &mut Writer<W>,
    machine: &Machine,
    items: &[DatItem],
) -> Result<(), DatError> {
    let mut open = BytesStart::new("game");
    open.push_attribute(("name", machine.name.as_str()));
    if let Some(parent) = &machine.clone_of {
        open.push_attribute(("cloneof", parent.as_str()));
    }
    if let Some(parent) = &machine.rom_of {
        open.push_attribute(("romof", parent.as_str()));
    }
    if let Some(parent) = &machine.sample_of {
        open.push_attribute(("sampleof", parent.as_str()));
    }
    match machine.machine_type {
        MachineType::None => {}
        MachineType::Bios => open.push_attribute(("isbios", "yes")),
        MachineType::Device => open.push_attribute(("isdevice", "yes")),
        MachineType::Mechanical => open.push_attribute(("ismechanical", "yes")),
    }
    if let Some(runnable) = machine.runnable {
        open.push_attribute(("runnable", if runnable { "yes" } else { "no" }));
    }
    xml.write_event(Event::Start(open))?;

    if !machine.description.is_empty() {
        write_text_element(xml, "description", &machine.description)?;
    }
    for device in &machine.devices {
        let mut elem = BytesStart::new("device_ref");
        elem.push_attribute(("name", device.as_str()));
        xml.write_event(Event::Empty(elem))?;
    }
    for item in items {
        if item.is_placeholder() {
            continue;
        }
        write_item(xml, item)?;
    }

    xml.write_event(Event::End(BytesEnd::new("game")))?;
    Ok(())
}

fn write_item<W: Write>(xml: &mut Writer<W>, item: &DatItem) -> Result<(), DatError> {
    let mut elem;
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
            elem = BytesStart::new("rom");
            elem.push_attribute(("name", item.name.as_str()));
            if let Some(size) = size {
                elem.push_attribute(("size", size.to_string().as_str()));
            }
            push_opt(&mut elem, "crc", crc);
            push_opt(&mut elem, "md5", md5);
            push_opt(&mut elem, "sha1", sha1);
            push_opt(&mut elem, "sha256", sha256);
            push_opt(&mut elem, "date", date);
            if let Some(status) = status.as_attr() {
                elem.push_attribute(("status", status));
            }
        }
        ItemKind::Disk {
            md5,
            sha1,
            sha256,
            status,
            merge_tag,
        } => {
            elem = BytesStart::new("disk");
            elem.push_attribute(("name", item.name.as_str()));
            push_opt(&mut elem, "md5", md5);
            push_opt(&mut elem, "sha1", sha1);
            push_opt(&mut elem, "sha256", sha256);
            push_opt(&mut elem, "merge", merge_tag);
            if let Some(status) = status.as_attr() {
                elem.push_attribute(("status", status));
            }
        }
        ItemKind::BiosSet {
            description,
            is_default,
        } => {
            elem = BytesStart::new("biosset");
            elem.push_attribute(("name", item.name.as_str()));
            elem.push_attribute(("description", description.as_str()));
            if *is_default {
                elem.push_attribute(("default", "yes"));
            }
        }
        ItemKind::Release {
            region,
            language,
            date,
            is_default,
        } => {
            elem = BytesStart::new("release");
            elem.push_attribute(("name", item.name.as_str()));
            elem.push_attribute(("region", region.as_str()));
            push_opt(&mut elem, "language", language);
            push_opt(&mut elem, "date", date);
            if *is_default {
                elem.push_attribute(("default", "yes"));
            }
        }
        ItemKind::Archive => {
            elem = BytesStart::new("archive");
            elem.push_attribute(("name", item.name.as_str()));
        }
        ItemKind::Sample => {
            elem = BytesStart::new("sample");
            elem.push_attribute(("name", item.name.as_str()));
        }
    }
    xml.write_event(Event::Empty(elem))?;
    Ok(())
}

fn push_opt(elem: &mut BytesStart<'_>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        elem.push_attribute((key, value.as_str()));
    }
}
