//! Document container: load, mutate and re-serialize a PDF object graph.
//!
//! Loading reads the whole cross-reference chain (classic tables, xref
//! streams, object streams) into memory. Mutations only ever add objects or
//! record new revisions of existing ones; [`Container::serialize`] then
//! writes them either as an incremental update appended to the untouched
//! original bytes, or as a fresh file.

use crate::object::{Dictionary, NULL, Object, ObjectId, Stream};
use crate::parser::{Parser, direct_lengths_only};
use crate::pdf::{find_eof_offset, find_startxref, header_version};
use crate::writer::{write_indirect, write_object};
use crate::xref::{XREF_STREAM_KEYS, XrefEntry, XrefIndex, XrefKind, read_xref_chain};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};

const MAX_REFERENCE_DEPTH: usize = 32;
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// How [`Container::serialize`] lays out its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeMode {
    /// Original bytes, then changed objects and a new cross-reference section.
    Incremental,
    /// A fresh file holding every live object.
    Full,
}

/// Serialized bytes plus the offset of every object written by this pass.
#[derive(Debug, Clone)]
pub struct SerializedContainer {
    pub bytes: Vec<u8>,
    pub offsets: BTreeMap<ObjectId, usize>,
}

/// Where a dictionary entry's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Stored directly inside the owning dictionary.
    Inline,
    /// Stored in its own indirect object.
    Indirect(ObjectId),
}

/// In-memory PDF document.
#[derive(Debug, Clone)]
pub struct Container {
    original: Vec<u8>,
    objects: BTreeMap<ObjectId, Object>,
    dirty: BTreeSet<ObjectId>,
    trailer: Dictionary,
    catalog_id: ObjectId,
    xref_kind: XrefKind,
    startxref: usize,
    next_number: u32,
    version: String,
}

impl Container {
    /// Parse a PDF file.
    #[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
    pub fn load(bytes: Vec<u8>) -> Result<Self> {
        let version = header_version(&bytes)?;
        let eof = find_eof_offset(&bytes)?;
        if eof < bytes.len() {
            tracing::debug!(trailing = bytes.len() - eof, "Bytes after the last %%EOF");
        }
        let startxref = find_startxref(&bytes)?;
        let xref = read_xref_chain(&bytes, startxref)?;
        if xref.trailer.contains_key(b"Encrypt") {
            return Err(Error::malformed("encrypted documents are not supported"));
        }

        let mut objects = read_objects(&bytes, &xref)?;
        expand_object_streams(&mut objects, &xref)?;
        objects.retain(|_, object| {
            !object
                .as_dict()
                .is_some_and(|d| d.has_type(b"XRef") || d.has_type(b"ObjStm"))
        });

        let catalog_id = xref
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::malformed("trailer has no /Root reference"))?;
        match objects.get(&catalog_id) {
            Some(Object::Dictionary(_)) => {}
            Some(other) => {
                return Err(Error::malformed(format!(
                    "catalog {catalog_id} is a {}, not a dictionary",
                    other.type_name()
                )));
            }
            None => return Err(Error::malformed(format!("catalog {catalog_id} is missing"))),
        }

        let declared_size = xref
            .trailer
            .get(b"Size")
            .and_then(Object::as_i64)
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0);
        let highest = objects.keys().map(|id| id.number).max().unwrap_or(0);
        let next_number = declared_size.max(highest + 1);

        tracing::debug!(
            objects = objects.len(),
            %catalog_id,
            version = %version,
            kind = ?xref.kind,
            "Loaded container"
        );
        Ok(Self {
            original: bytes,
            objects,
            dirty: BTreeSet::new(),
            trailer: xref.trailer,
            catalog_id,
            xref_kind: xref.kind,
            startxref,
            next_number,
            version,
        })
    }

    /// The bytes this container was loaded from.
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Header version, e.g. `1.7`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn xref_kind(&self) -> XrefKind {
        self.xref_kind
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn catalog_id(&self) -> ObjectId {
        self.catalog_id
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        self.get(self.catalog_id)
            .and_then(Object::as_dict)
            .ok_or_else(|| Error::malformed("catalog is not a dictionary"))
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Follow references; dangling ones resolve to `null`.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        let mut current = object;
        for _ in 0..MAX_REFERENCE_DEPTH {
            match current {
                Object::Reference(id) => current = self.objects.get(id).unwrap_or(&NULL),
                other => return other,
            }
        }
        &NULL
    }

    /// Ids of objects added or updated since load.
    pub fn dirty_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.dirty.iter().copied()
    }

    /// Store a new object under the next unused number.
    pub fn add_object(&mut self, object: impl Into<Object>) -> ObjectId {
        let id = ObjectId::new(self.next_number, 0);
        self.next_number += 1;
        self.objects.insert(id, object.into());
        self.dirty.insert(id);
        id
    }

    /// Replace an existing object; the new revision is written on the next serialize.
    pub fn update_object(&mut self, id: ObjectId, object: impl Into<Object>) -> Result<()> {
        let slot = self
            .objects
            .get_mut(&id)
            .ok_or_else(|| Error::InvalidInput(format!("object {id} does not exist")))?;
        *slot = object.into();
        self.dirty.insert(id);
        Ok(())
    }

    /// Mutable view of a dictionary (or stream dictionary) object, marking it changed.
    pub fn dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary> {
        let object = self
            .objects
            .get_mut(&id)
            .ok_or_else(|| Error::InvalidInput(format!("object {id} does not exist")))?;
        let dict = match object {
            Object::Dictionary(d) => d,
            Object::Stream(s) => &mut s.dict,
            other => {
                return Err(Error::malformed(format!(
                    "object {id} is a {}, expected a dictionary",
                    other.type_name()
                )));
            }
        };
        self.dirty.insert(id);
        Ok(dict)
    }

    pub fn set_catalog_entry(&mut self, key: &[u8], value: impl Into<Object>) -> Result<()> {
        let id = self.catalog_id;
        self.dict_mut(id)?.set(key, value);
        Ok(())
    }

    /// Resolve `owner[key]` to a dictionary, reporting where it is stored.
    pub fn entry_dict(&self, owner: &Dictionary, key: &[u8]) -> Result<Option<(Slot, Dictionary)>> {
        let Some((slot, value)) = self.entry(owner, key) else {
            return Ok(None);
        };
        match value.as_dict() {
            Some(d) => Ok(Some((slot, d.clone()))),
            None => Err(Error::malformed(format!(
                "/{} must be a dictionary, found {}",
                String::from_utf8_lossy(key),
                value.type_name()
            ))),
        }
    }

    /// Resolve `owner[key]` to an array, reporting where it is stored.
    pub fn entry_array(
        &self,
        owner: &Dictionary,
        key: &[u8],
    ) -> Result<Option<(Slot, Vec<Object>)>> {
        let Some((slot, value)) = self.entry(owner, key) else {
            return Ok(None);
        };
        match value.as_array() {
            Some(a) => Ok(Some((slot, a.clone()))),
            None => Err(Error::malformed(format!(
                "/{} must be an array, found {}",
                String::from_utf8_lossy(key),
                value.type_name()
            ))),
        }
    }

    fn entry<'a>(&'a self, owner: &'a Dictionary, key: &[u8]) -> Option<(Slot, &'a Object)> {
        let raw = owner.get(key)?;
        let slot = match raw {
            Object::Reference(id) => Slot::Indirect(*id),
            _ => Slot::Inline,
        };
        match self.resolve(raw) {
            Object::Null => None,
            value => Some((slot, value)),
        }
    }

    /// Write `value` back to where [`Container::entry_dict`] found it.
    pub fn put_entry(
        &mut self,
        owner: ObjectId,
        key: &[u8],
        slot: Slot,
        value: impl Into<Object>,
    ) -> Result<()> {
        match slot {
            Slot::Indirect(id) => self.update_object(id, value),
            Slot::Inline => {
                self.dict_mut(owner)?.set(key, value);
                Ok(())
            }
        }
    }

    /// Page object ids in document order.
    pub fn page_ids(&self) -> Result<Vec<ObjectId>> {
        let root = self
            .catalog()?
            .get(b"Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::malformed("catalog has no /Pages reference"))?;

        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            if depth > MAX_PAGE_TREE_DEPTH || !seen.insert(id) {
                return Err(Error::malformed(format!("page tree loops through {id}")));
            }
            let node = self
                .get(id)
                .and_then(Object::as_dict)
                .ok_or_else(|| {
                    Error::malformed(format!("page tree node {id} is not a dictionary"))
                })?;
            if node.has_type(b"Page") {
                pages.push(id);
                continue;
            }
            let kids = node
                .get(b"Kids")
                .map(|k| self.resolve(k))
                .and_then(Object::as_array)
                .ok_or_else(|| Error::malformed(format!("page tree node {id} has no /Kids")))?;
            for kid in kids.iter().rev() {
                let kid = kid
                    .as_reference()
                    .ok_or_else(|| Error::malformed("page tree kids must be references"))?;
                stack.push((kid, depth + 1));
            }
        }
        Ok(pages)
    }

    /// Decoded data of a stream object.
    pub fn stream_data(&self, id: ObjectId) -> Result<Vec<u8>> {
        self.get(id)
            .and_then(Object::as_stream)
            .ok_or_else(|| Error::malformed(format!("object {id} is not a stream")))?
            .decoded()
    }

    #[tracing::instrument(skip(self), fields(dirty = self.dirty.len()))]
    pub fn serialize(&self, mode: SerializeMode) -> Result<SerializedContainer> {
        match mode {
            SerializeMode::Incremental => self.serialize_incremental(),
            SerializeMode::Full => self.serialize_full(),
        }
    }

    fn serialize_incremental(&self) -> Result<SerializedContainer> {
        let mut offsets = BTreeMap::new();
        if self.dirty.is_empty() {
            return Ok(SerializedContainer {
                bytes: self.original.clone(),
                offsets,
            });
        }

        let mut out = self.original.clone();
        if !out.ends_with(b"\n") && !out.ends_with(b"\r") {
            out.push(b'\n');
        }
        for &id in &self.dirty {
            let object = self.objects.get(&id).unwrap_or(&NULL);
            offsets.insert(id, out.len());
            write_indirect(&mut out, id, object);
        }

        let mut trailer = self.trailer.clone();
        for key in XREF_STREAM_KEYS {
            trailer.remove(key);
        }
        trailer.set(b"Prev", self.startxref);

        let xref_offset = out.len();
        match self.xref_kind {
            XrefKind::Table => {
                trailer.set(b"Size", self.next_number);
                let entries: Vec<(ObjectId, usize)> =
                    offsets.iter().map(|(id, off)| (*id, *off)).collect();
                write_xref_table(&mut out, &entries, false);
                out.extend_from_slice(b"trailer\n");
                write_object(&mut out, &Object::Dictionary(trailer));
                out.push(b'\n');
            }
            XrefKind::Stream => {
                let stream_id = ObjectId::new(self.next_number, 0);
                let mut entries: Vec<(ObjectId, usize)> =
                    offsets.iter().map(|(id, off)| (*id, *off)).collect();
                entries.push((stream_id, xref_offset));
                trailer.set(b"Size", self.next_number + 1);
                let stream = xref_stream(trailer, &entries)?;
                offsets.insert(stream_id, xref_offset);
                write_indirect(&mut out, stream_id, &Object::Stream(stream));
            }
        }
        out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());

        tracing::debug!(
            appended = out.len() - self.original.len(),
            objects = self.dirty.len(),
            "Wrote incremental update"
        );
        Ok(SerializedContainer {
            bytes: out,
            offsets,
        })
    }

    fn serialize_full(&self) -> Result<SerializedContainer> {
        let mut out = format!("%PDF-{}\n%", self.version).into_bytes();
        out.extend_from_slice(&[0xE2, 0xE3, 0xCF, 0xD3, b'\n']);

        let mut offsets = BTreeMap::new();
        for (id, object) in &self.objects {
            offsets.insert(*id, out.len());
            write_indirect(&mut out, *id, object);
        }

        let xref_offset = out.len();
        let entries: Vec<(ObjectId, usize)> = offsets.iter().map(|(id, off)| (*id, *off)).collect();
        write_xref_table(&mut out, &entries, true);

        let mut trailer = Dictionary::new()
            .with("Size", self.next_number)
            .with("Root", self.catalog_id);
        for key in [&b"Info"[..], b"ID"] {
            if let Some(value) = self.trailer.get(key) {
                trailer.set(key, value.clone());
            }
        }
        out.extend_from_slice(b"trailer\n");
        write_object(&mut out, &Object::Dictionary(trailer));
        out.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());

        tracing::debug!(objects = offsets.len(), len = out.len(), "Wrote full document");
        Ok(SerializedContainer {
            bytes: out,
            offsets,
        })
    }
}

fn read_objects(data: &[u8], xref: &XrefIndex) -> Result<BTreeMap<ObjectId, Object>> {
    let length_of = |id: ObjectId| -> Option<i64> {
        match xref.entries.get(&id.number)? {
            XrefEntry::InUse { offset, .. } => {
                let (_, object) = Parser::new(data, *offset)
                    .parse_indirect_object(&direct_lengths_only)
                    .ok()?;
                object.as_i64()
            }
            _ => None,
        }
    };

    let mut objects = BTreeMap::new();
    for (&number, entry) in &xref.entries {
        let XrefEntry::InUse { offset, generation } = *entry else {
            continue;
        };
        if number == 0 {
            continue;
        }
        if offset >= data.len() {
            return Err(Error::malformed(format!(
                "object {number} offset {offset} is past the end of the file"
            )));
        }
        let (id, object) = Parser::new(data, offset)
            .parse_indirect_object(&length_of)
            .map_err(|e| e.within(format!("object {number} {generation} R")))?;
        if id.number != number {
            return Err(Error::malformed(format!(
                "xref entry for object {number} points at object {}",
                id.number
            )));
        }
        objects.insert(id, object);
    }
    Ok(objects)
}

fn expand_object_streams(
    objects: &mut BTreeMap<ObjectId, Object>,
    xref: &XrefIndex,
) -> Result<()> {
    let mut by_stream: BTreeMap<u32, Vec<(u32, u32)>> = BTreeMap::new();
    for (&number, entry) in &xref.entries {
        if let XrefEntry::Compressed { stream, index } = *entry {
            by_stream.entry(stream).or_default().push((number, index));
        }
    }

    for (stream_number, members) in by_stream {
        let stream = objects
            .iter()
            .find(|(id, _)| id.number == stream_number)
            .and_then(|(_, o)| o.as_stream())
            .filter(|s| s.dict.has_type(b"ObjStm"))
            .ok_or_else(|| {
                Error::malformed(format!("object stream {stream_number} is missing"))
            })?;
        let unpacked = unpack_object_stream(stream)
            .map_err(|e| e.within(format!("object stream {stream_number}")))?;
        for (number, index) in members {
            let Some((found, object)) = unpacked.get(index as usize) else {
                return Err(Error::malformed(format!(
                    "object {number} is not inside object stream {stream_number}"
                )));
            };
            if *found != number {
                return Err(Error::malformed(format!(
                    "object stream {stream_number} holds object {found} where {number} was expected"
                )));
            }
            objects.insert(ObjectId::new(number, 0), object.clone());
        }
    }
    Ok(())
}

fn unpack_object_stream(stream: &Stream) -> Result<Vec<(u32, Object)>> {
    let data = stream.decoded()?;
    let int = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .and_then(Object::as_i64)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| {
                Error::malformed(format!("missing /{}", String::from_utf8_lossy(key)))
            })
    };
    let count = int(b"N")?;
    let first = int(b"First")?;

    let mut header = Parser::new(&data, 0);
    let mut positions = Vec::with_capacity(count);
    for _ in 0..count {
        let number = u32::try_from(header.parse_unsigned()?)
            .map_err(|_| Error::malformed("object number out of range"))?;
        let offset = usize::try_from(header.parse_unsigned()?)
            .map_err(|_| Error::malformed("offset out of range"))?;
        positions.push((number, offset));
    }

    positions
        .into_iter()
        .map(|(number, offset)| {
            let object = Parser::new(&data, first + offset).parse_object()?;
            Ok((number, object))
        })
        .collect()
}

/// Classic xref section grouped into runs of consecutive numbers.
fn write_xref_table(out: &mut Vec<u8>, entries: &[(ObjectId, usize)], with_free_head: bool) {
    out.extend_from_slice(b"xref\n");
    let mut rows: Vec<(u32, String)> = entries
        .iter()
        .map(|(id, off)| (id.number, format!("{off:010} {:05} n\r\n", id.generation)))
        .collect();
    if with_free_head {
        rows.insert(0, (0, "0000000000 65535 f\r\n".to_string()));
        // Gaps in a full rewrite become free entries so the table is one run.
        let mut filled = Vec::with_capacity(rows.len());
        let mut expected = 0;
        for (number, row) in rows {
            while expected < number {
                filled.push((expected, "0000000000 00000 f\r\n".to_string()));
                expected += 1;
            }
            filled.push((number, row));
            expected = number + 1;
        }
        rows = filled;
    }

    for run in runs(&rows.iter().map(|(n, _)| *n).collect::<Vec<_>>()) {
        out.extend_from_slice(format!("{} {}\n", run.0, run.1).as_bytes());
        for (_, row) in rows.iter().filter(|(n, _)| *n >= run.0 && *n < run.0 + run.1) {
            out.extend_from_slice(row.as_bytes());
        }
    }
}

/// Uncompressed xref stream with `/W [1 4 2]`.
fn xref_stream(mut dict: Dictionary, entries: &[(ObjectId, usize)]) -> Result<Stream> {
    let mut data = Vec::with_capacity(entries.len() * 7);
    for (id, offset) in entries {
        let offset = u32::try_from(*offset).map_err(|_| {
            Error::ContainerTooComplex("offset does not fit a 4-byte xref stream field".into())
        })?;
        data.push(1);
        data.extend_from_slice(&offset.to_be_bytes());
        data.extend_from_slice(&id.generation.to_be_bytes());
    }
    let numbers: Vec<u32> = entries.iter().map(|(id, _)| id.number).collect();
    let index: Vec<Object> = runs(&numbers)
        .into_iter()
        .flat_map(|(first, count)| [Object::from(first), Object::from(count)])
        .collect();
    dict.set(b"Type", Object::name("XRef"));
    dict.set(b"W", vec![Object::from(1), Object::from(4), Object::from(2)]);
    dict.set(b"Index", index);
    Ok(Stream::new(dict, data))
}

/// `(first, count)` pairs covering sorted numbers.
fn runs(numbers: &[u32]) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &n in numbers {
        match runs.last_mut() {
            Some((first, count)) if *first + *count == n => *count += 1,
            _ => runs.push((n, 1)),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn loads_classic_fixture() {
        let container = Container::load(fixtures::minimal_pdf()).unwrap();
        assert_eq!(container.version(), "1.7");
        assert_eq!(container.xref_kind(), XrefKind::Table);
        assert!(container.catalog().unwrap().has_type(b"Catalog"));
        assert_eq!(container.page_ids().unwrap(), vec![ObjectId::new(3, 0)]);
    }

    #[test]
    fn loads_object_streams() {
        let container = Container::load(fixtures::object_stream_pdf()).unwrap();
        assert_eq!(container.xref_kind(), XrefKind::Stream);
        assert_eq!(container.page_ids().unwrap(), vec![ObjectId::new(3, 0)]);
        // The object stream itself is not kept as a live object.
        assert!(container.get(ObjectId::new(5, 0)).is_none());
    }

    #[test]
    fn loads_hybrid_reference_files() {
        let original = fixtures::hybrid_pdf();
        let mut container = Container::load(original.clone()).unwrap();
        assert_eq!(container.xref_kind(), XrefKind::Table);
        assert_eq!(container.page_ids().unwrap(), vec![ObjectId::new(3, 0)]);
        assert!(container.get(ObjectId::new(6, 0)).is_none());

        // The packed objects stay reachable through /Prev after an update.
        container.set_catalog_entry(b"Lang", Object::string("it-IT")).unwrap();
        let out = container.serialize(SerializeMode::Incremental).unwrap();
        assert!(out.bytes.starts_with(&original));
        let reloaded = Container::load(out.bytes).unwrap();
        assert_eq!(reloaded.page_ids().unwrap(), vec![ObjectId::new(3, 0)]);
    }

    #[test]
    fn rejects_garbage_and_missing_catalog() {
        assert!(matches!(
            Container::load(b"hello world".to_vec()),
            Err(Error::MalformedContainer(_))
        ));
        let no_root = fixtures::build_pdf(&[(1, "<< /Type /Catalog >>")], "");
        assert!(matches!(
            Container::load(no_root),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn rejects_encrypted_documents() {
        let pdf = fixtures::build_pdf(
            &[(1, "<< /Type /Catalog >>")],
            "/Root 1 0 R /Encrypt << /Filter /Standard >>",
        );
        let err = Container::load(pdf).unwrap_err();
        assert!(err.to_string().contains("encrypted"));
    }

    #[test]
    fn add_object_never_reuses_numbers() {
        let mut container = Container::load(fixtures::minimal_pdf()).unwrap();
        let before: Vec<ObjectId> = container.objects.keys().copied().collect();
        let a = container.add_object(Object::Integer(1));
        let b = container.add_object(Object::Integer(2));
        assert!(!before.contains(&a) && !before.contains(&b));
        assert_eq!(b.number, a.number + 1);
    }

    #[test]
    fn update_requires_existing_object() {
        let mut container = Container::load(fixtures::minimal_pdf()).unwrap();
        assert!(container.update_object(ObjectId::new(99, 0), Object::Null).is_err());
        container
            .update_object(ObjectId::new(4, 0), Object::Null)
            .unwrap();
        assert_eq!(container.dirty_ids().collect::<Vec<_>>(), vec![ObjectId::new(4, 0)]);
    }

    #[test]
    fn unchanged_container_serializes_to_original() {
        let original = fixtures::minimal_pdf();
        let container = Container::load(original.clone()).unwrap();
        let out = container.serialize(SerializeMode::Incremental).unwrap();
        assert_eq!(out.bytes, original);
        assert!(out.offsets.is_empty());
    }

    #[test]
    fn incremental_update_keeps_prefix_and_reloads() {
        let original = fixtures::minimal_pdf();
        let mut container = Container::load(original.clone()).unwrap();
        let id = container.add_object(Object::text("hello"));
        container.set_catalog_entry(b"Extra", id).unwrap();

        let out = container.serialize(SerializeMode::Incremental).unwrap();
        assert!(out.bytes.starts_with(&original));
        let offset = out.offsets[&id];
        assert!(out.bytes[offset..].starts_with(format!("{} 0 obj", id.number).as_bytes()));

        let reloaded = Container::load(out.bytes).unwrap();
        let extra = reloaded.catalog().unwrap().get(b"Extra").unwrap();
        assert_eq!(reloaded.resolve(extra), &Object::text("hello"));
        assert_eq!(
            reloaded.trailer().get(b"Prev").and_then(Object::as_i64),
            Some(container.startxref as i64)
        );
    }

    #[test]
    fn incremental_update_of_xref_stream_file_uses_xref_stream() {
        let original = fixtures::object_stream_pdf();
        let mut container = Container::load(original.clone()).unwrap();
        container.set_catalog_entry(b"Lang", Object::string("it-IT")).unwrap();

        let out = container.serialize(SerializeMode::Incremental).unwrap();
        assert!(out.bytes.starts_with(&original));
        let reloaded = Container::load(out.bytes).unwrap();
        assert_eq!(reloaded.xref_kind(), XrefKind::Stream);
        assert_eq!(
            reloaded.catalog().unwrap().get(b"Lang"),
            Some(&Object::string("it-IT"))
        );
        assert_eq!(reloaded.page_ids().unwrap(), vec![ObjectId::new(3, 0)]);
    }

    #[test]
    fn full_rewrite_round_trips() {
        let mut container = Container::load(fixtures::object_stream_pdf()).unwrap();
        container.set_catalog_entry(b"Lang", Object::string("it-IT")).unwrap();
        let out = container.serialize(SerializeMode::Full).unwrap();
        assert!(out.bytes.starts_with(b"%PDF-1.7\n"));

        let reloaded = Container::load(out.bytes).unwrap();
        assert_eq!(reloaded.xref_kind(), XrefKind::Table);
        assert!(!reloaded.trailer().contains_key(b"Prev"));
        assert_eq!(reloaded.page_ids().unwrap(), vec![ObjectId::new(3, 0)]);
        assert_eq!(
            reloaded.catalog().unwrap().get(b"Lang"),
            Some(&Object::string("it-IT"))
        );
    }

    #[test]
    fn entry_slots_report_storage() {
        let mut container = Container::load(fixtures::minimal_pdf()).unwrap();
        let names = container.add_object(Dictionary::new().with("Dests", Dictionary::new()));
        container.set_catalog_entry(b"Names", names).unwrap();
        container
            .set_catalog_entry(b"Inline", Dictionary::new())
            .unwrap();

        let catalog = container.catalog().unwrap().clone();
        let (slot, _) = container.entry_dict(&catalog, b"Names").unwrap().unwrap();
        assert_eq!(slot, Slot::Indirect(names));
        let (slot, _) = container.entry_dict(&catalog, b"Inline").unwrap().unwrap();
        assert_eq!(slot, Slot::Inline);
        assert!(container.entry_dict(&catalog, b"Missing").unwrap().is_none());
        assert!(container.entry_array(&catalog, b"Inline").is_err());
    }

    #[test]
    fn runs_group_consecutive_numbers() {
        assert_eq!(runs(&[1, 2, 3, 7, 8, 10]), vec![(1, 3), (7, 2), (10, 1)]);
        assert!(runs(&[]).is_empty());
    }
}
