//! Cross-reference tables, xref streams and `/Prev` chains.

use crate::object::{Dictionary, Object};
use crate::parser::{Parser, direct_lengths_only};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};

/// Where an object lives in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free,
    InUse { offset: usize, generation: u16 },
    Compressed { stream: u32, index: u32 },
}

/// Which syntax the newest cross-reference section uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    Table,
    Stream,
}

/// Merged view over every section of the `/Prev` chain.
#[derive(Debug, Clone)]
pub struct XrefIndex {
    pub entries: BTreeMap<u32, XrefEntry>,
    pub trailer: Dictionary,
    pub kind: XrefKind,
    pub startxref: usize,
}

/// Keys that describe an xref stream rather than the document.
pub(crate) const XREF_STREAM_KEYS: &[&[u8]] = &[
    b"Type",
    b"W",
    b"Index",
    b"Filter",
    b"DecodeParms",
    b"Length",
    b"Prev",
    b"XRefStm",
];

/// Read every cross-reference section, newest first; newer entries win.
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn read_xref_chain(data: &[u8], startxref: usize) -> Result<XrefIndex> {
    let mut entries = BTreeMap::new();
    let mut trailer: Option<Dictionary> = None;
    let mut kind = None;
    let mut visited = HashSet::new();
    let mut next = Some(startxref);

    while let Some(offset) = next {
        if !visited.insert(offset) {
            return Err(Error::malformed(format!(
                "cross-reference chain loops back to offset {offset}"
            )));
        }
        let section = read_section(data, offset)?;
        kind.get_or_insert(section.kind);

        // A hybrid file's table points at an xref stream locating the
        // objects the table leaves out or marks free; in-use rows win.
        let hybrid = section
            .trailer
            .get(b"XRefStm")
            .and_then(Object::as_i64)
            .and_then(|o| usize::try_from(o).ok());
        let mut section_entries = section.entries;
        if let Some(stm) = hybrid
            && visited.insert(stm)
        {
            for (number, entry) in read_section(data, stm)?.entries {
                match section_entries.get(&number) {
                    None | Some(XrefEntry::Free) => {
                        section_entries.insert(number, entry);
                    }
                    Some(_) => {}
                }
            }
        }
        for (number, entry) in section_entries {
            entries.entry(number).or_insert(entry);
        }

        next = section
            .trailer
            .get(b"Prev")
            .and_then(Object::as_i64)
            .and_then(|o| usize::try_from(o).ok());

        match trailer.as_mut() {
            None => trailer = Some(section.trailer),
            Some(newest) => {
                for (key, value) in section.trailer.iter() {
                    if !newest.contains_key(key) && !XREF_STREAM_KEYS.contains(&key) {
                        newest.set(key, value.clone());
                    }
                }
            }
        }
    }

    let trailer = trailer.ok_or_else(|| Error::malformed("no trailer found"))?;
    tracing::debug!(
        entries = entries.len(),
        sections = visited.len(),
        "Read cross-reference chain"
    );
    Ok(XrefIndex {
        entries,
        trailer,
        kind: kind.unwrap_or(XrefKind::Table),
        startxref,
    })
}

struct Section {
    entries: BTreeMap<u32, XrefEntry>,
    trailer: Dictionary,
    kind: XrefKind,
}

fn read_section(data: &[u8], offset: usize) -> Result<Section> {
    let mut parser = Parser::new(data, offset);
    parser.skip_whitespace();
    if parser.starts_with(b"xref") {
        read_table(&mut parser)
    } else {
        read_stream(data, offset)
    }
}

fn read_table(parser: &mut Parser<'_>) -> Result<Section> {
    parser.expect_keyword(b"xref")?;
    let mut entries = BTreeMap::new();
    loop {
        parser.skip_whitespace();
        if parser.starts_with(b"trailer") {
            break;
        }
        let first = parser.parse_unsigned()?;
        let count = parser.parse_unsigned()?;
        for i in 0..count {
            let offset = parser.parse_unsigned()?;
            let generation = parser.parse_unsigned()?;
            parser.skip_whitespace();
            let entry = if parser.starts_with(b"n") {
                XrefEntry::InUse {
                    offset: usize::try_from(offset)
                        .map_err(|_| Error::malformed("xref offset out of range"))?,
                    generation: u16::try_from(generation).unwrap_or(u16::MAX),
                }
            } else if parser.starts_with(b"f") {
                XrefEntry::Free
            } else {
                return Err(Error::malformed(format!(
                    "xref entry type must be 'n' or 'f' at offset {}",
                    parser.pos()
                )));
            };
            parser.expect_keyword(if entry == XrefEntry::Free { b"f" } else { b"n" })?;
            let number = u32::try_from(first + i)
                .map_err(|_| Error::malformed("object number out of range"))?;
            entries.insert(number, entry);
        }
    }
    parser.expect_keyword(b"trailer")?;
    let trailer = parser.parse_dictionary()?;
    Ok(Section {
        entries,
        trailer,
        kind: XrefKind::Table,
    })
}

fn read_stream(data: &[u8], offset: usize) -> Result<Section> {
    let (_, object) = Parser::new(data, offset).parse_indirect_object(&direct_lengths_only)?;
    let stream = match object {
        Object::Stream(s) if s.dict.has_type(b"XRef") => s,
        other => {
            return Err(Error::malformed(format!(
                "startxref points at a {} instead of a cross-reference section",
                other.type_name()
            )));
        }
    };
    let decoded = stream.decoded()?;
    let dict = &stream.dict;

    let widths: Vec<usize> = dict
        .get(b"W")
        .and_then(Object::as_array)
        .ok_or_else(|| Error::malformed("xref stream without /W"))?
        .iter()
        .map(|w| w.as_i64().and_then(|v| usize::try_from(v).ok()))
        .collect::<Option<_>>()
        .filter(|w: &Vec<usize>| w.len() == 3 && w.iter().all(|&x| x <= 8))
        .ok_or_else(|| Error::malformed("xref stream /W must hold three small integers"))?;
    let size = dict
        .get(b"Size")
        .and_then(Object::as_i64)
        .ok_or_else(|| Error::malformed("xref stream without /Size"))?;
    let index: Vec<i64> = match dict.get(b"Index").and_then(Object::as_array) {
        Some(items) => items.iter().filter_map(Object::as_i64).collect(),
        None => vec![0, size],
    };

    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(Error::malformed("xref stream rows are empty"));
    }
    let mut rows = decoded.chunks_exact(row_len);
    let mut entries = BTreeMap::new();
    for pair in index.chunks_exact(2) {
        let (first, count) = (pair[0], pair[1]);
        for i in 0..count {
            let Some(row) = rows.next() else {
                return Err(Error::malformed("xref stream shorter than its /Index"));
            };
            let (a, rest) = row.split_at(widths[0]);
            let (b, c) = rest.split_at(widths[1]);
            // Missing first field means type 1.
            let kind = if widths[0] == 0 { 1 } else { be_uint(a) };
            let (field2, field3) = (be_uint(b), be_uint(c));
            let entry = match kind {
                0 => XrefEntry::Free,
                1 => XrefEntry::InUse {
                    offset: usize::try_from(field2)
                        .map_err(|_| Error::malformed("xref offset out of range"))?,
                    generation: u16::try_from(field3).unwrap_or(u16::MAX),
                },
                2 => XrefEntry::Compressed {
                    stream: u32::try_from(field2)
                        .map_err(|_| Error::malformed("object stream number out of range"))?,
                    index: u32::try_from(field3)
                        .map_err(|_| Error::malformed("object stream index out of range"))?,
                },
                // Unknown types are references to the null object.
                _ => XrefEntry::Free,
            };
            let number = u32::try_from(first + i)
                .map_err(|_| Error::malformed("object number out of range"))?;
            entries.insert(number, entry);
        }
    }

    let mut trailer = stream.dict.clone();
    for key in XREF_STREAM_KEYS.iter().filter(|k| **k != &b"Prev"[..]) {
        trailer.remove(key);
    }
    Ok(Section {
        entries,
        trailer,
        kind: XrefKind::Stream,
    })
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| acc << 8 | u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_classic_table_and_trailer() {
        let pdf = b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n\
            xref\n0 2\n0000000000 65535 f\r\n0000000009 00000 n\r\n\
            trailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n30\n%%EOF\n";
        let xref = read_xref_chain(pdf, 30).unwrap();
        assert_eq!(xref.kind, XrefKind::Table);
        assert_eq!(
            xref.entries.get(&1),
            Some(&XrefEntry::InUse {
                offset: 9,
                generation: 0
            })
        );
        assert_eq!(xref.entries.get(&0), Some(&XrefEntry::Free));
        assert!(xref.trailer.contains_key(b"Root"));
    }

    #[test]
    fn reads_uncompressed_xref_stream() {
        // Entries for objects 0..3: free, in use at 15, compressed in 5 at index 1.
        let mut rows = vec![0u8, 0, 0, 0xFF];
        rows.extend_from_slice(&[1, 0, 15, 0]);
        rows.extend_from_slice(&[2, 0, 5, 1]);
        let mut pdf = b"%PDF-1.5\n".to_vec();
        let offset = pdf.len();
        pdf.extend_from_slice(
            format!(
                "9 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Root 1 0 R /Length {} >>\nstream\n",
                rows.len()
            )
            .as_bytes(),
        );
        pdf.extend_from_slice(&rows);
        pdf.extend_from_slice(b"\nendstream\nendobj\n");

        let xref = read_xref_chain(&pdf, offset).unwrap();
        assert_eq!(xref.kind, XrefKind::Stream);
        assert_eq!(
            xref.entries.get(&1),
            Some(&XrefEntry::InUse {
                offset: 15,
                generation: 0
            })
        );
        assert_eq!(
            xref.entries.get(&2),
            Some(&XrefEntry::Compressed {
                stream: 5,
                index: 1
            })
        );
        assert!(xref.trailer.contains_key(b"Root"));
        assert!(!xref.trailer.contains_key(b"W"));
    }

    #[test]
    fn hybrid_stream_locates_objects_the_table_marks_free() {
        let pdf = crate::fixtures::hybrid_pdf();
        let startxref = crate::pdf::find_startxref(&pdf).unwrap();
        let xref = read_xref_chain(&pdf, startxref).unwrap();

        assert_eq!(xref.kind, XrefKind::Table);
        assert_eq!(
            xref.entries.get(&2),
            Some(&XrefEntry::Compressed {
                stream: 5,
                index: 0
            })
        );
        assert_eq!(
            xref.entries.get(&3),
            Some(&XrefEntry::Compressed {
                stream: 5,
                index: 1
            })
        );
        assert!(matches!(xref.entries.get(&1), Some(XrefEntry::InUse { .. })));
        assert_eq!(xref.entries.get(&0), Some(&XrefEntry::Free));
        assert!(!xref.trailer.contains_key(b"W"));
    }

    #[test]
    fn newer_sections_win_across_prev() {
        let mut pdf = crate::fixtures::minimal_pdf();
        let base = crate::pdf::find_startxref(&pdf).unwrap();
        let replaced = pdf.len();
        pdf.extend_from_slice(b"4 0 obj\n<< /Length 0 >>\nstream\n\nendstream\nendobj\n");
        let table = pdf.len();
        pdf.extend_from_slice(
            format!(
                "xref\n3 2\n0000000000 00000 f\r\n{replaced:010} 00000 n\r\n\
                 trailer\n<< /Size 5 /Root 1 0 R /Prev {base} >>\nstartxref\n{table}\n%%EOF\n"
            )
            .as_bytes(),
        );

        let xref = read_xref_chain(&pdf, table).unwrap();
        assert_eq!(
            xref.entries.get(&4),
            Some(&XrefEntry::InUse {
                offset: replaced,
                generation: 0
            })
        );
        // Freed in the update even though the base table has it in use.
        assert_eq!(xref.entries.get(&3), Some(&XrefEntry::Free));
        // Untouched objects still come from the base section.
        assert!(matches!(xref.entries.get(&1), Some(XrefEntry::InUse { .. })));
    }

    #[test]
    fn detects_prev_loops() {
        let pdf = b"xref\n0 1\n0000000000 65535 f\r\ntrailer\n<< /Size 1 /Prev 0 >>\n";
        assert!(matches!(
            read_xref_chain(pdf, 0),
            Err(Error::MalformedContainer(_))
        ));
    }
}
