//! In-memory PDF object model.

use chrono::{DateTime, Utc};
use std::fmt;

/// Indirect object identifier (`<number> <generation> R`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub const fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// How a string was (or should be) written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Literal,
    Hexadecimal,
}

/// A PDF object value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Vec<u8>),
    String(Vec<u8>, StringFormat),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

pub(crate) static NULL: Object = Object::Null;

impl Object {
    pub fn name(name: impl AsRef<[u8]>) -> Self {
        Object::Name(name.as_ref().to_vec())
    }

    pub fn string(bytes: impl AsRef<[u8]>) -> Self {
        Object::String(bytes.as_ref().to_vec(), StringFormat::Literal)
    }

    pub fn hex_string(bytes: impl AsRef<[u8]>) -> Self {
        Object::String(bytes.as_ref().to_vec(), StringFormat::Hexadecimal)
    }

    /// Text string: plain bytes for printable ASCII, UTF-8 with BOM otherwise.
    pub fn text(text: &str) -> Self {
        Object::String(encode_text_string(text), StringFormat::Literal)
    }

    /// PDF date string (`D:YYYYMMDDHHmmSS+00'00'`).
    pub fn date(at: DateTime<Utc>) -> Self {
        Object::string(at.format("D:%Y%m%d%H%M%S+00'00'").to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Integer(_) => "integer",
            Object::Real(_) => "real",
            Object::Name(_) => "name",
            Object::String(..) => "string",
            Object::Array(_) => "array",
            Object::Dictionary(_) => "dictionary",
            Object::Stream(_) => "stream",
            Object::Reference(_) => "reference",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&[u8]> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string_bytes(&self) -> Option<&[u8]> {
        match self {
            Object::String(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary view; a stream yields its stream dictionary.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Object {
    fn from(v: bool) -> Self {
        Object::Boolean(v)
    }
}

impl From<i64> for Object {
    fn from(v: i64) -> Self {
        Object::Integer(v)
    }
}

impl From<i32> for Object {
    fn from(v: i32) -> Self {
        Object::Integer(i64::from(v))
    }
}

impl From<u32> for Object {
    fn from(v: u32) -> Self {
        Object::Integer(i64::from(v))
    }
}

impl From<usize> for Object {
    fn from(v: usize) -> Self {
        Object::Integer(v as i64)
    }
}

impl From<ObjectId> for Object {
    fn from(id: ObjectId) -> Self {
        Object::Reference(id)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl From<Stream> for Object {
    fn from(s: Stream) -> Self {
        Object::Stream(s)
    }
}

impl From<Vec<Object>> for Object {
    fn from(a: Vec<Object>) -> Self {
        Object::Array(a)
    }
}

/// Insertion-ordered dictionary keyed by name bytes (without the `/`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(Vec<(Vec<u8>, Object)>);

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Object> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace, keeping the original position of an existing key.
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl Into<Object>) {
        let key = key.as_ref();
        let value = value.into();
        match self.get_mut(key) {
            Some(slot) => *slot = value,
            None => self.0.push((key.to_vec(), value)),
        }
    }

    /// Builder-style [`Dictionary::set`].
    pub fn with(mut self, key: impl AsRef<[u8]>, value: impl Into<Object>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Object)> {
        self.0.iter().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_name(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key).and_then(Object::as_name)
    }

    /// True when `/Type` equals `ty`.
    pub fn has_type(&self, ty: &[u8]) -> bool {
        self.get_name(b"Type") == Some(ty)
    }
}

/// Stream object: dictionary plus raw (still encoded) data.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    pub data: Vec<u8>,
}

impl Stream {
    pub fn new(dict: Dictionary, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    /// Build a `FlateDecode` stream from plain bytes.
    pub fn flate(mut dict: Dictionary, plain: &[u8]) -> crate::Result<Self> {
        let data = crate::filters::flate_encode(plain)?;
        dict.set(b"Filter", Object::name("FlateDecode"));
        dict.remove(b"DecodeParms");
        Ok(Self { dict, data })
    }

    /// Data with all filters removed.
    pub fn decoded(&self) -> crate::Result<Vec<u8>> {
        crate::filters::decode_stream(self)
    }
}

/// Encode text for a PDF text string.
///
/// Printable ASCII stays as-is; anything else is UTF-8 prefixed with a BOM.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xEF, 0xBB, 0xBF];
    out.extend_from_slice(text.as_bytes());
    out
}

/// Decode a PDF text string (UTF-16BE or UTF-8 with BOM, else byte-per-char).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dictionary_set_keeps_position() {
        let mut d = Dictionary::new()
            .with("Type", Object::name("Catalog"))
            .with("Pages", ObjectId::new(2, 0));
        d.set("Type", Object::name("Other"));
        let keys: Vec<_> = d.iter().map(|(k, _)| k.to_vec()).collect();
        assert_eq!(keys, vec![b"Type".to_vec(), b"Pages".to_vec()]);
        assert!(d.has_type(b"Other"));
    }

    #[test]
    fn text_strings_round_trip() {
        assert_eq!(encode_text_string("cda.xml"), b"cda.xml");
        let encoded = encode_text_string("referto-è.xml");
        assert!(encoded.starts_with(&[0xEF, 0xBB, 0xBF]));
        assert_eq!(decode_text_string(&encoded), "referto-è.xml");
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x41]), "A");
    }

    #[test]
    fn date_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(
            Object::date(at),
            Object::string("D:20240305070809+00'00'")
        );
    }
}
