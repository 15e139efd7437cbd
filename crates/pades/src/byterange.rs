//! `/ByteRange` computation and `/Contents` patching.

use crate::placeholder::{PlaceholderRef, ReservedSignature};
use fse_core::{Error, Result, SerializeMode, find_subslice};
use std::ops::Range;

/// The two signed spans and the hex region between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteRangeDescriptor {
    /// `[0, '<')` and `('>', len)`: everything but the `/Contents` hex string.
    pub spans: [Range<usize>; 2],
    /// Hex digits between the angle brackets.
    pub contents: Range<usize>,
    /// Reserved signature size in bytes (half the hex digit count).
    pub capacity: usize,
}

impl ByteRangeDescriptor {
    /// `[offset1 length1 offset2 length2]` as written into `/ByteRange`.
    pub fn as_array(&self) -> [usize; 4] {
        let [a, b] = &self.spans;
        [a.start, a.len(), b.start, b.len()]
    }

    /// Slices of `bytes` covered by the signature.
    pub fn covered<'a>(&self, bytes: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        let spans = self.spans.clone();
        spans.into_iter().map(move |span| &bytes[span])
    }

    pub fn covered_len(&self) -> usize {
        self.spans.iter().map(|s| s.len()).sum()
    }
}

/// Final bytes with spans fixed and the placeholder still zeroed.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub(crate) bytes: Vec<u8>,
    pub(crate) descriptor: ByteRangeDescriptor,
    pub(crate) placeholder: PlaceholderRef,
    pub(crate) field_name: String,
}

impl PreparedDocument {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn descriptor(&self) -> &ByteRangeDescriptor {
        &self.descriptor
    }

    pub fn placeholder(&self) -> PlaceholderRef {
        self.placeholder
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }
}

/// Serialize the reserved container and fix the `/ByteRange` in place.
///
/// This is the last structural step: any later change to the bytes outside
/// `/Contents` invalidates the spans.
#[tracing::instrument(skip(reserved), fields(field = %reserved.field_name))]
pub fn finalize_byte_range(reserved: ReservedSignature) -> Result<PreparedDocument> {
    let ReservedSignature {
        container,
        placeholder,
        field_name,
    } = reserved;
    let serialized = container.serialize(SerializeMode::Incremental)?;
    let mut bytes = serialized.bytes;

    let object_start = *serialized.offsets.get(&placeholder.signature).ok_or_else(|| {
        Error::ContainerTooComplex("signature dictionary was not written".into())
    })?;
    let object_end = find_subslice(&bytes, b"endobj", object_start)
        .ok_or_else(|| Error::ContainerTooComplex("signature object is not terminated".into()))?;

    let contents_key = find_within(&bytes, b"/Contents <", object_start, object_end)?;
    let lt = contents_key + b"/Contents ".len();
    let gt = find_within(&bytes, b">", lt, object_end)?;
    let digits = gt - lt - 1;
    if digits != placeholder.reserved_size * 2 {
        return Err(Error::ContainerTooComplex(format!(
            "placeholder holds {digits} hex digits, expected {}",
            placeholder.reserved_size * 2
        )));
    }

    let range_key = find_within(&bytes, b"/ByteRange [", object_start, object_end)?;
    let open = range_key + b"/ByteRange ".len();
    let close = find_within(&bytes, b"]", open, object_end)?;

    let descriptor = ByteRangeDescriptor {
        spans: [0..lt, gt + 1..bytes.len()],
        contents: lt + 1..gt,
        capacity: placeholder.reserved_size,
    };
    let [o1, l1, o2, l2] = descriptor.as_array();
    let text = format!("[{o1} {l1} {o2} {l2}");
    let width = close - open;
    if text.len() > width {
        return Err(Error::ContainerTooComplex(format!(
            "byte range {text}] does not fit the {width}-byte placeholder"
        )));
    }
    bytes[open..open + text.len()].copy_from_slice(text.as_bytes());
    bytes[open + text.len()..close].fill(b' ');

    tracing::debug!(
        byte_range = ?descriptor.as_array(),
        contents_offset = lt,
        "Fixed signature byte range"
    );
    Ok(PreparedDocument {
        bytes,
        descriptor,
        placeholder,
        field_name,
    })
}

fn find_within(bytes: &[u8], needle: &[u8], from: usize, to: usize) -> Result<usize> {
    find_subslice(&bytes[..to], needle, from).ok_or_else(|| {
        Error::ContainerTooComplex(format!(
            "'{}' not found in the signature dictionary",
            String::from_utf8_lossy(needle)
        ))
    })
}

/// Hex-encode `signature` into the reserved `/Contents`, padding with `0`.
pub fn embed_signature(
    bytes: &mut [u8],
    descriptor: &ByteRangeDescriptor,
    signature: &[u8],
) -> Result<()> {
    if signature.len() > descriptor.capacity {
        return Err(Error::SignatureTooLarge {
            required: signature.len(),
            reserved: descriptor.capacity,
        });
    }
    let encoded = hex::encode_upper(signature);
    let region = &mut bytes[descriptor.contents.clone()];
    region[..encoded.len()].copy_from_slice(encoded.as_bytes());
    region[encoded.len()..].fill(b'0');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::{SignatureOptions, reserve_placeholder};
    use fse_core::{Container, fixtures};

    fn prepared(reserved_size: usize) -> (Vec<u8>, PreparedDocument) {
        let original = fixtures::minimal_pdf();
        let container = Container::load(original.clone()).unwrap();
        let options = SignatureOptions {
            reserved_size,
            ..SignatureOptions::default()
        };
        let reserved = reserve_placeholder(container, &options).unwrap();
        (original, finalize_byte_range(reserved).unwrap())
    }

    #[test]
    fn spans_exclude_exactly_the_hex_string() {
        let (original, doc) = prepared(8192);
        let bytes = doc.bytes();
        let d = doc.descriptor();

        assert!(bytes.starts_with(&original));
        assert_eq!(d.spans[0].start, 0);
        assert_eq!(bytes[d.spans[0].end], b'<');
        assert_eq!(bytes[d.spans[1].start - 1], b'>');
        assert_eq!(d.spans[1].end, bytes.len());
        assert_eq!(d.covered_len() + 8192 * 2 + 2, bytes.len());
        assert!(bytes[d.contents.clone()].iter().all(|&b| b == b'0'));
    }

    #[test]
    fn byte_range_text_is_patched_in_place() {
        let (_, doc) = prepared(64);
        let bytes = doc.bytes();
        let [o1, l1, o2, l2] = doc.descriptor().as_array();
        let expected = format!("/ByteRange [{o1} {l1} {o2} {l2}");
        let at = find_subslice(bytes, expected.as_bytes(), 0).unwrap();
        let close = find_subslice(bytes, b"]", at).unwrap();
        assert!(bytes[at + expected.len()..close].iter().all(|&b| b == b' '));
        assert!(find_subslice(bytes, b"9999999999", 0).is_none());
    }

    #[test]
    fn signature_larger_than_reservation_is_rejected() {
        let (_, doc) = prepared(16);
        let mut bytes = doc.bytes().to_vec();
        let err = embed_signature(&mut bytes, doc.descriptor(), &[0xAB; 17]).unwrap_err();
        assert!(matches!(
            err,
            Error::SignatureTooLarge {
                required: 17,
                reserved: 16
            }
        ));
        assert_eq!(bytes, doc.bytes());
    }

    #[test]
    fn short_signature_is_zero_padded() {
        let (_, doc) = prepared(16);
        let mut bytes = doc.bytes().to_vec();
        embed_signature(&mut bytes, doc.descriptor(), &[0xAB, 0x01]).unwrap();
        let region = &bytes[doc.descriptor().contents.clone()];
        assert_eq!(&region[..4], b"AB01");
        assert!(region[4..].iter().all(|&b| b == b'0'));
        assert_eq!(bytes.len(), doc.bytes().len());
    }
}
