//! Byte-level scanning helpers for PDF files.

use crate::{Error, Result};

/// Find the offset immediately after the last `%%EOF` marker in the PDF.
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn find_eof_offset(data: &[u8]) -> Result<usize> {
    rfind_subslice(data, b"%%EOF")
        .map(|pos| pos + 5)
        .ok_or_else(|| Error::malformed("PDF does not contain %%EOF marker"))
}

/// Read the byte offset recorded after the last `startxref` keyword.
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let pos = rfind_subslice(data, b"startxref")
        .ok_or_else(|| Error::malformed("PDF does not contain startxref"))?;
    let digits: String = data[pos + b"startxref".len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();
    let offset: usize = digits
        .parse()
        .map_err(|_| Error::malformed("startxref is not followed by an offset"))?;
    if offset >= data.len() {
        return Err(Error::malformed(format!(
            "startxref offset {offset} is past the end of the file"
        )));
    }
    Ok(offset)
}

/// Header version (`1.7` for `%PDF-1.7`), searched in the first kilobyte.
pub fn header_version(data: &[u8]) -> Result<String> {
    let window = &data[..data.len().min(1024)];
    let pos = find_subslice(window, b"%PDF-", 0)
        .ok_or_else(|| Error::malformed("missing %PDF- header"))?;
    let version: String = window[pos + 5..]
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .map(|&b| b as char)
        .collect();
    if version.is_empty() {
        return Err(Error::malformed("header carries no version"));
    }
    Ok(version)
}

pub fn find_subslice(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start + pos)
}

pub fn rfind_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_eof_marker() {
        let pdf = b"%PDF-1.4\n...content...%%EOF";
        assert_eq!(find_eof_offset(pdf).unwrap(), pdf.len());
    }

    #[test]
    fn finds_last_eof_when_multiple() {
        let pdf = b"%PDF-1.4\n%%EOF\nextra%%EOF";
        assert_eq!(find_eof_offset(pdf).unwrap(), pdf.len());
    }

    #[test]
    fn reads_last_startxref() {
        let pdf = b"%PDF-1.4\nstartxref\n3\n%%EOF\nmore\nstartxref\r\n12\n%%EOF\n";
        assert_eq!(find_startxref(pdf).unwrap(), 12);
    }

    #[test]
    fn rejects_startxref_past_end() {
        let pdf = b"%PDF-1.4\nstartxref\n99999\n%%EOF";
        assert!(matches!(
            find_startxref(pdf),
            Err(Error::MalformedContainer(_))
        ));
    }

    #[test]
    fn parses_header_version() {
        assert_eq!(header_version(b"%PDF-1.7\n%\xE2\xE3").unwrap(), "1.7");
        assert!(header_version(b"hello").is_err());
    }
}
