//! Tokenizer and object parser over a byte slice.

use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};
use crate::pdf::find_subslice;
use crate::{Error, Result};

const MAX_DEPTH: usize = 64;

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Resolves the value of an indirect `/Length`.
pub(crate) type LengthResolver<'r> = &'r dyn Fn(ObjectId) -> Option<i64>;

/// Resolver for contexts where `/Length` must be a direct integer.
pub(crate) fn direct_lengths_only(_: ObjectId) -> Option<i64> {
    None
}

pub(crate) struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn next_byte(&mut self) -> Result<u8> {
        let b = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of data"))?;
        self.pos += 1;
        Ok(b)
    }

    fn error(&self, msg: &str) -> Error {
        Error::malformed(format!("{msg} at offset {}", self.pos))
    }

    pub fn starts_with(&self, s: &[u8]) -> bool {
        self.data[self.pos..].starts_with(s)
    }

    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn read_regular_token(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(is_regular) {
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    pub fn expect_keyword(&mut self, keyword: &[u8]) -> Result<()> {
        self.skip_whitespace();
        let token = self.read_regular_token();
        if token != keyword {
            return Err(self.error(&format!(
                "expected '{}', found '{}'",
                String::from_utf8_lossy(keyword),
                String::from_utf8_lossy(token)
            )));
        }
        Ok(())
    }

    pub fn parse_unsigned(&mut self) -> Result<u64> {
        self.skip_whitespace();
        let token = self.read_regular_token();
        std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("expected an unsigned integer"))
    }

    pub fn parse_object(&mut self) -> Result<Object> {
        self.parse_nested(0)
    }

    pub fn parse_dictionary(&mut self) -> Result<Dictionary> {
        match self.parse_object()? {
            Object::Dictionary(d) => Ok(d),
            other => Err(self.error(&format!("expected dictionary, found {}", other.type_name()))),
        }
    }

    fn parse_nested(&mut self, depth: usize) -> Result<Object> {
        if depth > MAX_DEPTH {
            return Err(self.error("objects nested too deeply"));
        }
        self.skip_whitespace();
        match self.peek() {
            None => Err(self.error("unexpected end of data")),
            Some(b'/') => {
                self.pos += 1;
                Ok(Object::Name(self.parse_name_body()))
            }
            Some(b'(') => {
                self.pos += 1;
                self.parse_literal_string()
            }
            Some(b'<') if self.starts_with(b"<<") => {
                self.pos += 2;
                self.parse_dictionary_body(depth)
            }
            Some(b'<') => {
                self.pos += 1;
                self.parse_hex_string()
            }
            Some(b'[') => {
                self.pos += 1;
                self.parse_array_body(depth)
            }
            Some(b) if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.') => self.parse_number(),
            Some(_) => {
                let token = self.read_regular_token();
                match token {
                    b"true" => Ok(Object::Boolean(true)),
                    b"false" => Ok(Object::Boolean(false)),
                    b"null" => Ok(Object::Null),
                    _ => Err(self.error(&format!(
                        "unexpected token '{}'",
                        String::from_utf8_lossy(token)
                    ))),
                }
            }
        }
    }

    fn parse_name_body(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(b) = self.peek() {
            if !is_regular(b) {
                break;
            }
            if b == b'#'
                && let (Some(h), Some(l)) = (
                    self.data.get(self.pos + 1).copied().and_then(hex_value),
                    self.data.get(self.pos + 2).copied().and_then(hex_value),
                )
            {
                out.push(h << 4 | l);
                self.pos += 3;
                continue;
            }
            out.push(b);
            self.pos += 1;
        }
        out
    }

    fn parse_literal_string(&mut self) -> Result<Object> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        loop {
            let b = self
                .next_byte()
                .map_err(|_| self.error("unterminated literal string"))?;
            match b {
                b'\\' => {
                    let e = self.next_byte()?;
                    match e {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut value = u32::from(e - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\r' => {
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    out.push(b'\n');
                }
                _ => out.push(b),
            }
        }
        Ok(Object::String(out, StringFormat::Literal))
    }

    fn parse_hex_string(&mut self) -> Result<Object> {
        let mut nibbles = Vec::new();
        loop {
            let b = self
                .next_byte()
                .map_err(|_| self.error("unterminated hex string"))?;
            if b == b'>' {
                break;
            }
            if is_whitespace(b) {
                continue;
            }
            nibbles.push(hex_value(b).ok_or_else(|| self.error("invalid hex digit"))?);
        }
        if nibbles.len() % 2 == 1 {
            nibbles.push(0);
        }
        let bytes = nibbles.chunks_exact(2).map(|p| p[0] << 4 | p[1]).collect();
        Ok(Object::String(bytes, StringFormat::Hexadecimal))
    }

    fn parse_dictionary_body(&mut self, depth: usize) -> Result<Object> {
        let mut dict = Dictionary::new();
        loop {
            self.skip_whitespace();
            if self.starts_with(b">>") {
                self.pos += 2;
                return Ok(Object::Dictionary(dict));
            }
            match self.peek() {
                Some(b'/') => self.pos += 1,
                None => return Err(self.error("unterminated dictionary")),
                Some(_) => return Err(self.error("expected a name as dictionary key")),
            }
            let key = self.parse_name_body();
            let value = self.parse_nested(depth + 1)?;
            dict.set(key, value);
        }
    }

    fn parse_array_body(&mut self, depth: usize) -> Result<Object> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Object::Array(items));
                }
                None => return Err(self.error("unterminated array")),
                Some(_) => items.push(self.parse_nested(depth + 1)?),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Object> {
        let token = self.read_regular_token();
        let text = std::str::from_utf8(token).map_err(|_| self.error("invalid number"))?;
        if text.contains('.') {
            let value: f64 = text
                .parse()
                .or_else(|_| format!("{text}0").parse())
                .map_err(|_| self.error(&format!("invalid real '{text}'")))?;
            return Ok(Object::Real(value));
        }
        let value: i64 = text
            .parse()
            .map_err(|_| self.error(&format!("invalid integer '{text}'")))?;

        // `<num> <gen> R`
        if value >= 0 && text.bytes().all(|b| b.is_ascii_digit()) {
            let save = self.pos;
            self.skip_whitespace();
            let generation = self.read_regular_token();
            if !generation.is_empty() && generation.iter().all(u8::is_ascii_digit) {
                self.skip_whitespace();
                let after_r = self.data.get(self.pos + 1).copied();
                if self.peek() == Some(b'R') && !after_r.is_some_and(is_regular) {
                    let generation = std::str::from_utf8(generation)
                        .ok()
                        .and_then(|g| g.parse::<u16>().ok());
                    if let (Some(generation), Ok(number)) = (generation, u32::try_from(value)) {
                        self.pos += 1;
                        return Ok(Object::Reference(ObjectId::new(number, generation)));
                    }
                }
            }
            self.pos = save;
        }
        Ok(Object::Integer(value))
    }

    /// Parse `<num> <gen> obj ... endobj`, including stream bodies.
    pub fn parse_indirect_object(
        &mut self,
        length_of: LengthResolver<'_>,
    ) -> Result<(ObjectId, Object)> {
        let number = self.parse_unsigned()?;
        let generation = self.parse_unsigned()?;
        let id = match (u32::try_from(number), u16::try_from(generation)) {
            (Ok(n), Ok(g)) => ObjectId::new(n, g),
            _ => return Err(self.error("object number out of range")),
        };
        self.expect_keyword(b"obj")?;
        let object = self.parse_object()?;
        self.skip_whitespace();
        let object = match object {
            Object::Dictionary(dict) if self.starts_with(b"stream") => {
                Object::Stream(self.parse_stream_body(dict, length_of)?)
            }
            other => other,
        };
        self.skip_whitespace();
        if self.starts_with(b"endobj") {
            self.pos += b"endobj".len();
        } else {
            tracing::debug!(%id, "object is missing its endobj keyword");
        }
        Ok((id, object))
    }

    fn parse_stream_body(
        &mut self,
        dict: Dictionary,
        length_of: LengthResolver<'_>,
    ) -> Result<Stream> {
        self.pos += b"stream".len();
        if self.starts_with(b"\r\n") {
            self.pos += 2;
        } else if matches!(self.peek(), Some(b'\n' | b'\r')) {
            self.pos += 1;
        }
        let start = self.pos;

        let declared = match dict.get(b"Length") {
            Some(Object::Integer(n)) => Some(*n),
            Some(Object::Reference(r)) => length_of(*r),
            _ => None,
        };
        let end = declared
            .and_then(|n| usize::try_from(n).ok())
            .map(|n| start + n)
            .filter(|&end| end <= self.data.len() && self.endstream_follows(end));

        let end = match end {
            Some(end) => end,
            None => {
                let found = find_subslice(self.data, b"endstream", start)
                    .ok_or_else(|| self.error("unterminated stream"))?;
                let mut end = found;
                if end > start && self.data[end - 1] == b'\n' {
                    end -= 1;
                }
                if end > start && self.data[end - 1] == b'\r' {
                    end -= 1;
                }
                tracing::debug!(
                    declared,
                    actual = end - start,
                    "stream /Length disagrees with data"
                );
                end
            }
        };

        let data = self.data[start..end].to_vec();
        self.pos = end;
        self.expect_keyword(b"endstream")?;
        Ok(Stream::new(dict, data))
    }

    fn endstream_follows(&self, end: usize) -> bool {
        let mut p = end;
        while p < self.data.len() && is_whitespace(self.data[p]) {
            p += 1;
        }
        self.data[p..].starts_with(b"endstream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &[u8]) -> Object {
        Parser::new(src, 0).parse_object().unwrap()
    }

    fn no_lengths(_: ObjectId) -> Option<i64> {
        None
    }

    #[test]
    fn parses_scalars_and_references() {
        assert_eq!(parse(b"42"), Object::Integer(42));
        assert_eq!(parse(b"-3.5"), Object::Real(-3.5));
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"12 0 R"), Object::Reference(ObjectId::new(12, 0)));
        assert_eq!(
            parse(b"[1 2 3]"),
            Object::Array(vec![1.into(), 2.into(), 3.into()])
        );
    }

    #[test]
    fn integers_before_non_reference_stay_integers() {
        assert_eq!(
            parse(b"[0 612 792]"),
            Object::Array(vec![0.into(), 612.into(), 792.into()])
        );
        assert_eq!(
            parse(b"[2 0 /R]"),
            Object::Array(vec![2.into(), 0.into(), Object::name("R")])
        );
    }

    #[test]
    fn decodes_names_and_strings() {
        assert_eq!(parse(b"/text#2Fxml"), Object::name("text/xml"));
        assert_eq!(
            parse(b"(a\\(b\\)c\\n\\101 (nested))"),
            Object::string(b"a(b)c\nA (nested)")
        );
        assert_eq!(parse(b"<48 65 6C6C 6F>"), Object::hex_string(b"Hello"));
        assert_eq!(parse(b"<F>"), Object::hex_string([0xF0]));
    }

    #[test]
    fn parses_dictionary_with_comments() {
        let obj = parse(b"<< /Type /Catalog % comment\n /Pages 2 0 R >>");
        let dict = obj.as_dict().unwrap();
        assert!(dict.has_type(b"Catalog"));
        assert_eq!(
            dict.get(b"Pages"),
            Some(&Object::Reference(ObjectId::new(2, 0)))
        );
    }

    #[test]
    fn parses_stream_with_direct_length() {
        let src = b"5 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj\n";
        let (id, obj) = Parser::new(src, 0).parse_indirect_object(&no_lengths).unwrap();
        assert_eq!(id, ObjectId::new(5, 0));
        assert_eq!(obj.as_stream().unwrap().data, b"hello");
    }

    #[test]
    fn recovers_from_wrong_stream_length() {
        let src = b"5 0 obj\n<< /Length 99 >>\nstream\r\nhello\r\nendstream\nendobj\n";
        let (_, obj) = Parser::new(src, 0).parse_indirect_object(&no_lengths).unwrap();
        assert_eq!(obj.as_stream().unwrap().data, b"hello");
    }

    #[test]
    fn resolves_indirect_stream_length() {
        let src = b"5 0 obj\n<< /Length 6 0 R >>\nstream\nab\nendstream\nendobj\n";
        let lookup = |id: ObjectId| (id == ObjectId::new(6, 0)).then_some(2);
        let (_, obj) = Parser::new(src, 0).parse_indirect_object(&lookup).unwrap();
        assert_eq!(obj.as_stream().unwrap().data, b"ab");
    }

    #[test]
    fn reports_offset_of_errors() {
        let err = Parser::new(b"<< /A ) >>", 0).parse_object().unwrap_err();
        assert!(err.to_string().contains("offset"), "{err}");
    }
}
