//! Synthetic PDFs for tests across the workspace.

use crate::filters::flate_encode;

const HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";
const CONTENT: &str = "BT 72 720 Td (Referto) Tj ET";

fn catalog_and_pages() -> [(u32, String); 4] {
    [
        (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
        (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string()),
        (
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Contents 4 0 R /Resources << >> >>"
                .to_string(),
        ),
        (
            4,
            format!("<< /Length {} >>\nstream\n{CONTENT}\nendstream", CONTENT.len()),
        ),
    ]
}

/// Single-revision PDF with a classic xref table.
///
/// `trailer_extra` is spliced into the trailer dictionary after `/Size`.
pub fn build_pdf<S: AsRef<str>>(objects: &[(u32, S)], trailer_extra: &str) -> Vec<u8> {
    let mut out = HEADER.to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (number, body) in objects {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n{}\nendobj\n", body.as_ref()).as_bytes());
    }

    let size = objects.iter().map(|(n, _)| n + 1).max().unwrap_or(1);
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
    for number in 0..size {
        match offsets.iter().find(|(n, _)| *n == number) {
            Some((_, offset)) => {
                out.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes())
            }
            None if number == 0 => out.extend_from_slice(b"0000000000 65535 f\r\n"),
            None => out.extend_from_slice(b"0000000000 00000 f\r\n"),
        }
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size {size} {trailer_extra} >>\nstartxref\n{xref_offset}\n%%EOF\n")
            .as_bytes(),
    );
    out
}

/// One blank-ish page, classic xref table.
pub fn minimal_pdf() -> Vec<u8> {
    build_pdf(&catalog_and_pages(), "/Root 1 0 R")
}

/// Same document with the page tree packed in a compressed object stream
/// and an xref stream instead of a table.
pub fn object_stream_pdf() -> Vec<u8> {
    let [catalog, pages, page, content] = catalog_and_pages();

    let mut out = HEADER.to_vec();
    let mut offsets = Vec::new();
    for (number, body) in [&catalog, &content] {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    let objstm_offset = out.len();
    write_object_stream(&mut out, &pages, &page);

    let xref_offset = out.len();
    let offset_of = |n: u32| -> u32 {
        offsets
            .iter()
            .find(|(num, _)| *num == n)
            .map(|(_, o)| *o as u32)
            .unwrap_or(0)
    };
    let rows: Vec<u8> = [
        row(0, 0, 0xFFFF),
        row(1, offset_of(1), 0),
        row(2, 5, 0),
        row(2, 5, 1),
        row(1, offset_of(4), 0),
        row(1, objstm_offset as u32, 0),
        row(1, xref_offset as u32, 0),
    ]
    .concat();
    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 7 /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(
        format!("\nendstream\nendobj\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes(),
    );
    out
}

/// Object 5: an object stream packing the page tree node and the page.
fn write_object_stream(out: &mut Vec<u8>, pages: &(u32, String), page: &(u32, String)) {
    let first_body = format!("{} ", pages.1);
    let header = format!("{} 0 {} {} ", pages.0, page.0, first_body.len());
    let packed = format!("{header}{first_body}{}", page.1);
    let compressed = flate_encode(packed.as_bytes()).unwrap_or_default();

    out.extend_from_slice(
        format!(
            "5 0 obj\n<< /Type /ObjStm /N 2 /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
            header.len(),
            compressed.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&compressed);
    out.extend_from_slice(b"\nendstream\nendobj\n");
}

/// Xref stream row with `/W [1 4 2]`.
fn row(kind: u8, field: u32, extra: u16) -> Vec<u8> {
    let mut r = vec![kind];
    r.extend_from_slice(&field.to_be_bytes());
    r.extend_from_slice(&extra.to_be_bytes());
    r
}

/// Hybrid-reference file: the classic table marks the packed objects free
/// and its `/XRefStm` stream locates them in the object stream.
pub fn hybrid_pdf() -> Vec<u8> {
    let [catalog, pages, page, content] = catalog_and_pages();

    let mut out = HEADER.to_vec();
    let mut offsets = Vec::new();
    for (number, body) in [&catalog, &content] {
        offsets.push((*number, out.len()));
        out.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    offsets.push((5, out.len()));
    write_object_stream(&mut out, &pages, &page);

    let stm_offset = out.len();
    offsets.push((6, stm_offset));
    let rows = [row(2, 5, 0), row(2, 5, 1)].concat();
    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 7 /W [1 4 2] /Index [2 2] /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let table_offset = out.len();
    out.extend_from_slice(b"xref\n0 7\n0000000000 65535 f\r\n");
    for number in 1..7u32 {
        match offsets.iter().find(|(n, _)| *n == number) {
            Some((_, offset)) => {
                out.extend_from_slice(format!("{offset:010} 00000 n\r\n").as_bytes())
            }
            None => out.extend_from_slice(b"0000000000 00000 f\r\n"),
        }
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size 7 /Root 1 0 R /XRefStm {stm_offset} >>\n\
             startxref\n{table_offset}\n%%EOF\n"
        )
        .as_bytes(),
    );
    out
}
