//! Minimal HL7 CDA R2 document builder.
//!
//! Produces an example skeleton header (id, code, title, patient, author,
//! custodian) with a single narrative section. Real document types need the
//! national implementation guide on top of this.

mod data;
mod xml;

pub use data::ClinicalData;

use chrono::{DateTime, Utc};
use xml::XmlWriter;

/// HL7 v3 namespace of `ClinicalDocument`.
pub const CDA_NAMESPACE: &str = "urn:hl7-org:v3";

/// LOINC code system OID.
const LOINC: &str = "2.16.840.1.113883.6.1";

/// HL7 CDA R2 type id.
const TYPE_ID_ROOT: &str = "2.16.840.1.113883.1.3";
const TYPE_ID_EXTENSION: &str = "POCD_HD000040";

/// Format of HL7 `TS` values.
const HL7_TS: &str = "%Y%m%d%H%M%S";

/// Serialize `data` as UTF-8 CDA XML. `now` fills missing time fields.
#[tracing::instrument(skip(data), fields(doc = %data.doc_id_ext))]
pub fn build_cda_xml(data: &ClinicalData, now: DateTime<Utc>) -> Vec<u8> {
    let stamp = now.format(HL7_TS).to_string();
    let effective_time = data.effective_time.as_deref().unwrap_or(&stamp);
    let author_time = data.author_time.as_deref().unwrap_or(&stamp);

    let mut w = XmlWriter::new();
    w.start("ClinicalDocument", &[("xmlns", CDA_NAMESPACE)])
        .empty(
            "typeId",
            &[("root", TYPE_ID_ROOT), ("extension", TYPE_ID_EXTENSION)],
        )
        .empty(
            "id",
            &[("root", data.doc_id_root.as_str()), ("extension", data.doc_id_ext.as_str())],
        )
        .empty(
            "code",
            &[
                ("code", data.doc_code.as_str()),
                ("codeSystem", LOINC),
                ("displayName", data.doc_display.as_str()),
            ],
        )
        .text("title", &data.title)
        .empty("effectiveTime", &[("value", effective_time)]);

    w.start("recordTarget", &[])
        .start("patientRole", &[])
        .empty("id", &[("extension", data.patient_id.as_str())])
        .start("addr", &[])
        .text("city", &data.patient_city)
        .end()
        .start("patient", &[])
        .start("name", &[])
        .text("given", &data.patient_given)
        .text("family", &data.patient_family)
        .end()
        .empty("administrativeGenderCode", &[("code", data.patient_gender.as_str())])
        .empty("birthTime", &[("value", data.patient_birth.as_str())])
        .end()
        .end()
        .end();

    w.start("author", &[])
        .empty("time", &[("value", author_time)])
        .start("assignedAuthor", &[])
        .empty("id", &[("extension", data.author_id.as_str())])
        .start("assignedPerson", &[])
        .start("name", &[])
        .text("given", &data.author_given)
        .text("family", &data.author_family)
        .end()
        .end()
        .end()
        .end();

    w.start("custodian", &[])
        .start("assignedCustodian", &[])
        .start("representedCustodianOrganization", &[])
        .empty("id", &[("extension", data.org_id.as_str())])
        .text("name", &data.org_name)
        .end()
        .end()
        .end();

    w.start("component", &[])
        .start("structuredBody", &[])
        .start("component", &[])
        .start("section", &[])
        .empty(
            "code",
            &[
                ("code", data.section_code.as_str()),
                ("codeSystem", LOINC),
                ("displayName", "Testo referto"),
            ],
        )
        .text("text", &data.report_text);

    let xml = w.finish();
    tracing::debug!(len = xml.len(), "Built CDA document");
    xml.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    fn build(data: &ClinicalData) -> String {
        String::from_utf8(build_cda_xml(data, at())).unwrap()
    }

    #[test]
    fn defaults_produce_complete_header() {
        let xml = build(&ClinicalData::default());
        assert!(xml.starts_with(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <ClinicalDocument xmlns=\"urn:hl7-org:v3\">"
        ));
        assert!(xml.contains(r#"<id root="1.2.3.4.5" extension="ABC-123"/>"#));
        assert!(xml.contains(
            r#"<code code="11502-2" codeSystem="2.16.840.1.113883.6.1" displayName="Referto"/>"#
        ));
        assert!(xml.contains(r#"<effectiveTime value="20250314092653"/>"#));
        assert!(xml.contains(r#"<time value="20250314092653"/>"#));
        assert!(xml.contains("<given>Mario</given>"));
        assert!(xml.contains("<family>Bianchi</family>"));
        assert!(xml.contains("<name>Struttura Sanitaria</name>"));
        assert!(xml.contains("<city/>"));
        assert!(xml.trim_end().ends_with("</ClinicalDocument>"));
    }

    #[test]
    fn supplied_times_win_over_clock() {
        let data = ClinicalData {
            effective_time: Some("20240101000000".into()),
            author_time: Some("20231231235959".into()),
            ..ClinicalData::default()
        };
        let xml = build(&data);
        assert!(xml.contains(r#"<effectiveTime value="20240101000000"/>"#));
        assert!(xml.contains(r#"<time value="20231231235959"/>"#));
    }

    #[test]
    fn report_text_is_escaped() {
        let data = ClinicalData {
            report_text: "PA < 140 & FC > 60".into(),
            ..ClinicalData::default()
        };
        let xml = build(&data);
        assert!(xml.contains("<text>PA &lt; 140 &amp; FC &gt; 60</text>"));
    }

    #[test]
    fn output_is_deterministic_for_a_fixed_clock() {
        let data = ClinicalData::default();
        assert_eq!(build_cda_xml(&data, at()), build_cda_xml(&data, at()));
    }
}
