//! Clinical input record.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Flat clinical record read from JSON. Every field is optional.
///
/// Missing time fields fall back to the build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalData {
    pub doc_id_root: String,
    pub doc_id_ext: String,
    pub doc_code: String,
    pub doc_display: String,
    pub title: String,
    #[serde(rename = "effectiveTime", skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<String>,

    pub patient_id: String,
    pub patient_city: String,
    pub patient_given: String,
    pub patient_family: String,
    pub patient_gender: String,
    pub patient_birth: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_time: Option<String>,
    pub author_id: String,
    pub author_given: String,
    pub author_family: String,

    pub org_id: String,
    pub org_name: String,

    pub section_code: String,
    pub report_text: String,
}

impl Default for ClinicalData {
    fn default() -> Self {
        Self {
            doc_id_root: "1.2.3.4.5".into(),
            doc_id_ext: "ABC-123".into(),
            doc_code: "11502-2".into(),
            doc_display: "Referto".into(),
            title: "Referto".into(),
            effective_time: None,
            patient_id: "TEMP-PAZ".into(),
            patient_city: String::new(),
            patient_given: "Mario".into(),
            patient_family: "Rossi".into(),
            patient_gender: "M".into(),
            patient_birth: "19700101".into(),
            author_time: None,
            author_id: "AUTH-1".into(),
            author_given: "Giulia".into(),
            author_family: "Bianchi".into(),
            org_id: "ORG-1".into(),
            org_name: "Struttura Sanitaria".into(),
            section_code: "30954-2".into(),
            report_text: "Referto: ...".into(),
        }
    }
}

impl ClinicalData {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("clinical data is not a valid JSON object")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read clinical data {}", path.display()))?;
        Self::from_json(&bytes).with_context(|| format!("in {}", path.display()))
    }
}
