//! JSON output formats.

use fse_core::VerifiedSignature;
use serde::Serialize;

#[derive(Serialize)]
pub struct VerifyJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub trust_checked: bool,
    pub signatures: Vec<VerifiedSignature>,
    pub embedded_files: Vec<EmbeddedFileJson>,
}

#[derive(Serialize)]
pub struct EmbeddedFileJson {
    pub name: String,
    pub relationship: String,
    pub mime_type: Option<String>,
    pub size: usize,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub status: &'a str,
    pub error: String,
    pub causes: Vec<String>,
}
