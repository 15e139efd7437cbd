//! Embed, sign, write, submit, record.

use crate::audit::{AuditRecord, EdsResult};
use crate::util::write_atomic;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fse_cda::{ClinicalData, build_cda_xml};
use fse_core::{Attachment, Container, Relationship, SerializeMode, attach_with};
use fse_eds::Validator;
use fse_pades::{
    CmsSigner, SignatureOptions, SignedDocument, finalize_byte_range, reserve_placeholder, sign,
};
use std::path::PathBuf;

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildCda,
    EmbedAndSign,
    WriteOutput,
    Submit,
    WriteAudit,
}

/// Observer for stage transitions.
pub trait Progress {
    fn begin(&self, stage: Stage);
    fn finish(&self, stage: Stage, detail: &str);
}

impl Progress for () {
    fn begin(&self, _: Stage) {}
    fn finish(&self, _: Stage, _: &str) {}
}

/// How the CDA document is embedded and the result signed.
#[derive(Debug, Clone)]
pub struct EmbedOptions {
    pub embedded_name: String,
    pub relationship: Relationship,
    pub field_name: String,
    pub reserved_size: usize,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            embedded_name: "cda.xml".to_string(),
            relationship: Relationship::Alternative,
            field_name: fse_pades::DEFAULT_FIELD_NAME.to_string(),
            reserved_size: fse_pades::DEFAULT_RESERVED_SIZE,
        }
    }
}

/// One pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub pdf: Vec<u8>,
    pub data: ClinicalData,
    pub output: PathBuf,
    pub cda_output: Option<PathBuf>,
    pub log: Option<PathBuf>,
    pub options: EmbedOptions,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct PipelineReport {
    pub signed: SignedDocument,
    pub cda_len: usize,
    pub record: AuditRecord,
}

/// Attach `cda` to `pdf` and sign the result.
///
/// Both mutations are incremental, so `pdf` stays a byte prefix of the output.
#[tracing::instrument(skip(pdf, cda, signer), fields(
    pdf_len = pdf.len(),
    cda_len = cda.len(),
    name = %options.embedded_name,
))]
pub fn embed_and_sign(
    pdf: Vec<u8>,
    cda: &[u8],
    options: &EmbedOptions,
    signer: &dyn CmsSigner,
    now: DateTime<Utc>,
) -> Result<SignedDocument> {
    let container = Container::load(pdf).context("Failed to load input PDF")?;
    let attachment = Attachment::new(options.embedded_name.as_str(), cda, options.relationship)
        .with_mime_type("text/xml")
        .with_description("CDA R2")
        .with_modified(now);
    let container = attach_with(container, &attachment).context("Failed to embed CDA document")?;

    let intermediate = container
        .serialize(SerializeMode::Incremental)
        .context("Failed to serialize document with embedded CDA")?;
    tracing::debug!(len = intermediate.bytes.len(), "Embedded CDA document");
    let container = Container::load(intermediate.bytes)
        .context("Failed to reload document with embedded CDA")?;

    let signature_options = SignatureOptions {
        field_name: options.field_name.clone(),
        reserved_size: options.reserved_size,
        signing_time: now,
        ..SignatureOptions::default()
    };
    let reserved = reserve_placeholder(container, &signature_options)
        .context("Failed to reserve signature placeholder")?;
    let prepared = finalize_byte_range(reserved).context("Failed to compute signature byte range")?;
    sign(prepared, signer).context("Failed to sign PDF")
}

/// Run every stage. A rejection by the service is recorded, not raised.
#[tracing::instrument(skip_all, fields(output = %request.output.display()))]
pub async fn run_pipeline(
    request: PipelineRequest,
    signer: &dyn CmsSigner,
    validator: &dyn Validator,
    clock: &dyn Clock,
    progress: &dyn Progress,
) -> Result<PipelineReport> {
    let PipelineRequest {
        pdf,
        data,
        output,
        cda_output,
        log,
        options,
    } = request;

    progress.begin(Stage::BuildCda);
    let cda = build_cda_xml(&data, clock.now());
    progress.finish(Stage::BuildCda, &format!("{} bytes", cda.len()));

    progress.begin(Stage::EmbedAndSign);
    let signed = embed_and_sign(pdf, &cda, &options, signer, clock.now())?;
    progress.finish(Stage::EmbedAndSign, &signed.digest_sri());

    progress.begin(Stage::WriteOutput);
    if let Some(path) = &cda_output {
        write_atomic(path, &cda)
            .with_context(|| format!("Failed to write CDA document: {}", path.display()))?;
    }
    write_atomic(&output, signed.bytes())
        .with_context(|| format!("Failed to write signed PDF: {}", output.display()))?;
    progress.finish(Stage::WriteOutput, &output.display().to_string());

    progress.begin(Stage::Submit);
    let eds_result = match validator.submit(signed.bytes()).await {
        Ok(payload) => EdsResult::Accepted { payload },
        Err(fse_core::Error::RemoteRejection { status, body }) => EdsResult::Rejected {
            status_code: status,
            body,
        },
        Err(e) => {
            return Err(e).context("Failed to submit signed PDF for validation");
        }
    };
    let verdict = if eds_result.is_rejected() { "rejected" } else { "accepted" };
    progress.finish(Stage::Submit, verdict);

    progress.begin(Stage::WriteAudit);
    let record = AuditRecord::new(clock.now(), &output, eds_result);
    if let Some(path) = &log {
        let json = record.to_pretty_json()?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write audit log: {}", path.display()))?;
        progress.finish(Stage::WriteAudit, &path.display().to_string());
    } else {
        progress.finish(Stage::WriteAudit, "stdout only");
    }

    tracing::info!(verdict, "Pipeline finished");
    Ok(PipelineReport {
        signed,
        cda_len: cda.len(),
        record,
    })
}
