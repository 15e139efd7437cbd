//! `run` command: the full embed, sign and submit pipeline.

use anyhow::{Context, Result};
use console::style;
use fse_cda::ClinicalData;
use fse_eds::{MtlsCredentials, ValidationClient};
use fse_pades::SigningIdentity;
use indicatif::ProgressBar;
use std::cell::RefCell;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::pipeline::{EmbedOptions, PipelineRequest, Progress, Stage, SystemClock, run_pipeline};
use crate::util::{default_signed_output_path, format_bytes, spinner};

/// Spinner per stage on stderr.
struct SpinnerProgress {
    current: RefCell<Option<ProgressBar>>,
}

impl SpinnerProgress {
    fn new() -> Self {
        Self {
            current: RefCell::new(None),
        }
    }
}

fn describe(stage: Stage) -> &'static str {
    match stage {
        Stage::BuildCda => "Building CDA document",
        Stage::EmbedAndSign => "Embedding CDA and signing",
        Stage::WriteOutput => "Writing signed PDF",
        Stage::Submit => "Submitting to EDS validation",
        Stage::WriteAudit => "Writing audit record",
    }
}

impl Progress for SpinnerProgress {
    fn begin(&self, stage: Stage) {
        if let Some(previous) = self.current.borrow_mut().take() {
            previous.abandon();
        }
        *self.current.borrow_mut() = Some(spinner(format!("{}...", describe(stage))));
    }

    fn finish(&self, stage: Stage, detail: &str) {
        if let Some(bar) = self.current.borrow_mut().take() {
            bar.finish_with_message(format!("[OK] {} ({})", describe(stage), style(detail).cyan()));
        }
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        if let Some(bar) = self.current.get_mut().take() {
            bar.abandon();
        }
    }
}

pub fn run(args: RunArgs, json: bool) -> Result<()> {
    eprintln!("{}", style("==> Embedding, signing and submitting report").cyan().bold());

    let pdf = std::fs::read(&args.pdf)
        .with_context(|| format!("Failed to open PDF: {}", args.pdf.display()))?;
    eprintln!(
        "    Input: {} ({})",
        style(args.pdf.display()).cyan(),
        style(format_bytes(pdf.len())).cyan()
    );
    let data = ClinicalData::from_file(&args.data)?;

    let identity = SigningIdentity::from_pkcs12_file(&args.sign_p12, &args.sign_pass)
        .with_context(|| format!("Failed to load signing identity {}", args.sign_p12.display()))?;
    if let Ok(info) = identity.describe() {
        eprintln!(
            "    Signer: {} (serial {})",
            style(info.common_name.as_deref().unwrap_or(&info.subject)).cyan(),
            style(&info.serial).dim()
        );
    }

    let credentials = MtlsCredentials::from_files(&args.mtls_cert, &args.mtls_key, &args.ca)?;
    let client = ValidationClient::new(
        &args.eds_url,
        &credentials,
        Duration::from_secs(args.timeout_secs),
    )?;

    let output = match args.out {
        Some(p) => p,
        None => default_signed_output_path(&args.pdf)?,
    };
    let request = PipelineRequest {
        pdf,
        data,
        output: output.clone(),
        cda_output: args.cda_out,
        log: args.log,
        options: EmbedOptions {
            embedded_name: args.embedded_name,
            relationship: args.relationship,
            field_name: args.field_name,
            reserved_size: args.reserve,
        },
    };

    let rt = tokio::runtime::Runtime::new()?;
    let progress = SpinnerProgress::new();
    let report = rt.block_on(run_pipeline(
        request,
        &identity,
        &client,
        &SystemClock,
        &progress,
    ))?;
    drop(progress);

    eprintln!(
        "    Output: {} ({}, signature {})",
        style(output.display()).cyan(),
        style(format_bytes(report.signed.bytes().len())).cyan(),
        style(format_bytes(report.signed.signature_len())).dim()
    );

    // The record goes to stdout in both modes; it is the command's result.
    let line = if json {
        serde_json::to_string(&report.record)?
    } else {
        report.record.to_pretty_json()?
    };
    println!("{line}");

    if let crate::audit::EdsResult::Rejected { status_code, body } = report.record.eds_result {
        eprintln!(
            "\n{} {}",
            style("[REJECTED]").yellow().bold(),
            style(format!("EDS answered HTTP {status_code}")).yellow()
        );
        return Err(fse_core::Error::RemoteRejection {
            status: status_code,
            body,
        }
        .into());
    }

    eprintln!(
        "\n{} {}",
        style("[SUCCESS]").green().bold(),
        style("Report signed and accepted").green()
    );
    Ok(())
}
