//! `verify` command.

use anyhow::{Context, Result};
use console::style;
use fse_core::{Container, associated_files};
use fse_pades::{VerifyOptions, verify_document};
use std::path::PathBuf;

use crate::json::{EmbeddedFileJson, VerifyJson};
use crate::util::{format_bytes, spinner};

pub fn verify_pdf(input: PathBuf, trust_anchors: Option<PathBuf>, json: bool) -> Result<()> {
    eprintln!("{}", style("==> Verifying PDF signatures").cyan().bold());

    let spinner = spinner(format!(
        "Reading signed PDF {}",
        style(input.display()).cyan()
    ));
    let signed_data = std::fs::read(&input)
        .with_context(|| format!("Failed to open signed PDF: {}", input.display()))?;
    spinner.finish_with_message(format!(
        "[OK] Read PDF ({})",
        style(format_bytes(signed_data.len())).cyan()
    ));

    let options = match &trust_anchors {
        Some(path) => {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read trust anchors: {}", path.display()))?;
            VerifyOptions::with_anchors_pem(&pem)?
        }
        None => VerifyOptions::default(),
    };

    let verified = verify_document(&signed_data, &options)?;
    eprintln!(
        "    Found {} signature(s)",
        style(verified.len()).cyan()
    );

    let container = Container::load(signed_data)?;
    let embedded = associated_files(&container).context("Failed to read associated files")?;

    eprintln!(
        "\n{} {}",
        style("[VALID]").green().bold(),
        style("All signatures verified").green()
    );
    if trust_anchors.is_none() {
        eprintln!(
            "{} {}",
            style("Warning:").yellow().bold(),
            style("no trust anchors given; signer certificates were not checked").dim()
        );
    }

    eprintln!("\n    PAdES signatures:");
    for (i, sig) in verified.iter().enumerate() {
        eprintln!("      {}. Field: {}", i + 1, style(&sig.field_name).cyan());
        if let Some(signer) = &sig.signer {
            eprintln!("         Signer: {}", style(signer).cyan());
        }
        if let Some(time) = &sig.signing_time {
            eprintln!("         Time: {}", style(time).cyan());
        }
        eprintln!("         Digest: {}", style(&sig.digest_sri).dim());
        if !sig.covers_whole_document {
            eprintln!(
                "         {}",
                style("Document was modified after this signature").yellow()
            );
        }
    }
    if !embedded.is_empty() {
        eprintln!("\n    Associated files:");
        for file in &embedded {
            eprintln!(
                "      - {} ({}, {})",
                style(&file.name).cyan(),
                file.relationship,
                format_bytes(file.data.len())
            );
        }
    }

    if json {
        let payload = VerifyJson {
            status: "ok",
            command: "verify",
            input: input.display().to_string(),
            trust_checked: trust_anchors.is_some(),
            signatures: verified,
            embedded_files: embedded
                .into_iter()
                .map(|f| EmbeddedFileJson {
                    name: f.name,
                    relationship: f.relationship.to_string(),
                    mime_type: f.mime_type,
                    size: f.data.len(),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        // Only print "OK" when stdout is piped (for pipeline composition)
        use std::io::IsTerminal;
        if !std::io::stdout().is_terminal() {
            println!("OK");
        }
    }

    Ok(())
}
