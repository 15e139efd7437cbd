use crate::cli::{Cli, Commands};
use crate::json::ErrorJson;
use anyhow::Result;
use console::style;

/// Run the command and report a failure on stderr (or stdout with `--json`).
///
/// Returns the process exit code.
pub fn run(cli: Cli) -> Result<u8> {
    let json = cli.json;

    let result = match cli.command {
        Commands::Run(args) => crate::run::run(*args, json),
        Commands::Verify {
            input,
            trust_anchors,
        } => crate::commands::verify_pdf(input, trust_anchors, json),
    };

    let Err(e) = &result else {
        return Ok(0);
    };
    let code = exit_code(e);

    // A rejection already printed its audit record as the result.
    let rejected = code == 2;
    if json && !rejected {
        let causes: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
        let payload = ErrorJson {
            status: "error",
            error: e.to_string(),
            causes,
        };
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        eprintln!("\n{} {}", style("[ERROR]").red().bold(), style(&e).red());

        for (i, cause) in e.chain().skip(1).enumerate() {
            if i == 0 {
                eprintln!("\n    Caused by:");
            }
            eprintln!("      - {}", style(cause).red());
        }
        if core_error(e).is_some_and(fse_core::Error::is_retryable) {
            eprintln!(
                "\n    {}",
                style("Transient failure; the signed PDF was kept and the run can be retried.")
                    .dim()
            );
        }
        eprintln!();
    }

    Ok(code)
}

fn core_error(e: &anyhow::Error) -> Option<&fse_core::Error> {
    e.chain().find_map(|cause| cause.downcast_ref::<fse_core::Error>())
}

fn exit_code(e: &anyhow::Error) -> u8 {
    core_error(e).map_or(1, fse_core::Error::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_follows_the_wrapped_error() {
        let rejected: anyhow::Error = fse_core::Error::RemoteRejection {
            status: 503,
            body: String::new(),
        }
        .into();
        assert_eq!(exit_code(&rejected), 2);

        let wrapped = Err::<(), _>(fse_core::Error::Transport("reset".into()))
            .context("Failed to submit")
            .unwrap_err();
        assert_eq!(exit_code(&wrapped), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }
}
