use clap::{Args, Parser, Subcommand};
use fse_core::Relationship;
use fse_pades::{DEFAULT_FIELD_NAME, DEFAULT_RESERVED_SIZE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fse-tool",
    about = "Embed CDA into PDF, sign with PAdES and submit for EDS validation",
    long_about = "Build a CDA R2 document from clinical JSON, embed it in a PDF as an associated \
                  file, sign the result with a PAdES (ETSI.CAdES.detached) signature and submit \
                  it to the EDS validation service over mutual TLS."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output machine-readable JSON to stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging (sets RUST_LOG=debug if not already set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Embed, sign and submit a report
    Run(Box<RunArgs>),

    /// Verify the PAdES signatures of a signed PDF
    Verify {
        /// Path to the signed PDF file
        input: PathBuf,

        /// PEM bundle of trusted roots; without it only integrity is checked
        #[arg(long)]
        trust_anchors: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Input PDF report
    #[arg(long)]
    pub pdf: PathBuf,

    /// Clinical data JSON for the CDA document
    #[arg(long)]
    pub data: PathBuf,

    /// Output path for the signed PDF (default: <pdf>_signed.pdf)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Also write the generated CDA XML here
    #[arg(long)]
    pub cda_out: Option<PathBuf>,

    /// PKCS#12 bundle with the PAdES signing key
    #[arg(long)]
    pub sign_p12: PathBuf,

    /// PKCS#12 password
    #[arg(long, env = "FSE_SIGN_PASS", hide_env_values = true)]
    pub sign_pass: String,

    /// EDS validation endpoint
    #[arg(long)]
    pub eds_url: String,

    /// Client certificate (PEM) for mutual TLS
    #[arg(long)]
    pub mtls_cert: PathBuf,

    /// Client private key (PEM) for mutual TLS
    #[arg(long)]
    pub mtls_key: PathBuf,

    /// CA certificate (PEM) of the EDS gateway
    #[arg(long)]
    pub ca: PathBuf,

    /// Write the audit record (JSON) here
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Signature field name
    #[arg(long, default_value = DEFAULT_FIELD_NAME)]
    pub field_name: String,

    /// Bytes reserved for the CMS signature
    #[arg(long, default_value_t = DEFAULT_RESERVED_SIZE)]
    pub reserve: usize,

    /// Name of the embedded CDA file
    #[arg(long, default_value = "cda.xml")]
    pub embedded_name: String,

    /// AFRelationship of the embedded file
    #[arg(long, default_value = "Alternative")]
    pub relationship: Relationship,

    /// Submission timeout in seconds
    #[arg(long, default_value_t = fse_eds::DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 16] = [
        "fse-tool",
        "run",
        "--pdf",
        "in.pdf",
        "--data",
        "data.json",
        "--sign-p12",
        "signer.p12",
        "--eds-url",
        "https://eds.example/validate",
        "--mtls-cert",
        "client.pem",
        "--mtls-key",
        "client.key",
        "--ca",
        "ca.pem",
    ];

    #[test]
    fn run_defaults() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--sign-pass", "secret"]);
        let cli = Cli::try_parse_from(argv).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.field_name, "Signature1");
        assert_eq!(args.reserve, 16_384);
        assert_eq!(args.embedded_name, "cda.xml");
        assert_eq!(args.relationship, Relationship::Alternative);
        assert_eq!(args.timeout_secs, 60);
        assert!(args.out.is_none());
    }

    #[test]
    fn relationship_is_parsed_case_insensitively() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--sign-pass", "secret", "--relationship", "source", "--json"]);
        let cli = Cli::try_parse_from(argv).unwrap();
        assert!(cli.json);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.relationship, Relationship::Source);

        let mut argv = REQUIRED.to_vec();
        argv.extend(["--sign-pass", "secret", "--relationship", "bogus"]);
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
