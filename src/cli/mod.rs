//! # Command Line Interface
//!
//! `serve` runs the HTTP API, `issue` performs a one-shot issuance to a file and
//! `inspect` prints the metadata of an existing certificate.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::api::start_api_server;
use crate::config::{Config, ObservabilityConfig, SignerStrategy};
use crate::domain::OwnerId;
use crate::observability::{init_logging, init_observability, log_config_info};
use crate::pki::{self, IdentityRequest};
use crate::{startup, APP_NAME, VERSION};

#[derive(Parser)]
#[command(name = "certforge")]
#[command(about = "Leaf certificate issuance against an operator-controlled root CA")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve,

    /// Issue one certificate and write the combined PEM bundle to a file
    Issue {
        /// JSON file holding the identity request
        #[arg(long)]
        request: PathBuf,

        /// Destination of the certificate + key bundle
        #[arg(long)]
        out: PathBuf,

        /// Override the configured signing strategy (in-process | external)
        #[arg(long)]
        signer: Option<SignerStrategy>,

        /// Owner recorded for the issued certificate
        #[arg(long, default_value = "cli")]
        owner: String,
    },

    /// Print the metadata of a PEM certificate as JSON
    Inspect {
        /// Path to the PEM file
        pem: PathBuf,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve(cli.verbose).await,
        Commands::Issue { request, out, signer, owner } => {
            issue(&request, &out, signer, owner, cli.verbose).await
        }
        Commands::Inspect { pem } => inspect(&pem, cli.verbose).await,
    }
}

async fn serve(verbose: bool) -> anyhow::Result<()> {
    let mut observability = ObservabilityConfig::from_env();
    if verbose {
        observability.log_level = "debug".to_string();
    }
    init_observability(&observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting certforge");

    let config = Config::from_env().context("invalid configuration")?;
    log_config_info(&config);

    let service = startup::build_service(&config)
        .await
        .context("failed to initialize the issuance engine")?;
    start_api_server(config.api.clone(), service).await?;
    Ok(())
}

async fn issue(
    request_path: &Path,
    out: &Path,
    signer: Option<SignerStrategy>,
    owner: String,
    verbose: bool,
) -> anyhow::Result<()> {
    initialise_logging(verbose);

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(strategy) = signer {
        config.signer.strategy = strategy;
    }

    let raw = tokio::fs::read_to_string(request_path)
        .await
        .with_context(|| format!("failed to read {}", request_path.display()))?;
    let request: IdentityRequest =
        serde_json::from_str(&raw).context("request file is not a valid identity request")?;

    let service = startup::build_service(&config)
        .await
        .context("failed to initialize the issuance engine")?;
    let outcome = service.issue_and_wait(OwnerId::new(owner), request).await?;

    write_private(out, outcome.bundle.to_combined().as_bytes())
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!("{}", serde_json::to_string_pretty(&outcome.metadata)?);
    Ok(())
}

async fn inspect(pem_path: &Path, verbose: bool) -> anyhow::Result<()> {
    initialise_logging(verbose);

    let bytes = tokio::fs::read(pem_path)
        .await
        .with_context(|| format!("failed to read {}", pem_path.display()))?;
    let metadata = pki::extract(&bytes)?;

    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

/// One-shot commands keep stdout for their JSON output; logs stay quiet unless asked.
fn initialise_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    init_logging(&ObservabilityConfig {
        log_level: level.to_string(),
        ..Default::default()
    });
}

/// The bundle holds a private key; it is owner-readable only from creation on.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;

    // `mode` only applies to new files; narrow an existing one before writing.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }

    file.write_all(contents).await?;
    file.flush().await
}
