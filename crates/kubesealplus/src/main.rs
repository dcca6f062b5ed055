//! kubesealplus - SealedSecret rotation for Helm templates
//!
//! Commands:
//! - rotate <FILE>: Re-seal some or all keys of an existing manifest
//! - new <FILE>: Create a manifest from scratch
//! - config <ENVIRONMENT> cert <PATH-OR-URL>: Set the sealing certificate

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kubesealplus::cert::CertProvider;
use kubesealplus::{ops, ConfigStore, Kubeseal, ManifestName, Outcome, Prompt};
use kubesealplus_core::Paths;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kubesealplus")]
#[command(about = "Rotate and create SealedSecret manifests embedded in environment-gated Helm templates")]
#[command(version)]
#[command(after_help = r#"FILE NAMING:
    Manifests must be named secret-<name>.<environment>.yaml, e.g.
    templates/secret-example.production.yaml

    The file must start with
        {{- if eq .Values.environment "<environment>" }}
    and end with
        {{- end }}

SECRET VALUES:
    Leave a value blank to keep its current ciphertext.
    A value naming a readable file is replaced by the file's contents."#)]
struct Cli {
    /// Config file (default: ~/.kubesealplus/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-seal some or all keys of an existing SealedSecret template
    Rotate {
        /// Template file (secret-<name>.<environment>.yaml)
        file: String,
    },

    /// Create a new SealedSecret template
    New {
        /// Template file to create (secret-<name>.<environment>.yaml)
        file: String,
    },

    /// Set per-environment configuration
    Config {
        /// Environment name (e.g., production)
        environment: String,
        /// Setting to change (only "cert" is supported)
        key: String,
        /// Certificate file path or URL
        value: String,
    },
}

fn main() -> Result<()> {
    // stdout carries the prompts, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .unwrap_or_else(|| Paths::new().config_file(""));
    let store = ConfigStore::new(&config_path);

    match cli.command {
        Commands::Rotate { file } => cmd_rotate(&store, &file),
        Commands::New { file } => cmd_new(&store, &file),
        Commands::Config {
            environment,
            key,
            value,
        } => cmd_config(&store, &environment, &key, &value),
    }
}

/// Rotate secrets in an existing manifest
fn cmd_rotate(store: &ConfigStore, file: &str) -> Result<()> {
    let name = ManifestName::parse(file)?;
    let path = Path::new(file);
    if !path.is_file() {
        bail!("Cannot open file: {}", file);
    }

    let cert_location = store.cert(&name.environment)?;
    let cert = CertProvider::default()
        .materialize(&cert_location)
        .with_context(|| format!("Failed to load certificate for '{}'", name.environment))?;

    let mut prompt = Prompt::new(io::stdin().lock(), io::stdout());
    let outcome = ops::rotate(path, &name, &mut prompt, &Kubeseal::new(), cert.path())?;

    match outcome {
        Outcome::Unchanged => println!("info: No values entered, {} left unchanged", file),
        Outcome::Written { sealed } => {
            println!("success: Rotated {} secret(s) in {}", sealed, file)
        }
    }
    Ok(())
}

/// Create a new manifest
fn cmd_new(store: &ConfigStore, file: &str) -> Result<()> {
    let name = ManifestName::parse(file)?;
    let path = Path::new(file);
    if path.exists() {
        bail!("{} already exists, use 'kubesealplus rotate {}'", file, file);
    }

    let cert_location = store.cert(&name.environment)?;
    let cert = CertProvider::default()
        .materialize(&cert_location)
        .with_context(|| format!("Failed to load certificate for '{}'", name.environment))?;

    let mut prompt = Prompt::new(io::stdin().lock(), io::stdout());
    let outcome = ops::create(path, &name, &mut prompt, &Kubeseal::new(), cert.path())?;

    if let Outcome::Written { sealed } = outcome {
        println!("success: Created {} with {} secret(s)", file, sealed);
    }
    Ok(())
}

/// Update configuration
fn cmd_config(store: &ConfigStore, environment: &str, key: &str, value: &str) -> Result<()> {
    let stored = ops::configure(store, environment, key, value)?;
    println!("success: {}.{} = {}", environment, key, stored);
    println!("Config written to {}", store.path().display());
    Ok(())
}
