//! `FieldSeal` CLI tool for key management and record encryption.
//!
//! Records are read as JSON from stdin (one object, or an array of objects)
//! and written as JSON to stdout. Logs go to stderr and follow `RUST_LOG`.

#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fieldseal::prelude::*;
use fieldseal_key_file::FileKeyProvider;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "fieldseal=warn";

#[derive(Parser)]
#[command(name = "fieldseal")]
#[command(about = "FieldSeal field-level record encryption CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new master key
    Keygen {
        /// Output directory for keys
        #[arg(short, long, default_value = "./keys")]
        output: PathBuf,
    },
    /// Encrypt fields of JSON records read from stdin
    Encrypt {
        /// Directory holding the master key
        #[arg(long, default_value = "./keys")]
        key_dir: PathBuf,
        /// Comma-separated field names to encrypt
        #[arg(long, required = true, value_delimiter = ',')]
        fields: Vec<String>,
        /// Records that may share one data key
        #[arg(long, default_value_t = 1)]
        max_uses: u32,
        /// Data keys derived per generated key
        #[arg(long, default_value_t = 1)]
        derivations: u32,
        /// Write the legacy per-field envelope format
        #[arg(long)]
        legacy: bool,
    },
    /// Decrypt JSON envelopes read from stdin
    Decrypt {
        /// Directory holding the master key
        #[arg(long, default_value = "./keys")]
        key_dir: PathBuf,
    },
}

/// Records read from stdin, keeping the input's shape for the output.
#[derive(Debug, PartialEq)]
enum Batch {
    One(Record),
    Many(Vec<Record>),
}

impl Batch {
    fn parse(input: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(input).context("input is not valid JSON")?;
        match Value::from_json(json) {
            Value::Object(record) => Ok(Self::One(record)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(record) => Ok(record),
                    _ => bail!("item {i} is not a JSON object"),
                })
                .collect::<Result<_>>()
                .map(Self::Many),
            _ => bail!("expected a JSON object or an array of objects"),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::One(record) => Value::Object(record),
            Self::Many(records) => Value::Array(records.into_iter().map(Value::Object).collect()),
        }
    }
}

fn read_batch() -> Result<Batch> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input).context("failed to read stdin")?;
    Batch::parse(&input)
}

fn write_batch(batch: Batch) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &batch.into_value())?;
    writeln!(stdout)?;
    Ok(())
}

fn open_provider(key_dir: PathBuf, derivations: u32) -> Result<KeyAmortizer<FileKeyProvider>> {
    let provider = FileKeyProvider::new(&key_dir)
        .with_context(|| format!("failed to load master key from {}", key_dir.display()))?;
    Ok(KeyAmortizer::new(provider, AmortizerConfig::new(derivations))?)
}

async fn encrypt<C: FieldCipher>(
    provider: KeyAmortizer<FileKeyProvider>,
    cipher: C,
    config: VaultConfig,
    fields: &FieldSelection,
) -> Result<()> {
    let vault = Vault::with_config(provider, cipher, config)?;
    let output = match read_batch()? {
        Batch::One(record) => Batch::One(vault.encrypt_item(record, fields).await?),
        Batch::Many(records) => {
            let items =
                records.into_iter().map(|record| ItemToEncrypt::new(record, fields.clone())).collect();
            Batch::Many(vault.encrypt_items(items).await?)
        }
    };
    write_batch(output)
}

async fn decrypt(provider: KeyAmortizer<FileKeyProvider>) -> Result<()> {
    let vault = Vault::new(provider, XChaChaCipher);
    let output = match read_batch()? {
        Batch::One(record) => Batch::One(vault.decrypt_item(record).await?),
        Batch::Many(records) => Batch::Many(vault.decrypt_items(records).await?),
    };
    write_batch(output)
}

/// Uses `RUST_LOG` when set, otherwise only warnings from the library.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log.map_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER), EnvFilter::new)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { output } => {
            FileKeyProvider::init(&output)
                .with_context(|| format!("failed to initialize {}", output.display()))?;
            info!(key_dir = %output.display(), "generated master key");
            eprintln!("Master key written to {}", output.display());
        }
        Commands::Encrypt { key_dir, fields, max_uses, derivations, legacy } => {
            let fields = FieldSelection::new(fields)?;
            let provider = open_provider(key_dir, derivations)?;
            let config = VaultConfig { max_uses_per_data_key: max_uses, provider_timeout_ms: None };
            if legacy {
                encrypt(provider, LegacyXChaChaCipher, config, &fields).await?;
            } else {
                encrypt(provider, XChaChaCipher, config, &fields).await?;
            }
        }
        Commands::Decrypt { key_dir } => {
            // Sub-keys are re-derived from each envelope's key index.
            decrypt(open_provider(key_dir, 1)?).await?;
        }
    }
    Ok(())
}
