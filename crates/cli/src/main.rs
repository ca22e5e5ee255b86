use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use regroup_core::{Regrouper, Selection, TablePayload};
use regroup_embed::{load_config, EmbeddingClient, DEFAULT_CONFIG};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "regroup", version = VERSION, about = "Semantic regrouping of aggregated tables")]
struct Cli {
    #[arg(long, global = true, env = "REGROUP_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Regroup the first table of a payload file and print the result.
    Run {
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        /// The input file holds base64 text rather than raw JSON.
        #[arg(long, action = ArgAction::SetTrue)]
        base64: bool,
        #[arg(long, action = ArgAction::SetTrue)]
        pretty: bool,
    },
    /// Print the silhouette score of every candidate cluster count.
    Scores {
        input: PathBuf,
        #[arg(long, action = ArgAction::SetTrue)]
        base64: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = load_config(&config_path)?;
    let client = EmbeddingClient::from_settings(&config.embedding)?;
    info!("embedder" = %client.describe(), "configured embeddings");
    let regrouper = Regrouper::new(client, config.clustering)?;

    match cli.command {
        Commands::Run {
            input,
            out,
            base64,
            pretty,
        } => {
            let payload = read_payload(&input, base64)?;
            let result = regrouper.regroup_payload(payload)?;
            let json = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            match out {
                Some(path) => {
                    fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("wrote" = %path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::Scores { input, base64 } => {
            let payload = read_payload(&input, base64)?;
            let selection = regrouper.score_candidates(payload.first_table()?)?;
            let stdout = io::stdout();
            write_scores(&mut stdout.lock(), &selection)?;
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_payload(path: &Path, base64: bool) -> Result<TablePayload> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let bytes = if base64 {
        let text: Vec<u8> = raw
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        general_purpose::STANDARD
            .decode(text)
            .map_err(|e| anyhow!("{} is not valid base64: {e}", path.display()))?
    } else {
        raw
    };
    Ok(TablePayload::from_slice(&bytes)?)
}

fn write_scores<W: Write>(out: &mut W, selection: &Selection) -> Result<()> {
    for (k, score) in &selection.scores {
        let marker = if *k == selection.k { " *" } else { "" };
        match score {
            Some(score) => writeln!(out, "k={k} score={score:.4}{marker}")?,
            None => writeln!(out, "k={k} score=n/a{marker}")?,
        }
    }
    Ok(())
}
