use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facerank_core::{corpus, ModelConfig, Raster, RecognitionModel};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod output;

use config::Config;

#[derive(Parser)]
#[command(name = "facerank", version, about = "Rank known identities for a face image")]
struct Cli {
    /// TOML configuration file (default: $FACERANK_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a corpus and rank every known identity for a probe image
    Identify {
        /// Corpus root: one subdirectory of images per identity
        #[arg(short, long)]
        corpus: Option<PathBuf>,
        /// Grayscale face crop to identify
        #[arg(short, long)]
        probe: PathBuf,
        /// Resize the probe to WIDTHxHEIGHT before identifying
        #[arg(long, value_parser = parse_resize)]
        resize: Option<(u32, u32)>,
        /// Print only the N most probable identities
        #[arg(long)]
        top: Option<usize>,
        /// Print the ranking as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show class counts and image geometry of a corpus
    Inspect {
        #[arg(short, long)]
        corpus: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Identify {
            corpus,
            probe,
            resize,
            top,
            json,
        } => {
            let root = corpus_root(corpus, &config)?;
            let probe = load_probe(&probe, resize)?;
            print!("{}", identify(config.model, &root, &probe, top, json)?);
        }
        Commands::Inspect { corpus, json } => {
            let root = corpus_root(corpus, &config)?;
            let corpus = corpus::assemble(&root)
                .with_context(|| format!("failed to assemble corpus {}", root.display()))?;
            let summary = output::CorpusSummary::new(&corpus);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary.render());
            }
        }
    }

    Ok(())
}

/// Train on `root` and render the ranking of `probe` as it goes to stdout.
fn identify(
    model_config: ModelConfig,
    root: &Path,
    probe: &Raster,
    top: Option<usize>,
    json: bool,
) -> Result<String> {
    tracing::info!(corpus = %root.display(), "training the model, please wait");
    let mut model = RecognitionModel::new(model_config);
    model
        .train(root)
        .with_context(|| format!("training on {} failed", root.display()))?;

    let ranking = model.identify_raster(probe).context("identification failed")?;
    let entries = output::head(&ranking, top);
    Ok(if json {
        output::ranking_json(entries)? + "\n"
    } else {
        output::render_ranking(entries)
    })
}

/// `--corpus` wins over the configured corpus.
fn corpus_root(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match flag.or_else(|| config.corpus.clone()) {
        Some(root) => Ok(root),
        None => bail!("no corpus given: pass --corpus or set FACERANK_CORPUS"),
    }
}

fn load_probe(path: &Path, resize: Option<(u32, u32)>) -> Result<Raster> {
    let raster =
        Raster::open(path).with_context(|| format!("failed to load probe {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        width = raster.width,
        height = raster.height,
        "probe loaded"
    );
    Ok(match resize {
        Some((width, height)) => {
            tracing::debug!(
                from = ?(raster.width, raster.height),
                to = ?(width, height),
                "resizing probe"
            );
            raster.resize(width, height)
        }
        None => raster,
    })
}

fn parse_resize(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let parse = |s: &str| -> Result<u32, String> {
        match s.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(format!("invalid dimension {s:?} in {value:?}")),
            Ok(n) => Ok(n),
        }
    };
    Ok((parse(w)?, parse(h)?))
}
