use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use scribe_ctc::datagen::{synthesize, write_dataset, DatagenConfig};

#[derive(Debug, Parser)]
#[command(name = "scribe_datagen")]
#[command(about = "Render a synthetic slab dataset for transcriber training")]
struct Args {
    #[arg(long, env = "SCRIBE_DATAGEN_OUT", default_value = "data/scribe.json")]
    out: PathBuf,
    #[arg(long, env = "SCRIBE_DATAGEN_EXAMPLES", default_value_t = 100)]
    examples: usize,
    #[arg(long, env = "SCRIBE_DATAGEN_MIN_LABELS", default_value_t = 1)]
    min_labels: usize,
    #[arg(long, env = "SCRIBE_DATAGEN_MAX_LABELS", default_value_t = 4)]
    max_labels: usize,
    #[arg(long, env = "SCRIBE_DATAGEN_SEED", default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = DatagenConfig {
        examples: args.examples,
        min_labels: args.min_labels,
        max_labels: args.max_labels,
        seed: args.seed,
    };

    let raw = synthesize(&config)?;
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    write_dataset(&raw, &args.out)?;
    tracing::info!(examples = raw.x.len(), path = %args.out.display(), "dataset written");
    Ok(())
}
