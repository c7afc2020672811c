use std::path::PathBuf;

use anyhow::Context;
use candle_core::{Device, IndexOp};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scribe_ctc::render::{best_path, collapse_path, render_slab, transpose_frames};
use scribe_ctc::{train, Mode, PaddedBatch, ScribeDataset, TrainConfig, TrainRun};

#[derive(Debug, Parser)]
#[command(name = "scribe_train")]
#[command(about = "Train the slab transcriber and show a sample prediction")]
struct Args {
    #[arg(long, env = "SCRIBE_DATASET", default_value = "data/scribe.json")]
    dataset: PathBuf,
    #[arg(
        long,
        env = "SCRIBE_LEARNING_RATE",
        default_value_t = TrainConfig::DEFAULT_LEARNING_RATE
    )]
    learning_rate: f64,
    #[arg(
        long,
        env = "SCRIBE_BATCH_SIZE",
        default_value_t = TrainConfig::DEFAULT_BATCH_SIZE
    )]
    batch_size: usize,
    #[arg(long, env = "SCRIBE_EPOCHS", default_value_t = 1)]
    epochs: usize,
    #[arg(long, env = "SCRIBE_L1_UNITS", default_value_t = 64)]
    l1_units: usize,
    #[arg(long, env = "SCRIBE_L2_UNITS", default_value_t = 64)]
    l2_units: usize,
    #[arg(
        long,
        env = "SCRIBE_NOISE_SIGMA",
        default_value_t = TrainConfig::DEFAULT_NOISE_SIGMA
    )]
    noise_sigma: f64,
    #[arg(
        long,
        env = "SCRIBE_SPLIT_RATIO",
        default_value_t = TrainConfig::DEFAULT_SPLIT_RATIO
    )]
    split_ratio: f64,
    #[arg(long, env = "SCRIBE_SEED", default_value_t = 42)]
    seed: u64,
    #[arg(
        long,
        env = "SCRIBE_MAX_TIME",
        default_value_t = TrainConfig::DEFAULT_MAX_TIME
    )]
    max_time: usize,
    /// Dataset index to transcribe after training.
    #[arg(long, env = "SCRIBE_SHOW_EXAMPLE", default_value_t = 0)]
    show_example: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = TrainConfig {
        learning_rate: args.learning_rate,
        batch_size: args.batch_size,
        epochs: args.epochs,
        l1_units: args.l1_units,
        l2_units: args.l2_units,
        noise_sigma: args.noise_sigma,
        split_ratio: args.split_ratio,
        seed: args.seed,
        max_time: args.max_time,
    };
    let device = Device::Cpu;

    let dataset = ScribeDataset::load(&args.dataset)
        .with_context(|| format!("loading dataset {}", args.dataset.display()))?;
    tracing::info!(
        examples = dataset.len(),
        feature_dim = dataset.feature_dim(),
        symbols = dataset.alphabet().len(),
        "dataset ready"
    );

    let run = train(&dataset, &config, &device).context("training failed")?;

    if let Some(mean) = mean(&run.report.training_losses()) {
        println!("mean training loss: {mean:.6}");
    }
    if let Some(mean) = mean(&run.report.validation_losses()) {
        println!("mean validation loss: {mean:.6}");
    }

    let index = args.show_example.min(dataset.len() - 1);
    show_prediction(&dataset, &run, index, &config, &device)
}

fn mean(values: &[f32]) -> Option<f32> {
    (!values.is_empty()).then(|| values.iter().sum::<f32>() / values.len() as f32)
}

/// Render one slab the way the network sees it, then print the true text
/// next to the raw per-frame readout and its collapsed form.
fn show_prediction(
    dataset: &ScribeDataset,
    run: &TrainRun,
    index: usize,
    config: &TrainConfig,
    device: &Device,
) -> anyhow::Result<()> {
    let example = dataset
        .example(index)
        .context("example index out of range")?;
    let batch = PaddedBatch::build(dataset, &[index], config.max_time, device)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let out = run.model.forward(&batch.inputs, Mode::Eval, &mut rng)?;

    let frames = out.probs.i(0)?.to_vec2::<f32>()?;
    let predicted = best_path(&frames);
    let alphabet = dataset.alphabet();
    let collapsed = collapse_path(&predicted, alphabet.blank());

    let padded = batch.inputs.i(0)?.to_vec2::<f32>()?;
    println!("example {index}:");
    print!("{}", render_slab(&transpose_frames(&padded)));
    println!("true: {}", alphabet.decode(&example.labels));
    println!("seen: {}", alphabet.decode(&predicted));
    println!("read: {}", alphabet.decode(&collapsed));
    Ok(())
}
