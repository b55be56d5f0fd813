//! LeafBot CLI
//!
//! Classifies leaf images with a trained checkpoint and inspects checkpoints.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use leafbot::backend::{backend_name, default_device, InferenceBackend};
use leafbot::inference::{ModelCache, PredictionResult, Predictor, SCORE_DECIMALS};
use leafbot::model::{CheckpointSource, ModelCheckpoint, MpkCheckpointSource};
use leafbot::utils::logging::{init_logging, LogConfig, LogLevel, Session};
use leafbot::{InferenceConfig, LeafbotError, VERSION};

/// Plant leaf disease classification
#[derive(Parser, Debug)]
#[command(name = "leafbot")]
#[command(version)]
#[command(about = "Plant leaf disease classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false", conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, default_value = "false")]
    quiet: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify one or more leaf images
    Predict {
        /// Image files to classify
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Path to the model checkpoint (.mpk)
        #[arg(short = 'm', long)]
        checkpoint: Option<PathBuf>,

        /// Number of ranked labels per image
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print one JSON object per image
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show the classes and architecture stored in a checkpoint
    Inspect {
        /// Path to the model checkpoint (.mpk)
        #[arg(short = 'm', long)]
        checkpoint: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => InferenceConfig::from_file(path)?,
        None => InferenceConfig::default(),
    }
    .merge_env()?;

    if cli.log_file.is_some() {
        config.log_file = cli.log_file.clone();
    }

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    if let Some(path) = &config.log_file {
        log_config = log_config.with_log_file(path);
    }

    init_logging(&log_config).map_err(anyhow::Error::msg)?;
    let _session = Session::start();
    info!("leafbot {} on {}", VERSION, backend_name());

    match cli.command {
        Commands::Predict {
            images,
            checkpoint,
            top_k,
            json,
        } => {
            if let Some(path) = checkpoint {
                config.checkpoint_path = Some(path);
            }
            if let Some(k) = top_k {
                config.top_k = k;
            }
            cmd_predict(&config, &images, json)?;
        }

        Commands::Inspect { checkpoint } => {
            if let Some(path) = checkpoint {
                config.checkpoint_path = Some(path);
            }
            cmd_inspect(&config)?;
        }
    }

    Ok(())
}

fn cmd_predict(config: &InferenceConfig, images: &[PathBuf], json: bool) -> Result<()> {
    let cache = Arc::new(ModelCache::<InferenceBackend>::new(default_device()));
    let predictor = Predictor::from_config(config, cache)?;

    info!(
        "Classifying {} image(s) with {:?} on {}",
        images.len(),
        predictor.checkpoint_path(),
        backend_name()
    );

    let mut failures = 0;
    for image in images {
        let outcome = std::fs::read(image)
            .map_err(|e| LeafbotError::ImageDecode(format!("cannot read {:?}: {}", image, e)))
            .and_then(|bytes| predictor.predict(&bytes, config.top_k))
            .map(|result| result.rounded(SCORE_DECIMALS));

        if outcome.is_err() {
            failures += 1;
        }

        if json {
            print_json(image, &outcome)?;
        } else {
            print_ranked(image, &outcome);
        }
    }

    if failures > 0 {
        bail!("{} of {} image(s) failed", failures, images.len());
    }

    Ok(())
}

fn print_json(image: &Path, outcome: &leafbot::Result<PredictionResult>) -> Result<()> {
    let value = match outcome {
        Ok(result) => serde_json::json!({
            "image": image,
            "predictions": result.predictions,
        }),
        Err(err) => serde_json::json!({
            "image": image,
            "error": err.report(),
        }),
    };
    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}

fn print_ranked(image: &Path, outcome: &leafbot::Result<PredictionResult>) {
    println!("{} {}", "Image:".cyan().bold(), image.display());

    match outcome {
        Ok(result) => {
            for (rank, p) in result.predictions.iter().enumerate() {
                let line = format!("  {}. {} - {:.4}", rank + 1, p.label, p.score);
                if rank == 0 {
                    println!("{}", line.green().bold());
                } else {
                    println!("{}", line);
                }
            }
        }
        Err(err) => {
            let report = err.report();
            println!("  {} {}", format!("{}:", report.kind).red(), report.message);
        }
    }
    println!();
}

fn cmd_inspect(config: &InferenceConfig) -> Result<()> {
    let path = config.checkpoint_path()?;
    let device = default_device();

    let checkpoint: ModelCheckpoint<InferenceBackend> = MpkCheckpointSource.read(path, &device)?;
    let architecture = checkpoint
        .config()
        .map_err(|reason| LeafbotError::model_load(path, reason))
        .context("checkpoint architecture is unreadable")?;
    let (model, class_names) = checkpoint.bind(path, &device)?;

    println!("{}", "Checkpoint:".cyan().bold());
    println!("  Path:            {}", path.display());
    println!("  Backend:         {}", backend_name());
    println!("  Classes:         {}", class_names.len());
    println!("  Backbone blocks: {}", architecture.backbone.num_blocks());
    println!("  Feature width:   {}", model.backbone.out_channels());
    println!(
        "  Head:            {} -> {} -> {} -> {}",
        model.backbone.out_channels(),
        architecture.fc1_units,
        architecture.fc2_units,
        model.num_classes()
    );
    println!("  Dropout:         {}", architecture.dropout_rate);
    println!();

    println!("{}", "Class names:".cyan().bold());
    for (index, name) in class_names.iter().enumerate() {
        println!("  {:>3}  {}", index, name);
    }

    Ok(())
}
