use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use onnx_vision::{
    classify::{BatchReport, ImageClassifier, ItemStatus},
    config::{Config, ExecutionTarget, OptimizationLevel},
    web::serve,
    RawImage,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onnx-vision")]
#[command(about = "ONNX-powered image classification")]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP classification service
    Serve {
        /// Server bind address
        #[arg(long, default_value = "0.0.0.0:5005")]
        bind: String,

        /// Number of worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// Enable development mode
        #[arg(long)]
        dev: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
    /// Classify image files one after another and print a summary
    Classify {
        /// Image files, processed in the given order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Model file inside the model directory
    #[arg(long, default_value = "mobilenetv2.onnx")]
    model_file: String,

    /// Label file inside the model directory
    #[arg(long, default_value = "labels.txt")]
    labels_file: String,

    /// Number of ranked predictions per result
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    #[arg(long, value_enum, default_value_t = ExecutionTarget::Cpu)]
    execution_target: ExecutionTarget,

    #[arg(long, value_enum, default_value_t = OptimizationLevel::All)]
    optimization_level: OptimizationLevel,
}

impl ModelArgs {
    fn apply(self, config: &mut Config) -> Result<()> {
        config.model_file = self.model_file;
        config.labels_file = self.labels_file;
        config.top_k = self.top_k;
        config.onnx_config.execution_target = self.execution_target;
        config.onnx_config.optimization_level = self.optimization_level;
        config.load_preprocess_sidecar()?;
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Command::Serve {
            bind,
            workers,
            dev,
            model,
        } => {
            tracing::info!("Starting ONNX vision service...");
            tracing::info!("Bind address: {}", bind);
            tracing::info!("Models directory: {}", model.models_dir);

            let mut config = Config::new(bind, model.models_dir.clone(), workers, dev)?;
            model.apply(&mut config)?;

            // Async workers handle requests; classification itself runs on the blocking pool
            tracing::info!("Worker threads: {}", config.workers);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.workers)
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;
            runtime.block_on(serve(config))?;
        }
        Command::Classify { files, json, model } => {
            let mut config = Config::new("127.0.0.1:0".to_string(), model.models_dir.clone(), Some(1), false)?;
            model.apply(&mut config)?;

            let report = classify_files(&config, &files)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

fn classify_files(config: &Config, files: &[PathBuf]) -> Result<BatchReport> {
    let classifier = ImageClassifier::load(config)?;
    let images = read_images(files);

    let mut run = classifier.classify_batch(&images);
    for event in run.by_ref() {
        if event.item.status == ItemStatus::Processing {
            eprintln!("[{}/{}] {}", event.index + 1, event.total, event.item.name);
        }
    }
    Ok(run.into_report())
}

/// Reads every path in order. Unreadable paths are skipped with a warning.
fn read_images(files: &[PathBuf]) -> Vec<RawImage> {
    let mut images = Vec::with_capacity(files.len());
    for path in files {
        match std::fs::read(path) {
            Ok(bytes) => images.push(RawImage::new(path.display().to_string(), bytes)),
            Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
        }
    }
    if images.len() < files.len() {
        tracing::warn!("{} of {} files could not be read", files.len() - images.len(), files.len());
    }
    images
}

fn print_report(report: &BatchReport) {
    for item in &report.items {
        match (&item.result, &item.error) {
            (Some(result), _) => println!(
                "{:<40} {:<30} {:>6.2}%  {:>8.2}ms",
                item.name,
                result.label,
                result.confidence * 100.0,
                result.elapsed_ms
            ),
            (None, Some(error)) => println!("{:<40} ERROR: {}", item.name, error),
            (None, None) => println!("{:<40} {:?}", item.name, item.status),
        }
    }

    let Some(stats) = &report.statistics else {
        println!("\nNo images were classified successfully.");
        return;
    };

    println!();
    println!(
        "Classified {}/{} images ({} failed)",
        stats.done_count, stats.total_items, stats.error_count
    );
    println!("Mean confidence: {:.2}%", stats.mean_confidence * 100.0);
    println!("Mean time:       {:.2}ms", stats.mean_elapsed_ms);
    println!(
        "Fastest:         {} ({:.2}ms)",
        stats.fastest.name, stats.fastest.elapsed_ms
    );
    println!(
        "Slowest:         {} ({:.2}ms)",
        stats.slowest.name, stats.slowest.elapsed_ms
    );
    println!("Labels:");
    for (label, count) in &stats.label_counts {
        println!("  {:<30} {}", label, count);
    }
}
