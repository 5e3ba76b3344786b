//! vizier-ai - Image analysis pipeline
//!
//! Fingerprints images, skips content that was already analyzed, and sends
//! the rest to the configured visual classifier and LLM endpoints. Every
//! outcome lands in `<root>/vizier.db`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vizier_ai::config::{AnalysisConfig, FileConfig, PreprocessSettings};
use vizier_ai::db::JobStore;
use vizier_ai::models::ResultRecord;
use vizier_ai::services::{
    AnalysisOrchestrator, ApiLogger, BatchRunner, ContentFingerprinter, ImagePreprocessor,
    ImageScanner,
};
use vizier_common::config::{
    database_path, load_toml_config, locate_config_file, logs_dir, resolve_root_folder,
    CONFIG_FILE_ENV, ROOT_FOLDER_ENV,
};

const DEFAULT_LOG_FILTER: &str = "vizier_ai=info,vizier_common=info";

#[derive(Parser, Debug)]
#[command(name = "vizier-ai")]
#[command(about = "Content-addressed image analysis pipeline")]
#[command(version)]
struct Args {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database and logs
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze image files and directories
    Analyze {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Reprocess images that already completed
        #[arg(long)]
        force: bool,

        /// Images processed at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write `<stem>_analysis.json` per image into this directory
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the stored result record for an image path or fingerprint
    Show { target: String },

    /// List stored images that look like the given image
    Similar {
        path: PathBuf,

        /// Maximum Hamming distance between difference hashes
        #[arg(long, default_value = "10")]
        max_distance: u32,
    },

    /// Print job store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = locate_config_file(args.config.as_deref(), CONFIG_FILE_ENV);
    let file_config: FileConfig =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    let filter = file_config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting vizier-ai {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        file_config.root_folder.as_deref(),
    );
    std::fs::create_dir_all(&root_folder).with_context(|| {
        format!("Failed to create root folder {}", root_folder.display())
    })?;

    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let store = JobStore::open(&db_path)
        .await
        .context("Failed to open job store")?;

    match args.command {
        Command::Analyze {
            paths,
            force,
            concurrency,
            output,
        } => {
            let mut file_config = file_config;
            file_config.pipeline.force_reprocess |= force;
            if let Some(concurrency) = concurrency {
                file_config.pipeline.concurrency = concurrency;
            }
            analyze(file_config, store, &root_folder, paths, output).await
        }
        Command::Show { target } => show(&store, &target).await,
        Command::Similar { path, max_distance } => similar(&store, &path, max_distance).await,
        Command::Stats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn analyze(
    file_config: FileConfig,
    store: JobStore,
    root_folder: &Path,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let config = Arc::new(AnalysisConfig::from_file_config(&file_config)?);

    let api_log = if config.log_api_communication {
        let logger = ApiLogger::new(&logs_dir(root_folder));
        info!("API communication log: {}", logger.path().display());
        Some(Arc::new(logger))
    } else {
        None
    };

    let paths = ImageScanner::new().expand(&inputs)?;
    if paths.is_empty() {
        bail!("No images found");
    }

    if let Some(dir) = &output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let concurrency = config.concurrency;
    let orchestrator = Arc::new(AnalysisOrchestrator::new(config, store, api_log)?);
    let runner = BatchRunner::new(orchestrator, concurrency);

    let summary = runner
        .run_with(paths, |record| emit_record(record, output.as_deref()))
        .await?;

    eprintln!(
        "{} image(s): {} completed, {} skipped, {} failed in {} ms",
        summary.total, summary.completed, summary.skipped, summary.failed, summary.elapsed_ms
    );
    for error in &summary.errors {
        eprintln!("  {}: {}", error.path, error.messages.join("; "));
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Write one record to `<output>/<stem>_analysis.json`, or stdout as a JSON line
fn emit_record(record: &ResultRecord, output: Option<&Path>) {
    let Some(dir) = output else {
        match serde_json::to_string(record) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to serialize result record: {}", e),
        }
        return;
    };

    let stem = Path::new(&record.file_info.filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| record.file_info.filename.clone());
    let target = dir.join(format!("{}_analysis.json", stem));

    let written = serde_json::to_vec_pretty(record)
        .map_err(|e| e.to_string())
        .and_then(|bytes| std::fs::write(&target, bytes).map_err(|e| e.to_string()));
    match written {
        Ok(()) => tracing::debug!(path = %target.display(), "Wrote result record"),
        Err(e) => tracing::error!(path = %target.display(), "Failed to write result record: {}", e),
    }
}

async fn show(store: &JobStore, target: &str) -> Result<ExitCode> {
    let candidate = Path::new(target);
    let fingerprint = if candidate.is_file() {
        ContentFingerprinter::new().fingerprint_file(candidate).await?.digest
    } else {
        target.to_ascii_lowercase()
    };

    let Some(image) = store.get_image(&fingerprint).await? else {
        eprintln!("No stored image for {}", target);
        return Ok(ExitCode::FAILURE);
    };

    let latest = store.latest_results(image.image_id).await?;
    let path = if candidate.is_file() {
        candidate.to_path_buf()
    } else {
        match &image.directory {
            Some(dir) => Path::new(dir).join(&image.filename),
            None => PathBuf::from(&image.filename),
        }
    };
    let record = ResultRecord::assemble(&path, &image, &latest, Vec::new(), true);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(ExitCode::SUCCESS)
}

async fn similar(store: &JobStore, path: &Path, max_distance: u32) -> Result<ExitCode> {
    let fingerprint = ContentFingerprinter::new().fingerprint_file(path).await?;
    let stored = store.get_image(&fingerprint.digest).await?;

    let hashes = match stored.as_ref().and_then(|image| image.perceptual_hashes.clone()) {
        Some(hashes) => hashes,
        None => {
            let prepared = ImagePreprocessor::new(PreprocessSettings::default())
                .with_perceptual_hashes(true)
                .prepare(path)
                .await?;
            match prepared.metadata.perceptual_hashes {
                Some(hashes) => hashes,
                None => bail!("No perceptual hash computed for {}", path.display()),
            }
        }
    };

    let exclude = stored.as_ref().map(|image| image.image_id);
    let matches = store
        .find_similar(&hashes.difference, max_distance, exclude)
        .await?;

    if matches.is_empty() {
        eprintln!("No similar images within distance {}", max_distance);
    }
    for (image, distance) in matches {
        let location = match &image.directory {
            Some(dir) => Path::new(dir).join(&image.filename),
            None => PathBuf::from(&image.filename),
        };
        println!("{}\t{}\t{}", distance, image.fingerprint, location.display());
    }

    Ok(ExitCode::SUCCESS)
}
