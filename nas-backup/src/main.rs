//! NAS Backup - Main entry point
//!
//! Example:
//!   nas-backup -c creds.json -n 5 ./documents.tgz /backups/phil/documents

use clap::Parser;
use nas_backup::{
    rotation::CleanupReport, transfer::LogProgress, utils, AppError, BackupRotator, Credentials,
    FileStation, QnapSession, RetentionPolicy, Settings,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Exit code when the backup was stored but old backups were left behind.
const EXIT_CLEANUP_INCOMPLETE: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, allow_missing_positional = true)]
struct Args {
    /// Number of backups to keep
    #[arg(short = 'n', value_name = "NUM_TO_KEEP", allow_negative_numbers = true)]
    count: i64,

    /// Credentials JSON file
    #[arg(short = 'c', long = "creds", value_name = "FILE", default_value = "creds.json")]
    creds: PathBuf,

    /// Settings TOML file
    #[arg(short = 's', long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Quiet: only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Only prune old backups; do not upload
    #[arg(long)]
    cleanup_only: bool,

    /// Local file to back up (not needed with --cleanup-only)
    #[arg(required_unless_present = "cleanup_only")]
    local_file: Option<PathBuf>,

    /// Remote backup path, e.g. /backups/phil/documents
    remote_backup_path: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(report) if report.is_complete() => ExitCode::SUCCESS,
        Ok(report) => {
            if let Some(failure) = report.failure {
                eprintln!("{}", failure.reason);
                eprintln!("Old backups left in place:");
                for path in failure.remaining {
                    eprintln!("  {}", path);
                }
            }
            ExitCode::from(EXIT_CLEANUP_INCOMPLETE)
        }
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn config_error(e: anyhow::Error) -> AppError {
    AppError::Config(format!("{:#}", e))
}

async fn run(args: Args) -> nas_backup::Result<CleanupReport> {
    let settings = match &args.settings {
        Some(path) => Settings::from_file(path).map_err(|e| {
            AppError::Config(format!("Failed to load settings from {}: {:#}", path.display(), e))
        })?,
        None => Settings::default(),
    };

    let level = args.log_level.as_deref().unwrap_or(&settings.log.level);
    utils::logger::init(utils::logger::effective_level(level, args.quiet)).map_err(config_error)?;

    // Contract violations fail before anything touches the network.
    RetentionPolicy::new(args.count)?;

    let creds = Credentials::from_file(&args.creds).map_err(config_error)?;
    let mut session = QnapSession::new(&creds.url, &settings.client.user_agent)?;
    let login = session.login(&creds.username, &creds.password).await;
    drop(creds);
    login?;

    let file_station = FileStation::new(session);
    let rotator = BackupRotator::new(&file_station)
        .with_observer(Arc::new(LogProgress))
        .with_progress_interval(Duration::from_secs(settings.upload.progress_interval_secs));

    if args.cleanup_only {
        let report = rotator.cleanup(&args.remote_backup_path, args.count).await?;
        tracing::info!(deleted = report.deleted.len(), "Cleanup finished");
        return Ok(report);
    }

    let local_file = args
        .local_file
        .as_deref()
        .ok_or_else(|| AppError::Config("No local file given".to_string()))?;
    let report = rotator
        .rotate(local_file, &args.remote_backup_path, args.count)
        .await?;
    tracing::info!(
        uploaded = %report.uploaded,
        deleted = report.cleanup.deleted.len(),
        "Rotation finished"
    );
    Ok(report.cleanup)
}
