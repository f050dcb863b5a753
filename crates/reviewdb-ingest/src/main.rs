//! reviewdb-ingest - review dataset loader

use anyhow::Result;
use clap::{Parser, Subcommand};
use reviewdb_common::logging::{init_logging, LogConfig, LogLevel};
use reviewdb_ingest::{run, IngestConfig, IngestError, LoadMode, RunOptions};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "reviewdb-ingest")]
#[command(author, version, about = "Load review datasets into the relational and document stores")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Parse and stage everything against in-memory stores, write nothing
    #[arg(long, global = true)]
    dry_run: bool,

    /// Rows staged per table before a flush
    #[arg(long, global = true, env = "REVIEWDB_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Hide the progress bar
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// First load: recreate both stores and ingest the given files
    Load {
        /// Review files (defaults to REVIEWDB_BULK_FILES under REVIEWDB_DATA_DIR)
        files: Vec<PathBuf>,
    },

    /// Append files to the existing stores
    Append {
        /// Review files (defaults to REVIEWDB_INCREMENTAL_FILES under REVIEWDB_DATA_DIR)
        files: Vec<PathBuf>,
    },
}

impl Command {
    fn mode(&self) -> LoadMode {
        match self {
            Command::Load { .. } => LoadMode::Bulk,
            Command::Append { .. } => LoadMode::Incremental,
        }
    }

    fn files(&self) -> &[PathBuf] {
        match self {
            Command::Load { files } | Command::Append { files } => files,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("reviewdb-ingest")
        .build();

    // Environment variables take precedence over the flags
    let _guard = match log_config.merge_env().and_then(|config| init_logging(&config)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::from(2);
        },
    };

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<IngestError>()
                .map(IngestError::exit_code)
                .unwrap_or(1);
            error!(exit_code = code, "Ingestion failed: {:#}", e);
            ExitCode::from(code)
        },
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let mut config = IngestConfig::from_env();
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;

    let mode = cli.command.mode();
    let files = config.files_for(mode, cli.command.files());

    let cancel = CancellationToken::new();
    let listener = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing staged rows and stopping");
            listener.cancel();
        }
    });

    info!(mode = %mode, files = files.len(), dry_run = cli.dry_run, "Starting ingestion");

    let options = RunOptions {
        dry_run: cli.dry_run,
        show_progress: !cli.no_progress && std::io::stderr().is_terminal(),
        cancel,
    };
    let summary = run(&config, mode, &files, options).await?;

    for file in &summary.files {
        info!(
            file = %file.path.display(),
            category = %file.category,
            reviews = file.reviews,
            rejected = file.rejected_lines,
            "File summary"
        );
    }
    info!("{}", summary.summary());
    Ok(())
}
