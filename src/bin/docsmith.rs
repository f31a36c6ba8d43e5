//! CLI binary for docsmith.
//!
//! `serve` runs the HTTP gateway; `process` runs one operation on local
//! files without a server; `sweep` applies the retention policy once.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docsmith::pipeline::input;
use docsmith::store::{sweep, OutputStore, StagingArea};
use docsmith::{
    Application, Dispatcher, Operation, OperationKind, OperationParams, RetentionPolicy,
    ServiceConfig,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 8080
  docsmith serve --bind 0.0.0.0:8080

  # Merge two PDFs into ./out
  docsmith process pdf-merge a.pdf b.pdf --out out

  # Resize an image
  docsmith process image-resize photo.png --width 800 --height 600

  # Rotate every page by 90 degrees
  docsmith process rotate scan.pdf --rotation-angle 90

  # Expire stored files older than one day, once
  docsmith sweep --ttl 1d

OPERATIONS:
  pdf-to-word  pdf-to-text  word-to-pdf  pdf-merge  pdf-split  image-resize
  image-to-pdf  watermark  rotate  pdf-compress  pdf-to-jpg  protect

ENVIRONMENT VARIABLES:
  DOCSMITH_BIND, DOCSMITH_STAGING_DIR, DOCSMITH_OUTPUT_DIR, ...
                          Every `serve` flag has a DOCSMITH_* equivalent
  RUST_LOG                Overrides the log filter (e.g. docsmith=debug)
  PDFIUM_LIB_PATH         libpdfium to load for pdf-to-jpg (pdfium builds)
"#;

/// Document and image conversion service.
#[derive(Parser, Debug)]
#[command(
    name = "docsmith",
    version,
    about = "Convert, merge, split, rotate and watermark PDFs, Word files and images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCSMITH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCSMITH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway.
    Serve(ServeArgs),
    /// Run one operation on local files.
    Process(ProcessArgs),
    /// Remove stored files older than the TTL, once.
    Sweep(SweepArgs),
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Root directory for per-request upload staging.
    #[arg(long, env = "DOCSMITH_STAGING_DIR", default_value = "data/uploads")]
    staging_dir: PathBuf,

    /// Directory for produced files awaiting download.
    #[arg(long, env = "DOCSMITH_OUTPUT_DIR", default_value = "data/output")]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "DOCSMITH_BIND", default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    #[command(flatten)]
    stores: StoreArgs,

    /// Per-file upload limit in MiB.
    #[arg(long, env = "DOCSMITH_MAX_FILE_MB", default_value_t = 50)]
    max_file_mb: u64,

    /// Maximum file parts per request.
    #[arg(long, env = "DOCSMITH_MAX_FILES", default_value_t = 20)]
    max_files: usize,

    /// Processing time limit per operation (e.g. 90s, 2m).
    #[arg(long, env = "DOCSMITH_TIMEOUT", default_value = "2m",
          value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Evict stored files older than this (e.g. 1h, 1d). 0s keeps everything.
    #[arg(long, env = "DOCSMITH_RETENTION_TTL", default_value = "1h",
          value_parser = humantime::parse_duration)]
    retention_ttl: Duration,

    /// How often the eviction sweep runs.
    #[arg(long, env = "DOCSMITH_SWEEP_INTERVAL", default_value = "5m",
          value_parser = humantime::parse_duration)]
    sweep_interval: Duration,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Operation identifier, e.g. pdf-merge.
    operation: String,

    /// Input files, in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Directory to write results into.
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Target width in pixels (image-resize).
    #[arg(long)]
    width: Option<u32>,

    /// Target height in pixels (image-resize).
    #[arg(long)]
    height: Option<u32>,

    /// Stamp text (watermark).
    #[arg(long)]
    watermark_text: Option<String>,

    /// 90, 180 or 270 (rotate).
    #[arg(long)]
    rotation_angle: Option<u32>,

    /// low, medium or high (pdf-compress).
    #[arg(long)]
    compression_level: Option<String>,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SweepArgs {
    #[command(flatten)]
    stores: StoreArgs,

    /// Remove anything older than this.
    #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
    ttl: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "docsmith=debug,tower_http=debug"
    } else if cli.quiet {
        "error"
    } else {
        "docsmith=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Process(args) => process(args, cli.quiet).await,
        Command::Sweep(args) => sweep_once(args, cli.quiet).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let retention = if args.retention_ttl.is_zero() {
        RetentionPolicy::disabled()
    } else {
        RetentionPolicy {
            ttl: args.retention_ttl,
            sweep_interval: args.sweep_interval,
        }
    };
    let config = ServiceConfig::builder()
        .bind(args.bind)
        .staging_dir(args.stores.staging_dir)
        .output_dir(args.stores.output_dir)
        .max_file_bytes(args.max_file_mb.saturating_mul(1024 * 1024))
        .max_files(args.max_files)
        .processing_timeout_secs(args.timeout.as_secs())
        .retention(retention)
        .build()
        .context("Invalid configuration")?;

    Application::new(config)
        .await
        .context("Failed to prepare stores")?
        .serve(shutdown_signal())
        .await
        .context("Server failed")
}

/// Wait for SIGTERM or Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down gracefully..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down gracefully..."),
    }
}

async fn process(args: ProcessArgs, quiet: bool) -> Result<()> {
    let kind: OperationKind = args.operation.parse()?;

    let mut params = OperationParams::new();
    let fields = [
        ("width", args.width.map(|v| v.to_string())),
        ("height", args.height.map(|v| v.to_string())),
        ("watermarkText", args.watermark_text.clone()),
        ("rotationAngle", args.rotation_angle.map(|v| v.to_string())),
        ("compressionLevel", args.compression_level.clone()),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            params.insert(name, value);
        }
    }
    let operation = Operation::decode(kind, &params)?;

    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let staging = StagingArea::new(scratch.path());
    let mut stage = staging.begin()?;
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let input = input::from_path(path);
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        stage
            .stage_bytes(&input.name, mime.essence_str(), &bytes)
            .await?;
    }

    tokio::fs::create_dir_all(&args.out)
        .await
        .with_context(|| format!("Cannot create {}", args.out.display()))?;
    let dispatcher = Dispatcher::new(
        OutputStore::new(&args.out),
        ServiceConfig::default().processing_timeout(),
    );

    match dispatcher.dispatch(operation, stage.files()).await {
        Ok(result) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if !quiet {
                for name in result.all_outputs() {
                    eprintln!("{} {}", green("✓"), args.out.join(name).display());
                }
                if let Some(message) = &result.message {
                    eprintln!("  {}", dim(message));
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", red("✗"), e);
            Err(e.into())
        }
    }
}

async fn sweep_once(args: SweepArgs, quiet: bool) -> Result<()> {
    for dir in [&args.stores.staging_dir, &args.stores.output_dir] {
        let stats = sweep(dir, args.ttl)
            .await
            .with_context(|| format!("Sweep of {} failed", dir.display()))?;
        if !quiet {
            eprintln!(
                "{} {}: removed {}, failed {}",
                if stats.failed == 0 { green("✓") } else { red("✗") },
                dir.display(),
                stats.removed,
                stats.failed
            );
        }
    }
    Ok(())
}
