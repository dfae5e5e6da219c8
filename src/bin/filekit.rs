//! CLI binary for filekit.
//!
//! A thin shim over the library crate: each subcommand builds a
//! `WorkspaceConfig`, selects the given files, runs one tool and saves the
//! artifacts into the output directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use filekit::{
    decode_text, encode_text, AcceptedTypes, DirectoryTarget, OverflowPolicy,
    ProcessingProgressCallback, ProgressCallback, RawInput, ToolCatalog, ToolDescriptor,
    ToolOptions, Workspace, WorkspaceConfig,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const MIB: u64 = 1024 * 1024;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn human_bytes(n: u64) -> String {
    if n >= MIB {
        format!("{:.1} MiB", n as f64 / MIB as f64)
    } else if n >= 1024 {
        format!("{:.1} KiB", n as f64 / 1024.0)
    } else {
        format!("{n} B")
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a 0–100 bar (driven by the workspace progress stream) and one log
/// line per finished file. Files may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new(bar: ProgressBar) -> Arc<Self> {
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_files: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, index: usize, _total: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, output_bytes: u64) {
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            index,
            total,
            dim(&human_bytes(output_bytes)),
            self.elapsed(index),
        ));
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            self.elapsed(index),
        ));
    }
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
    bar.set_style(style);
    bar.set_prefix("Working");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compress photos at 60% quality into ./out
  filekit -o out compress --quality 0.6 a.jpg b.png

  # Convert to WebP
  filekit convert --to webp scan.png

  # Merge PDFs (byte-level concatenation, 50 MiB cap)
  filekit merge part1.pdf part2.pdf

  # Split a PDF into one output per range
  filekit split --ranges 1-3,4,5-9 report.pdf

  # Base64 text mode (prints to stdout)
  filekit encode --text hello
  filekit decode --text aGVsbG8=

  # Tool catalog as JSON
  filekit --json tools --search image

ENVIRONMENT VARIABLES:
  FILEKIT_OUTPUT_DIR         Directory for saved artifacts
  FILEKIT_MAX_FILES          Files accepted per run
  FILEKIT_MAX_FILE_SIZE_MB   Per-file cap in MiB
  FILEKIT_MAX_BATCH_SIZE_MB  Whole-batch cap in MiB
  FILEKIT_CONCURRENCY        Files transformed at once
  RUST_LOG                   Overrides the log filter
"#;

/// Compress, convert, merge, split and Base64 files locally.
#[derive(Parser, Debug)]
#[command(
    name = "filekit",
    version,
    about = "Compress, convert, merge, split and Base64 files locally",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory artifacts are saved into.
    #[arg(short, long, global = true, env = "FILEKIT_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Maximum number of input files accepted.
    #[arg(long, global = true, env = "FILEKIT_MAX_FILES", default_value_t = 20)]
    max_files: usize,

    /// Per-file size cap in MiB.
    #[arg(long, global = true, env = "FILEKIT_MAX_FILE_SIZE_MB", default_value_t = 10)]
    max_file_size_mb: u64,

    /// Whole-batch size cap in MiB.
    #[arg(long, global = true, env = "FILEKIT_MAX_BATCH_SIZE_MB", default_value_t = 100)]
    max_batch_size_mb: u64,

    /// Files transformed concurrently.
    #[arg(short, long, global = true, env = "FILEKIT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Report files past --max-files instead of silently dropping them.
    #[arg(long, global = true)]
    report_overflow: bool,

    /// Print results as JSON.
    #[arg(long, global = true, env = "FILEKIT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "FILEKIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILEKIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILEKIT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-encode images at a lower quality (longer edge capped at 4096 px).
    Compress {
        /// Quality in (0, 1].
        #[arg(long, default_value_t = 0.8)]
        quality: f32,
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Convert images to another format.
    Convert {
        /// Target format: webp, jpg, jpeg, png, bmp.
        #[arg(long = "to", default_value = "webp")]
        target: String,
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Concatenate PDFs into merged_document.pdf.
    Merge {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Emit one output per page range (placeholder: each holds the full file).
    Split {
        /// Page ranges, e.g. 1-3,5,7-9.
        #[arg(long)]
        ranges: String,
        file: PathBuf,
    },
    /// Base64-encode files, or a string with --text.
    Encode(TextOrFiles),
    /// Decode Base64 files, or a string with --text.
    Decode(TextOrFiles),
    /// List the tool catalog.
    Tools {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        popular: bool,
        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Args, Debug)]
struct Inputs {
    /// Input files.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct TextOrFiles {
    /// Operate on this string instead of files.
    #[arg(long, conflicts_with = "files")]
    text: Option<String>,
    /// Input files.
    #[arg(required_unless_present = "text")]
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct Saved<'a> {
    #[serde(flatten)]
    artifact: &'a filekit::Artifact,
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar replaces INFO-level library logs while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Compress { quality, inputs } => {
            let options = ToolOptions {
                quality: Some(*quality),
                ..Default::default()
            };
            run_tool(&cli, "image-compress", "image/*", &inputs.files, &options).await
        }
        Command::Convert { target, inputs } => {
            let options = ToolOptions {
                target_format: Some(target.clone()),
                ..Default::default()
            };
            run_tool(&cli, "image-convert", "image/*", &inputs.files, &options).await
        }
        Command::Merge { inputs } => {
            run_tool(&cli, "pdf-merge", ".pdf", &inputs.files, &ToolOptions::default()).await
        }
        Command::Split { ranges, file } => {
            let options = ToolOptions {
                page_ranges: Some(ranges.clone()),
                ..Default::default()
            };
            run_tool(&cli, "pdf-split", ".pdf", std::slice::from_ref(file), &options).await
        }
        Command::Encode(args) => match &args.text {
            Some(text) => print_text(&cli, &encode_text(text)),
            None => {
                run_tool(&cli, "base64-encode", "*", &args.files, &ToolOptions::default()).await
            }
        },
        Command::Decode(args) => match &args.text {
            Some(text) => {
                let decoded = decode_text(text).context("Invalid Base64 input")?;
                print_text(&cli, &decoded)
            }
            None => {
                run_tool(&cli, "base64-decode", "*", &args.files, &ToolOptions::default()).await
            }
        },
        Command::Tools {
            category,
            popular,
            search,
        } => list_tools(&cli, category.as_deref(), *popular, search.as_deref()).await,
    }
}

/// Select `files`, run `tool_id` and save every artifact.
async fn run_tool(
    cli: &Cli,
    tool_id: &str,
    accepted: &str,
    files: &[PathBuf],
    options: &ToolOptions,
) -> Result<()> {
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let bar = show_progress.then(progress_bar);
    let callback = bar
        .clone()
        .map(|b| CliProgressCallback::new(b) as ProgressCallback);

    let ws = Workspace::new(build_config(cli, accepted, callback)?);
    let inputs = files.iter().map(RawInput::from_path).collect();
    let rejected = ws
        .select_inputs(inputs)
        .await
        .context("Failed to read input files")?;
    for r in &rejected {
        eprintln!("{} skipped {}", cyan("⚠"), r);
    }
    if ws.files().is_empty() {
        if let Some(b) = &bar {
            b.finish_and_clear();
        }
        anyhow::bail!("No input files were accepted for {tool_id}");
    }

    let ticker = bar.clone().map(|b| {
        let mut progress = ws.progress_stream();
        tokio::spawn(async move {
            while let Some(p) = progress.next().await {
                b.set_position(u64::from(p));
            }
        })
    });

    let started = Instant::now();
    let outcome = ws.process_tool(tool_id, options).await;
    if let Some(t) = ticker {
        t.abort();
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    let artifacts = outcome.with_context(|| format!("{tool_id} failed"))?;

    let target = DirectoryTarget::new(&cli.output_dir);
    let paths = ws
        .download_all(&target)
        .await
        .with_context(|| format!("Failed to save results to {}", cli.output_dir.display()))?;

    if cli.json {
        let saved: Vec<Saved<'_>> = artifacts
            .iter()
            .zip(paths)
            .map(|(artifact, path)| Saved { artifact, path })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&saved).context("Failed to serialise results")?
        );
    } else if !cli.quiet {
        for (a, path) in artifacts.iter().zip(&paths) {
            eprintln!(
                "  {} {:<32} {:>10}  →  {}",
                green("✔"),
                a.name,
                dim(&human_bytes(a.byte_size)),
                bold(&path.display().to_string()),
            );
        }
        eprintln!(
            "{} {} artifact(s) in {}ms",
            green("✔"),
            artifacts.len(),
            started.elapsed().as_millis()
        );
    }
    Ok(())
}

/// Map CLI args to `WorkspaceConfig`.
fn build_config(
    cli: &Cli,
    accepted: &str,
    progress: Option<ProgressCallback>,
) -> Result<WorkspaceConfig> {
    let mut builder = WorkspaceConfig::builder()
        .accepted_types(AcceptedTypes::parse(accepted))
        .max_files(cli.max_files)
        .max_file_size(cli.max_file_size_mb.saturating_mul(MIB))
        .max_batch_size(cli.max_batch_size_mb.saturating_mul(MIB))
        .concurrency(cli.concurrency)
        .settle_delay(Duration::ZERO);
    if cli.report_overflow {
        builder = builder.overflow(OverflowPolicy::Report);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn print_text(cli: &Cli, text: &str) -> Result<()> {
    if cli.json {
        let value = serde_json::json!({ "text": text });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialise output")?
        );
    } else {
        println!("{text}");
    }
    Ok(())
}

async fn list_tools(
    cli: &Cli,
    category: Option<&str>,
    popular: bool,
    search: Option<&str>,
) -> Result<()> {
    let catalog = ToolCatalog::builtin().context("Failed to load tool catalog")?;
    let mut tools: Vec<ToolDescriptor> = match (search, category) {
        (Some(q), _) => catalog.search(q).await,
        (None, Some(c)) => catalog.get_by_category(c).await,
        (None, None) if popular => catalog.get_popular().await,
        (None, None) => catalog.get_all().await,
    };
    if let Some(c) = category {
        tools.retain(|t| t.category == c);
    }
    if popular {
        tools.retain(|t| t.popular);
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&tools).context("Failed to serialise catalog")?
        );
        return Ok(());
    }
    for t in &tools {
        println!(
            "{:<15} {:<7} {}{}",
            bold(&t.slug),
            t.category,
            t.description,
            if t.popular { cyan("  ★") } else { String::new() }
        );
    }
    Ok(())
}
