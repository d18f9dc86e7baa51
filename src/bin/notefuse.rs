//! CLI binary for notefuse.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use notefuse::{process, ProcessConfig, ProgressCallback, RunProgressCallback};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one progress bar anchored at the bottom plus
/// a log line per note. Notes are processed sequentially, so lines always
/// arrive in order.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Bar length is set by `on_run_start` once normalisation knows the
    /// target count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Probing downloader service…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} notes  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_notes: usize) {
        self.activate_bar(total_notes);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_notes} notes…"))
        ));
    }

    fn on_note_start(&self, _index: usize, _total: usize, note_id: &str) {
        self.bar.set_message(note_id.to_string());
    }

    fn on_note_complete(
        &self,
        index: usize,
        total: usize,
        note_id: &str,
        content_len: usize,
        from_cache: bool,
    ) {
        let origin = if from_cache { "cached" } else { "fresh" };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index,
            total,
            note_id,
            dim(&format!("{content_len:>6} chars")),
            dim(origin),
        ));
        self.bar.inc(1);
    }

    fn on_note_error(&self, index: usize, total: usize, note_id: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            note_id,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_notes: usize, success_count: usize) {
        let failed = total_notes.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} notes processed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} notes processed  ({} failed)",
                if failed == total_notes {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_notes,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Single note by id
  notefuse "68a9a370000000001b037dc0"

  # Share URL with auth token (preferred — the service needs the token)
  notefuse "https://www.xiaohongshu.com/explore/68a9a370000000001b037dc0?xsec_token=AB..."

  # Pasted numbered list
  notefuse "1. 68a9a370000000001b037dc0
  2. 68a82fc1000000001d02ab79"

  # Print the merged document to stdout
  notefuse --print "68a9a370000000001b037dc0"

  # Structured JSON output
  notefuse --json "68a9a370000000001b037dc0" > run.json

EXIT CODES:
  0  batch ran (even if individual notes failed — check the error log)
  1  no usable targets in the input, or the downloader service is down

SERVICES:
  The downloader must be running locally before a batch starts:
    docker run --name xhs-api -d -p 5556:5556 \
      -v xhs_downloader_volume:/app/Volume \
      joeanamier/xhs-downloader python main.py api

  OCR expects a PaddleOCR-style serving endpoint (base64 images in,
  recognised lines out) on 127.0.0.1:8868.

ENVIRONMENT VARIABLES:
  NOTEFUSE_API_URL      Downloader detail endpoint
  NOTEFUSE_OCR_URL      OCR serving endpoint
  NOTEFUSE_NOTES_DIR    Per-note checkpoint root
  NOTEFUSE_OUTPUT_DIR   Per-run output root
"#;

/// Fetch Xiaohongshu notes, OCR their images, and merge into one document.
#[derive(Parser, Debug)]
#[command(
    name = "notefuse",
    version,
    about = "Fetch Xiaohongshu notes, OCR their images, and merge into one Markdown document",
    long_about = "Process a pasted list of Xiaohongshu note ids or share URLs: fetch each note's \
metadata and images through a local XHS-Downloader service, recognise the text inside every \
image, and fuse the batch into a single merged Markdown document. All intermediate results are \
checkpointed on disk, so re-running the same input never redoes completed work.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Raw target list: note ids and/or share URLs, any separator.
    input: String,

    /// Downloader API detail endpoint.
    #[arg(long, env = "NOTEFUSE_API_URL", default_value = "http://127.0.0.1:5556/xhs/detail")]
    api_url: String,

    /// Downloader liveness probe endpoint.
    #[arg(long, env = "NOTEFUSE_PROBE_URL", default_value = "http://127.0.0.1:5556/docs")]
    probe_url: String,

    /// OCR serving endpoint.
    #[arg(long, env = "NOTEFUSE_OCR_URL", default_value = "http://127.0.0.1:8868/ocr")]
    ocr_url: String,

    /// Per-note fetch timeout in seconds.
    #[arg(long, env = "NOTEFUSE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Per-image OCR timeout in seconds.
    #[arg(long, env = "NOTEFUSE_OCR_TIMEOUT", default_value_t = 120)]
    ocr_timeout: u64,

    /// Delay between image downloads in milliseconds.
    #[arg(long, env = "NOTEFUSE_IMAGE_DELAY", default_value_t = 500)]
    image_delay_ms: u64,

    /// Per-note checkpoint root directory.
    #[arg(long, env = "NOTEFUSE_NOTES_DIR", default_value = "notes")]
    notes_dir: PathBuf,

    /// Per-run output root directory.
    #[arg(long, env = "NOTEFUSE_OUTPUT_DIR", default_value = "runs")]
    output_dir: PathBuf,

    /// Print the merged document to stdout after the run.
    #[arg(long)]
    print: bool,

    /// Output the full run result as JSON instead of the summary.
    #[arg(long, env = "NOTEFUSE_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "NOTEFUSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "NOTEFUSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "NOTEFUSE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn RunProgressCallback>)
    } else {
        None
    };

    let mut builder = ProcessConfig::builder()
        .api_url(&cli.api_url)
        .probe_url(&cli.probe_url)
        .ocr_url(&cli.ocr_url)
        .api_timeout_secs(cli.api_timeout)
        .ocr_timeout_secs(cli.ocr_timeout)
        .image_delay_ms(cli.image_delay_ms)
        .notes_dir(&cli.notes_dir)
        .output_dir(&cli.output_dir);

    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run the batch ────────────────────────────────────────────────────
    // Fatal errors (unusable input, dead service) propagate and exit 1;
    // per-note failures do not — the batch itself succeeded.
    let output = process(&cli.input, &config).await?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if cli.print {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.merged.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.merged.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        eprintln!(
            "{}  {}/{} notes  {}ms  →  {}",
            if output.stats.failed == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.stats.succeeded,
            output.stats.total_targets,
            output.stats.total_duration_ms,
            bold(&output.merged_path.display().to_string()),
        );
        if output.stats.failed > 0 {
            eprintln!(
                "   {} notes failed — see {}",
                red(&output.stats.failed.to_string()),
                dim(&output.error_log_path.display().to_string()),
            );
        }
    }

    Ok(())
}
