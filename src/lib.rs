//! # notefuse
//!
//! Fetch Xiaohongshu notes, OCR their images, and merge everything into
//! one Markdown source document.
//!
//! ## Why this crate?
//!
//! Xiaohongshu notes carry most of their content inside images — recipe
//! cards, slides, annotated screenshots. Copy-pasting a note loses all of
//! it. This crate drives a local XHS-Downloader service and an OCR engine
//! to pull the note metadata *and* the text inside every image, then fuses
//! the whole batch into a single document ready for downstream editing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw input
//!  │
//!  ├─ 1. Normalise  note ids / share URLs → deduplicated targets
//!  ├─ 2. Fetch      downloader API → metadata checkpoint + image blobs
//!  ├─ 3. OCR        each image → one text artifact
//!  ├─ 4. Assemble   metadata + image text → per-note document
//!  └─ 5. Merge      all note documents + run summary → merged.md
//! ```
//!
//! Every stage checkpoints to disk and checks before doing work, so
//! re-running a batch costs nothing for notes that already finished and a
//! crashed run resumes from wherever it stopped. One note's failure never
//! aborts the batch: it is logged to the run's error log and the batch
//! moves on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notefuse::{process, ProcessConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProcessConfig::default();
//!     let output = process("68a9a370000000001b037dc0", &config).await?;
//!     println!("{}", output.merged);
//!     eprintln!("{}/{} notes processed",
//!         output.stats.succeeded,
//!         output.stats.total_targets);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `notefuse` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only
//! deps:
//! ```toml
//! notefuse = { version = "0.1", default-features = false }
//! ```
//!
//! ## External services
//!
//! Two local collaborators must be running (or injected as mocks through
//! [`ProcessConfig`]):
//!
//! * **XHS-Downloader** on `127.0.0.1:5556` — does the actual scraping.
//!   The run aborts up front if its liveness probe fails.
//! * **A PaddleOCR-style serving endpoint** on `127.0.0.1:8868` — receives
//!   base64 images, returns recognised text lines.
//!
//! ## Known limitation
//!
//! A single run at a time is assumed. Two simultaneous runs over
//! overlapping note ids race on checkpoint writes; no locking is provided.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ProcessConfig, ProcessConfigBuilder};
pub use error::{FetchFailure, NoteError, ProcessError};
pub use normalize::{normalize, Target};
pub use output::{generate_run_id, NoteResult, RunOutput, RunStats};
pub use pipeline::fetch::{ApiNoteFetcher, NoteFetcher};
pub use pipeline::ocr::{HttpOcrEngine, OcrEngine, Recognition};
pub use process::{process, process_sync};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use store::{NoteRecord, NoteStore, RunLog};
