//! Result types returned by a batch run.
//!
//! [`RunOutput`] is the full picture of one invocation: the merged document,
//! per-note outcomes, and the aggregate statistics. Everything serialises
//! with `serde` so the CLI's `--json` mode can emit the structure verbatim.

use crate::error::NoteError;
use crate::normalize::Target;
use serde::Serialize;
use std::path::PathBuf;

/// The outcome of one note within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct NoteResult {
    /// Extracted note id, or the raw target string when no id could be
    /// extracted (failed short links).
    pub note_id: String,
    /// The target as the user supplied it.
    pub target: Target,
    /// The assembled per-note document; `None` when the note failed.
    pub content: Option<String>,
    /// True when the stored document was returned without running any stage.
    pub from_cache: bool,
    /// What went wrong, if anything.
    pub error: Option<NoteError>,
    pub duration_ms: u64,
}

impl NoteResult {
    pub fn succeeded(&self) -> bool {
        self.content.is_some()
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub total_targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

/// Everything produced by one batch invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// Human-sortable run identifier, e.g. `20250911-143025-a3b5c7`.
    pub run_id: String,
    /// The final merged document text.
    pub merged: String,
    /// Where the merged document was written.
    pub merged_path: PathBuf,
    /// Where item failures were logged (file exists only if something failed).
    pub error_log_path: PathBuf,
    /// Per-note outcomes in input order.
    pub notes: Vec<NoteResult>,
    pub stats: RunStats,
}

/// Generate a fresh run identifier: local timestamp plus a short random
/// suffix. The timestamp keeps run directories sortable by creation time;
/// the suffix keeps two runs within the same second from colliding.
pub fn generate_run_id() -> String {
    use rand::Rng;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("{stamp}-{suffix:06x}")
}
