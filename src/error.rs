//! Error types for the notefuse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ProcessError`] — **Fatal**: the run cannot proceed at all (empty
//!   target list, downloader service unreachable, bad configuration).
//!   Returned as `Err(ProcessError)` from the top-level `process*`
//!   functions before any note is touched.
//!
//! * [`NoteError`] — **Non-fatal**: a single note failed (fetch rejected,
//!   OCR crash, missing checkpoint) but every other note in the batch is
//!   fine. Stored inside [`crate::output::NoteResult`] and appended to the
//!   run's error log so callers can inspect partial success rather than
//!   losing the whole batch to one bad note.
//!
//! The separation mirrors the batch contract: item errors never raise out
//! of the batch loop, fatal errors abort before the loop starts.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the notefuse library.
///
/// Note-level failures use [`NoteError`] and are stored in
/// [`crate::output::NoteResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ProcessError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The raw input contained no note id or recognised URL.
    #[error(
        "No note ids or URLs found in input.\n\
         Provide 24-character hex note ids or xiaohongshu.com / xhslink.com URLs."
    )]
    EmptyInput,

    // ── Environment errors ────────────────────────────────────────────────
    /// The downloader API did not answer the liveness probe.
    #[error("Downloader service unreachable at '{url}'\n{hint}")]
    ServiceUnavailable { url: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a run output file (merged document, log).
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single note.
///
/// One `NoteError` marks exactly one note as failed for the current run.
/// The batch continues with the remaining notes; the error text is appended
/// to the run's error log with a timestamp.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum NoteError {
    /// The target had no extractable note id (e.g. a short link that never
    /// resolved to a 24-hex identifier).
    #[error("Cannot extract a note id from target '{target}'")]
    InvalidTarget { target: String },

    /// The downloader API rejected the note or could not be reached.
    #[error("Note {note_id}: fetch failed — {reason}")]
    FetchFailed { note_id: String, reason: FetchFailure },

    /// The OCR stage failed for the whole note (engine unavailable etc.).
    /// Per-image recognition errors are logged and skipped instead.
    #[error("Note {note_id}: OCR failed — {detail}")]
    OcrFailed { note_id: String, detail: String },

    /// Assembly ran without a metadata checkpoint on disk.
    #[error("Note {note_id}: no metadata checkpoint, cannot assemble document")]
    MissingMetadata { note_id: String },

    /// A checkpoint read/write failed mid-pipeline.
    #[error("Note {note_id}: storage error — {detail}")]
    StorageFailed { note_id: String, detail: String },
}

/// Why a fetch attempt failed.
///
/// The reasons are distinct for the error log but collapse to the same
/// externally-visible effect: the note is marked failed and the batch moves
/// on. No reason is retried.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FetchFailure {
    /// HTTP 200 but the `data` field was null/absent. Carries the service's
    /// own `message` text, typically an auth-token complaint.
    EmptyPayload { message: String },
    /// Non-200 status from the downloader API.
    HttpStatus { status: u16 },
    /// Request exceeded the configured timeout.
    Timeout { secs: u64 },
    /// TCP/TLS-level connection failure.
    Connection { detail: String },
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailure::EmptyPayload { message } => {
                if message.is_empty() {
                    write!(f, "service returned no data")
                } else {
                    write!(f, "service returned no data: {message}")
                }
            }
            FetchFailure::HttpStatus { status } => write!(f, "HTTP {status}"),
            FetchFailure::Timeout { secs } => write!(f, "request timed out after {secs}s"),
            FetchFailure::Connection { detail } => write!(f, "connection failed: {detail}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_unavailable_display() {
        let e = ProcessError::ServiceUnavailable {
            url: "http://127.0.0.1:5556".into(),
            hint: "start the container first".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("127.0.0.1:5556"), "got: {msg}");
        assert!(msg.contains("start the container"));
    }

    #[test]
    fn fetch_failed_display_names_the_note() {
        let e = NoteError::FetchFailed {
            note_id: "68a9a370000000001b037dc0".into(),
            reason: FetchFailure::HttpStatus { status: 500 },
        };
        let msg = e.to_string();
        assert!(msg.contains("68a9a370000000001b037dc0"));
        assert!(msg.contains("HTTP 500"));
    }

    #[test]
    fn empty_payload_carries_service_message() {
        let r = FetchFailure::EmptyPayload {
            message: "笔记不存在或需要登录".into(),
        };
        assert!(r.to_string().contains("笔记不存在或需要登录"));
    }

    #[test]
    fn timeout_display() {
        let r = FetchFailure::Timeout { secs: 60 };
        assert!(r.to_string().contains("60s"));
    }

    #[test]
    fn missing_metadata_display() {
        let e = NoteError::MissingMetadata {
            note_id: "abc".into(),
        };
        assert!(e.to_string().contains("metadata checkpoint"));
    }
}
