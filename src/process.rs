//! Batch orchestration entry points.
//!
//! [`process`] drives the whole run: normalise the input, probe the
//! downloader service, then walk the targets one at a time through the
//! per-note state machine (fetch → OCR → assemble), finishing with the
//! merged batch document. Notes are strictly sequential; a note failure is
//! logged to the run's error log and never aborts the batch.
//!
//! ## Per-note state machine
//!
//! Before each stage the orchestrator consults the checkpoint store and
//! skips the stage if its artifact already exists:
//!
//! * `content.md` present — the note is complete; the stored document is
//!   returned verbatim with zero fetch/OCR calls.
//! * `metadata.json` present — fetch (and image download) is skipped.
//! * any OCR artifact present — the OCR stage is skipped for the note.
//!
//! A stage failure is terminal for the note within this run; the next run
//! resumes from whatever checkpoints were written before the failure.

use crate::config::ProcessConfig;
use crate::error::{NoteError, ProcessError};
use crate::normalize::{normalize, Target};
use crate::output::{generate_run_id, NoteResult, RunOutput, RunStats};
use crate::pipeline::assemble::{assemble_batch, assemble_note};
use crate::pipeline::fetch::{fetch_note, ApiNoteFetcher, NoteFetcher};
use crate::pipeline::ocr::{ocr_note, HttpOcrEngine, OcrEngine};
use crate::store::{NoteStore, RunLog};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process a raw target list through the full pipeline.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `raw_input` — free-form text containing note ids and/or share URLs
/// * `config`    — run configuration
///
/// # Returns
/// `Ok(RunOutput)` when the batch ran, even if every note failed (check
/// `output.stats.failed`). The merged document and error log are on disk
/// under `<output_dir>/<run_id>/`.
///
/// # Errors
/// Returns `Err(ProcessError)` only for fatal conditions detected before
/// any note is processed: unusable input, unreachable downloader service,
/// or an output directory that cannot be written.
pub async fn process(raw_input: &str, config: &ProcessConfig) -> Result<RunOutput, ProcessError> {
    let total_start = Instant::now();

    // ── Step 1: Normalise input ──────────────────────────────────────────
    let targets = normalize(raw_input);
    if targets.is_empty() {
        return Err(ProcessError::EmptyInput);
    }
    info!("Found {} targets", targets.len());

    // ── Step 2: Resolve collaborators ────────────────────────────────────
    // Both are constructed once per run and shared across notes; the OCR
    // engine in particular must not be re-created per image.
    let fetcher = resolve_fetcher(config)?;
    let engine = resolve_engine(config)?;

    // ── Step 3: Fail fast on a dead service ──────────────────────────────
    // A batch against an unreachable downloader would fail every fetch.
    fetcher.probe().await?;

    // ── Step 4: Create the run ───────────────────────────────────────────
    let run_id = generate_run_id();
    let run_dir = config.output_dir.join(&run_id);
    let log = RunLog::new(&run_dir);
    let store = NoteStore::new(&config.notes_dir);
    info!("Run {run_id}: starting over {} targets", targets.len());

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(targets.len());
    }

    // ── Step 5: Per-note pipeline, strictly sequential ───────────────────
    let total = targets.len();
    let mut notes: Vec<NoteResult> = Vec::with_capacity(total);
    for (i, target) in targets.into_iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            let display_id = target
                .note_id()
                .unwrap_or_else(|| target.as_str().to_string());
            cb.on_note_start(i + 1, total, &display_id);
        }
        let result = process_note(&fetcher, &engine, &store, &log, target, config).await;

        if let Some(ref cb) = config.progress_callback {
            match (&result.content, &result.error) {
                (Some(content), _) => cb.on_note_complete(
                    i + 1,
                    total,
                    &result.note_id,
                    content.len(),
                    result.from_cache,
                ),
                (None, Some(e)) => cb.on_note_error(i + 1, total, &result.note_id, &e.to_string()),
                (None, None) => {}
            }
        }
        notes.push(result);
    }

    // ── Step 6: Merge and persist ────────────────────────────────────────
    let merged = assemble_batch(&run_id, &notes);
    let merged_path = run_dir.join("merged.md");
    write_atomic(&merged_path, &merged).await?;
    info!("Run {run_id}: merged document written to {}", merged_path.display());

    // ── Step 7: Statistics ───────────────────────────────────────────────
    let succeeded = notes.iter().filter(|n| n.succeeded()).count();
    let stats = RunStats {
        total_targets: total,
        succeeded,
        failed: total - succeeded,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, succeeded);
    }
    info!(
        "Run {run_id}: complete — {}/{} notes in {}ms",
        succeeded, total, stats.total_duration_ms
    );

    Ok(RunOutput {
        run_id,
        merged,
        merged_path,
        error_log_path: log.path().to_path_buf(),
        notes,
        stats,
    })
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(raw_input: &str, config: &ProcessConfig) -> Result<RunOutput, ProcessError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ProcessError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(process(raw_input, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn resolve_fetcher(config: &ProcessConfig) -> Result<Arc<dyn NoteFetcher>, ProcessError> {
    if let Some(ref fetcher) = config.fetcher {
        return Ok(Arc::clone(fetcher));
    }
    Ok(Arc::new(ApiNoteFetcher::new(config)?))
}

fn resolve_engine(config: &ProcessConfig) -> Result<Arc<dyn OcrEngine>, ProcessError> {
    if let Some(ref engine) = config.engine {
        return Ok(Arc::clone(engine));
    }
    Ok(Arc::new(HttpOcrEngine::new(config)?))
}

/// Drive one note through the state machine. Never returns an error — a
/// failed note is a [`NoteResult`] with `content: None` and the failure
/// appended to the run log.
async fn process_note(
    fetcher: &Arc<dyn NoteFetcher>,
    engine: &Arc<dyn OcrEngine>,
    store: &NoteStore,
    log: &RunLog,
    target: Target,
    config: &ProcessConfig,
) -> NoteResult {
    let start = Instant::now();

    let note_id = match target.note_id() {
        Some(id) => id,
        None => {
            let err = NoteError::InvalidTarget {
                target: target.as_str().to_string(),
            };
            warn!("{err}");
            log.append(&err.to_string());
            return failed(target.as_str().to_string(), target, err, start);
        }
    };

    info!("Processing note {note_id}");

    // Complete notes short-circuit the whole pipeline.
    if store.is_complete(&note_id) {
        match store.read_document(&note_id) {
            Ok(Some(document)) => {
                info!("Note {note_id}: already processed, returning stored document");
                return NoteResult {
                    note_id,
                    target,
                    content: Some(document),
                    from_cache: true,
                    error: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
            Ok(None) => {} // raced away between predicate and read; fall through
            Err(e) => {
                let err = NoteError::StorageFailed {
                    note_id: note_id.clone(),
                    detail: e.to_string(),
                };
                log.append(&err.to_string());
                return failed(note_id, target, err, start);
            }
        }
    }

    // Stage 1: fetch (skipped when the metadata checkpoint exists).
    if !store.has_metadata(&note_id) {
        if let Err(err) = fetch_note(fetcher, store, &target, &note_id, config.image_delay_ms).await
        {
            warn!("{err}");
            log.append(&err.to_string());
            return failed(note_id, target, err, start);
        }
    } else {
        debug!("Note {note_id}: metadata checkpoint exists, skipping fetch");
    }

    // Stage 2: OCR (skipped when any OCR artifact exists for the note).
    if !store.has_ocr_results(&note_id) {
        if let Err(err) = ocr_note(engine, store, &note_id).await {
            warn!("{err}");
            log.append(&err.to_string());
            return failed(note_id, target, err, start);
        }
    } else {
        debug!("Note {note_id}: OCR artifacts exist, skipping recognition");
    }

    // Stage 3: assemble — the write marks the note complete.
    match assemble_note(store, &note_id) {
        Ok(document) => NoteResult {
            note_id,
            target,
            content: Some(document),
            from_cache: false,
            error: None,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        Err(err) => {
            warn!("{err}");
            log.append(&err.to_string());
            failed(note_id, target, err, start)
        }
    }
}

fn failed(note_id: String, target: Target, error: NoteError, start: Instant) -> NoteResult {
    NoteResult {
        note_id,
        target,
        content: None,
        from_cache: false,
        error: Some(error),
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

/// Atomic write: temp file in the target directory, then rename.
async fn write_atomic(path: &Path, text: &str) -> Result<(), ProcessError> {
    let write_failed = |source: std::io::Error| ProcessError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, text).await.map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_failed)?;
    Ok(())
}
