//! OCR stage: turn downloaded image blobs into per-image text artifacts.
//!
//! The engine is an external collaborator behind the [`OcrEngine`] trait:
//! the orchestrator constructs one engine at run start and passes it by
//! reference into this stage, so the handle is shared across all notes of
//! a run without any hidden global state, and tests can count calls on a
//! mock. The bundled [`HttpOcrEngine`] talks to a local PaddleOCR serving
//! endpoint; device selection (GPU vs CPU) is the serving process's
//! concern, decided when that process starts.
//!
//! The stage is incremental per image: only indices without a text
//! artifact are recognised, and a per-image failure is logged without
//! blocking the remaining images.

use crate::config::ProcessConfig;
use crate::error::{NoteError, ProcessError};
use crate::store::NoteStore;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The outcome of recognising one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    /// Recognised text lines, top-to-bottom reading order.
    pub lines: Vec<String>,
    /// True when the engine answered but its response lacked the expected
    /// substructure — "recognised zero text" and "engine returned an
    /// unexpected shape" are different facts, even though both checkpoint
    /// as an empty artifact.
    pub degraded: bool,
}

impl Recognition {
    pub fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            lines: Vec::new(),
            degraded: true,
        }
    }
}

/// Text-recognition collaborator.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognise one image file. The error is a human-readable detail;
    /// classification into note-level failure happens in the stage.
    async fn recognize(&self, image: &Path) -> Result<Recognition, String>;
}

/// [`OcrEngine`] backed by a PaddleOCR-style HTTP serving endpoint.
///
/// The image is posted base64-encoded; the response is the engine
/// version's own JSON shape, parsed defensively by
/// [`parse_engine_response`].
pub struct HttpOcrEngine {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct OcrRequest {
    images: Vec<String>,
}

impl HttpOcrEngine {
    pub fn new(config: &ProcessConfig) -> Result<Self, ProcessError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProcessError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.ocr_url.clone(),
            timeout: Duration::from_secs(config.ocr_timeout_secs),
        })
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn recognize(&self, image: &Path) -> Result<Recognition, String> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| format!("read {}: {e}", image.display()))?;

        let body = OcrRequest {
            images: vec![STANDARD.encode(&bytes)],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("malformed response body: {e}"))?;

        Ok(parse_engine_response(&value))
    }
}

/// Extract recognised lines from the engine's response.
///
/// The expected shape is version-specific:
///
/// ```json
/// {"results": [{"res": {"rec_texts": ["line 1", "line 2"]}}]}
/// ```
///
/// Any missing level degrades to zero lines instead of failing — an engine
/// upgrade that renames a field should cost recognition output, not the
/// batch. The `degraded` flag records that this happened.
pub fn parse_engine_response(value: &serde_json::Value) -> Recognition {
    let texts = value
        .get("results")
        .and_then(|r| r.get(0))
        .and_then(|first| first.get("res"))
        .and_then(|res| res.get("rec_texts"))
        .and_then(|t| t.as_array());

    match texts {
        Some(items) => Recognition::lines(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect(),
        ),
        None => Recognition::degraded(),
    }
}

/// Run the OCR stage for one note: recognise every downloaded image that
/// has no text artifact yet and checkpoint one `<i>.txt` per image.
///
/// Fails the note only when the engine errored on every image it was given
/// in this invocation — that means the recognition subsystem is unusable,
/// not that one image was bad.
pub async fn ocr_note(
    engine: &Arc<dyn OcrEngine>,
    store: &NoteStore,
    note_id: &str,
) -> Result<(), NoteError> {
    let indices = store
        .image_indices(note_id)
        .map_err(|e| NoteError::StorageFailed {
            note_id: note_id.to_string(),
            detail: e.to_string(),
        })?;

    if indices.is_empty() {
        warn!("Note {note_id}: no images to recognise");
        return Ok(());
    }

    let pending: Vec<usize> = indices
        .into_iter()
        .filter(|&idx| !store.has_ocr_text(note_id, idx))
        .collect();
    if pending.is_empty() {
        debug!("Note {note_id}: all OCR artifacts already present");
        return Ok(());
    }

    info!("Note {note_id}: recognising {} images", pending.len());
    let mut attempted = 0usize;
    let mut errored = 0usize;
    let mut first_error = String::new();

    for idx in pending {
        attempted += 1;
        let image = store.image_path(note_id, idx);
        match engine.recognize(&image).await {
            Ok(recognition) => {
                if recognition.degraded {
                    warn!(
                        "Note {note_id}: image {idx} — unexpected engine response \
                         shape, recording zero lines"
                    );
                } else {
                    debug!(
                        "Note {note_id}: image {idx} — {} lines recognised",
                        recognition.lines.len()
                    );
                }
                if let Err(e) = store.write_ocr_text(note_id, idx, &recognition.lines) {
                    warn!("Note {note_id}: failed to store OCR text {idx}: {e}");
                }
            }
            Err(detail) => {
                warn!("Note {note_id}: image {idx} recognition failed: {detail}");
                errored += 1;
                if first_error.is_empty() {
                    first_error = detail;
                }
            }
        }
    }

    if errored == attempted {
        return Err(NoteError::OcrFailed {
            note_id: note_id.to_string(),
            detail: format!("engine failed on all {attempted} images; first: {first_error}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_expected_shape() {
        let value = json!({"results": [{"res": {"rec_texts": ["第一行", "第二行"]}}]});
        let rec = parse_engine_response(&value);
        assert!(!rec.degraded);
        assert_eq!(rec.lines, vec!["第一行", "第二行"]);
    }

    #[test]
    fn parse_empty_rec_texts() {
        let value = json!({"results": [{"res": {"rec_texts": []}}]});
        let rec = parse_engine_response(&value);
        assert!(!rec.degraded);
        assert!(rec.lines.is_empty());
    }

    #[test]
    fn missing_res_field_degrades() {
        let value = json!({"results": [{"status": "ok"}]});
        assert_eq!(parse_engine_response(&value), Recognition::degraded());
    }

    #[test]
    fn missing_results_degrades() {
        let value = json!({"msg": "unexpected"});
        let rec = parse_engine_response(&value);
        assert!(rec.degraded);
        assert!(rec.lines.is_empty());
    }

    #[test]
    fn non_string_entries_are_dropped() {
        let value = json!({"results": [{"res": {"rec_texts": ["ok", 42, null]}}]});
        let rec = parse_engine_response(&value);
        assert_eq!(rec.lines, vec!["ok"]);
    }

    #[test]
    fn ocr_request_wire_shape() {
        let req = OcrRequest {
            images: vec!["aGVsbG8=".into()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["images"][0], "aGVsbG8=");
    }
}
