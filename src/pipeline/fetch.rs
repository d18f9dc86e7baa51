//! Remote fetch stage: wrap the downloader API and checkpoint its output.
//!
//! The pipeline never talks to xiaohongshu.com itself — a local
//! XHS-Downloader container does the scraping and exposes one POST
//! endpoint. This module turns a [`Target`] into a persisted
//! [`NoteRecord`] plus downloaded image blobs, or a classified
//! [`NoteError`]. One attempt per note per run; failures are isolated by
//! the orchestrator, not retried here.
//!
//! [`NoteFetcher`] is a trait so the orchestrator tests can count calls
//! and inject failures without a live service.

use crate::config::ProcessConfig;
use crate::error::{FetchFailure, NoteError, ProcessError};
use crate::normalize::Target;
use crate::store::{NoteRecord, NoteStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Remote collaborator that resolves targets into note records and bytes.
#[async_trait]
pub trait NoteFetcher: Send + Sync {
    /// Liveness probe, polled once before the batch starts.
    async fn probe(&self) -> Result<(), ProcessError>;

    /// Fetch the structured record for one target. Exactly one attempt.
    async fn fetch(&self, target: &Target, note_id: &str) -> Result<NoteRecord, NoteError>;

    /// Download one image. The error is a human-readable detail string;
    /// per-image failures never fail the note.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Request body of the downloader API's detail endpoint.
#[derive(Debug, Serialize)]
struct DetailRequest<'a> {
    url: &'a str,
    download: bool,
    skip: bool,
}

/// Response envelope: `data` is absent when the service could not resolve
/// the note (bad id, missing auth token, deleted note).
#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: Option<NoteRecord>,
    #[serde(default)]
    message: String,
}

/// The request URL sent to the downloader service for a target.
///
/// URLs pass through untouched — they may carry the `xsec_token` the
/// service needs. A bare id is wrapped in the canonical explore URL; the
/// service will usually reject it, but the attempt is still made.
pub fn request_url_for(target: &Target, note_id: &str) -> String {
    match target {
        Target::Url(url) => url.clone(),
        Target::Id(_) => format!("https://www.xiaohongshu.com/explore/{note_id}"),
    }
}

/// [`NoteFetcher`] backed by a local XHS-Downloader HTTP endpoint.
pub struct ApiNoteFetcher {
    client: reqwest::Client,
    api_url: String,
    probe_url: String,
    api_timeout: Duration,
    probe_timeout: Duration,
    image_timeout: Duration,
}

impl ApiNoteFetcher {
    pub fn new(config: &ProcessConfig) -> Result<Self, ProcessError> {
        // Timeouts are applied per request: the detail call, the probe, and
        // image downloads all have different budgets.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProcessError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            probe_url: config.probe_url.clone(),
            api_timeout: Duration::from_secs(config.api_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            image_timeout: Duration::from_secs(config.image_timeout_secs),
        })
    }
}

#[async_trait]
impl NoteFetcher for ApiNoteFetcher {
    async fn probe(&self) -> Result<(), ProcessError> {
        let unavailable = |detail: String| ProcessError::ServiceUnavailable {
            url: self.probe_url.clone(),
            hint: format!(
                "{detail}\nStart the downloader first:\n  \
                 docker run --name xhs-api -d -p 5556:5556 \\\n    \
                 -v xhs_downloader_volume:/app/Volume \\\n    \
                 joeanamier/xhs-downloader python main.py api"
            ),
        };

        let response = self
            .client
            .get(&self.probe_url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if response.status().is_success() {
            debug!("Downloader service is up at {}", self.probe_url);
            Ok(())
        } else {
            Err(unavailable(format!("probe returned HTTP {}", response.status())))
        }
    }

    async fn fetch(&self, target: &Target, note_id: &str) -> Result<NoteRecord, NoteError> {
        if !target.has_auth_token() {
            warn!(
                "Note {note_id}: target has no xsec_token, the service will \
                 likely reject it — use the full share URL"
            );
        }

        let url = request_url_for(target, note_id);
        let body = DetailRequest {
            url: &url,
            download: false,
            skip: false,
        };

        let failed = |reason: FetchFailure| NoteError::FetchFailed {
            note_id: note_id.to_string(),
            reason,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .timeout(self.api_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    failed(FetchFailure::Timeout {
                        secs: self.api_timeout.as_secs(),
                    })
                } else {
                    failed(FetchFailure::Connection {
                        detail: e.to_string(),
                    })
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(FetchFailure::HttpStatus {
                status: status.as_u16(),
            }));
        }

        let envelope: DetailResponse = response.json().await.map_err(|e| {
            failed(FetchFailure::Connection {
                detail: format!("malformed response body: {e}"),
            })
        })?;

        match envelope.data {
            Some(record) => {
                info!("Note {note_id}: fetched '{}'", record.title);
                Ok(record)
            }
            None => Err(failed(FetchFailure::EmptyPayload {
                message: envelope.message,
            })),
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .timeout(self.image_timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

/// Run the fetch stage for one note: persist the metadata checkpoint, then
/// download every image the record lists, index-addressed in payload order.
///
/// Already-present blobs are skipped, so a rerun only fills the gaps left
/// by earlier failures. A per-image failure is logged and the loop
/// continues; only the fetch call itself can fail the note. A fixed delay
/// separates downloads so the CDN never sees a burst.
pub async fn fetch_note(
    fetcher: &Arc<dyn NoteFetcher>,
    store: &NoteStore,
    target: &Target,
    note_id: &str,
    image_delay_ms: u64,
) -> Result<(), NoteError> {
    let record = fetcher.fetch(target, note_id).await?;

    store
        .write_metadata(note_id, &record)
        .map_err(|e| NoteError::StorageFailed {
            note_id: note_id.to_string(),
            detail: e.to_string(),
        })?;
    debug!("Note {note_id}: metadata checkpoint written");

    if record.image_urls.is_empty() {
        warn!("Note {note_id}: record lists no image URLs");
        return Ok(());
    }

    info!("Note {note_id}: downloading {} images", record.image_urls.len());
    for (idx, url) in record.image_urls.iter().enumerate() {
        if store.has_image(note_id, idx) {
            debug!("Note {note_id}: image {idx} already present, skipping");
            continue;
        }

        match fetcher.fetch_image(url).await {
            Ok(bytes) => {
                if let Err(e) = store.write_image(note_id, idx, &bytes) {
                    warn!("Note {note_id}: failed to store image {idx}: {e}");
                } else {
                    debug!("Note {note_id}: image {idx} downloaded ({} bytes)", bytes.len());
                }
            }
            Err(detail) => {
                warn!("Note {note_id}: image {idx} download failed: {detail}");
            }
        }

        if image_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(image_delay_ms)).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "68a9a370000000001b037dc0";

    #[test]
    fn request_url_passes_share_urls_through() {
        let url = format!("https://www.xiaohongshu.com/explore/{ID}?xsec_token=AB-c");
        let t = Target::Url(url.clone());
        assert_eq!(request_url_for(&t, ID), url);
    }

    #[test]
    fn request_url_wraps_bare_ids() {
        let t = Target::Id(ID.into());
        assert_eq!(
            request_url_for(&t, ID),
            format!("https://www.xiaohongshu.com/explore/{ID}")
        );
    }

    #[test]
    fn detail_request_wire_shape() {
        let req = DetailRequest {
            url: "https://example",
            download: false,
            skip: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["url"], "https://example");
        assert_eq!(json["download"], false);
        assert_eq!(json["skip"], false);
    }

    #[test]
    fn detail_response_with_payload() {
        let json = r#"{"message":"ok","data":{"作品标题":"标题","下载地址":["http://a","http://b"]}}"#;
        let resp: DetailResponse = serde_json::from_str(json).unwrap();
        let record = resp.data.unwrap();
        assert_eq!(record.title, "标题");
        assert_eq!(record.image_urls.len(), 2);
    }

    #[test]
    fn detail_response_without_payload() {
        let json = r#"{"message":"获取数据失败","data":null}"#;
        let resp: DetailResponse = serde_json::from_str(json).unwrap();
        assert!(resp.data.is_none());
        assert_eq!(resp.message, "获取数据失败");
    }

    #[test]
    fn detail_response_missing_message_defaults_empty() {
        let resp: DetailResponse = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert_eq!(resp.message, "");
    }
}
