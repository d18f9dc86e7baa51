//! Configuration for a batch run.
//!
//! All behaviour is controlled through [`ProcessConfig`], built via its
//! [`ProcessConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across call sites and to diff two runs to
//! understand why their outputs differ.

use crate::error::ProcessError;
use crate::pipeline::fetch::NoteFetcher;
use crate::pipeline::ocr::OcrEngine;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one batch invocation.
///
/// Built via [`ProcessConfig::builder()`] or [`ProcessConfig::default()`].
///
/// # Example
/// ```rust
/// use notefuse::ProcessConfig;
///
/// let config = ProcessConfig::builder()
///     .api_url("http://127.0.0.1:5556/xhs/detail")
///     .notes_dir("notes")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ProcessConfig {
    /// Downloader API detail endpoint. Default: `http://127.0.0.1:5556/xhs/detail`.
    ///
    /// The XHS-Downloader container binds here locally; the pipeline never
    /// talks to xiaohongshu.com directly.
    pub api_url: String,

    /// Unauthenticated liveness probe polled once before the batch starts.
    /// Default: `http://127.0.0.1:5556/docs`.
    ///
    /// A batch against a dead service would fail every single fetch, so the
    /// run aborts up front instead.
    pub probe_url: String,

    /// Per-note fetch timeout in seconds. Default: 60.
    ///
    /// The downloader service scrapes the note live on first request, which
    /// can take tens of seconds for image-heavy notes.
    pub api_timeout_secs: u64,

    /// Liveness probe timeout in seconds. Default: 5.
    pub probe_timeout_secs: u64,

    /// Per-image download timeout in seconds. Default: 30.
    pub image_timeout_secs: u64,

    /// Fixed politeness delay between image downloads in milliseconds.
    /// Default: 500.
    ///
    /// A rate-limiting policy, not backpressure: the CDN sees at most two
    /// requests per second from one run regardless of observed load.
    pub image_delay_ms: u64,

    /// OCR serving endpoint used by the default engine.
    /// Default: `http://127.0.0.1:8868/ocr`.
    pub ocr_url: String,

    /// Per-image OCR timeout in seconds. Default: 120.
    ///
    /// First recognition after engine start loads models and is much slower
    /// than steady state.
    pub ocr_timeout_secs: u64,

    /// Root of the per-note checkpoint store. Default: `notes`.
    pub notes_dir: PathBuf,

    /// Root of per-run output (merged document, error log). Default: `runs`.
    pub output_dir: PathBuf,

    /// Pre-constructed OCR engine. Takes precedence over `ocr_url`; the
    /// primary seam for tests and custom engines.
    pub engine: Option<Arc<dyn OcrEngine>>,

    /// Pre-constructed fetcher. Takes precedence over `api_url`/`probe_url`.
    pub fetcher: Option<Arc<dyn NoteFetcher>>,

    /// Receiver for per-note progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5556/xhs/detail".to_string(),
            probe_url: "http://127.0.0.1:5556/docs".to_string(),
            api_timeout_secs: 60,
            probe_timeout_secs: 5,
            image_timeout_secs: 30,
            image_delay_ms: 500,
            ocr_url: "http://127.0.0.1:8868/ocr".to_string(),
            ocr_timeout_secs: 120,
            notes_dir: PathBuf::from("notes"),
            output_dir: PathBuf::from("runs"),
            engine: None,
            fetcher: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("api_url", &self.api_url)
            .field("probe_url", &self.probe_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("image_delay_ms", &self.image_delay_ms)
            .field("ocr_url", &self.ocr_url)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("notes_dir", &self.notes_dir)
            .field("output_dir", &self.output_dir)
            .field("engine", &self.engine.as_ref().map(|_| "<dyn OcrEngine>"))
            .field("fetcher", &self.fetcher.as_ref().map(|_| "<dyn NoteFetcher>"))
            .finish()
    }
}

impl ProcessConfig {
    /// Create a new builder for `ProcessConfig`.
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessConfig`].
#[derive(Debug)]
pub struct ProcessConfigBuilder {
    config: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.config.probe_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs.max(1);
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs.max(1);
        self
    }

    pub fn image_delay_ms(mut self, ms: u64) -> Self {
        self.config.image_delay_ms = ms;
        self
    }

    pub fn ocr_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr_url = url.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs.max(1);
        self
    }

    pub fn notes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.notes_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn NoteFetcher>) -> Self {
        self.config.fetcher = Some(fetcher);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessConfig, ProcessError> {
        let c = &self.config;
        if c.api_url.is_empty() {
            return Err(ProcessError::InvalidConfig("api_url must not be empty".into()));
        }
        if c.fetcher.is_none() && !c.api_url.starts_with("http") {
            return Err(ProcessError::InvalidConfig(format!(
                "api_url must be an HTTP endpoint, got '{}'",
                c.api_url
            )));
        }
        if c.notes_dir.as_os_str().is_empty() || c.output_dir.as_os_str().is_empty() {
            return Err(ProcessError::InvalidConfig(
                "notes_dir and output_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_service() {
        let c = ProcessConfig::default();
        assert!(c.api_url.contains("127.0.0.1:5556"));
        assert_eq!(c.api_timeout_secs, 60);
        assert_eq!(c.image_delay_ms, 500);
    }

    #[test]
    fn builder_rejects_non_http_api_url() {
        let err = ProcessConfig::builder().api_url("not-a-url").build();
        assert!(matches!(err, Err(ProcessError::InvalidConfig(_))));
    }

    #[test]
    fn timeouts_clamp_to_at_least_one_second() {
        let c = ProcessConfig::builder().api_timeout_secs(0).build().unwrap();
        assert_eq!(c.api_timeout_secs, 1);
    }

    #[test]
    fn debug_prints_without_collaborators_set() {
        let repr = format!("{:?}", ProcessConfig::default());
        assert!(repr.contains("api_url"));
        assert!(repr.contains("engine"));
    }
}
