//! Progress-callback trait for per-note batch events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::ProcessConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the batch. The callback approach
//! keeps the library ignorant of how the host application communicates —
//! the CLI renders an indicatif bar, a server could forward to a channel.
//!
//! Notes are processed strictly one at a time, so events always arrive in
//! order; the trait is still `Send + Sync` so callbacks can be shared with
//! other tasks the host may run.

use std::sync::Arc;

/// Called by the pipeline as it works through a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait RunProgressCallback: Send + Sync {
    /// Called once after normalisation, before any note is processed.
    fn on_run_start(&self, total_notes: usize) {
        let _ = total_notes;
    }

    /// Called just before a note's pipeline begins. `index` is 1-based.
    fn on_note_start(&self, index: usize, total: usize, note_id: &str) {
        let _ = (index, total, note_id);
    }

    /// Called when a note's document is ready. `from_cache` is true when
    /// the stored document was returned without running any stage.
    fn on_note_complete(
        &self,
        index: usize,
        total: usize,
        note_id: &str,
        content_len: usize,
        from_cache: bool,
    ) {
        let _ = (index, total, note_id, content_len, from_cache);
    }

    /// Called when a note fails; the batch continues with the next note.
    fn on_note_error(&self, index: usize, total: usize, note_id: &str, error: &str) {
        let _ = (index, total, note_id, error);
    }

    /// Called once after every note has been attempted.
    fn on_run_complete(&self, total_notes: usize, success_count: usize) {
        let _ = (total_notes, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        cached: AtomicUsize,
    }

    impl RunProgressCallback for TrackingCallback {
        fn on_note_start(&self, _i: usize, _t: usize, _id: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_note_complete(&self, _i: usize, _t: usize, _id: &str, _len: usize, from_cache: bool) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            if from_cache {
                self.cached.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn on_note_error(&self, _i: usize, _t: usize, _id: &str, _e: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_note_start(1, 3, "abc");
        cb.on_note_complete(1, 3, "abc", 42, false);
        cb.on_note_error(2, 3, "def", "fetch failed");
        cb.on_run_complete(3, 2);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            cached: AtomicUsize::new(0),
        };
        t.on_note_start(1, 2, "a");
        t.on_note_complete(1, 2, "a", 10, true);
        t.on_note_start(2, 2, "b");
        t.on_note_error(2, 2, "b", "boom");
        assert_eq!(t.starts.load(Ordering::SeqCst), 2);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.cached.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn RunProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_note_complete(1, 10, "abc", 512, false);
    }
}
