//! Per-note checkpoint store: a directory per note id on disk.
//!
//! Every pipeline stage persists its output here and every stage checks
//! here before doing work, which is what makes repeated runs over the same
//! note instantaneous. The layout under the store root:
//!
//! ```text
//! <root>/<note_id>/metadata.json   fetch checkpoint (NoteRecord)
//! <root>/<note_id>/images/<i>.jpg  downloaded image blobs, index-addressed
//! <root>/<note_id>/ocr/<i>.txt     recognised lines for image i
//! <root>/<note_id>/content.md      assembled document — the completion marker
//! ```
//!
//! All operations are plain filesystem predicates, reads, and writes; there
//! is no in-memory cache, so the predicates are always consistent with what
//! a crashed-and-restarted run would see. Artifacts are monotonic: the
//! pipeline checks before writing and never deletes.
//!
//! Known limitation: two simultaneous runs over overlapping note ids race
//! on artifact writes. A single run at a time is assumed; no locking is
//! provided.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Structured note metadata as returned by the downloader API.
///
/// Field names on the wire are the downloader service's Chinese keys; every
/// field defaults so a sparse payload still deserialises. The same struct
/// is the on-disk `metadata.json` checkpoint, so fetch hands the assembler
/// a typed record instead of text to be re-parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(rename = "作品标题", default)]
    pub title: String,
    #[serde(rename = "作者昵称", default)]
    pub author: String,
    #[serde(rename = "作者ID", default)]
    pub author_id: String,
    #[serde(rename = "发布时间", default)]
    pub published_at: String,
    #[serde(rename = "更新时间", default)]
    pub updated_at: String,
    #[serde(rename = "作品类型", default)]
    pub kind: String,
    #[serde(rename = "点赞数量", default, with = "count")]
    pub likes: u64,
    #[serde(rename = "收藏数量", default, with = "count")]
    pub collects: u64,
    #[serde(rename = "评论数量", default, with = "count")]
    pub comments: u64,
    #[serde(rename = "分享数量", default, with = "count")]
    pub shares: u64,
    #[serde(rename = "作品描述", default)]
    pub description: String,
    #[serde(rename = "标签", default)]
    pub tags: Vec<String>,
    #[serde(rename = "下载地址", default)]
    pub image_urls: Vec<String>,
}

/// The downloader API reports engagement counters as numbers on some
/// versions and display strings ("1万") on others. Accept both; strings
/// that don't parse as integers count as 0.
mod count {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(*v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Text(String),
        }
        Ok(match Raw::deserialize(d)? {
            Raw::Num(n) => n,
            Raw::Text(s) => s.trim().parse().unwrap_or(0),
        })
    }
}

/// Filesystem-backed checkpoint store, one directory per note id.
#[derive(Debug, Clone)]
pub struct NoteStore {
    root: PathBuf,
}

impl NoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all artifacts for one note.
    pub fn note_dir(&self, note_id: &str) -> PathBuf {
        self.root.join(note_id)
    }

    fn metadata_path(&self, note_id: &str) -> PathBuf {
        self.note_dir(note_id).join("metadata.json")
    }

    fn images_dir(&self, note_id: &str) -> PathBuf {
        self.note_dir(note_id).join("images")
    }

    fn ocr_dir(&self, note_id: &str) -> PathBuf {
        self.note_dir(note_id).join("ocr")
    }

    fn document_path(&self, note_id: &str) -> PathBuf {
        self.note_dir(note_id).join("content.md")
    }

    /// Path of image blob `idx` (whether or not it exists yet).
    pub fn image_path(&self, note_id: &str, idx: usize) -> PathBuf {
        self.images_dir(note_id).join(format!("{idx}.jpg"))
    }

    // ── Predicates ────────────────────────────────────────────────────────

    /// True iff the final document artifact exists — the sole signal that a
    /// note is fully processed and every earlier stage can be skipped.
    pub fn is_complete(&self, note_id: &str) -> bool {
        self.document_path(note_id).exists()
    }

    pub fn has_metadata(&self, note_id: &str) -> bool {
        self.metadata_path(note_id).exists()
    }

    pub fn has_images(&self, note_id: &str) -> bool {
        self.images_dir(note_id).exists()
    }

    /// True iff at least one OCR text artifact exists for the note.
    ///
    /// A "partial OK" check: a note with five images and one recognised
    /// text counts as having OCR results. The stage itself still fills the
    /// per-image gaps because it checks each index individually.
    pub fn has_ocr_results(&self, note_id: &str) -> bool {
        self.ocr_indices(note_id).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn has_image(&self, note_id: &str, idx: usize) -> bool {
        self.image_path(note_id, idx).exists()
    }

    pub fn has_ocr_text(&self, note_id: &str, idx: usize) -> bool {
        self.ocr_text_path(note_id, idx).exists()
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    pub fn read_metadata(&self, note_id: &str) -> io::Result<Option<NoteRecord>> {
        let path = self.metadata_path(note_id);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        let record = serde_json::from_str(&text)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(record))
    }

    pub fn read_document(&self, note_id: &str) -> io::Result<Option<String>> {
        let path = self.document_path(note_id);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path).map(Some)
    }

    pub fn read_ocr_text(&self, note_id: &str, idx: usize) -> io::Result<String> {
        fs::read_to_string(self.ocr_text_path(note_id, idx))
    }

    /// Indices of downloaded image blobs, sorted ascending. A gap means
    /// that image's download failed in an earlier run.
    pub fn image_indices(&self, note_id: &str) -> io::Result<Vec<usize>> {
        indexed_entries(&self.images_dir(note_id), "jpg")
    }

    /// Indices of OCR text artifacts, sorted ascending.
    pub fn ocr_indices(&self, note_id: &str) -> io::Result<Vec<usize>> {
        indexed_entries(&self.ocr_dir(note_id), "txt")
    }

    // ── Writes ────────────────────────────────────────────────────────────

    pub fn write_metadata(&self, note_id: &str, record: &NoteRecord) -> io::Result<()> {
        fs::create_dir_all(self.note_dir(note_id))?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.metadata_path(note_id), json)
    }

    pub fn write_image(&self, note_id: &str, idx: usize, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(self.images_dir(note_id))?;
        fs::write(self.image_path(note_id, idx), bytes)
    }

    /// Persist the recognised lines for image `idx`, one line per line.
    /// Zero lines writes an empty file — "recognised nothing" is still a
    /// checkpoint so the image is not re-run next time.
    pub fn write_ocr_text(&self, note_id: &str, idx: usize, lines: &[String]) -> io::Result<()> {
        fs::create_dir_all(self.ocr_dir(note_id))?;
        fs::write(self.ocr_text_path(note_id, idx), lines.join("\n"))
    }

    pub fn write_document(&self, note_id: &str, text: &str) -> io::Result<()> {
        fs::create_dir_all(self.note_dir(note_id))?;
        fs::write(self.document_path(note_id), text)
    }

    fn ocr_text_path(&self, note_id: &str, idx: usize) -> PathBuf {
        self.ocr_dir(note_id).join(format!("{idx}.txt"))
    }
}

/// List `<n>.<ext>` entries in `dir` and return the sorted indices.
/// A missing directory is an empty list, not an error.
fn indexed_entries(dir: &Path, ext: &str) -> io::Result<Vec<usize>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut indices = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(idx) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<usize>().ok())
        {
            indices.push(idx);
        }
    }
    indices.sort_unstable();
    Ok(indices)
}

/// Append-only, timestamped error log for one run.
///
/// Lives at `<run_dir>/error.log`. Appends never truncate; a log write
/// failure is reported via `tracing` but never aborts the batch — losing a
/// log line is better than losing the run.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(run_dir: impl AsRef<Path>) -> Self {
        Self {
            path: run_dir.as_ref().join("error.log"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped entry.
    pub fn append(&self, message: &str) {
        if let Err(e) = self.try_append(message) {
            tracing::warn!("Failed to append to error log {}: {e}", self.path.display());
        }
    }

    fn try_append(&self, message: &str) -> io::Result<()> {
        use std::io::Write;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{stamp}] {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOTE: &str = "68a9a370000000001b037dc0";

    fn store() -> (TempDir, NoteStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = NoteStore::new(dir.path().join("notes"));
        (dir, store)
    }

    fn record() -> NoteRecord {
        NoteRecord {
            title: "测试标题".into(),
            author: "测试作者".into(),
            description: "测试描述".into(),
            likes: 100,
            image_urls: vec!["http://img.example/0".into()],
            ..NoteRecord::default()
        }
    }

    #[test]
    fn metadata_predicate_toggles_exactly_once() {
        let (_dir, store) = store();
        assert!(!store.has_metadata(NOTE));
        store.write_metadata(NOTE, &record()).unwrap();
        assert!(store.has_metadata(NOTE));
        // Re-checking does not flip it back
        assert!(store.has_metadata(NOTE));
    }

    #[test]
    fn second_metadata_write_wins() {
        let (_dir, store) = store();
        store.write_metadata(NOTE, &record()).unwrap();
        let mut updated = record();
        updated.title = "第二版".into();
        store.write_metadata(NOTE, &updated).unwrap();
        let read = store.read_metadata(NOTE).unwrap().unwrap();
        assert_eq!(read.title, "第二版");
        assert_eq!(read, updated);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let (_dir, store) = store();
        let rec = record();
        store.write_metadata(NOTE, &rec).unwrap();
        assert_eq!(store.read_metadata(NOTE).unwrap().unwrap(), rec);
    }

    #[test]
    fn counters_accept_numbers_and_strings() {
        let json = r#"{"作品标题":"t","点赞数量":"123","收藏数量":7,"评论数量":"1万"}"#;
        let rec: NoteRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.likes, 123);
        assert_eq!(rec.collects, 7);
        // Display strings that aren't plain integers count as zero
        assert_eq!(rec.comments, 0);
    }

    #[test]
    fn document_marks_completion() {
        let (_dir, store) = store();
        assert!(!store.is_complete(NOTE));
        assert_eq!(store.read_document(NOTE).unwrap(), None);
        store.write_document(NOTE, "# done\n").unwrap();
        assert!(store.is_complete(NOTE));
        assert_eq!(store.read_document(NOTE).unwrap().as_deref(), Some("# done\n"));
    }

    #[test]
    fn image_indices_sorted_with_gaps() {
        let (_dir, store) = store();
        store.write_image(NOTE, 2, b"b").unwrap();
        store.write_image(NOTE, 0, b"a").unwrap();
        assert_eq!(store.image_indices(NOTE).unwrap(), vec![0, 2]);
        assert!(store.has_image(NOTE, 0));
        assert!(!store.has_image(NOTE, 1));
    }

    #[test]
    fn ocr_results_is_a_partial_ok_check() {
        let (_dir, store) = store();
        assert!(!store.has_ocr_results(NOTE));
        store.write_image(NOTE, 0, b"a").unwrap();
        store.write_image(NOTE, 1, b"b").unwrap();
        // One artifact out of two images is enough for the predicate
        store.write_ocr_text(NOTE, 0, &["第一行".into()]).unwrap();
        assert!(store.has_ocr_results(NOTE));
        assert!(!store.has_ocr_text(NOTE, 1));
    }

    #[test]
    fn empty_ocr_result_is_still_a_checkpoint() {
        let (_dir, store) = store();
        store.write_ocr_text(NOTE, 0, &[]).unwrap();
        assert!(store.has_ocr_text(NOTE, 0));
        assert_eq!(store.read_ocr_text(NOTE, 0).unwrap(), "");
    }

    #[test]
    fn missing_dirs_read_as_empty() {
        let (_dir, store) = store();
        assert_eq!(store.image_indices(NOTE).unwrap(), Vec::<usize>::new());
        assert_eq!(store.ocr_indices(NOTE).unwrap(), Vec::<usize>::new());
        assert!(!store.has_images(NOTE));
    }

    #[test]
    fn run_log_appends_never_truncate() {
        let dir = TempDir::new().unwrap();
        let log = RunLog::new(dir.path().join("run"));
        log.append("first failure");
        log.append("second failure");
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.contains("first failure"));
        assert!(text.contains("second failure"));
        assert_eq!(text.lines().count(), 2);
        // Entries carry a timestamp prefix
        assert!(text.starts_with('['));
    }
}
