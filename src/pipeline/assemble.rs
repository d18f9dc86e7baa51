//! Document assembly: checkpoints → per-note document → merged batch document.
//!
//! Per-note assembly reads the structured metadata checkpoint and the OCR
//! text artifacts and renders one Markdown document. Writing that document
//! is what marks the note complete, so assembly always runs last. The
//! metadata arrives as a typed [`NoteRecord`] — nothing here re-parses
//! previously generated text.
//!
//! Batch assembly concatenates the successful per-note documents under a
//! run header with the target list and success/failure counts.

use crate::error::NoteError;
use crate::output::NoteResult;
use crate::store::{NoteRecord, NoteStore};
use tracing::debug;

/// Separator between per-note documents in the merged output.
const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Assemble the per-note document from the note's checkpoints and persist
/// it as `content.md` — the completion marker for future runs.
///
/// Requires the metadata checkpoint; OCR artifacts are optional (a note
/// whose recognition produced nothing still assembles, with an explicit
/// placeholder). Sections are ordered by image index, with index 0
/// labelled as the cover image.
pub fn assemble_note(store: &NoteStore, note_id: &str) -> Result<String, NoteError> {
    let storage_failed = |detail: String| NoteError::StorageFailed {
        note_id: note_id.to_string(),
        detail,
    };

    let record = store
        .read_metadata(note_id)
        .map_err(|e| storage_failed(e.to_string()))?
        .ok_or_else(|| NoteError::MissingMetadata {
            note_id: note_id.to_string(),
        })?;

    let mut doc = render_note_header(note_id, &record);

    doc.push_str("\n## Image text\n");
    let indices = store
        .ocr_indices(note_id)
        .map_err(|e| storage_failed(e.to_string()))?;
    if indices.is_empty() {
        doc.push_str("\n(no recognised image text)\n");
    } else {
        for idx in indices {
            let text = store
                .read_ocr_text(note_id, idx)
                .map_err(|e| storage_failed(e.to_string()))?;
            if idx == 0 {
                doc.push_str("\n### Cover image text\n\n");
            } else {
                doc.push_str(&format!("\n### Image {idx} text\n\n"));
            }
            if text.is_empty() {
                doc.push_str("(no text recognised)\n");
            } else {
                doc.push_str(&text);
                doc.push('\n');
            }
        }
    }

    store
        .write_document(note_id, &doc)
        .map_err(|e| storage_failed(e.to_string()))?;
    debug!("Note {note_id}: document assembled ({} bytes)", doc.len());
    Ok(doc)
}

fn render_note_header(note_id: &str, record: &NoteRecord) -> String {
    let title = non_empty(&record.title, "Untitled note");
    let mut s = format!("# {title}\n\n## Note info\n\n");
    s.push_str(&format!("- **Note id**: {note_id}\n"));
    s.push_str(&format!("- **Author**: {}\n", non_empty(&record.author, "unknown")));
    if !record.author_id.is_empty() {
        s.push_str(&format!("- **Author id**: {}\n", record.author_id));
    }
    s.push_str(&format!(
        "- **Published**: {}\n",
        non_empty(&record.published_at, "unknown")
    ));
    if !record.updated_at.is_empty() {
        s.push_str(&format!("- **Updated**: {}\n", record.updated_at));
    }
    if !record.kind.is_empty() {
        s.push_str(&format!("- **Type**: {}\n", record.kind));
    }
    s.push_str(&format!(
        "- **Engagement**: {} likes / {} collects / {} comments / {} shares\n",
        record.likes, record.collects, record.comments, record.shares
    ));
    if !record.tags.is_empty() {
        s.push_str(&format!("- **Tags**: {}\n", record.tags.join(", ")));
    }
    s.push_str(&format!(
        "- **Link**: https://www.xiaohongshu.com/explore/{note_id}\n"
    ));

    s.push_str("\n## Description\n\n");
    s.push_str(non_empty(&record.description, "(no description)"));
    s.push('\n');
    s
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Assemble the merged batch document: run header, target list, then every
/// successful per-note document joined with a visible separator.
pub fn assemble_batch(run_id: &str, results: &[NoteResult]) -> String {
    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    let failed = results.len() - succeeded;
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    let mut doc = String::from("# Merged source document\n\n## Run info\n\n");
    doc.push_str(&format!("- **Generated**: {stamp}\n"));
    doc.push_str(&format!("- **Run id**: {run_id}\n"));
    doc.push_str(&format!("- **Targets**: {}\n", results.len()));
    doc.push_str(&format!("- **Succeeded**: {succeeded}\n"));
    doc.push_str(&format!("- **Failed**: {failed}\n"));

    doc.push_str("\n## Targets\n\n");
    for (i, result) in results.iter().enumerate() {
        doc.push_str(&format_target_line(i + 1, result));
        doc.push('\n');
    }

    doc.push_str("\n---\n\n");

    let contents: Vec<&str> = results
        .iter()
        .filter_map(|r| r.content.as_deref())
        .collect();
    if contents.is_empty() {
        doc.push_str("No notes were processed successfully.\n");
    } else {
        doc.push_str(&contents.join(DOCUMENT_SEPARATOR));
        if !doc.ends_with('\n') {
            doc.push('\n');
        }
    }

    doc
}

/// One line of the target list: the note id, annotated when the target was
/// given as a URL; un-extractable URLs are truncated for display.
fn format_target_line(position: usize, result: &NoteResult) -> String {
    if result.target.is_url() {
        match result.target.note_id() {
            Some(id) => format!("  {position}. {id} (URL)"),
            None => {
                let url = result.target.as_str();
                let shown: String = url.chars().take(50).collect();
                if shown.len() < url.len() {
                    format!("  {position}. {shown}...")
                } else {
                    format!("  {position}. {shown}")
                }
            }
        }
    } else {
        format!("  {position}. {}", result.note_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Target;
    use tempfile::TempDir;

    const NOTE: &str = "68a9a370000000001b037dc0";

    fn note_result(id: &str, target: Target, content: Option<&str>) -> NoteResult {
        NoteResult {
            note_id: id.to_string(),
            target,
            content: content.map(|s| s.to_string()),
            from_cache: false,
            error: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn assembled_document_orders_sections() {
        let dir = TempDir::new().unwrap();
        let store = NoteStore::new(dir.path());
        store
            .write_metadata(
                NOTE,
                &NoteRecord {
                    title: "T".into(),
                    author: "A".into(),
                    published_at: "2025-09-11".into(),
                    description: "D".into(),
                    ..NoteRecord::default()
                },
            )
            .unwrap();
        store.write_ocr_text(NOTE, 0, &["X0".into()]).unwrap();
        store.write_ocr_text(NOTE, 1, &["X1".into()]).unwrap();

        let doc = assemble_note(&store, NOTE).unwrap();

        let pos = |needle: &str| doc.find(needle).unwrap_or_else(|| panic!("missing {needle:?}"));
        assert!(pos("# T") < pos("A"));
        assert!(pos("A") < pos("D"));
        assert!(pos("D") < pos("### Cover image text"));
        assert!(pos("### Cover image text") < pos("X0"));
        assert!(pos("X0") < pos("### Image 1 text"));
        assert!(pos("### Image 1 text") < pos("X1"));

        // The write doubles as the completion marker
        assert!(store.is_complete(NOTE));
        assert_eq!(store.read_document(NOTE).unwrap().unwrap(), doc);
    }

    #[test]
    fn assembly_without_metadata_fails() {
        let dir = TempDir::new().unwrap();
        let store = NoteStore::new(dir.path());
        let err = assemble_note(&store, NOTE).unwrap_err();
        assert!(matches!(err, NoteError::MissingMetadata { .. }));
        assert!(!store.is_complete(NOTE));
    }

    #[test]
    fn assembly_without_ocr_text_uses_placeholder() {
        let dir = TempDir::new().unwrap();
        let store = NoteStore::new(dir.path());
        store.write_metadata(NOTE, &NoteRecord::default()).unwrap();
        let doc = assemble_note(&store, NOTE).unwrap();
        assert!(doc.contains("(no recognised image text)"));
        assert!(doc.contains("# Untitled note"));
    }

    #[test]
    fn empty_ocr_artifact_renders_placeholder_section() {
        let dir = TempDir::new().unwrap();
        let store = NoteStore::new(dir.path());
        store.write_metadata(NOTE, &NoteRecord::default()).unwrap();
        store.write_ocr_text(NOTE, 0, &[]).unwrap();
        let doc = assemble_note(&store, NOTE).unwrap();
        assert!(doc.contains("### Cover image text"));
        assert!(doc.contains("(no text recognised)"));
    }

    #[test]
    fn batch_header_counts_successes_and_failures() {
        let results = vec![
            note_result("aaa", Target::Id("aaa".into()), Some("doc A")),
            note_result("bbb", Target::Id("bbb".into()), Some("doc B")),
            note_result("ccc", Target::Id("ccc".into()), None),
        ];
        let doc = assemble_batch("20250911-143025-a3b5c7", &results);

        assert!(doc.contains("- **Targets**: 3"));
        assert!(doc.contains("- **Succeeded**: 2"));
        assert!(doc.contains("- **Failed**: 1"));
        assert!(doc.contains("doc A"));
        assert!(doc.contains("doc B"));
        // All three targets are listed even though one failed
        assert!(doc.contains("  1. aaa"));
        assert!(doc.contains("  2. bbb"));
        assert!(doc.contains("  3. ccc"));
    }

    #[test]
    fn batch_with_zero_successes_says_so() {
        let results = vec![note_result("aaa", Target::Id("aaa".into()), None)];
        let doc = assemble_batch("run", &results);
        assert!(doc.contains("No notes were processed successfully."));
    }

    #[test]
    fn url_targets_are_annotated() {
        let url = format!("https://www.xiaohongshu.com/explore/{NOTE}?xsec_token=x");
        let results = vec![note_result(NOTE, Target::Url(url), Some("d"))];
        let doc = assemble_batch("run", &results);
        assert!(doc.contains(&format!("  1. {NOTE} (URL)")));
    }

    #[test]
    fn unresolvable_short_links_are_truncated() {
        let url = "http://xhslink.com/a/veryveryveryverylongshortlinktokenpath0123456789";
        let results = vec![note_result(url, Target::Url(url.to_string()), None)];
        let doc = assemble_batch("run", &results);
        assert!(doc.contains("..."));
        assert!(!doc.contains("0123456789\n"));
    }
}
