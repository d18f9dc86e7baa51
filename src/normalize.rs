//! Target normalisation: free-form user input → deduplicated processing targets.
//!
//! Users paste note lists in whatever shape their clipboard had: numbered
//! lists, comma- or newline-separated ids, bare 24-hex note ids, or full
//! share URLs carrying an `xsec_token` query parameter. This module reduces
//! all of those to a flat, deduplicated list of [`Target`]s.
//!
//! ## URL priority
//!
//! URLs are scanned first and, when any qualifying URL is present, the
//! result is *exactly* the set of qualifying URLs — bare ids elsewhere in
//! the same input are dropped. A share URL carries the auth token the
//! downloader service needs for full data, so it is always the better form
//! of the same target. The global scope of the rule (an unrelated bare id
//! is also dropped) is intentional and pinned by a test.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Hosts whose URLs qualify as note targets.
const NOTE_HOSTS: [&str; 2] = ["xiaohongshu.com", "xhslink.com"];

static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap());

static RE_NOTE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9a-f]{24}").unwrap());

/// One normalised processing target: a bare note id or a share URL.
///
/// Identity is the extracted note id — two `Target`s naming the same note
/// share one checkpoint directory regardless of input form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// A bare 24-character lowercase hex note id.
    Id(String),
    /// A full xiaohongshu.com / xhslink.com URL, possibly with auth token.
    Url(String),
}

impl Target {
    /// The raw string as the user supplied it (id or URL).
    pub fn as_str(&self) -> &str {
        match self {
            Target::Id(s) | Target::Url(s) => s,
        }
    }

    /// True if the target was given as a URL.
    pub fn is_url(&self) -> bool {
        matches!(self, Target::Url(_))
    }

    /// Extract the note id used for checkpoint storage.
    ///
    /// Returns `None` for URLs with no embedded 24-hex id (unresolved
    /// xhslink.com short links).
    pub fn note_id(&self) -> Option<String> {
        match self {
            Target::Id(id) => Some(id.clone()),
            Target::Url(url) => RE_NOTE_ID
                .find(&url.to_lowercase())
                .map(|m| m.as_str().to_string()),
        }
    }

    /// True if the target carries the `xsec_token` auth parameter the
    /// downloader service wants. Bare ids never do.
    pub fn has_auth_token(&self) -> bool {
        matches!(self, Target::Url(url) if url.contains("xsec_token="))
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse free-form input into a deduplicated target list.
///
/// 1. Scan for URL-shaped substrings and keep the ones on a recognised
///    host. If any are found, they *are* the result (URL priority).
/// 2. Otherwise scan the lower-cased text for 24-hex note ids.
///
/// Duplicates are removed preserving first occurrence. An empty result is
/// the caller's signal of unusable input, not an error here.
pub fn normalize(raw: &str) -> Vec<Target> {
    let mut out: Vec<Target> = Vec::new();

    for m in RE_URL.find_iter(raw) {
        let url = m.as_str();
        if NOTE_HOSTS.iter().any(|h| url.contains(h)) {
            push_unique(&mut out, Target::Url(url.to_string()));
        }
    }

    if out.is_empty() {
        let lowered = raw.to_lowercase();
        for m in RE_NOTE_ID.find_iter(&lowered) {
            push_unique(&mut out, Target::Id(m.as_str().to_string()));
        }
    }

    out
}

fn push_unique(targets: &mut Vec<Target>, t: Target) {
    if !targets.contains(&t) {
        targets.push(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_A: &str = "68a9a370000000001b037dc0";
    const ID_B: &str = "68a82fc1000000001d02ab79";
    const ID_C: &str = "68a82d32000000001d03619c";

    #[test]
    fn numbered_list_of_ids() {
        let input = format!("1. {ID_A}\n2. {ID_B}\n3. {ID_C}\n");
        let targets = normalize(&input);
        assert_eq!(targets.len(), 3);
        assert!(targets.contains(&Target::Id(ID_A.into())));
    }

    #[test]
    fn comma_separated_ids() {
        let targets = normalize(&format!("{ID_A},{ID_B}"));
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn ids_match_case_insensitively() {
        let targets = normalize(&ID_A.to_uppercase());
        assert_eq!(targets, vec![Target::Id(ID_A.into())]);
    }

    #[test]
    fn duplicate_ids_collapse() {
        let input = format!("{ID_A}\n{ID_A}\n{ID_A}");
        assert_eq!(normalize(&input).len(), 1);
    }

    #[test]
    fn explore_url_is_kept_whole() {
        let url = format!("https://www.xiaohongshu.com/explore/{ID_A}?xsec_token=ABC");
        let targets = normalize(&url);
        assert_eq!(targets, vec![Target::Url(url.clone())]);
        assert_eq!(targets[0].note_id().as_deref(), Some(ID_A));
        assert!(targets[0].has_auth_token());
    }

    #[test]
    fn short_link_qualifies_without_note_id() {
        let targets = normalize("http://xhslink.com/a/bcdEFG");
        assert_eq!(targets.len(), 1);
        assert!(targets[0].is_url());
        assert_eq!(targets[0].note_id(), None);
    }

    #[test]
    fn foreign_urls_are_ignored() {
        let targets = normalize("https://example.com/explore/whatever");
        assert!(targets.is_empty());
    }

    #[test]
    fn any_url_suppresses_all_bare_ids() {
        // Documented policy: the presence of one qualifying URL drops every
        // bare id in the input, even ids unrelated to that URL.
        let input = format!(
            "1. {ID_A}\nhttps://www.xiaohongshu.com/explore/{ID_B}\n{ID_C}"
        );
        let targets = normalize(&input);
        assert_eq!(targets.len(), 1);
        assert!(targets[0].is_url());
        assert_eq!(targets[0].note_id().as_deref(), Some(ID_B));
    }

    #[test]
    fn duplicate_urls_collapse() {
        let url = format!("https://www.xiaohongshu.com/explore/{ID_A}");
        let targets = normalize(&format!("{url}\n{url}"));
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn empty_and_garbage_input_yield_empty_set() {
        assert!(normalize("").is_empty());
        assert!(normalize("some prose with no ids at all").is_empty());
        // 23 hex chars — one short of a note id
        assert!(normalize("68a9a370000000001b037dc").is_empty());
    }

    #[test]
    fn bare_id_has_no_auth_token() {
        assert!(!Target::Id(ID_A.into()).has_auth_token());
        let url = format!("https://www.xiaohongshu.com/explore/{ID_A}");
        assert!(!Target::Url(url).has_auth_token());
    }
}
