//! Inline `[N]` marker scanning and resolution
//!
//! Rendering converts markers into activatable references without ever
//! mutating the stored content: the mapping here is span-based, computed
//! fresh per render. A marker whose citation has not arrived yet binds to
//! nothing and renders as a plain numbered placeholder until the citation
//! event lands.

use once_cell::sync::Lazy;
use regex::Regex;
use shared_types::{Citation, CitationIndex};

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("marker pattern compiles"));

/// Byte span of one `[N]` marker in message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMarker {
    pub start: usize,
    pub end: usize,
    pub number: u32,
}

/// A marker paired with its citation, if it has arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerBinding<'a> {
    pub marker: InlineMarker,
    pub citation: Option<&'a Citation>,
}

/// All `[N]` markers in `content`, in text order.
pub fn scan_markers(content: &str) -> Vec<InlineMarker> {
    MARKER
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let number = caps.get(1)?.as_str().parse().ok()?;
            Some(InlineMarker {
                start: whole.start(),
                end: whole.end(),
                number,
            })
        })
        .collect()
}

/// Bind each marker in `content` to its citation metadata.
pub fn bind_markers<'a>(content: &str, citations: &'a CitationIndex) -> Vec<MarkerBinding<'a>> {
    scan_markers(content)
        .into_iter()
        .map(|marker| MarkerBinding {
            citation: citations.resolve(marker.number),
            marker,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::CitationSource;

    fn citation(number: u32, name: &str) -> Citation {
        Citation::from_source(
            number,
            CitationSource {
                document_id: format!("doc-{number}"),
                document_name: name.to_string(),
                document_url: String::new(),
                page_number: 0,
                chunk_text: "excerpt".to_string(),
                relevance_score: 0.9,
            },
        )
    }

    #[test]
    fn test_scan_finds_markers_with_spans() {
        let content = "Revenue grew [1], while costs fell [12].";
        let markers = scan_markers(content);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].number, 1);
        assert_eq!(&content[markers[0].start..markers[0].end], "[1]");
        assert_eq!(markers[1].number, 12);
        assert_eq!(&content[markers[1].start..markers[1].end], "[12]");
    }

    #[test]
    fn test_scan_ignores_non_numeric_brackets() {
        let markers = scan_markers("see [source] and [ 3 ] but not [4]");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].number, 4);
    }

    #[test]
    fn test_unresolved_marker_binds_to_placeholder() {
        let index = CitationIndex::new();
        let bindings = bind_markers("pending [7]", &index);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].marker.number, 7);
        assert!(bindings[0].citation.is_none());
    }

    #[test]
    fn test_marker_upgrades_once_citation_arrives() {
        let content = "first [1] then [2]";
        let mut index = CitationIndex::new();
        index.insert(citation(1, "a.pdf"));

        let before = bind_markers(content, &index);
        assert!(before[0].citation.is_some());
        assert!(before[1].citation.is_none());
        // Snapshot the unrelated marker's pre-upgrade state as owned data so
        // the comparison below does not hold an immutable borrow of `index`
        // across the mutating insert.
        let before0_marker = before[0].marker.clone();
        let before0_citation = before[0].citation.cloned();

        index.insert(citation(2, "b.pdf"));
        let after = bind_markers(content, &index);
        assert_eq!(after[1].citation.unwrap().document_name, "b.pdf");
        // Unrelated markers are untouched by the upgrade.
        assert_eq!(after[0].marker, before0_marker);
        assert_eq!(after[0].citation.cloned(), before0_citation);
    }

    #[test]
    fn test_binding_never_mutates_content() {
        let content = "answer [1].";
        let mut index = CitationIndex::new();
        index.insert(citation(1, "a.pdf"));
        let _ = bind_markers(content, &index);
        assert_eq!(content, "answer [1].");
    }
}
