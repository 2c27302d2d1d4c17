//! GNO Link Extraction - Wiki and Markdown References
//!
//! Parses canonical markdown for document references:
//!
//! - Wiki links: `[[target]]`, `[[target|display]]`, with an optional
//!   `collection:` prefix and `#anchor` suffix.
//! - Standard markdown links: `[text](target)`.
//!
//! Every extracted link carries its 1-based source position
//! (`start_line`, `start_col`, `end_line`, `end_col`, columns counted in
//! characters, end inclusive), the target as written, and a normalized
//! target (`case-folded`, whitespace-collapsed, anchor stripped) used for
//! resolution and backlink lookups.
//!
//! Fenced code blocks and inline code spans are skipped. Links do not span
//! lines.
//!
//! Resolution against stored documents is advisory metadata computed by the
//! graph layer, not by this parser.

mod parser;

pub use crate::parser::{extract_links, is_valid_collection, normalize_ref};

use serde::{Deserialize, Serialize};

/// Kind of reference syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Wiki,
    Markdown,
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Wiki => "wiki",
            LinkType::Markdown => "markdown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wiki" => Some(LinkType::Wiki),
            "markdown" => Some(LinkType::Markdown),
            _ => None,
        }
    }
}

/// Where a link row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkSource {
    /// Extracted from document text.
    Parsed,
    /// Entered by the user through a front-end.
    User,
    /// Proposed by a similarity pass.
    Suggested,
}

/// A parsed reference with its source position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    /// The reference as written (collection prefix and anchor included,
    /// display text excluded).
    pub target_ref: String,
    /// Case-folded, whitespace-collapsed, anchor- and collection-stripped.
    pub target_ref_norm: String,
    pub target_anchor: Option<String>,
    pub target_collection: Option<String>,
    pub link_type: LinkType,
    /// Display text: the `|display` part of a wiki link or the `[text]` of
    /// a markdown link.
    pub link_text: Option<String>,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub source: LinkSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<ExtractedLink> {
        extract_links(text)
    }

    #[test]
    fn plain_wiki_link() {
        let links = extract("see [[Target Page]] here\n");
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.target_ref, "Target Page");
        assert_eq!(link.target_ref_norm, "target page");
        assert_eq!(link.link_type, LinkType::Wiki);
        assert_eq!(link.link_text, None);
        assert_eq!(link.source, LinkSource::Parsed);
        assert_eq!((link.start_line, link.start_col), (1, 5));
        assert_eq!((link.end_line, link.end_col), (1, 19));
    }

    #[test]
    fn wiki_link_with_display_text() {
        let links = extract("[[Real Target|shown words]]\n");
        assert_eq!(links[0].target_ref, "Real Target");
        assert_eq!(links[0].link_text.as_deref(), Some("shown words"));
    }

    #[test]
    fn wiki_link_with_collection_and_anchor() {
        let links = extract("[[notes:Design Doc#headers|d]]\n");
        let link = &links[0];
        assert_eq!(link.target_ref, "notes:Design Doc#headers");
        assert_eq!(link.target_collection.as_deref(), Some("notes"));
        assert_eq!(link.target_anchor.as_deref(), Some("headers"));
        assert_eq!(link.target_ref_norm, "design doc");
    }

    #[test]
    fn colon_prefix_that_is_not_a_collection_stays_in_target() {
        let links = extract("[[C: The Language]]\n");
        let link = &links[0];
        assert_eq!(link.target_collection, None);
        assert_eq!(link.target_ref_norm, "c: the language");
    }

    #[test]
    fn markdown_link() {
        let links = extract("read [the guide](guides/setup.md#install) first\n");
        let link = &links[0];
        assert_eq!(link.link_type, LinkType::Markdown);
        assert_eq!(link.target_ref, "guides/setup.md#install");
        assert_eq!(link.target_ref_norm, "guides/setup.md");
        assert_eq!(link.target_anchor.as_deref(), Some("install"));
        assert_eq!(link.link_text.as_deref(), Some("the guide"));
    }

    #[test]
    fn image_links_are_skipped() {
        let links = extract("![diagram](images/arch.png)\n");
        assert!(links.is_empty());
    }

    #[test]
    fn code_fences_are_skipped() {
        let text = "```\n[[not a link]]\n```\n\n[[real link]]\n";
        let links = extract(text);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_ref, "real link");
        assert_eq!(links[0].start_line, 5);
    }

    #[test]
    fn inline_code_is_skipped() {
        let links = extract("use `[[fake]]` but [[genuine]]\n");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target_ref, "genuine");
    }

    #[test]
    fn multiple_links_on_one_line_keep_order_and_positions() {
        let links = extract("[[a]] then [b](c)\n");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target_ref, "a");
        assert_eq!(links[1].target_ref, "c");
        assert!(links[0].start_col < links[1].start_col);
    }

    #[test]
    fn unterminated_links_are_ignored() {
        assert!(extract("[[dangling\n").is_empty());
        assert!(extract("[text](no close\n").is_empty());
        assert!(extract("[text] (not a link)\n").is_empty());
    }

    #[test]
    fn normalization_collapses_whitespace_and_case() {
        assert_eq!(normalize_ref("  Some\t Big   NAME "), "some big name");
    }

    #[test]
    fn collection_name_validation() {
        assert!(is_valid_collection("notes"));
        assert!(is_valid_collection("my-notes_2"));
        assert!(!is_valid_collection("Notes"));
        assert!(!is_valid_collection("-lead"));
        assert!(!is_valid_collection(""));
    }
}
