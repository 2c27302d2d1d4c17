//! Line scanner for wiki and markdown references.

use crate::{ExtractedLink, LinkSource, LinkType};

/// Case-fold, collapse whitespace runs to single spaces, and trim.
///
/// Anchors are split off before normalization by the caller; this function
/// only normalizes the textual reference.
pub fn normalize_ref(target: &str) -> String {
    let mut out = String::with_capacity(target.len());
    let mut pending_space = false;
    for c in target.trim().chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

/// Collection names are `[a-z0-9][a-z0-9_-]*`.
pub fn is_valid_collection(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Extract every wiki and markdown link outside code fences and inline
/// code spans. Links must open and close on the same line.
pub fn extract_links(markdown: &str) -> Vec<ExtractedLink> {
    let mut links = Vec::new();
    let mut fence: Option<&str> = None;

    for (line_idx, line) in markdown.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            fence = Some("~~~");
            continue;
        }

        scan_line(line, line_idx as u32 + 1, &mut links);
    }

    links
}

fn scan_line(line: &str, line_no: u32, links: &mut Vec<ExtractedLink>) {
    let chars: Vec<char> = line.chars().collect();
    let mut in_code = false;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if c == '`' {
            in_code = !in_code;
            i += 1;
            continue;
        }
        if in_code || c != '[' {
            i += 1;
            continue;
        }

        // Wiki link: "[[" ... "]]".
        if chars.get(i + 1) == Some(&'[') {
            if let Some(close) = find_pair(&chars, i + 2, ']') {
                let inner: String = chars[i + 2..close].iter().collect();
                if let Some(link) = parse_wiki(&inner, line_no, i, close) {
                    links.push(link);
                }
                i = close + 2;
                continue;
            }
            i += 1;
            continue;
        }

        // Markdown link: "[text](target)", not preceded by "!".
        if i > 0 && chars[i - 1] == '!' {
            i += 1;
            continue;
        }
        if let Some(text_close) = find_single(&chars, i + 1, ']') {
            if chars.get(text_close + 1) == Some(&'(') {
                if let Some(target_close) = find_single(&chars, text_close + 2, ')') {
                    let text: String = chars[i + 1..text_close].iter().collect();
                    let target: String = chars[text_close + 2..target_close].iter().collect();
                    if let Some(link) = parse_markdown(&text, &target, line_no, i, target_close) {
                        links.push(link);
                    }
                    i = target_close + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
}

/// Index of the first of a `cc` pair at or after `from`.
fn find_pair(chars: &[char], from: usize, c: char) -> Option<usize> {
    let mut i = from;
    while i + 1 < chars.len() {
        if chars[i] == c && chars[i + 1] == c {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn find_single(chars: &[char], from: usize, c: char) -> Option<usize> {
    (from..chars.len()).find(|&i| chars[i] == c)
}

/// Parse the inside of `[[...]]`.
///
/// Grammar: `[collection:]target[#anchor][|display]`. The collection prefix
/// only binds when the text before the first `:` is a valid collection
/// name; otherwise the colon stays part of the target.
fn parse_wiki(inner: &str, line_no: u32, open_idx: usize, close_idx: usize) -> Option<ExtractedLink> {
    let (ref_part, display) = match inner.split_once('|') {
        Some((r, d)) => (r, Some(d.trim().to_string())),
        None => (inner, None),
    };
    let ref_part = ref_part.trim();
    if ref_part.is_empty() {
        return None;
    }

    let (collection, rest) = match ref_part.split_once(':') {
        Some((head, tail)) if is_valid_collection(head) => (Some(head.to_string()), tail),
        _ => (None, ref_part),
    };
    let (target, anchor) = match rest.split_once('#') {
        Some((t, a)) if !a.trim().is_empty() => (t, Some(a.trim().to_string())),
        Some((t, _)) => (t, None),
        None => (rest, None),
    };
    let norm = normalize_ref(target);
    if norm.is_empty() {
        return None;
    }

    Some(ExtractedLink {
        target_ref: ref_part.to_string(),
        target_ref_norm: norm,
        target_anchor: anchor,
        target_collection: collection,
        link_type: LinkType::Wiki,
        link_text: display.filter(|d| !d.is_empty()),
        start_line: line_no,
        start_col: open_idx as u32 + 1,
        end_line: line_no,
        end_col: close_idx as u32 + 2,
        source: LinkSource::Parsed,
    })
}

fn parse_markdown(
    text: &str,
    target: &str,
    line_no: u32,
    open_idx: usize,
    close_idx: usize,
) -> Option<ExtractedLink> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }
    let (bare, anchor) = match target.split_once('#') {
        Some((t, a)) if !a.trim().is_empty() => (t, Some(a.trim().to_string())),
        Some((t, _)) => (t, None),
        None => (target, None),
    };
    let norm = normalize_ref(bare);
    if norm.is_empty() {
        return None;
    }

    let text = text.trim();
    Some(ExtractedLink {
        target_ref: target.to_string(),
        target_ref_norm: norm,
        target_anchor: anchor,
        target_collection: None,
        link_type: LinkType::Markdown,
        link_text: (!text.is_empty()).then(|| text.to_string()),
        start_line: line_no,
        start_col: open_idx as u32 + 1,
        end_line: line_no,
        end_col: close_idx as u32 + 1,
        source: LinkSource::Parsed,
    })
}
