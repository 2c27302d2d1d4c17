//! The canonicalization pipeline.
//!
//! Implements the seven-rule normalization that turns raw markdown into
//! canonical bytes. The rules run in a fixed order; the line-oriented rules
//! (4–7) operate on the output of the character-oriented rules (1–3).

use std::borrow::Cow;

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Transform text into its canonical form.
///
/// The result contains no `\r`, no control characters other than `\n` and
/// `\t`, no trailing whitespace on any line, no runs of consecutive blank
/// lines, and ends with exactly one `\n`. Empty and whitespace-only inputs
/// canonicalize to `"\n"`.
///
/// Idempotent: `canonicalize(canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(input: &str) -> String {
    // Rule 1: unify line endings before NFC so `\r` never reaches the
    // line-oriented passes.
    let unified = normalize_line_endings(input);

    // Rule 2: NFC. Skip the allocation when the text is already composed.
    let composed: Cow<str> = if is_nfc(&unified) {
        Cow::Borrowed(unified.as_ref())
    } else {
        Cow::Owned(unified.nfc().collect())
    };

    // Rules 3-6 build the canonical line list.
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = false;
    for raw_line in composed.split('\n') {
        let mut line = String::with_capacity(raw_line.len());
        // Rule 3: the strip set is exactly U+0000-U+001F and U+007F. Tab
        // survives, newline is the split delimiter and never appears
        // here, and anything above DEL (C1 included) passes through.
        line.extend(
            raw_line
                .chars()
                .filter(|&c| c == '\t' || !(c <= '\u{001F}' || c == '\u{007F}')),
        );
        // Rules 4-5: trailing trim turns whitespace-only lines blank.
        line.truncate(line.trim_end().len());

        if line.is_empty() {
            // Rule 6: at most one blank line in a row.
            if !previous_blank {
                lines.push(line);
                previous_blank = true;
            }
        } else {
            lines.push(line);
            previous_blank = false;
        }
    }

    // Rule 7: no trailing blank lines, then exactly one trailing newline.
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let mut out = String::with_capacity(composed.len() + 1);
    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }
    if out.is_empty() {
        out.push('\n');
    }
    out
}

/// Rewrite `\r\n` and lone `\r` to `\n`.
fn normalize_line_endings(input: &str) -> Cow<str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
