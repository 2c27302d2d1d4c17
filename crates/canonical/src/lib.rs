//! GNO Canonical Layer - Deterministic Markdown Canonicalization
//!
//! This crate is the first stage of the GNO indexing pipeline. It transforms
//! arbitrary markdown text into a canonical byte sequence whose SHA-256 hash
//! is a stable content key across platforms, and it computes that hash (the
//! *mirror hash*).
//!
//! # Core Guarantee
//!
//! > **Same input text → identical canonical bytes and mirror hash, forever.**
//!
//! The canonicalization rules are a compatibility contract: changing them
//! invalidates every stored mirror hash. Any behavioral change requires a
//! store-level schema migration, not a quiet edit here.
//!
//! This crate is **pure** and **side-effect free**: no I/O, no clocks, no
//! locale dependence.
//!
//! # Canonicalization Rules
//!
//! Applied in order:
//!
//! 1. Normalize line endings: `\r\n` → `\n`, lone `\r` → `\n`.
//! 2. Apply Unicode NFC normalization.
//! 3. Strip control characters U+0000–U+001F and U+007F, except tab and
//!    newline.
//! 4. Trim trailing whitespace on every line.
//! 5. Treat whitespace-only lines as blank.
//! 6. Collapse any run of two or more consecutive blank lines into exactly
//!    one blank line.
//! 7. Ensure exactly one trailing newline. Empty input becomes `"\n"`.
//!
//! # Quick Start
//!
//! ```rust
//! use canonical::{canonicalize, mirror_hash};
//!
//! let text = canonicalize("# Title\r\n\r\n\r\nBody  \r\n");
//! assert_eq!(text, "# Title\n\nBody\n");
//!
//! let hash = mirror_hash(&text);
//! assert_eq!(hash.len(), 64);
//! ```

mod hash;
mod normalize;

pub use crate::hash::{mirror_hash, mirror_hash_bytes};
pub use crate::normalize::canonicalize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_line_endings_and_blank_runs() {
        let input = "# T\r\n\r\nA  \r\n\r\n\r\nB\r\n\r\n";
        let out = canonicalize(input);
        assert_eq!(out, "# T\n\nA\n\nB\n");
        assert_eq!(mirror_hash(&out), mirror_hash("# T\n\nA\n\nB\n"));
    }

    #[test]
    fn lone_carriage_returns_become_newlines() {
        assert_eq!(canonicalize("a\rb"), "a\nb\n");
        assert_eq!(canonicalize("a\r\rb"), "a\nb\n");
    }

    #[test]
    fn empty_input_is_single_newline() {
        assert_eq!(canonicalize(""), "\n");
    }

    #[test]
    fn whitespace_only_input_is_single_newline() {
        assert_eq!(canonicalize("   \n \t \n  "), "\n");
    }

    #[test]
    fn known_mirror_hash() {
        let canonical = canonicalize("hello");
        assert_eq!(canonical, "hello\n");
        assert_eq!(
            mirror_hash(&canonical),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn idempotent_on_arbitrary_inputs() {
        let inputs = [
            "",
            "plain",
            "# T\r\n\r\nA  \r\n\r\n\r\nB\r\n\r\n",
            "\n\n\nleading blanks",
            "trailing\n\n\n\n",
            "tabs\tstay\n",
            "Cafe\u{0301} composed\n",
            "mixed\r\nline\rendings\n",
        ];
        for input in inputs {
            let once = canonicalize(input);
            let twice = canonicalize(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn strips_control_characters_but_keeps_tabs() {
        let out = canonicalize("a\u{0000}b\u{0007}c\td\u{007f}e");
        assert_eq!(out, "abc\tde\n");
    }

    #[test]
    fn c1_controls_are_outside_the_strip_set() {
        // The strip set is exactly U+0000-U+001F and U+007F; C1 scalars
        // pass through untouched so the hash contract stays stable.
        assert_eq!(canonicalize("a\u{009F}b"), "a\u{009F}b\n");
        assert_ne!(
            mirror_hash(&canonicalize("a\u{009F}b")),
            mirror_hash(&canonicalize("ab"))
        );
    }

    #[test]
    fn interior_tab_survives_trailing_trim() {
        assert_eq!(canonicalize("a\tb\t \t"), "a\tb\n");
    }

    #[test]
    fn nfc_unifies_decomposed_input() {
        let composed = "Caf\u{00E9}";
        let decomposed = "Cafe\u{0301}";
        assert_eq!(canonicalize(composed), canonicalize(decomposed));
        assert_eq!(
            mirror_hash(&canonicalize(composed)),
            mirror_hash(&canonicalize(decomposed))
        );
    }

    #[test]
    fn canonical_bytes_invariants_hold() {
        let inputs = ["a\r\nb\u{000C}c", "", "x\n\n\n\ny  ", "\u{001B}[0m colored"];
        for input in inputs {
            let out = canonicalize(input);
            assert!(!out.contains('\r'));
            assert!(out
                .chars()
                .all(|c| c == '\n' || c == '\t' || !(c <= '\u{001F}' || c == '\u{007F}')));
            assert!(out.ends_with('\n'));
            assert!(!out.ends_with("\n\n") || out == "\n");
        }
    }

    #[test]
    fn single_leading_blank_line_is_preserved() {
        assert_eq!(canonicalize("\nA"), "\nA\n");
        assert_eq!(canonicalize("\n\n\nA"), "\nA\n");
    }

    #[test]
    fn mirror_hash_matches_byte_hash() {
        let text = canonicalize("some body\n\nmore");
        assert_eq!(mirror_hash(&text), mirror_hash_bytes(text.as_bytes()));
    }
}
