//! Full-text tokenizers and BM25 scoring.
//!
//! The tokenizer is chosen at `open` time and persisted in the store's
//! metadata; changing it later requires a full-text rebuild because the
//! postings on disk were produced by the old tokenizer.

use serde::{Deserialize, Serialize};

/// BM25 term-frequency saturation.
const K1: f64 = 1.2;
/// BM25 length normalization.
const B: f64 = 0.75;

/// Available tokenizers. Persisted by name in store metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FtsTokenizer {
    /// Unicode alphanumeric words, case-folded.
    #[default]
    Unicode61,
    /// `unicode61` plus English Porter stemming.
    Porter,
    /// ASCII alphanumeric words, ASCII case-folded.
    Simple,
    /// Case-folded character trigrams, for substring-ish matching.
    Trigram,
}

impl FtsTokenizer {
    pub fn as_str(self) -> &'static str {
        match self {
            FtsTokenizer::Unicode61 => "unicode61",
            FtsTokenizer::Porter => "porter",
            FtsTokenizer::Simple => "simple",
            FtsTokenizer::Trigram => "trigram",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unicode61" => Some(FtsTokenizer::Unicode61),
            "porter" => Some(FtsTokenizer::Porter),
            "simple" => Some(FtsTokenizer::Simple),
            "trigram" => Some(FtsTokenizer::Trigram),
            _ => None,
        }
    }

    /// Tokenize text for indexing or querying. Indexing and querying must
    /// use the same tokenizer for postings to line up.
    pub fn tokenize(self, text: &str) -> Vec<String> {
        match self {
            FtsTokenizer::Unicode61 => unicode_words(text, false),
            FtsTokenizer::Porter => {
                let stemmer =
                    rust_stemmers::Stemmer::create(rust_stemmers::Algorithm::English);
                unicode_words(text, false)
                    .into_iter()
                    .map(|w| stemmer.stem(&w).into_owned())
                    .collect()
            }
            FtsTokenizer::Simple => unicode_words(text, true),
            FtsTokenizer::Trigram => trigrams(text),
        }
    }
}

fn unicode_words(text: &str, ascii_only: bool) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        let is_word = if ascii_only {
            c.is_ascii_alphanumeric()
        } else {
            c.is_alphanumeric()
        };
        if is_word {
            if ascii_only {
                current.push(c.to_ascii_lowercase());
            } else {
                current.extend(c.to_lowercase());
            }
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Sliding 3-character windows over the case-folded, whitespace-collapsed
/// text. Windows containing a space at the edge are kept so substrings
/// spanning word boundaries still match.
fn trigrams(text: &str) -> Vec<String> {
    let folded: String = {
        let mut out = String::with_capacity(text.len());
        let mut pending_space = false;
        for c in text.chars() {
            if c.is_whitespace() {
                pending_space = !out.is_empty();
            } else {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.extend(c.to_lowercase());
            }
        }
        out
    };
    let chars: Vec<char> = folded.chars().collect();
    if chars.len() < 3 {
        return if chars.is_empty() {
            Vec::new()
        } else {
            vec![chars.iter().collect()]
        };
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// One BM25 term contribution.
///
/// `idf` uses the non-negative `ln(1 + (n - df + 0.5) / (df + 0.5))` form,
/// so scores grow with relevance; the store negates totals so that its
/// external convention stays "more negative = better".
pub fn bm25_term(tf: u32, df: u64, n_docs: u64, doc_len: u32, avg_len: f64) -> f64 {
    if tf == 0 || df == 0 || n_docs == 0 {
        return 0.0;
    }
    let tf = tf as f64;
    let idf = (1.0 + (n_docs as f64 - df as f64 + 0.5) / (df as f64 + 0.5)).ln();
    let avg_len = if avg_len > 0.0 { avg_len } else { 1.0 };
    let norm = K1 * (1.0 - B + B * doc_len as f64 / avg_len);
    idf * tf * (K1 + 1.0) / (tf + norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicode61_folds_and_splits() {
        let words = FtsTokenizer::Unicode61.tokenize("Hello, WORLD-wide Café!");
        assert_eq!(words, vec!["hello", "world", "wide", "café"]);
    }

    #[test]
    fn simple_is_ascii_only() {
        let words = FtsTokenizer::Simple.tokenize("Caf\u{00E9} shop");
        assert_eq!(words, vec!["caf", "shop"]);
    }

    #[test]
    fn porter_stems_english() {
        let words = FtsTokenizer::Porter.tokenize("running searches");
        assert_eq!(words, vec!["run", "search"]);
    }

    #[test]
    fn trigram_windows() {
        let grams = FtsTokenizer::Trigram.tokenize("AbCd");
        assert_eq!(grams, vec!["abc", "bcd"]);
        let short = FtsTokenizer::Trigram.tokenize("ab");
        assert_eq!(short, vec!["ab"]);
    }

    #[test]
    fn tokenizer_names_roundtrip() {
        for tok in [
            FtsTokenizer::Unicode61,
            FtsTokenizer::Porter,
            FtsTokenizer::Simple,
            FtsTokenizer::Trigram,
        ] {
            assert_eq!(FtsTokenizer::parse(tok.as_str()), Some(tok));
        }
        assert_eq!(FtsTokenizer::parse("bogus"), None);
    }

    #[test]
    fn bm25_rewards_rarity_and_frequency() {
        let rare = bm25_term(1, 1, 100, 10, 10.0);
        let common = bm25_term(1, 90, 100, 10, 10.0);
        assert!(rare > common);

        let once = bm25_term(1, 5, 100, 10, 10.0);
        let thrice = bm25_term(3, 5, 100, 10, 10.0);
        assert!(thrice > once);
    }

    #[test]
    fn bm25_penalizes_long_documents() {
        let short = bm25_term(2, 5, 100, 5, 20.0);
        let long = bm25_term(2, 5, 100, 200, 20.0);
        assert!(short > long);
    }

    #[test]
    fn bm25_degenerate_inputs_are_zero() {
        assert_eq!(bm25_term(0, 1, 10, 5, 5.0), 0.0);
        assert_eq!(bm25_term(1, 0, 10, 5, 5.0), 0.0);
        assert_eq!(bm25_term(1, 1, 0, 5, 5.0), 0.0);
    }
}
