//! Query expansion through the generator port.
//!
//! The generator is prompted for a strict JSON object; anything that does
//! not validate is rejected and the caller falls back to the identity
//! expansion. Unvalidated model output never flows downstream.

use std::sync::Arc;

use embed::{EmbedError, Generator};
use serde::Deserialize;

use crate::error::SearchError;

const MAX_VARIANTS: usize = 8;
const MAX_LEXICAL_TOKENS: usize = 3;
const MAX_HYDE_CHARS: usize = 2000;

/// The structured expansion of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Short keyword variants (1–3 tokens each).
    pub lexical_queries: Vec<String>,
    /// Natural-language rephrasings preserving intent.
    pub vector_queries: Vec<String>,
    /// Hypothetical answer passage used as an extra vector query; empty
    /// when unavailable.
    pub hyde_passage: String,
}

impl Expansion {
    /// The fallback used whenever expansion is unavailable or invalid.
    pub fn identity(query: &str) -> Self {
        Self {
            lexical_queries: vec![query.to_string()],
            vector_queries: vec![query.to_string()],
            hyde_passage: String::new(),
        }
    }
}

/// What the generator must return.
#[derive(Debug, Deserialize)]
struct RawExpansion {
    lexical: Vec<String>,
    vector: Vec<String>,
    #[serde(default)]
    hyde: String,
}

/// Expands queries via the generator port.
pub struct QueryExpander {
    generator: Arc<dyn Generator>,
}

impl QueryExpander {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Expand a query. Errors cover both generator failures and output
    /// that fails schema validation; callers are expected to fall back to
    /// [`Expansion::identity`].
    pub async fn expand(&self, query: &str) -> Result<Expansion, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Validation("empty query".into()));
        }

        let prompt = expansion_prompt(query);
        let raw = self.generator.generate(&prompt).await?;
        let parsed = parse_expansion(&raw)
            .map_err(|reason| SearchError::Embed(EmbedError::validation(reason)))?;

        // The original query always participates in both retrievers.
        let mut expansion = Expansion {
            lexical_queries: vec![query.to_string()],
            vector_queries: vec![query.to_string()],
            hyde_passage: parsed.hyde.trim().to_string(),
        };
        for variant in parsed.lexical {
            if !expansion.lexical_queries.contains(&variant) {
                expansion.lexical_queries.push(variant);
            }
        }
        for variant in parsed.vector {
            if !expansion.vector_queries.contains(&variant) {
                expansion.vector_queries.push(variant);
            }
        }
        Ok(expansion)
    }
}

fn expansion_prompt(query: &str) -> String {
    format!(
        "You rewrite search queries for a hybrid retrieval engine.\n\
         Respond with ONLY a JSON object, no prose, matching exactly:\n\
         {{\"lexical\": [\"1-3 keyword variant\", ...], \"vector\": [\"full-sentence rephrasing\", ...], \"hyde\": \"a short hypothetical passage that would answer the query\"}}\n\
         Up to {MAX_VARIANTS} entries per array.\n\
         Query: {query}"
    )
}

/// Strict validation of the generator's output.
fn parse_expansion(raw: &str) -> Result<RawExpansion, String> {
    let trimmed = strip_code_fence(raw.trim());
    let parsed: RawExpansion =
        serde_json::from_str(trimmed).map_err(|e| format!("expansion is not valid JSON: {e}"))?;

    if parsed.lexical.is_empty() && parsed.vector.is_empty() && parsed.hyde.trim().is_empty() {
        return Err("expansion is empty".into());
    }
    if parsed.lexical.len() > MAX_VARIANTS || parsed.vector.len() > MAX_VARIANTS {
        return Err(format!("more than {MAX_VARIANTS} variants"));
    }
    for variant in &parsed.lexical {
        let tokens = variant.split_whitespace().count();
        if tokens == 0 || tokens > MAX_LEXICAL_TOKENS {
            return Err(format!(
                "lexical variant '{variant}' must have 1-{MAX_LEXICAL_TOKENS} tokens"
            ));
        }
    }
    for variant in &parsed.vector {
        if variant.trim().is_empty() {
            return Err("empty vector variant".into());
        }
    }
    if parsed.hyde.chars().count() > MAX_HYDE_CHARS {
        return Err(format!("hyde passage exceeds {MAX_HYDE_CHARS} chars"));
    }
    Ok(parsed)
}

/// Models love wrapping JSON in markdown fences.
fn strip_code_fence(raw: &str) -> &str {
    let raw = raw.trim();
    let Some(inner) = raw.strip_prefix("```") else {
        return raw;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim().strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedGenerator(String);

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, EmbedError> {
            Ok(self.0.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, EmbedError> {
            Err(EmbedError::runtime("model down"))
        }
    }

    async fn expand_with(raw: &str, query: &str) -> Result<Expansion, SearchError> {
        QueryExpander::new(Arc::new(FixedGenerator(raw.to_string())))
            .expand(query)
            .await
    }

    #[tokio::test]
    async fn valid_expansion_includes_original_query() {
        let raw = r#"{"lexical": ["rust borrow", "ownership"], "vector": ["How does Rust ownership work?"], "hyde": "Rust tracks ownership at compile time."}"#;
        let expansion = expand_with(raw, "rust ownership rules").await.unwrap();

        assert_eq!(expansion.lexical_queries[0], "rust ownership rules");
        assert!(expansion.lexical_queries.contains(&"rust borrow".to_string()));
        assert_eq!(expansion.vector_queries[0], "rust ownership rules");
        assert_eq!(expansion.vector_queries.len(), 2);
        assert!(expansion.hyde_passage.starts_with("Rust tracks"));
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let raw = "```json\n{\"lexical\": [\"q\"], \"vector\": [\"question\"], \"hyde\": \"\"}\n```";
        assert!(expand_with(raw, "q").await.is_ok());
    }

    #[tokio::test]
    async fn non_json_is_rejected() {
        let err = expand_with("Sure! Here are some variants: ...", "q")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[tokio::test]
    async fn overlong_lexical_variant_is_rejected() {
        let raw = r#"{"lexical": ["one two three four"], "vector": ["v"], "hyde": ""}"#;
        assert!(expand_with(raw, "q").await.is_err());
    }

    #[tokio::test]
    async fn too_many_variants_rejected() {
        let many: Vec<String> = (0..9).map(|i| format!("v{i}")).collect();
        let raw = serde_json::json!({"lexical": many, "vector": ["v"], "hyde": ""}).to_string();
        assert!(expand_with(&raw, "q").await.is_err());
    }

    #[tokio::test]
    async fn generator_failure_surfaces_for_fallback() {
        let expander = QueryExpander::new(Arc::new(FailingGenerator));
        let err = expander.expand("q").await.unwrap_err();
        assert_eq!(err.code(), "RUNTIME");
        // The caller's fallback.
        let identity = Expansion::identity("q");
        assert_eq!(identity.lexical_queries, vec!["q"]);
        assert_eq!(identity.hyde_passage, "");
    }

    #[tokio::test]
    async fn empty_query_is_validation() {
        let expander = QueryExpander::new(Arc::new(FixedGenerator("{}".into())));
        assert!(expander.expand("   ").await.is_err());
    }
}
