//! Search error surface.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SearchError {
    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error("{0}")]
    Embed(#[from] embed::EmbedError),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl SearchError {
    /// Stable identifier for collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::Store(e) => e.code(),
            SearchError::Embed(e) => e.code(),
            SearchError::Validation(_) => "VALIDATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_pass_through() {
        let err = SearchError::from(store::StoreError::VecUnavailable);
        assert_eq!(err.code(), "VEC_UNAVAILABLE");
        let err = SearchError::from(embed::EmbedError::runtime("x"));
        assert_eq!(err.code(), "RUNTIME");
        assert_eq!(SearchError::Validation("x".into()).code(), "VALIDATION");
    }
}
