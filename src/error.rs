//! Engine-level error surface and the exit-code mapping used by
//! front-end collaborators.

use thiserror::Error;

/// Any failure crossing the engine boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Convert(#[from] convert::ConvertError),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    Search(#[from] search::SearchError),

    #[error(transparent)]
    Graph(#[from] graph::GraphError),

    #[error(transparent)]
    Embed(#[from] embed::EmbedError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The stable error identifier (see the error taxonomy in the crate
    /// docs).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Convert(e) => e.code(),
            EngineError::Store(e) => e.code(),
            EngineError::Search(e) => e.code(),
            EngineError::Graph(e) => e.code(),
            EngineError::Embed(e) => e.code(),
            EngineError::Validation(_) => "VALIDATION",
            EngineError::Io(_) => "IO",
        }
    }

    /// Process exit code for CLI/MCP collaborators: user-addressable
    /// problems exit 1, runtime problems exit 2 (0 is success and never
    /// produced here).
    pub fn exit_code(&self) -> i32 {
        match self.code() {
            "VALIDATION" | "UNSUPPORTED" | "NOT_FOUND" => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_mapping() {
        assert_eq!(EngineError::Validation("x".into()).exit_code(), 1);
        assert_eq!(
            EngineError::Store(store::StoreError::NotFound("d".into())).exit_code(),
            1
        );
        assert_eq!(
            EngineError::Convert(convert::ConvertError::unsupported("m", "e")).exit_code(),
            1
        );
        assert_eq!(
            EngineError::Store(store::StoreError::QueryFailed("q".into())).exit_code(),
            2
        );
        assert_eq!(
            EngineError::Embed(embed::EmbedError::runtime("r")).exit_code(),
            2
        );
        assert_eq!(
            EngineError::Io(std::io::Error::other("disk")).exit_code(),
            2
        );
    }
}
