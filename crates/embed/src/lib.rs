//! GNO Embed - Model-Runtime Ports and the Backlog Processor
//!
//! The model runtime (local ONNX, remote HTTP, whatever the deployment
//! uses) is a collaborator behind three async ports:
//!
//! - [`Embedder`]: `embed` / `embed_batch` text into fixed-dimension
//!   vectors.
//! - [`Reranker`]: score `(query, candidate)` pairs in `[0, 1]`.
//! - [`Generator`]: produce text for query expansion.
//!
//! [`StubEmbedder`] is a deterministic, dependency-free implementation
//! used by tests and by deployments that have no model runtime yet.
//!
//! [`BacklogProcessor`] drains the embedding backlog: chunks that have no
//! vector for the active model yet, processed in batches behind a
//! monotonic `(mirror_hash, seq)` cursor that advances even past failed
//! batches, so one bad row can never stall the backlog.

mod backlog;
mod error;
mod ports;
mod stub;

pub use crate::backlog::{BacklogOptions, BacklogProcessor, BacklogReport};
pub use crate::error::{EmbedError, EmbedErrorKind};
pub use crate::ports::{Embedder, Generator, Reranker};
pub use crate::stub::StubEmbedder;
