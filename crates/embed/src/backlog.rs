//! The embedding backlog processor.
//!
//! Drains chunks that have no vector for the active model, in batches,
//! behind a monotonic `(mirror_hash, seq)` cursor. The cursor advances to
//! the last item of every fetched batch *even when the batch fails*, so a
//! poisonous row costs one batch of errors, not an infinite loop. The
//! cursor lives on the processor instance; a fresh processor starts from
//! the beginning of the backlog.
//!
//! The side-index is synced at most once, at the end, and only when a
//! write left it dirty. A sync failure is reported in the result without
//! invalidating the embeddings that were stored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use store::{Store, VectorInput};

use crate::error::{EmbedError, EmbedErrorKind};
use crate::ports::Embedder;

/// Processor tuning.
#[derive(Debug, Clone)]
pub struct BacklogOptions {
    pub batch_size: usize,
}

impl Default for BacklogOptions {
    fn default() -> Self {
        Self { batch_size: 32 }
    }
}

/// Outcome of one [`BacklogProcessor::run`]. Serialized as-is by
/// front-ends that render the run as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogReport {
    pub embedded: usize,
    pub errors: usize,
    /// Set when the final side-index sync failed; the dirty flag stays
    /// set for a later sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

/// See the module docs.
pub struct BacklogProcessor {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    options: BacklogOptions,
    cursor: Option<(String, u32)>,
}

impl BacklogProcessor {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>, options: BacklogOptions) -> Self {
        Self {
            store,
            embedder,
            options,
            cursor: None,
        }
    }

    /// Where the cursor currently points (last item of the last fetched
    /// batch).
    pub fn cursor(&self) -> Option<&(String, u32)> {
        self.cursor.as_ref()
    }

    /// Restart from the beginning of the backlog.
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    /// Drain the backlog from the current cursor position.
    ///
    /// `cancel` is honored between batches, never mid-batch. Store-level
    /// failures fetching the backlog abort the run; embedding failures
    /// are counted and skipped.
    pub async fn run(&mut self, cancel: Option<&AtomicBool>) -> Result<BacklogReport, EmbedError> {
        let model = self.embedder.model_uri().to_string();
        if model != self.store.vec_index().model() {
            return Err(EmbedError::validation(format!(
                "embedder model '{model}' does not match store vector model '{}'",
                self.store.vec_index().model()
            )));
        }
        if self.embedder.dimensions() != self.store.vec_index().dimensions() {
            return Err(EmbedError::validation(format!(
                "embedder dimensions {} do not match store vector dimensions {}",
                self.embedder.dimensions(),
                self.store.vec_index().dimensions()
            )));
        }
        let batch_size = self.options.batch_size.max(1);

        let mut report = BacklogReport::default();
        loop {
            if cancel.map(|c| c.load(Ordering::Acquire)).unwrap_or(false) {
                tracing::info!("backlog processing cancelled between batches");
                break;
            }

            let batch = self
                .store
                .get_backlog(&model, batch_size, self.cursor.as_ref())
                .map_err(|e| EmbedError {
                    kind: EmbedErrorKind::Runtime,
                    message: format!("backlog fetch failed: {e}"),
                })?;
            if batch.is_empty() {
                break;
            }

            // Advance before attempting the batch: progress is
            // guaranteed even when everything below fails.
            let last = &batch[batch.len() - 1];
            self.cursor = Some((last.mirror_hash.clone(), last.seq));

            let texts: Vec<String> = batch
                .iter()
                .map(|item| match &item.title {
                    Some(title) => format!("{title}\n\n{}", item.text),
                    None => item.text.clone(),
                })
                .collect();

            let vectors = match self.embedder.embed_batch(&texts).await {
                Ok(vectors) => vectors,
                Err(err) => {
                    tracing::warn!(error = %err, batch = batch.len(), "embed batch failed");
                    report.errors += batch.len();
                    continue;
                }
            };
            if vectors.len() != batch.len() {
                tracing::warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "embed batch returned wrong count"
                );
                report.errors += batch.len();
                continue;
            }

            let inputs: Vec<VectorInput> = batch
                .iter()
                .zip(vectors)
                .map(|(item, vector)| VectorInput {
                    mirror_hash: item.mirror_hash.clone(),
                    seq: item.seq,
                    vector,
                })
                .collect();
            match self.store.upsert_vectors(&inputs) {
                Ok(result) => report.embedded += result.stored,
                Err(err) => {
                    tracing::warn!(error = %err, "vector upsert failed");
                    report.errors += batch.len();
                }
            }
        }

        if self.store.vec_index().search_available() && self.store.vec_index().is_dirty() {
            if let Err(err) = self.store.sync_vec_index() {
                tracing::warn!(error = %err, "side-index sync failed; dirty flag left set");
                report.sync_error = Some(err.to_string());
            }
        }

        tracing::debug!(
            embedded = report.embedded,
            errors = report.errors,
            synced = report.sync_error.is_none(),
            "backlog run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use store::{ChunkRecord, DocumentInput, FtsTokenizer, StoreOptions, VecIndexOptions};

    const DIMS: usize = 4;

    fn temp_store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(
            dir.path().join("gno.redb"),
            StoreOptions::new(FtsTokenizer::Unicode61, VecIndexOptions::new("mock", DIMS)),
        )
        .unwrap();
        (dir, Arc::new(store))
    }

    fn seed(store: &Store, rel_path: &str, texts: &[&str]) -> String {
        let markdown = canonical::canonicalize(&texts.join("\n\n"));
        let mirror = canonical::mirror_hash(&markdown);
        store.upsert_content(&mirror, &markdown).unwrap();
        let chunks: Vec<ChunkRecord> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord {
                seq: i as u32,
                pos: 0,
                text: text.to_string(),
                start_line: 1,
                end_line: 1,
                language: None,
                token_count: None,
            })
            .collect();
        store.put_chunks(&mirror, &chunks).unwrap();
        store
            .upsert_document(DocumentInput {
                collection: "notes".into(),
                rel_path: rel_path.into(),
                source_hash: canonical::mirror_hash_bytes(rel_path.as_bytes()),
                source_mime: "text/markdown".into(),
                source_ext: "md".into(),
                source_size: 1,
                source_mtime: None,
                mirror_hash: Some(mirror.clone()),
                title: Some("Doc Title".into()),
                converter_id: None,
                converter_version: None,
                language_hint: None,
            })
            .unwrap();
        mirror
    }

    /// Fails the first `fail_batches` calls, succeeds afterwards.
    struct FlakyEmbedder {
        calls: AtomicUsize,
        fail_batches: usize,
    }

    impl FlakyEmbedder {
        fn new(fail_batches: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_batches,
            }
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_uri(&self) -> &str {
            "mock"
        }
        fn dimensions(&self) -> usize {
            DIMS
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_batches {
                return Err(EmbedError::runtime("model backend unavailable"));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    /// Returns the wrong number of vectors.
    struct MiscountingEmbedder;

    #[async_trait]
    impl Embedder for MiscountingEmbedder {
        fn model_uri(&self) -> &str {
            "mock"
        }
        fn dimensions(&self) -> usize {
            DIMS
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn drains_backlog_and_reports_embedded() {
        let (_dir, store) = temp_store();
        seed(&store, "a.md", &["one text", "two text", "three text"]);

        let mut processor = BacklogProcessor::new(
            store.clone(),
            Arc::new(FlakyEmbedder::new(0)),
            BacklogOptions { batch_size: 2 },
        );
        let report = processor.run(None).await.unwrap();
        assert_eq!(report.embedded, 3);
        assert_eq!(report.errors, 0);
        assert_eq!(report.sync_error, None);
        assert_eq!(store.get_backlog("mock", 10, None).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn failed_batch_advances_cursor_and_counts_errors() {
        let (_dir, store) = temp_store();
        seed(&store, "a.md", &["one", "two", "three"]);

        let mut processor = BacklogProcessor::new(
            store.clone(),
            Arc::new(FlakyEmbedder::new(1)),
            BacklogOptions { batch_size: 32 },
        );

        // First run: the only batch fails; cursor ends past all three.
        let report = processor.run(None).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.errors, 3);
        assert_eq!(report.sync_error, None);
        assert!(processor.cursor().is_some());

        // Second run on the same processor: nothing after the cursor.
        let report = processor.run(None).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.errors, 0);

        // After a cursor reset the items are retried and now succeed.
        processor.reset_cursor();
        let report = processor.run(None).await.unwrap();
        assert_eq!(report.embedded, 3);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn count_mismatch_fails_whole_batch() {
        let (_dir, store) = temp_store();
        seed(&store, "a.md", &["one", "two"]);

        let mut processor = BacklogProcessor::new(
            store.clone(),
            Arc::new(MiscountingEmbedder),
            BacklogOptions::default(),
        );
        let report = processor.run(None).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.errors, 2);
    }

    #[tokio::test]
    async fn contextual_formatting_prefixes_title() {
        let (_dir, store) = temp_store();
        seed(&store, "a.md", &["body text"]);

        struct CapturingEmbedder(std::sync::Mutex<Vec<String>>);

        #[async_trait]
        impl Embedder for CapturingEmbedder {
            fn model_uri(&self) -> &str {
                "mock"
            }
            fn dimensions(&self) -> usize {
                DIMS
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
                Ok(vec![1.0, 0.0, 0.0, 0.0])
            }
            async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
                self.0.lock().unwrap().extend(texts.iter().cloned());
                Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
            }
        }

        let capturing = Arc::new(CapturingEmbedder(std::sync::Mutex::new(Vec::new())));
        let mut processor =
            BacklogProcessor::new(store.clone(), capturing.clone(), BacklogOptions::default());
        processor.run(None).await.unwrap();

        let seen = capturing.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], "Doc Title\n\nbody text");
    }

    #[tokio::test]
    async fn model_mismatch_is_validation() {
        let (_dir, store) = temp_store();
        let embedder = Arc::new(StubLike);

        struct StubLike;
        #[async_trait]
        impl Embedder for StubLike {
            fn model_uri(&self) -> &str {
                "different-model"
            }
            fn dimensions(&self) -> usize {
                DIMS
            }
            async fn embed(&self, _t: &str) -> Result<Vec<f32>, EmbedError> {
                Ok(vec![0.0; DIMS])
            }
            async fn embed_batch(&self, t: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
                Ok(t.iter().map(|_| vec![0.0; DIMS]).collect())
            }
        }

        let mut processor = BacklogProcessor::new(store, embedder, BacklogOptions::default());
        let err = processor.run(None).await.unwrap_err();
        assert_eq!(err.kind, EmbedErrorKind::Validation);
    }

    #[tokio::test]
    async fn cancellation_stops_between_batches() {
        let (_dir, store) = temp_store();
        seed(&store, "a.md", &["one", "two", "three", "four"]);

        let cancel = AtomicBool::new(true);
        let mut processor = BacklogProcessor::new(
            store.clone(),
            Arc::new(FlakyEmbedder::new(0)),
            BacklogOptions { batch_size: 1 },
        );
        let report = processor.run(Some(&cancel)).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(store.get_backlog("mock", 10, None).unwrap().len(), 4);
    }
}
