//! End-to-end pipeline tests: ingest → embed → search → graph, against a
//! real on-disk store and the deterministic stub embedder.

use std::sync::Arc;

use async_trait::async_trait;
use gno::{
    EmbedError, Engine, EngineConfig, Generator, HybridOptions, ModelPorts, ModelPreset, Reranker,
    SearchOptions, SimilarOptions, StubEmbedder,
};

const DIMS: usize = 32;

struct JsonGenerator;

#[async_trait]
impl Generator for JsonGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, EmbedError> {
        // A well-behaved expander output for whatever query is embedded
        // in the prompt.
        let _ = prompt;
        Ok(r#"{"lexical": ["ownership"], "vector": ["how does ownership work"], "hyde": "Ownership moves values between bindings."}"#.to_string())
    }
}

struct UniformReranker;

#[async_trait]
impl Reranker for UniformReranker {
    async fn rerank(&self, _query: &str, candidates: &[String]) -> Result<Vec<f32>, EmbedError> {
        Ok(candidates.iter().map(|_| 0.5).collect())
    }
}

fn test_config(root: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::rooted_at(root);
    config.model = ModelPreset {
        model_uri: "stub:sha256".into(),
        dimensions: DIMS,
    };
    config
}

async fn open_engine(root: &std::path::Path) -> Engine {
    let ports = ModelPorts {
        embedder: Some(Arc::new(StubEmbedder::new(DIMS))),
        reranker: Some(Arc::new(UniformReranker)),
        generator: Some(Arc::new(JsonGenerator)),
    };
    Engine::open(test_config(root), ports).await.unwrap()
}

#[tokio::test]
async fn ingest_embed_query_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path()).await;

    let doc = engine
        .ingest(
            "notes",
            "rust/ownership.md",
            b"# Ownership\n\nOwnership is Rust's memory model.\n\nSee [[Borrowing]].\n".to_vec(),
            None,
        )
        .await
        .unwrap();
    assert!(doc.active);
    assert_eq!(doc.title.as_deref(), Some("Ownership"));
    assert_eq!(doc.uri, "gno://notes/rust/ownership.md");
    assert!(doc.mirror_hash.is_some());

    engine
        .ingest(
            "notes",
            "rust/borrowing.md",
            b"# Borrowing\n\nReferences borrow values without taking ownership.\n".to_vec(),
            None,
        )
        .await
        .unwrap();

    let report = engine.embed_backlog(None).await.unwrap();
    assert!(report.embedded >= 2);
    assert_eq!(report.errors, 0);
    assert_eq!(report.sync_error, None);

    // Lexical only.
    let results = engine
        .search_bm25("ownership", &SearchOptions { limit: 5, ..Default::default() })
        .unwrap();
    assert!(!results.is_empty());
    assert!(results[0].docid.starts_with('#'));
    assert!((0.0..=1.0).contains(&results[0].score));
    assert!(results[0].snippet.to_lowercase().contains("ownership"));

    // Vector only.
    let results = engine
        .search_vector("ownership model", &SearchOptions { limit: 5, ..Default::default() })
        .await
        .unwrap();
    assert!(!results.is_empty());

    // Full hybrid with expansion and reranking.
    let results = engine
        .query("ownership", &HybridOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].source.ext, "md");
    for result in &results {
        assert!((0.0..=1.0).contains(&result.score));
    }
}

#[tokio::test]
async fn links_backlinks_and_similar() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path()).await;

    let hub = engine
        .ingest("notes", "hub.md", b"# Hub\n\nCentral page.\n".to_vec(), None)
        .await
        .unwrap();
    let spoke = engine
        .ingest(
            "notes",
            "spoke.md",
            b"# Spoke\n\nBack to [[Hub]] and out to [docs](guide.md).\n".to_vec(),
            None,
        )
        .await
        .unwrap();
    engine
        .ingest(
            "notes",
            "similar-hub.md",
            b"# Hub Copy\n\nCentral page.\n\nAlmost identical body text.\n".to_vec(),
            None,
        )
        .await
        .unwrap();
    engine.embed_backlog(None).await.unwrap();

    // Outgoing links of the spoke, then filtered to wiki only.
    let (_, all_links) = engine.get_links(&spoke.docid, None).unwrap();
    assert_eq!(all_links.len(), 2);
    let (_, wiki) = engine.get_links(&spoke.docid, Some("wiki")).unwrap();
    assert_eq!(wiki.len(), 1);
    assert_eq!(wiki[0].link.target_ref, "Hub");
    assert!(wiki[0].resolved);

    // Backlinks of the hub point at the spoke.
    let (_, backlinks) = engine.get_backlinks(&hub.docid).unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].source_docid, spoke.docid);

    // Similarity over stub embeddings with a permissive threshold: the
    // query document itself never appears.
    let (_, similar) = engine
        .get_similar(
            &hub.docid,
            &SimilarOptions {
                limit: 3,
                threshold: 0.0,
                cross_collection: false,
            },
        )
        .unwrap();
    assert!(similar.iter().all(|s| s.doc.docid != hub.docid));
}

#[tokio::test]
async fn reingest_unchanged_is_idempotent_and_docid_stable() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path()).await;
    let bytes = b"# Stable\n\nSame bytes every time.\n".to_vec();

    let first = engine
        .ingest("notes", "stable.md", bytes.clone(), None)
        .await
        .unwrap();
    let second = engine
        .ingest("notes", "stable.md", bytes.clone(), None)
        .await
        .unwrap();
    assert_eq!(first.docid, second.docid);
    assert_eq!(first.id, second.id);
    assert_eq!(first.updated_at, second.updated_at);

    // Changed bytes re-convert and replace chunks; identity is kept.
    let third = engine
        .ingest("notes", "stable.md", b"# Stable\n\nEdited body.\n".to_vec(), None)
        .await
        .unwrap();
    assert_eq!(first.docid, third.docid);
    assert_ne!(first.mirror_hash, third.mirror_hash);

    let results = engine
        .search_bm25("edited", &SearchOptions { limit: 5, ..Default::default() })
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn remove_then_cleanup_deep_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path()).await;

    engine
        .ingest("notes", "gone.md", b"# Gone\n\nDisposable text.\n".to_vec(), None)
        .await
        .unwrap();
    engine.embed_backlog(None).await.unwrap();

    let removed = engine.remove("notes", "gone.md").unwrap();
    assert!(!removed.active);

    // Tombstoned documents stop matching immediately.
    let results = engine
        .search_bm25("disposable", &SearchOptions { limit: 5, ..Default::default() })
        .unwrap();
    assert!(results.is_empty());

    let report = engine.cleanup_orphans().unwrap();
    assert_eq!(report.documents_removed, 1);
    assert_eq!(report.content_removed, 1);
    assert!(report.vectors_removed >= 1);

    let again = engine.cleanup_orphans().unwrap();
    assert_eq!(again.documents_removed, 0);
    assert_eq!(again.content_removed, 0);
}

#[tokio::test]
async fn shared_content_deduplicates_by_mirror_hash() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open_engine(dir.path()).await;

    let body = b"# Same\n\nIdentical canonical text.\n".to_vec();
    let a = engine.ingest("notes", "a.md", body.clone(), None).await.unwrap();
    let b = engine.ingest("notes", "b.md", body, None).await.unwrap();

    assert_ne!(a.docid, b.docid);
    assert_eq!(a.mirror_hash, b.mirror_hash);
}

#[tokio::test]
async fn restart_preserves_index_and_reconciles_vectors() {
    let dir = tempfile::tempdir().unwrap();
    {
        let engine = open_engine(dir.path()).await;
        engine
            .ingest("notes", "keep.md", b"# Keep\n\nPersistent text.\n".to_vec(), None)
            .await
            .unwrap();
        engine.embed_backlog(None).await.unwrap();
    }

    // A fresh engine over the same data directory sees everything and
    // reloads the vector side-index from the durable table.
    let engine = open_engine(dir.path()).await;
    let results = engine
        .search_bm25("persistent", &SearchOptions { limit: 5, ..Default::default() })
        .unwrap();
    assert_eq!(results.len(), 1);

    let results = engine
        .search_vector("persistent text", &SearchOptions { limit: 5, ..Default::default() })
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(!engine.store().needs_vec_sync().unwrap());
}
