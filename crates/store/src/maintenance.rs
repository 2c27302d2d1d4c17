//! The ingest-error journal and referential cleanup.

use std::collections::HashSet;

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};

use crate::content::term_frequencies;
use crate::error::StoreResult;
use crate::store::{decode_row, encode_row, Store};
use crate::tables::{self, meta_keys};
use crate::types::{document_key, ChunkRecord, CleanupReport, DocumentRow, IngestErrorRow};
use crate::vec::VecKey;

impl Store {
    /// Append one diagnostic row. The journal is append-only; rows are
    /// never updated or replaced.
    pub fn record_ingest_error(
        &self,
        collection: &str,
        rel_path: &str,
        code: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> StoreResult<()> {
        let row = IngestErrorRow {
            collection: collection.to_string(),
            rel_path: rel_path.to_string(),
            occurred_at: Utc::now(),
            code: code.to_string(),
            message: message.to_string(),
            details_json: details
                .map(|d| d.to_string())
                .unwrap_or_else(|| "null".to_string()),
        };
        let key = document_key(collection, rel_path);

        let txn = self.db.begin_write()?;
        {
            let mut errors = txn.open_table(tables::INGEST_ERRORS)?;
            let mut meta = txn.open_table(tables::META)?;
            let seq = Store::meta_counter(&meta, meta_keys::INGEST_ERROR_SEQ)? + 1;
            meta.insert(meta_keys::INGEST_ERROR_SEQ, seq.to_le_bytes().as_slice())?;
            errors.insert((key.as_str(), seq), encode_row(&row)?.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Journal rows, oldest first, optionally scoped to a collection.
    pub fn get_ingest_errors(&self, collection: Option<&str>) -> StoreResult<Vec<IngestErrorRow>> {
        let txn = self.db.begin_read()?;
        let errors = txn.open_table(tables::INGEST_ERRORS)?;
        let mut rows: Vec<(u64, IngestErrorRow)> = Vec::new();
        for item in errors.range::<(&str, u64)>(..)? {
            let (key, value) = item?;
            let (_, seq) = key.value();
            let row: IngestErrorRow = decode_row(value.value())?;
            if collection.map(|c| row.collection == c).unwrap_or(true) {
                rows.push((seq, row));
            }
        }
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    /// Remove everything unreachable: tombstoned documents (deep
    /// removal), content with no referring document, chunks of removed
    /// content, vectors without a chunk, and full-text rows without a
    /// chunk. Runs in a single transaction and is reentrant: a second
    /// run on a clean store removes nothing.
    pub fn cleanup_orphans(&self) -> StoreResult<CleanupReport> {
        let tokenizer = self.tokenizer;
        let mut report = CleanupReport::default();
        let mut side_removals: Vec<VecKey> = Vec::new();

        let txn = self.db.begin_write()?;
        {
            let mut documents = txn.open_table(tables::DOCUMENTS)?;
            let mut docids = txn.open_table(tables::DOCIDS)?;
            let mut content = txn.open_table(tables::CONTENT)?;
            let mut content_docs = txn.open_table(tables::CONTENT_DOCS)?;
            let mut chunks = txn.open_table(tables::CHUNKS)?;
            let mut postings = txn.open_table(tables::FTS_POSTINGS)?;
            let mut fts_chunks = txn.open_table(tables::FTS_CHUNKS)?;
            let mut vectors = txn.open_table(tables::VECTORS)?;
            let mut link_table = txn.open_table(tables::LINKS)?;
            let mut link_norms = txn.open_table(tables::LINK_NORMS)?;
            let mut meta = txn.open_table(tables::META)?;

            // Pass 1: deep-remove tombstoned documents and their link
            // rows and reverse mappings.
            let mut dead_docs: Vec<(String, DocumentRow)> = Vec::new();
            for item in documents.range::<&str>(..)? {
                let (key, value) = item?;
                let row: DocumentRow = decode_row(value.value())?;
                if !row.active {
                    dead_docs.push((key.value().to_string(), row));
                }
            }
            for (key, row) in &dead_docs {
                documents.remove(key.as_str())?;
                docids.remove(row.docid.as_str())?;
                if let Some(mirror) = &row.mirror_hash {
                    content_docs.remove((mirror.as_str(), key.as_str()))?;
                }
                let mut dead_links: Vec<(u32, String)> = Vec::new();
                let upper = tables::str_successor(&row.docid);
                for item in link_table.range((row.docid.as_str(), 0u32)..(upper.as_str(), 0u32))? {
                    let (link_key, value) = item?;
                    let (_, ordinal) = link_key.value();
                    let link: links::ExtractedLink = decode_row(value.value())?;
                    dead_links.push((ordinal, link.target_ref_norm));
                }
                for (ordinal, norm) in dead_links {
                    link_table.remove((row.docid.as_str(), ordinal))?;
                    link_norms.remove((norm.as_str(), row.docid.as_str(), ordinal))?;
                }
            }
            report.documents_removed = dead_docs.len();

            // Pass 2: content with no referring document, plus its
            // chunks and their full-text rows.
            let mut total_tokens = Store::meta_counter(&meta, meta_keys::FTS_TOTAL_TOKENS)?;
            let mut dead_content: Vec<String> = Vec::new();
            for item in content.range::<&str>(..)? {
                let (key, _) = item?;
                let mirror = key.value().to_string();
                let upper = tables::str_successor(&mirror);
                let referenced = content_docs
                    .range((mirror.as_str(), "")..(upper.as_str(), ""))?
                    .next()
                    .is_some();
                if !referenced {
                    dead_content.push(mirror);
                }
            }
            for mirror in &dead_content {
                content.remove(mirror.as_str())?;
                let upper = tables::str_successor(mirror);
                let mut dead_chunks: Vec<ChunkRecord> = Vec::new();
                for item in chunks.range((mirror.as_str(), 0u32)..(upper.as_str(), 0u32))? {
                    let (_, value) = item?;
                    dead_chunks.push(decode_row(value.value())?);
                }
                for record in dead_chunks {
                    chunks.remove((mirror.as_str(), record.seq))?;
                    report.chunks_removed += 1;
                    for (term, _) in term_frequencies(tokenizer, &record.text) {
                        if postings.remove((term.as_str(), mirror.as_str(), record.seq))?.is_some() {
                            report.fts_rows_removed += 1;
                        }
                    }
                    if let Some(guard) = fts_chunks.remove((mirror.as_str(), record.seq))? {
                        total_tokens = total_tokens.saturating_sub(guard.value() as u64);
                        report.fts_rows_removed += 1;
                    }
                }
            }
            report.content_removed = dead_content.len();

            // Pass 3: vectors whose chunk is gone.
            let mut live_chunks: HashSet<(String, u32)> = HashSet::new();
            for item in chunks.range::<(&str, u32)>(..)? {
                let (key, _) = item?;
                let (hash, seq) = key.value();
                live_chunks.insert((hash.to_string(), seq));
            }
            let mut dead_vectors: Vec<(String, u32, String)> = Vec::new();
            for item in vectors.range::<(&str, u32, &str)>(..)? {
                let (key, _) = item?;
                let (hash, seq, model) = key.value();
                if !live_chunks.contains(&(hash.to_string(), seq)) {
                    dead_vectors.push((hash.to_string(), seq, model.to_string()));
                }
            }
            for (hash, seq, model) in &dead_vectors {
                vectors.remove((hash.as_str(), *seq, model.as_str()))?;
                if model == self.vec.model() {
                    side_removals.push((hash.clone(), *seq));
                }
            }
            report.vectors_removed = dead_vectors.len();

            // Pass 4: stray full-text rows without a chunk (covers rows
            // missed by pass 2, e.g. after a partial external mutation).
            let mut dead_fts: Vec<(String, u32)> = Vec::new();
            for item in fts_chunks.range::<(&str, u32)>(..)? {
                let (key, _) = item?;
                let (hash, seq) = key.value();
                if !live_chunks.contains(&(hash.to_string(), seq)) {
                    dead_fts.push((hash.to_string(), seq));
                }
            }
            for (hash, seq) in &dead_fts {
                if let Some(guard) = fts_chunks.remove((hash.as_str(), *seq))? {
                    total_tokens = total_tokens.saturating_sub(guard.value() as u64);
                    report.fts_rows_removed += 1;
                }
            }
            let mut dead_postings: Vec<(String, String, u32)> = Vec::new();
            for item in postings.range::<(&str, &str, u32)>(..)? {
                let (key, _) = item?;
                let (term, hash, seq) = key.value();
                if !live_chunks.contains(&(hash.to_string(), seq)) {
                    dead_postings.push((term.to_string(), hash.to_string(), seq));
                }
            }
            for (term, hash, seq) in &dead_postings {
                postings.remove((term.as_str(), hash.as_str(), *seq))?;
                report.fts_rows_removed += 1;
            }

            meta.insert(
                meta_keys::FTS_TOTAL_TOKENS,
                total_tokens.to_le_bytes().as_slice(),
            )?;
        }
        txn.commit()?;

        if self.vec.search_available() {
            for key in &side_removals {
                self.vec.remove(key);
            }
        }

        tracing::info!(
            documents = report.documents_removed,
            content = report.content_removed,
            chunks = report.chunks_removed,
            vectors = report.vectors_removed,
            fts_rows = report.fts_rows_removed,
            "orphan cleanup finished"
        );
        Ok(report)
    }
}
