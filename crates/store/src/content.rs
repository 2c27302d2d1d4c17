//! Content, chunk, and full-text operations.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable, ReadableTableMetadata};

use crate::error::{StoreError, StoreResult};
use crate::fts::{bm25_term, FtsTokenizer};
use crate::store::{decode_row, encode_row, u64_from_bytes, Store};
use crate::tables::{self, meta_keys, str_successor};
use crate::types::{ChunkLookup, ChunkRecord, ContentRow, FtsHit, FtsSearchOptions};

impl Store {
    /// Insert canonical markdown under its mirror hash. Idempotent: an
    /// existing row is left untouched.
    pub fn upsert_content(&self, mirror_hash: &str, markdown: &str) -> StoreResult<()> {
        if canonical::mirror_hash(markdown) != mirror_hash {
            return Err(StoreError::Validation(format!(
                "markdown does not hash to {mirror_hash}"
            )));
        }

        let txn = self.db.begin_write()?;
        {
            let mut content = txn.open_table(tables::CONTENT)?;
            if content.get(mirror_hash)?.is_none() {
                let row = ContentRow {
                    markdown: markdown.to_string(),
                    created_at: Utc::now(),
                };
                content.insert(mirror_hash, encode_row(&row)?.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_content(&self, mirror_hash: &str) -> StoreResult<Option<ContentRow>> {
        let txn = self.db.begin_read()?;
        let content = txn.open_table(tables::CONTENT)?;
        match content.get(mirror_hash)? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Replace all chunks (and their full-text rows) for a mirror hash in
    /// one transaction.
    pub fn put_chunks(&self, mirror_hash: &str, chunks: &[ChunkRecord]) -> StoreResult<()> {
        for (index, chunk) in chunks.iter().enumerate() {
            if chunk.seq != index as u32 {
                return Err(StoreError::Validation(format!(
                    "chunk seq {} at position {index} is not contiguous from 0",
                    chunk.seq
                )));
            }
        }

        let tokenizer = self.tokenizer;
        let txn = self.db.begin_write()?;
        {
            let mut chunk_table = txn.open_table(tables::CHUNKS)?;
            let mut postings = txn.open_table(tables::FTS_POSTINGS)?;
            let mut fts_chunks = txn.open_table(tables::FTS_CHUNKS)?;
            let mut meta = txn.open_table(tables::META)?;

            let mut total_tokens = Store::meta_counter(&meta, meta_keys::FTS_TOTAL_TOKENS)?;

            // Drop the previous generation, postings included. The old
            // chunk text is re-tokenized to find its posting keys.
            let upper = str_successor(mirror_hash);
            let mut old: Vec<ChunkRecord> = Vec::new();
            for item in chunk_table.range((mirror_hash, 0u32)..(upper.as_str(), 0u32))? {
                let (_, value) = item?;
                old.push(decode_row(value.value())?);
            }
            for record in &old {
                chunk_table.remove((mirror_hash, record.seq))?;
                for (term, _) in term_frequencies(tokenizer, &record.text) {
                    postings.remove((term.as_str(), mirror_hash, record.seq))?;
                }
                if let Some(guard) = fts_chunks.remove((mirror_hash, record.seq))? {
                    total_tokens = total_tokens.saturating_sub(guard.value() as u64);
                }
            }

            for record in chunks {
                chunk_table.insert(
                    (mirror_hash, record.seq),
                    encode_row(record)?.as_slice(),
                )?;
                let frequencies = term_frequencies(tokenizer, &record.text);
                let length: u32 = frequencies.values().sum();
                for (term, tf) in &frequencies {
                    postings.insert((term.as_str(), mirror_hash, record.seq), *tf)?;
                }
                fts_chunks.insert((mirror_hash, record.seq), length)?;
                total_tokens += length as u64;
            }

            meta.insert(
                meta_keys::FTS_TOTAL_TOKENS,
                total_tokens.to_le_bytes().as_slice(),
            )?;
        }
        txn.commit()?;
        tracing::debug!(mirror = mirror_hash, chunks = chunks.len(), "chunks replaced");
        Ok(())
    }

    pub fn get_chunks(&self, mirror_hash: &str) -> StoreResult<Vec<ChunkRecord>> {
        let txn = self.db.begin_read()?;
        let chunk_table = txn.open_table(tables::CHUNKS)?;
        let upper = str_successor(mirror_hash);
        let mut chunks = Vec::new();
        for item in chunk_table.range((mirror_hash, 0u32)..(upper.as_str(), 0u32))? {
            let (_, value) = item?;
            chunks.push(decode_row(value.value())?);
        }
        Ok(chunks)
    }

    /// Fetch chunks for many hashes in one read pass. Callers index into
    /// the returned [`ChunkLookup`] instead of issuing per-hash fetches.
    pub fn get_chunks_batch(&self, mirror_hashes: &[String]) -> StoreResult<ChunkLookup> {
        let unique: BTreeSet<&String> = mirror_hashes.iter().collect();
        let txn = self.db.begin_read()?;
        let chunk_table = txn.open_table(tables::CHUNKS)?;

        let mut by_hash: HashMap<String, Vec<ChunkRecord>> = HashMap::with_capacity(unique.len());
        for hash in unique {
            let upper = str_successor(hash);
            let mut chunks = Vec::new();
            for item in chunk_table.range((hash.as_str(), 0u32)..(upper.as_str(), 0u32))? {
                let (_, value) = item?;
                chunks.push(decode_row(value.value())?);
            }
            if !chunks.is_empty() {
                by_hash.insert(hash.clone(), chunks);
            }
        }
        Ok(ChunkLookup::new(by_hash))
    }

    /// BM25 full-text search over chunks.
    ///
    /// Scores follow the store convention: negated BM25, so more negative
    /// is better and results come back sorted ascending. Ties are broken
    /// by `(mirror_hash, seq)` so ranking is stable under re-issue.
    pub fn search_fts(&self, query: &str, options: &FtsSearchOptions) -> StoreResult<Vec<FtsHit>> {
        let terms: BTreeSet<String> = self.tokenizer.tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read()?;
        let postings = txn.open_table(tables::FTS_POSTINGS)?;
        let fts_chunks = txn.open_table(tables::FTS_CHUNKS)?;
        let meta = txn.open_table(tables::META)?;
        let content_docs = txn.open_table(tables::CONTENT_DOCS)?;
        let documents = txn.open_table(tables::DOCUMENTS)?;

        let n_docs = fts_chunks.len()?;
        if n_docs == 0 {
            return Ok(Vec::new());
        }
        let total_tokens = match meta.get(meta_keys::FTS_TOTAL_TOKENS)? {
            Some(guard) => u64_from_bytes(guard.value())?,
            None => 0,
        };
        let avg_len = total_tokens as f64 / n_docs as f64;

        // Accumulate per-chunk BM25 across query terms.
        let mut scores: BTreeMap<(String, u32), f64> = BTreeMap::new();
        for term in &terms {
            let upper = str_successor(term);
            let mut term_postings: Vec<(String, u32, u32)> = Vec::new();
            for item in postings.range((term.as_str(), "", 0u32)..(upper.as_str(), "", 0u32))? {
                let (key, tf) = item?;
                let (_, hash, seq) = key.value();
                term_postings.push((hash.to_string(), seq, tf.value()));
            }
            let df = term_postings.len() as u64;
            for (hash, seq, tf) in term_postings {
                let doc_len = match fts_chunks.get((hash.as_str(), seq))? {
                    Some(guard) => guard.value(),
                    None => continue,
                };
                *scores.entry((hash, seq)).or_insert(0.0) +=
                    bm25_term(tf, df, n_docs, doc_len, avg_len);
            }
        }

        // Negate, order ascending (best first), stable tie-break on key.
        let mut ranked: Vec<((String, u32), f64)> =
            scores.into_iter().map(|(key, s)| (key, -s)).collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let collection = options.collection.as_deref();
        let limit = if options.limit == 0 { usize::MAX } else { options.limit };
        let mut hits = Vec::new();
        let mut doc_cache: HashMap<String, Option<crate::types::DocumentRow>> = HashMap::new();
        for ((hash, seq), score) in ranked {
            if hits.len() >= limit {
                break;
            }
            let doc = match doc_cache.get(&hash) {
                Some(cached) => cached.clone(),
                None => {
                    let found = Store::document_for_mirror_tx(
                        &content_docs,
                        &documents,
                        &hash,
                        collection,
                    )?;
                    doc_cache.insert(hash.clone(), found.clone());
                    found
                }
            };
            let Some(doc) = doc else { continue };
            hits.push(FtsHit {
                mirror_hash: hash,
                seq,
                score,
                docid: doc.docid,
                uri: doc.uri,
                title: doc.title,
                collection: doc.collection,
                rel_path: doc.rel_path,
            });
        }
        Ok(hits)
    }

    /// Re-tokenize every stored chunk with the tokenizer requested at open
    /// time and persist it. Clears `needs_fts_rebuild`.
    pub fn rebuild_fts(&self) -> StoreResult<()> {
        let tokenizer = self.tokenizer;
        let txn = self.db.begin_write()?;
        {
            txn.delete_table(tables::FTS_POSTINGS)?;
            txn.delete_table(tables::FTS_CHUNKS)?;
            let mut postings = txn.open_table(tables::FTS_POSTINGS)?;
            let mut fts_chunks = txn.open_table(tables::FTS_CHUNKS)?;
            let chunk_table = txn.open_table(tables::CHUNKS)?;
            let mut meta = txn.open_table(tables::META)?;

            let mut total_tokens = 0u64;
            for item in chunk_table.range::<(&str, u32)>(..)? {
                let (key, value) = item?;
                let (hash, seq) = key.value();
                let record: ChunkRecord = decode_row(value.value())?;
                let frequencies = term_frequencies(tokenizer, &record.text);
                let length: u32 = frequencies.values().sum();
                for (term, tf) in &frequencies {
                    postings.insert((term.as_str(), hash, seq), *tf)?;
                }
                fts_chunks.insert((hash, seq), length)?;
                total_tokens += length as u64;
            }
            meta.insert(
                meta_keys::FTS_TOTAL_TOKENS,
                total_tokens.to_le_bytes().as_slice(),
            )?;
            meta.insert(meta_keys::FTS_TOKENIZER, tokenizer.as_str().as_bytes())?;
        }
        txn.commit()?;
        self.set_persisted_tokenizer(tokenizer);
        tracing::info!(tokenizer = tokenizer.as_str(), "full-text index rebuilt");
        Ok(())
    }
}

/// Term → frequency for one chunk text.
pub(crate) fn term_frequencies(tokenizer: FtsTokenizer, text: &str) -> BTreeMap<String, u32> {
    let mut frequencies = BTreeMap::new();
    for token in tokenizer.tokenize(text) {
        *frequencies.entry(token).or_insert(0) += 1;
    }
    frequencies
}
