//! Vector operations: durable table writes, side-index mirroring,
//! reconciliation, nearest-neighbor search, and the embedding backlog.

use std::collections::{HashMap, HashSet};
use std::ops::Bound;

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};

use crate::error::{StoreError, StoreResult};
use crate::store::{decode_row, encode_row, Store};
use crate::tables::{self, str_successor};
use crate::types::{BacklogItem, NearestFilters, NearestHit, VectorInput, VectorRow, VectorUpsertReport};
use crate::vec::{decode_vector, encode_vector, l2_normalize, VecKey};

impl Store {
    /// Store embeddings for the active model.
    ///
    /// The durable write covers the whole batch in one transaction and is
    /// the source of truth. Side-index writes happen after the commit;
    /// any side failure sets the dirty flag (reconciled later by
    /// `sync_vec_index`) without rolling back the durable rows. Vectors
    /// are L2-normalized before storage so cosine distance holds.
    pub fn upsert_vectors(&self, inputs: &[VectorInput]) -> StoreResult<VectorUpsertReport> {
        let model = self.vec.model().to_string();
        let dimensions = self.vec.dimensions();
        for input in inputs {
            if input.vector.len() != dimensions {
                return Err(StoreError::Validation(format!(
                    "vector for ({}, {}) has {} dimensions, model '{model}' expects {dimensions}",
                    input.mirror_hash,
                    input.seq,
                    input.vector.len()
                )));
            }
        }

        let now = Utc::now();
        let mut normalized: Vec<(VecKey, Vec<f32>)> = Vec::with_capacity(inputs.len());
        let txn = self.db.begin_write()?;
        {
            let chunks = txn.open_table(tables::CHUNKS)?;
            let mut vectors = txn.open_table(tables::VECTORS)?;
            for input in inputs {
                if chunks.get((input.mirror_hash.as_str(), input.seq))?.is_none() {
                    return Err(StoreError::Validation(format!(
                        "no chunk ({}, {}) for vector upsert",
                        input.mirror_hash, input.seq
                    )));
                }
                let mut vector = input.vector.clone();
                l2_normalize(&mut vector);
                let row = VectorRow {
                    embedding: encode_vector(&vector),
                    embedded_at: now,
                };
                vectors.insert(
                    (input.mirror_hash.as_str(), input.seq, model.as_str()),
                    encode_row(&row)?.as_slice(),
                )?;
                normalized.push(((input.mirror_hash.clone(), input.seq), vector));
            }
        }
        txn.commit()?;

        let mut report = VectorUpsertReport {
            stored: normalized.len(),
            ..Default::default()
        };
        if self.vec.search_available() {
            for (key, vector) in normalized {
                match self.vec.upsert(key, vector) {
                    Ok(()) => report.side_index_ok += 1,
                    Err(err) => {
                        report.side_index_failed += 1;
                        tracing::warn!(error = %err, "vector side-index upsert failed");
                    }
                }
            }
            if report.side_index_failed > 0 {
                self.vec.mark_dirty();
            }
        }
        Ok(report)
    }

    /// Delete all vectors of one mirror hash for a model.
    pub fn delete_vectors_for_mirror(&self, mirror_hash: &str, model: &str) -> StoreResult<usize> {
        let txn = self.db.begin_write()?;
        let mut removed_keys: Vec<VecKey> = Vec::new();
        {
            let mut vectors = txn.open_table(tables::VECTORS)?;
            let upper = str_successor(mirror_hash);
            let mut keys: Vec<(String, u32, String)> = Vec::new();
            for item in vectors.range((mirror_hash, 0u32, "")..(upper.as_str(), 0u32, ""))? {
                let (key, _) = item?;
                let (hash, seq, row_model) = key.value();
                if row_model == model {
                    keys.push((hash.to_string(), seq, row_model.to_string()));
                }
            }
            for (hash, seq, row_model) in keys {
                vectors.remove((hash.as_str(), seq, row_model.as_str()))?;
                removed_keys.push((hash, seq));
            }
        }
        txn.commit()?;

        if self.vec.search_available() && model == self.vec.model() {
            for key in &removed_keys {
                self.vec.remove(key);
            }
        }
        Ok(removed_keys.len())
    }

    /// Cosine nearest neighbors from the side-index, ascending by
    /// distance. Fails with `VEC_UNAVAILABLE` when the side-index is not
    /// loaded; durable vector rows are unaffected by that condition.
    pub fn search_nearest(
        &self,
        query: &[f32],
        k: usize,
        filters: &NearestFilters,
    ) -> StoreResult<Vec<NearestHit>> {
        if !self.vec.search_available() {
            return Err(StoreError::VecUnavailable);
        }
        let fetch = if filters.collection.is_some() {
            k.saturating_mul(4).max(k + 16)
        } else {
            k
        };
        let raw = self
            .vec
            .search(query, fetch)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read()?;
        let content_docs = txn.open_table(tables::CONTENT_DOCS)?;
        let documents = txn.open_table(tables::DOCUMENTS)?;

        let collection = filters.collection.as_deref();
        let mut allowed: HashMap<String, bool> = HashMap::new();
        let mut hits = Vec::with_capacity(k);
        for ((hash, seq), distance) in raw {
            if hits.len() >= k {
                break;
            }
            let ok = match allowed.get(&hash) {
                Some(&cached) => cached,
                None => {
                    let doc = Store::document_for_mirror_tx(
                        &content_docs,
                        &documents,
                        &hash,
                        collection,
                    )?;
                    let ok = doc.is_some();
                    allowed.insert(hash.clone(), ok);
                    ok
                }
            };
            if ok {
                hits.push(NearestHit {
                    mirror_hash: hash,
                    seq,
                    distance,
                });
            }
        }
        Ok(hits)
    }

    /// Whether the side-index diverges from the durable table for the
    /// active model. Used after restart, when the in-memory index starts
    /// empty and the dirty flag has been lost.
    pub fn needs_vec_sync(&self) -> StoreResult<bool> {
        if !self.vec.search_available() {
            return Ok(false);
        }
        let durable = self.durable_vector_keys()?;
        if durable.len() != self.vec.len() {
            return Ok(true);
        }
        Ok(durable.iter().any(|key| !self.vec.contains(key)))
    }

    /// Reconcile the side-index to the durable table: add missing rows,
    /// drop stale ones, rebuild the graph, and clear the dirty flag.
    pub fn sync_vec_index(&self) -> StoreResult<()> {
        if !self.vec.search_available() {
            return Err(StoreError::VecUnavailable);
        }
        let durable = self.load_durable_vectors()?;
        let durable_keys: HashSet<VecKey> = durable.keys().cloned().collect();

        let mut added = 0usize;
        for (key, vector) in durable {
            if !self.vec.contains(&key) {
                self.vec
                    .upsert(key, vector)
                    .map_err(|e| StoreError::VecSyncFailed(e.to_string()))?;
                added += 1;
            }
        }
        let mut removed = 0usize;
        for key in self.vec.keys() {
            if !durable_keys.contains(&key) {
                self.vec.remove(&key);
                removed += 1;
            }
        }
        self.vec.build();
        self.vec.clear_dirty();
        tracing::debug!(added, removed, "vector side-index synced");
        Ok(())
    }

    /// Drop the side-index and repopulate it from the durable table.
    pub fn rebuild_vec_index(&self) -> StoreResult<()> {
        if !self.vec.search_available() {
            return Err(StoreError::VecUnavailable);
        }
        self.vec.clear();
        for (key, vector) in self.load_durable_vectors()? {
            self.vec
                .upsert(key, vector)
                .map_err(|e| StoreError::VecSyncFailed(e.to_string()))?;
        }
        self.vec.build();
        self.vec.clear_dirty();
        Ok(())
    }

    /// Chunks with no vector for `model`, in `(mirror_hash, seq)` order,
    /// starting strictly after the cursor.
    pub fn get_backlog(
        &self,
        model: &str,
        limit: usize,
        after: Option<&(String, u32)>,
    ) -> StoreResult<Vec<BacklogItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_read()?;
        let chunks = txn.open_table(tables::CHUNKS)?;
        let vectors = txn.open_table(tables::VECTORS)?;
        let content_docs = txn.open_table(tables::CONTENT_DOCS)?;
        let documents = txn.open_table(tables::DOCUMENTS)?;

        let range = match after {
            Some((hash, seq)) => chunks.range((
                Bound::Excluded((hash.as_str(), *seq)),
                Bound::<(&str, u32)>::Unbounded,
            ))?,
            None => chunks.range::<(&str, u32)>(..)?,
        };

        let mut items = Vec::new();
        let mut titles: HashMap<String, Option<String>> = HashMap::new();
        for item in range {
            if items.len() >= limit {
                break;
            }
            let (key, value) = item?;
            let (hash, seq) = key.value();
            if vectors.get((hash, seq, model))?.is_some() {
                continue;
            }
            let record: crate::types::ChunkRecord = decode_row(value.value())?;
            let title = match titles.get(hash) {
                Some(cached) => cached.clone(),
                None => {
                    let title = Store::document_for_mirror_tx(&content_docs, &documents, hash, None)?
                        .and_then(|doc| doc.title);
                    titles.insert(hash.to_string(), title.clone());
                    title
                }
            };
            items.push(BacklogItem {
                mirror_hash: hash.to_string(),
                seq,
                text: record.text,
                title,
            });
        }
        Ok(items)
    }

    /// Stored vectors of one content row for a model, decoded, in `seq`
    /// order.
    pub fn get_vectors_for_mirror(
        &self,
        mirror_hash: &str,
        model: &str,
    ) -> StoreResult<Vec<(u32, Vec<f32>)>> {
        let txn = self.db.begin_read()?;
        let vectors = txn.open_table(tables::VECTORS)?;
        let upper = str_successor(mirror_hash);
        let mut out = Vec::new();
        for item in vectors.range((mirror_hash, 0u32, "")..(upper.as_str(), 0u32, ""))? {
            let (key, value) = item?;
            let (_, seq, row_model) = key.value();
            if row_model != model {
                continue;
            }
            let row: VectorRow = decode_row(value.value())?;
            let vector = decode_vector(&row.embedding).ok_or_else(|| {
                StoreError::Internal(format!(
                    "vector ({mirror_hash}, {seq}) has a byte length not divisible by 4"
                ))
            })?;
            out.push((seq, vector));
        }
        Ok(out)
    }

    fn durable_vector_keys(&self) -> StoreResult<Vec<VecKey>> {
        let model = self.vec.model();
        let txn = self.db.begin_read()?;
        let vectors = txn.open_table(tables::VECTORS)?;
        let mut keys = Vec::new();
        for item in vectors.range::<(&str, u32, &str)>(..)? {
            let (key, _) = item?;
            let (hash, seq, row_model) = key.value();
            if row_model == model {
                keys.push((hash.to_string(), seq));
            }
        }
        Ok(keys)
    }

    fn load_durable_vectors(&self) -> StoreResult<HashMap<VecKey, Vec<f32>>> {
        let model = self.vec.model();
        let txn = self.db.begin_read()?;
        let vectors = txn.open_table(tables::VECTORS)?;
        let mut out = HashMap::new();
        for item in vectors.range::<(&str, u32, &str)>(..)? {
            let (key, value) = item?;
            let (hash, seq, row_model) = key.value();
            if row_model != model {
                continue;
            }
            let row: VectorRow = decode_row(value.value())?;
            let vector = decode_vector(&row.embedding).ok_or_else(|| {
                StoreError::Internal(format!(
                    "vector ({hash}, {seq}) has a byte length not divisible by 4"
                ))
            })?;
            out.insert((hash.to_string(), seq), vector);
        }
        Ok(out)
    }
}
