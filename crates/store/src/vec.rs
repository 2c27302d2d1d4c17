//! Vector side-index: an in-process ANN mirror of the durable vector table.
//!
//! The durable `vectors` table is authoritative; this index is a derived
//! view reconciled by `sync_vec_index`. Mutations mark the HNSW graph
//! stale, and searches fall back to an exact linear scan until the next
//! `build`, so results stay correct between builds at the cost of speed.
//!
//! The `dirty` flag is per-instance and never persisted; after a restart
//! `needs_vec_sync` recomputes the divergence by diffing the durable table
//! against this index.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use hnsw_rs::prelude::*;
use thiserror::Error;

/// `(mirror_hash, seq)`.
pub type VecKey = (String, u32);

/// Configuration for the side-index.
#[derive(Debug, Clone)]
pub struct VecIndexOptions {
    /// When false the index is absent: nearest-neighbor search fails with
    /// `VEC_UNAVAILABLE` while durable vector writes keep succeeding.
    pub enabled: bool,
    pub model: String,
    pub dimensions: usize,
    /// Neighbors per HNSW node.
    pub m: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Candidate list size during search.
    pub ef_search: usize,
    /// Below this many vectors the exact linear scan is used even when the
    /// graph is built.
    pub min_vectors_for_ann: usize,
}

impl VecIndexOptions {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            enabled: true,
            model: model.into(),
            dimensions,
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            min_vectors_for_ann: 1000,
        }
    }

    pub fn disabled(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            enabled: false,
            ..Self::new(model, dimensions)
        }
    }
}

#[derive(Debug, Error)]
pub enum VecIndexError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("vector index is unavailable")]
    Unavailable,
}

struct State {
    /// Live key → slot. Slots are never reused until `build` compacts.
    keys: HashMap<VecKey, usize>,
    /// Slot → key; `None` marks a tombstone.
    slots: Vec<Option<VecKey>>,
    vectors: Vec<Vec<f32>>,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    /// False whenever the graph no longer reflects `vectors`.
    built: bool,
}

impl State {
    fn live(&self) -> usize {
        self.keys.len()
    }
}

/// The per-model ANN side-index.
pub struct VectorIndex {
    options: VecIndexOptions,
    state: RwLock<State>,
    dirty: AtomicBool,
}

impl VectorIndex {
    pub fn new(options: VecIndexOptions) -> Self {
        Self {
            options,
            state: RwLock::new(State {
                keys: HashMap::new(),
                slots: Vec::new(),
                vectors: Vec::new(),
                hnsw: None,
                built: false,
            }),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn model(&self) -> &str {
        &self.options.model
    }

    pub fn dimensions(&self) -> usize {
        self.options.dimensions
    }

    /// Whether nearest-neighbor search can be served at all.
    pub fn search_available(&self) -> bool {
        self.options.enabled
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Number of live keys in the side-index.
    pub fn len(&self) -> usize {
        self.read().live()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &VecKey) -> bool {
        self.read().keys.contains_key(key)
    }

    /// Snapshot of the live keys, for reconciliation diffs.
    pub fn keys(&self) -> Vec<VecKey> {
        self.read().keys.keys().cloned().collect()
    }

    /// Insert or replace one vector. Marks the graph stale.
    pub fn upsert(&self, key: VecKey, vector: Vec<f32>) -> Result<(), VecIndexError> {
        if vector.len() != self.options.dimensions {
            return Err(VecIndexError::DimensionMismatch {
                expected: self.options.dimensions,
                got: vector.len(),
            });
        }
        let mut state = self.write();
        match state.keys.get(&key).copied() {
            Some(slot) => {
                state.vectors[slot] = vector;
            }
            None => {
                let slot = state.vectors.len();
                state.vectors.push(vector);
                state.slots.push(Some(key.clone()));
                state.keys.insert(key, slot);
            }
        }
        state.built = false;
        Ok(())
    }

    /// Remove a key if present. Tombstones the slot; `build` compacts.
    pub fn remove(&self, key: &VecKey) -> bool {
        let mut state = self.write();
        match state.keys.remove(key) {
            Some(slot) => {
                state.slots[slot] = None;
                state.built = false;
                true
            }
            None => false,
        }
    }

    /// Drop everything, including tombstones.
    pub fn clear(&self) {
        let mut state = self.write();
        state.keys.clear();
        state.slots.clear();
        state.vectors.clear();
        state.hnsw = None;
        state.built = false;
    }

    /// Compact tombstones and rebuild the HNSW graph.
    ///
    /// Small sets skip graph construction; the linear scan handles them.
    pub fn build(&self) {
        let mut state = self.write();
        let state = &mut *state;

        // Compact: drop tombstoned slots so graph ids stay dense.
        if state.keys.len() != state.slots.len() {
            let mut vectors = Vec::with_capacity(state.keys.len());
            let mut slots = Vec::with_capacity(state.keys.len());
            let mut keys = HashMap::with_capacity(state.keys.len());
            for (slot, key) in state.slots.iter().enumerate() {
                if let Some(key) = key {
                    keys.insert(key.clone(), vectors.len());
                    slots.push(Some(key.clone()));
                    vectors.push(std::mem::take(&mut state.vectors[slot]));
                }
            }
            state.vectors = vectors;
            state.slots = slots;
            state.keys = keys;
        }

        let count = state.vectors.len();
        if count < 10 {
            state.hnsw = None;
            state.built = true;
            return;
        }

        let layers = 16.min((count as f32).ln().trunc() as usize).max(1);
        let hnsw = Hnsw::<f32, DistCosine>::new(
            self.options.m,
            count,
            layers,
            self.options.ef_construction,
            DistCosine {},
        );
        let data: Vec<(&Vec<f32>, usize)> = state
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, vec)| (vec, slot))
            .collect();
        hnsw.parallel_insert(&data);
        state.hnsw = Some(hnsw);
        state.built = true;
    }

    /// Nearest neighbors by cosine distance, ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(VecKey, f32)>, VecIndexError> {
        if !self.options.enabled {
            return Err(VecIndexError::Unavailable);
        }
        if query.len() != self.options.dimensions {
            return Err(VecIndexError::DimensionMismatch {
                expected: self.options.dimensions,
                got: query.len(),
            });
        }

        let state = self.read();
        if k == 0 || state.live() == 0 {
            return Ok(Vec::new());
        }

        let use_graph =
            state.built && state.hnsw.is_some() && state.live() >= self.options.min_vectors_for_ann;
        if use_graph {
            Ok(self.graph_search(&state, query, k))
        } else {
            Ok(self.linear_search(&state, query, k))
        }
    }

    fn graph_search(&self, state: &State, query: &[f32], k: usize) -> Vec<(VecKey, f32)> {
        let hnsw = match &state.hnsw {
            Some(h) => h,
            None => return self.linear_search(state, query, k),
        };
        // Over-fetch so tombstones cannot shrink the result set.
        let fetch = k.saturating_mul(2).max(k + 8);
        let neighbours: Vec<Neighbour> = hnsw.search(query, fetch, self.options.ef_search);
        let mut out = Vec::with_capacity(k);
        for n in neighbours {
            let slot = n.get_origin_id();
            if let Some(Some(key)) = state.slots.get(slot) {
                out.push((key.clone(), n.distance));
                if out.len() == k {
                    break;
                }
            }
        }
        out
    }

    fn linear_search(&self, state: &State, query: &[f32], k: usize) -> Vec<(VecKey, f32)> {
        let mut scored: Vec<(usize, f32)> = state
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, key)| {
                key.as_ref()
                    .map(|_| (slot, cosine_distance(query, &state.vectors[slot])))
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .filter_map(|(slot, dist)| {
                state.slots[slot].as_ref().map(|key| (key.clone(), dist))
            })
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cosine distance (`1 - cosine similarity`), clamped to `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// L2-normalize in place; zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Encode a vector as little-endian f32 bytes (`dim * 4` long).
#[cfg(target_endian = "little")]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(vector).to_vec()
}

#[cfg(not(target_endian = "little"))]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode little-endian f32 bytes. Fails when the length is not a
/// multiple of four.
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
