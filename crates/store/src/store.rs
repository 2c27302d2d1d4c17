//! Store construction, schema migrations, and shared helpers.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::fts::FtsTokenizer;
use crate::tables::{self, meta_keys};
use crate::vec::{VecIndexOptions, VectorIndex};

/// Bump on any table/key-layout change. Migrations run forward-only.
pub const SCHEMA_VERSION: u32 = 1;

/// Options for [`Store::open`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub tokenizer: FtsTokenizer,
    pub vec: VecIndexOptions,
}

impl StoreOptions {
    pub fn new(tokenizer: FtsTokenizer, vec: VecIndexOptions) -> Self {
        Self { tokenizer, vec }
    }
}

/// The persistent, ACID, embedded store.
///
/// One write transaction per logical operation; readers observe either the
/// pre- or post-transaction state, never a partial write. The vector
/// side-index lives in process memory and is reconciled against the
/// durable `vectors` table (see [`crate::vec`]).
pub struct Store {
    pub(crate) db: Database,
    path: PathBuf,
    /// Tokenizer requested at open time; used for all new postings and
    /// query tokenization.
    pub(crate) tokenizer: FtsTokenizer,
    /// Tokenizer the on-disk postings were built with.
    pub(crate) persisted_tokenizer: RwLock<FtsTokenizer>,
    pub(crate) vec: VectorIndex,
}

impl Store {
    /// Open or create a store, running schema migrations in a single
    /// transaction. Opening a store written by a newer schema version is
    /// refused.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;

        let txn = db.begin_write()?;
        let persisted_tokenizer;
        {
            // Opening a table creates it; creating every table up front
            // means read transactions never observe a missing table.
            let mut meta = txn.open_table(tables::META)?;
            let _ = txn.open_table(tables::COLLECTIONS)?;
            let _ = txn.open_table(tables::DOCUMENTS)?;
            let _ = txn.open_table(tables::DOCIDS)?;
            let _ = txn.open_table(tables::CONTENT)?;
            let _ = txn.open_table(tables::CONTENT_DOCS)?;
            let _ = txn.open_table(tables::CHUNKS)?;
            let _ = txn.open_table(tables::FTS_POSTINGS)?;
            let _ = txn.open_table(tables::FTS_CHUNKS)?;
            let _ = txn.open_table(tables::VECTORS)?;
            let _ = txn.open_table(tables::LINKS)?;
            let _ = txn.open_table(tables::LINK_NORMS)?;
            let _ = txn.open_table(tables::INGEST_ERRORS)?;

            let stored_version = match meta.get(meta_keys::SCHEMA_VERSION)? {
                Some(guard) => Some(u32_from_bytes(guard.value())?),
                None => None,
            };
            match stored_version {
                None => {
                    meta.insert(meta_keys::SCHEMA_VERSION, SCHEMA_VERSION.to_le_bytes().as_slice())?;
                }
                Some(v) if v > SCHEMA_VERSION => {
                    return Err(StoreError::Validation(format!(
                        "store schema version {v} is newer than supported {SCHEMA_VERSION}; refusing downgrade"
                    )));
                }
                Some(v) if v < SCHEMA_VERSION => {
                    // Forward-only migration hook. Schema v1 is the first
                    // public layout, so there is nothing to migrate yet.
                    meta.insert(meta_keys::SCHEMA_VERSION, SCHEMA_VERSION.to_le_bytes().as_slice())?;
                }
                Some(_) => {}
            }

            let existing_tokenizer_bytes =
                meta.get(meta_keys::FTS_TOKENIZER)?.map(|guard| guard.value().to_vec());
            persisted_tokenizer = match existing_tokenizer_bytes {
                Some(bytes) => {
                    let name = std::str::from_utf8(&bytes)
                        .map_err(StoreError::internal)?
                        .to_string();
                    FtsTokenizer::parse(&name).ok_or_else(|| {
                        StoreError::Validation(format!("unknown persisted tokenizer '{name}'"))
                    })?
                }
                None => {
                    meta.insert(
                        meta_keys::FTS_TOKENIZER,
                        options.tokenizer.as_str().as_bytes(),
                    )?;
                    options.tokenizer
                }
            };
        }
        txn.commit()?;

        tracing::info!(
            path = %path.display(),
            tokenizer = options.tokenizer.as_str(),
            vec_model = %options.vec.model,
            vec_available = options.vec.enabled,
            "store opened"
        );

        Ok(Self {
            db,
            path,
            tokenizer: options.tokenizer,
            persisted_tokenizer: RwLock::new(persisted_tokenizer),
            vec: VectorIndex::new(options.vec),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tokenizer used for new postings and queries.
    pub fn tokenizer(&self) -> FtsTokenizer {
        self.tokenizer
    }

    /// The vector side-index for the active model.
    pub fn vec_index(&self) -> &VectorIndex {
        &self.vec
    }

    /// True when the on-disk postings were built with a different
    /// tokenizer than the one requested at open time; `rebuild_fts`
    /// clears the condition.
    pub fn needs_fts_rebuild(&self) -> bool {
        let persisted = *self
            .persisted_tokenizer
            .read()
            .unwrap_or_else(|e| e.into_inner());
        persisted != self.tokenizer
    }

    /// Flush and release the store. Dropping the handle has the same
    /// effect; this exists to make shutdown explicit at call sites.
    pub fn close(self) {
        tracing::debug!(path = %self.path.display(), "store closed");
        drop(self);
    }

    pub(crate) fn set_persisted_tokenizer(&self, tokenizer: FtsTokenizer) {
        *self
            .persisted_tokenizer
            .write()
            .unwrap_or_else(|e| e.into_inner()) = tokenizer;
    }

    /// Read a u64 metadata counter, defaulting to 0.
    pub(crate) fn meta_counter(
        meta: &impl ReadableTable<&'static str, &'static [u8]>,
        key: &str,
    ) -> StoreResult<u64> {
        match meta.get(key)? {
            Some(guard) => u64_from_bytes(guard.value()),
            None => Ok(0),
        }
    }
}

pub(crate) fn u32_from_bytes(bytes: &[u8]) -> StoreResult<u32> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StoreError::Internal("corrupt u32 metadata value".into()))?;
    Ok(u32::from_le_bytes(arr))
}

pub(crate) fn u64_from_bytes(bytes: &[u8]) -> StoreResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Internal("corrupt u64 metadata value".into()))?;
    Ok(u64::from_le_bytes(arr))
}

pub(crate) fn encode_row<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, bincode::config::standard())?)
}

pub(crate) fn decode_row<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(
            dir.path().join("gno.redb"),
            StoreOptions::new(
                FtsTokenizer::Unicode61,
                VecIndexOptions::new("test-model", 4),
            ),
        )
        .unwrap();
        (dir, store)
    }

    #[test]
    fn open_is_idempotent_and_persists_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gno.redb");

        let store = Store::open(
            &path,
            StoreOptions::new(FtsTokenizer::Porter, VecIndexOptions::new("m", 4)),
        )
        .unwrap();
        assert!(!store.needs_fts_rebuild());
        store.close();

        // Reopen with a different tokenizer: the persisted one is kept and
        // a rebuild is flagged.
        let store = Store::open(
            &path,
            StoreOptions::new(FtsTokenizer::Trigram, VecIndexOptions::new("m", 4)),
        )
        .unwrap();
        assert!(store.needs_fts_rebuild());
    }

    #[test]
    fn byte_codecs_roundtrip() {
        assert_eq!(u32_from_bytes(&7u32.to_le_bytes()).unwrap(), 7);
        assert_eq!(u64_from_bytes(&9u64.to_le_bytes()).unwrap(), 9);
        assert!(u32_from_bytes(&[1, 2]).is_err());

        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Row {
            a: String,
            b: Option<u32>,
        }
        let row = Row {
            a: "x".into(),
            b: Some(3),
        };
        let bytes = encode_row(&row).unwrap();
        assert_eq!(decode_row::<Row>(&bytes).unwrap(), row);
    }
}
