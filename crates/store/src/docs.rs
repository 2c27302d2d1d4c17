//! Document and collection operations.

use chrono::Utc;
use redb::{ReadableDatabase, ReadableTable};

use crate::error::{StoreError, StoreResult};
use crate::store::{decode_row, encode_row, u64_from_bytes, Store};
use crate::tables::{self, meta_keys, str_successor};
use crate::types::{
    derive_docid, document_key, document_uri, is_valid_collection, CollectionRow, DocumentInput,
    DocumentRow, LastError,
};

impl Store {
    /// Insert or update a document by `(collection, rel_path)`.
    ///
    /// `id` and `docid` are minted on first insert and never mutated.
    /// Re-upserting a tombstoned document reactivates it.
    pub fn upsert_document(&self, input: DocumentInput) -> StoreResult<DocumentRow> {
        validate_document_input(&input)?;
        let now = Utc::now();
        let key = document_key(&input.collection, &input.rel_path);

        let txn = self.db.begin_write()?;
        let row;
        {
            let mut documents = txn.open_table(tables::DOCUMENTS)?;
            let mut docids = txn.open_table(tables::DOCIDS)?;
            let mut collections = txn.open_table(tables::COLLECTIONS)?;
            let mut content_docs = txn.open_table(tables::CONTENT_DOCS)?;
            let mut meta = txn.open_table(tables::META)?;

            if collections.get(input.collection.as_str())?.is_none() {
                let collection = CollectionRow {
                    name: input.collection.clone(),
                    created_at: now,
                };
                collections.insert(input.collection.as_str(), encode_row(&collection)?.as_slice())?;
            }

            let existing: Option<DocumentRow> = match documents.get(key.as_str())? {
                Some(guard) => Some(decode_row(guard.value())?),
                None => None,
            };

            row = match existing {
                Some(old) => {
                    if old.mirror_hash != input.mirror_hash {
                        if let Some(old_mirror) = &old.mirror_hash {
                            content_docs.remove((old_mirror.as_str(), key.as_str()))?;
                        }
                    }
                    DocumentRow {
                        id: old.id,
                        docid: old.docid,
                        collection: old.collection,
                        rel_path: old.rel_path,
                        uri: old.uri,
                        source_hash: input.source_hash,
                        source_mime: input.source_mime,
                        source_ext: input.source_ext,
                        source_size: input.source_size,
                        source_mtime: input.source_mtime,
                        mirror_hash: input.mirror_hash,
                        title: input.title,
                        converter_id: input.converter_id,
                        converter_version: input.converter_version,
                        language_hint: input.language_hint,
                        active: true,
                        last_error: None,
                        created_at: old.created_at,
                        updated_at: now,
                    }
                }
                None => {
                    let docid = mint_docid(&docids, &input.collection, &input.rel_path)?;
                    let id = Store::meta_counter(&meta, meta_keys::NEXT_DOC_ID)? + 1;
                    meta.insert(meta_keys::NEXT_DOC_ID, id.to_le_bytes().as_slice())?;
                    docids.insert(docid.as_str(), key.as_str())?;
                    DocumentRow {
                        id,
                        docid,
                        collection: input.collection.clone(),
                        rel_path: input.rel_path.clone(),
                        uri: document_uri(&input.collection, &input.rel_path),
                        source_hash: input.source_hash,
                        source_mime: input.source_mime,
                        source_ext: input.source_ext,
                        source_size: input.source_size,
                        source_mtime: input.source_mtime,
                        mirror_hash: input.mirror_hash,
                        title: input.title,
                        converter_id: input.converter_id,
                        converter_version: input.converter_version,
                        language_hint: input.language_hint,
                        active: true,
                        last_error: None,
                        created_at: now,
                        updated_at: now,
                    }
                }
            };

            if let Some(mirror) = &row.mirror_hash {
                content_docs.insert((mirror.as_str(), key.as_str()), ())?;
            }
            documents.insert(key.as_str(), encode_row(&row)?.as_slice())?;
        }
        txn.commit()?;
        Ok(row)
    }

    pub fn get_document(
        &self,
        collection: &str,
        rel_path: &str,
    ) -> StoreResult<Option<DocumentRow>> {
        let key = document_key(collection, rel_path);
        let txn = self.db.begin_read()?;
        let documents = txn.open_table(tables::DOCUMENTS)?;
        match documents.get(key.as_str())? {
            Some(guard) => Ok(Some(decode_row(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a docid (6–8 lowercase hex chars, `#` prefix optional) to
    /// its document. Shorter prefixes must be unambiguous.
    pub fn get_document_by_docid(&self, docid: &str) -> StoreResult<DocumentRow> {
        let needle = normalize_docid(docid)?;
        let txn = self.db.begin_read()?;
        let docids = txn.open_table(tables::DOCIDS)?;
        let documents = txn.open_table(tables::DOCUMENTS)?;

        let key: String = if needle.len() == 8 {
            match docids.get(needle.as_str())? {
                Some(guard) => guard.value().to_string(),
                None => return Err(StoreError::NotFound(format!("docid #{needle}"))),
            }
        } else {
            let upper = str_successor(&needle);
            let mut matches = docids.range(needle.as_str()..upper.as_str())?;
            let first = match matches.next() {
                Some(item) => {
                    let (id, key) = item?;
                    // Range by string order also catches ids that merely
                    // sort after the prefix; check the prefix explicitly.
                    if !id.value().starts_with(&needle) {
                        return Err(StoreError::NotFound(format!("docid #{needle}")));
                    }
                    key.value().to_string()
                }
                None => return Err(StoreError::NotFound(format!("docid #{needle}"))),
            };
            if let Some(item) = matches.next() {
                let (id, _) = item?;
                if id.value().starts_with(&needle) {
                    return Err(StoreError::Validation(format!(
                        "docid prefix #{needle} is ambiguous"
                    )));
                }
            }
            first
        };

        match documents.get(key.as_str())? {
            Some(guard) => decode_row(guard.value()),
            None => Err(StoreError::Internal(format!(
                "docid #{needle} points at a missing document row"
            ))),
        }
    }

    /// All documents, optionally restricted to a collection. Tombstoned
    /// rows are excluded unless requested.
    pub fn list_documents(
        &self,
        collection: Option<&str>,
        include_inactive: bool,
    ) -> StoreResult<Vec<DocumentRow>> {
        let txn = self.db.begin_read()?;
        let documents = txn.open_table(tables::DOCUMENTS)?;

        let mut rows = Vec::new();
        let push =
            |rows: &mut Vec<DocumentRow>, bytes: &[u8]| -> StoreResult<()> {
                let row: DocumentRow = decode_row(bytes)?;
                if row.active || include_inactive {
                    rows.push(row);
                }
                Ok(())
            };

        match collection {
            Some(name) => {
                let low = format!("{name}\x00");
                let high = format!("{name}\x01");
                for item in documents.range(low.as_str()..high.as_str())? {
                    let (_, value) = item?;
                    push(&mut rows, value.value())?;
                }
            }
            None => {
                for item in documents.range::<&str>(..)? {
                    let (_, value) = item?;
                    push(&mut rows, value.value())?;
                }
            }
        }
        Ok(rows)
    }

    /// Tombstone or reactivate a document. Deep removal happens only in
    /// `cleanup_orphans`.
    pub fn set_document_active(
        &self,
        collection: &str,
        rel_path: &str,
        active: bool,
    ) -> StoreResult<DocumentRow> {
        self.update_document(collection, rel_path, |row| {
            row.active = active;
        })
    }

    /// Record the most recent per-document failure.
    pub fn set_document_error(
        &self,
        collection: &str,
        rel_path: &str,
        code: &str,
        message: &str,
    ) -> StoreResult<DocumentRow> {
        let error = LastError {
            code: code.to_string(),
            message: message.to_string(),
            at: Utc::now(),
        };
        self.update_document(collection, rel_path, move |row| {
            row.last_error = Some(error);
        })
    }

    fn update_document(
        &self,
        collection: &str,
        rel_path: &str,
        apply: impl FnOnce(&mut DocumentRow),
    ) -> StoreResult<DocumentRow> {
        let key = document_key(collection, rel_path);
        let txn = self.db.begin_write()?;
        let row;
        {
            let mut documents = txn.open_table(tables::DOCUMENTS)?;
            let mut updated: DocumentRow = match documents.get(key.as_str())? {
                Some(guard) => decode_row(guard.value())?,
                None => {
                    return Err(StoreError::NotFound(format!(
                        "document {collection}/{rel_path}"
                    )))
                }
            };
            apply(&mut updated);
            updated.updated_at = Utc::now();
            documents.insert(key.as_str(), encode_row(&updated)?.as_slice())?;
            row = updated;
        }
        txn.commit()?;
        Ok(row)
    }

    /// First active document referring to a mirror hash, preferring the
    /// requested collection when one is given.
    pub fn document_for_mirror(
        &self,
        mirror_hash: &str,
        collection: Option<&str>,
    ) -> StoreResult<Option<DocumentRow>> {
        let txn = self.db.begin_read()?;
        let content_docs = txn.open_table(tables::CONTENT_DOCS)?;
        let documents = txn.open_table(tables::DOCUMENTS)?;
        Store::document_for_mirror_tx(&content_docs, &documents, mirror_hash, collection)
    }

    pub(crate) fn document_for_mirror_tx(
        content_docs: &impl ReadableTable<(&'static str, &'static str), ()>,
        documents: &impl ReadableTable<&'static str, &'static [u8]>,
        mirror_hash: &str,
        collection: Option<&str>,
    ) -> StoreResult<Option<DocumentRow>> {
        let upper = str_successor(mirror_hash);
        for item in content_docs.range((mirror_hash, "")..(upper.as_str(), ""))? {
            let (key, _) = item?;
            let (_, doc_key) = key.value();
            let row: DocumentRow = match documents.get(doc_key)? {
                Some(guard) => decode_row(guard.value())?,
                None => continue,
            };
            if !row.active {
                continue;
            }
            match collection {
                Some(c) if row.collection == c => return Ok(Some(row)),
                Some(_) => {}
                None => return Ok(Some(row)),
            }
        }
        Ok(None)
    }
}

fn validate_document_input(input: &DocumentInput) -> StoreResult<()> {
    if !is_valid_collection(&input.collection) {
        return Err(StoreError::Validation(format!(
            "invalid collection name '{}'",
            input.collection
        )));
    }
    if input.rel_path.is_empty()
        || input.rel_path.starts_with('/')
        || input.rel_path.contains('\x00')
    {
        return Err(StoreError::Validation(format!(
            "invalid relative path '{}'",
            input.rel_path
        )));
    }
    if let Some(mirror) = &input.mirror_hash {
        if !is_hex_hash(mirror) {
            return Err(StoreError::Validation(format!(
                "mirror_hash '{mirror}' is not a lowercase 64-hex digest"
            )));
        }
    }
    Ok(())
}

fn is_hex_hash(value: &str) -> bool {
    value.len() == 64
        && value
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Strip the optional `#`, validate shape.
fn normalize_docid(docid: &str) -> StoreResult<String> {
    let bare = docid.strip_prefix('#').unwrap_or(docid);
    let valid = (6..=8).contains(&bare.len())
        && bare
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    if !valid {
        return Err(StoreError::Validation(format!(
            "'{docid}' is not a docid (#[a-f0-9]{{6,8}})"
        )));
    }
    Ok(bare.to_string())
}

/// Derive an unused 8-hex docid, sliding the hash window on collision.
fn mint_docid(
    docids: &impl ReadableTable<&'static str, &'static str>,
    collection: &str,
    rel_path: &str,
) -> StoreResult<String> {
    for window in 0..56 {
        let candidate = derive_docid(collection, rel_path, window);
        if docids.get(candidate.as_str())?.is_none() {
            return Ok(candidate);
        }
    }
    Err(StoreError::Internal(format!(
        "could not mint a unique docid for {collection}/{rel_path}"
    )))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::tests::temp_store;

    pub(crate) fn sample_input(collection: &str, rel_path: &str) -> DocumentInput {
        DocumentInput {
            collection: collection.to_string(),
            rel_path: rel_path.to_string(),
            source_hash: canonical::mirror_hash_bytes(rel_path.as_bytes()),
            source_mime: "text/markdown".into(),
            source_ext: "md".into(),
            source_size: 64,
            source_mtime: None,
            mirror_hash: None,
            title: Some("Title".into()),
            converter_id: Some("markdown".into()),
            converter_version: Some(1),
            language_hint: None,
        }
    }

    #[test]
    fn docid_stable_across_reupserts() {
        let (_dir, store) = temp_store();
        let first = store.upsert_document(sample_input("notes", "a.md")).unwrap();
        let mut updated = sample_input("notes", "a.md");
        updated.source_size = 128;
        let second = store.upsert_document(updated).unwrap();

        assert_eq!(first.docid, second.docid);
        assert_eq!(first.id, second.id);
        assert_eq!(second.source_size, 128);
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn docid_lookup_full_and_prefix() {
        let (_dir, store) = temp_store();
        let row = store.upsert_document(sample_input("notes", "a.md")).unwrap();

        let by_full = store.get_document_by_docid(&row.docid).unwrap();
        assert_eq!(by_full.rel_path, "a.md");

        let by_hash_prefix = store
            .get_document_by_docid(&format!("#{}", &row.docid[..6]))
            .unwrap();
        assert_eq!(by_hash_prefix.docid, row.docid);

        assert!(matches!(
            store.get_document_by_docid("#ffffff"),
            Err(StoreError::NotFound(_)) | Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.get_document_by_docid("not-hex"),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn invalid_collection_rejected() {
        let (_dir, store) = temp_store();
        let err = store
            .upsert_document(sample_input("Bad Name", "a.md"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn tombstone_then_reactivate() {
        let (_dir, store) = temp_store();
        store.upsert_document(sample_input("notes", "a.md")).unwrap();

        let row = store.set_document_active("notes", "a.md", false).unwrap();
        assert!(!row.active);
        assert!(store.list_documents(Some("notes"), false).unwrap().is_empty());
        assert_eq!(store.list_documents(Some("notes"), true).unwrap().len(), 1);

        // Re-discovery reactivates and clears the last error.
        store
            .set_document_error("notes", "a.md", "IO", "disk read failed")
            .unwrap();
        let row = store.upsert_document(sample_input("notes", "a.md")).unwrap();
        assert!(row.active);
        assert!(row.last_error.is_none());
    }

    #[test]
    fn list_documents_scopes_by_collection() {
        let (_dir, store) = temp_store();
        store.upsert_document(sample_input("alpha", "a.md")).unwrap();
        store.upsert_document(sample_input("beta", "b.md")).unwrap();

        assert_eq!(store.list_documents(Some("alpha"), false).unwrap().len(), 1);
        assert_eq!(store.list_documents(None, false).unwrap().len(), 2);
    }

    #[test]
    fn missing_document_updates_are_not_found() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.set_document_active("notes", "ghost.md", false),
            Err(StoreError::NotFound(_))
        ));
    }
}
