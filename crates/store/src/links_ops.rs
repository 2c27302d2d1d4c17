//! Link storage: outgoing links per document plus the normalized-target
//! index that powers backlink lookups.

use links::ExtractedLink;
use redb::{ReadableDatabase, ReadableTable};

use crate::error::{StoreError, StoreResult};
use crate::store::{decode_row, encode_row, Store};
use crate::tables::{self, str_successor};
use crate::types::{Backlink, DocumentRow};

impl Store {
    /// Replace all stored links for a source document.
    pub fn put_links(&self, source_docid: &str, links: &[ExtractedLink]) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut link_table = txn.open_table(tables::LINKS)?;
            let mut norms = txn.open_table(tables::LINK_NORMS)?;

            let upper = str_successor(source_docid);
            let mut old: Vec<(u32, String)> = Vec::new();
            for item in link_table.range((source_docid, 0u32)..(upper.as_str(), 0u32))? {
                let (key, value) = item?;
                let (_, ordinal) = key.value();
                let link: ExtractedLink = decode_row(value.value())?;
                old.push((ordinal, link.target_ref_norm));
            }
            for (ordinal, norm) in old {
                link_table.remove((source_docid, ordinal))?;
                norms.remove((norm.as_str(), source_docid, ordinal))?;
            }

            for (index, link) in links.iter().enumerate() {
                let ordinal = index as u32;
                link_table.insert((source_docid, ordinal), encode_row(link)?.as_slice())?;
                norms.insert((link.target_ref_norm.as_str(), source_docid, ordinal), ())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Outgoing links in stored (document) order.
    pub fn get_links_for_doc(&self, source_docid: &str) -> StoreResult<Vec<ExtractedLink>> {
        let txn = self.db.begin_read()?;
        let link_table = txn.open_table(tables::LINKS)?;
        let upper = str_successor(source_docid);
        let mut out = Vec::new();
        for item in link_table.range((source_docid, 0u32)..(upper.as_str(), 0u32))? {
            let (_, value) = item?;
            out.push(decode_row(value.value())?);
        }
        Ok(out)
    }

    /// Links from other documents whose normalized target matches this
    /// document's normalized title, path, or file stem, scoped by the
    /// link's target collection when it names one.
    ///
    /// Sorted by `(source_uri, start_line, start_col)`.
    pub fn get_backlinks_for_doc(&self, doc: &DocumentRow) -> StoreResult<Vec<Backlink>> {
        let mut needles: Vec<String> = Vec::new();
        if let Some(title) = &doc.title {
            needles.push(links::normalize_ref(title));
        }
        needles.push(links::normalize_ref(&doc.rel_path));
        let stem = doc
            .rel_path
            .rsplit('/')
            .next()
            .map(|name| name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name))
            .unwrap_or(&doc.rel_path);
        needles.push(links::normalize_ref(stem));
        needles.retain(|n| !n.is_empty());
        needles.sort();
        needles.dedup();

        let txn = self.db.begin_read()?;
        let norms = txn.open_table(tables::LINK_NORMS)?;
        let link_table = txn.open_table(tables::LINKS)?;
        let docids = txn.open_table(tables::DOCIDS)?;
        let documents = txn.open_table(tables::DOCUMENTS)?;

        let mut seen: Vec<(String, u32)> = Vec::new();
        let mut backlinks = Vec::new();
        for needle in &needles {
            let upper = str_successor(needle);
            for item in norms.range((needle.as_str(), "", 0u32)..(upper.as_str(), "", 0u32))? {
                let (key, _) = item?;
                let (_, source_docid, ordinal) = key.value();
                if seen.contains(&(source_docid.to_string(), ordinal)) {
                    continue;
                }
                seen.push((source_docid.to_string(), ordinal));

                let link: ExtractedLink = match link_table.get((source_docid, ordinal))? {
                    Some(guard) => decode_row(guard.value())?,
                    None => continue,
                };
                if let Some(target_collection) = &link.target_collection {
                    if target_collection != &doc.collection {
                        continue;
                    }
                }

                let source: DocumentRow = match docids.get(source_docid)? {
                    Some(key_guard) => {
                        let doc_key = key_guard.value().to_string();
                        match documents.get(doc_key.as_str())? {
                            Some(guard) => decode_row(guard.value())?,
                            None => continue,
                        }
                    }
                    None => continue,
                };
                if !source.active {
                    continue;
                }
                backlinks.push(Backlink {
                    source_docid: source.docid.clone(),
                    source_uri: source.uri.clone(),
                    link,
                });
            }
        }

        backlinks.sort_by(|a, b| {
            a.source_uri
                .cmp(&b.source_uri)
                .then_with(|| a.link.start_line.cmp(&b.link.start_line))
                .then_with(|| a.link.start_col.cmp(&b.link.start_col))
        });
        Ok(backlinks)
    }

    /// Whether a normalized reference resolves to a stored document,
    /// optionally scoped to a collection. Advisory: the result is not
    /// stored on link rows.
    pub fn resolve_target(
        &self,
        target_ref_norm: &str,
        collection: Option<&str>,
    ) -> StoreResult<Option<DocumentRow>> {
        if target_ref_norm.is_empty() {
            return Err(StoreError::Validation("empty link target".into()));
        }
        let docs = self.list_documents(collection, false)?;
        for doc in docs {
            let title_match = doc
                .title
                .as_deref()
                .map(|t| links::normalize_ref(t) == target_ref_norm)
                .unwrap_or(false);
            let path_match = links::normalize_ref(&doc.rel_path) == target_ref_norm;
            let stem = doc
                .rel_path
                .rsplit('/')
                .next()
                .map(|name| name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name))
                .unwrap_or(&doc.rel_path);
            let stem_match = links::normalize_ref(stem) == target_ref_norm;
            if title_match || path_match || stem_match {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::seed_document;
    use crate::store::tests::temp_store;
    use links::extract_links;

    #[test]
    fn put_and_get_links_roundtrip() {
        let (_dir, store) = temp_store();
        let (_, doc) = seed_document(&store, "notes", "a.md", &["body"]);

        let parsed = extract_links("see [[Other Page]] and [guide](docs/guide.md)\n");
        store.put_links(&doc.docid, &parsed).unwrap();

        let stored = store.get_links_for_doc(&doc.docid).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].target_ref, "Other Page");
        assert_eq!(stored[1].target_ref, "docs/guide.md");

        // Replacement drops the old generation.
        store
            .put_links(&doc.docid, &extract_links("only [[One Left]]\n"))
            .unwrap();
        let stored = store.get_links_for_doc(&doc.docid).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].target_ref, "One Left");
    }

    #[test]
    fn backlinks_match_title_and_are_sorted() {
        let (_dir, store) = temp_store();
        let (_, target) = seed_document(&store, "notes", "target.md", &["target body"]);
        // seed_document sets the title to "Title".
        let (_, src_b) = seed_document(&store, "notes", "b.md", &["linking body"]);
        let (_, src_a) = seed_document(&store, "notes", "a.md", &["linking body two"]);

        store
            .put_links(&src_b.docid, &extract_links("points at [[Title]]\n"))
            .unwrap();
        store
            .put_links(&src_a.docid, &extract_links("also [[title]] here\n"))
            .unwrap();

        let backlinks = store.get_backlinks_for_doc(&target).unwrap();
        assert_eq!(backlinks.len(), 2);
        // Sorted by source_uri: gno://notes/a.md before gno://notes/b.md.
        assert_eq!(backlinks[0].source_docid, src_a.docid);
        assert_eq!(backlinks[1].source_docid, src_b.docid);
    }

    #[test]
    fn backlinks_respect_target_collection_scope() {
        let (_dir, store) = temp_store();
        let (_, target) = seed_document(&store, "notes", "shared.md", &["x"]);
        let (_, src) = seed_document(&store, "other", "src.md", &["y"]);

        store
            .put_links(
                &src.docid,
                &extract_links("[[wiki:shared]] and [[notes:shared]]\n"),
            )
            .unwrap();

        let backlinks = store.get_backlinks_for_doc(&target).unwrap();
        // Only the link scoped to the target's collection matches.
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].link.target_collection.as_deref(), Some("notes"));
    }

    #[test]
    fn tombstoned_sources_are_excluded() {
        let (_dir, store) = temp_store();
        let (_, target) = seed_document(&store, "notes", "t.md", &["x"]);
        let (_, src) = seed_document(&store, "notes", "src.md", &["y"]);
        store
            .put_links(&src.docid, &extract_links("[[t]]\n"))
            .unwrap();

        assert_eq!(store.get_backlinks_for_doc(&target).unwrap().len(), 1);
        store.set_document_active("notes", "src.md", false).unwrap();
        assert!(store.get_backlinks_for_doc(&target).unwrap().is_empty());
    }

    #[test]
    fn resolve_target_by_stem_and_collection() {
        let (_dir, store) = temp_store();
        seed_document(&store, "notes", "deep/path/design.md", &["x"]);

        let hit = store.resolve_target("design", None).unwrap();
        assert!(hit.is_some());
        assert!(store.resolve_target("design", Some("other")).unwrap().is_none());
        assert!(store.resolve_target("missing", None).unwrap().is_none());
        assert!(matches!(
            store.resolve_target("", None),
            Err(StoreError::Validation(_))
        ));
    }
}
