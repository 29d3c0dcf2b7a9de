use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reqdb_core::error::{Error, Result};
use reqdb_core::storage::{read_if_exists, stage_bytes, StagedFile};
use reqdb_core::traits::TextIndexer;
use reqdb_core::types::{DocId, SearchHit, SourceKind};

use crate::search::{bm25_search, Bm25Params};
use crate::tokenizer::tokenize;

pub const KEYWORD_INDEX_FILE: &str = "keyword_index.json";

/// Immutable keyword index version. Field names are the on-disk JSON keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordSnapshot {
    /// term -> (doc id -> term frequency)
    pub inverted_index: HashMap<String, HashMap<DocId, u32>>,
    /// doc id -> token count
    pub doc_lengths: HashMap<DocId, u32>,
    pub avg_doc_length: f64,
    pub total_docs: usize,
}

impl KeywordSnapshot {
    pub fn build(documents: &[(DocId, String)]) -> Self {
        let mut snapshot = Self::default();
        let mut total_tokens: u64 = 0;

        for (id, text) in documents {
            let tokens = tokenize(text);
            let len = u32::try_from(tokens.len()).unwrap_or(u32::MAX);
            total_tokens += u64::from(len);
            snapshot.doc_lengths.insert(id.clone(), len);

            let mut tf: HashMap<String, u32> = HashMap::new();
            for t in tokens {
                *tf.entry(t).or_insert(0) += 1;
            }
            for (term, freq) in tf {
                snapshot.inverted_index.entry(term).or_default().insert(id.clone(), freq);
            }
        }

        snapshot.total_docs = snapshot.doc_lengths.len();
        snapshot.avg_doc_length = if snapshot.total_docs == 0 {
            0.0
        } else {
            total_tokens as f64 / snapshot.total_docs as f64
        };
        snapshot
    }

    pub fn vocabulary_size(&self) -> usize {
        self.inverted_index.len()
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.doc_lengths.len() != self.total_docs {
            return Err(Error::corrupt(
                path,
                format!("total_docs is {} but {} document lengths are stored", self.total_docs, self.doc_lengths.len()),
            ));
        }
        if let Some((term, _)) = self
            .inverted_index
            .iter()
            .find(|(_, postings)| postings.keys().any(|id| !self.doc_lengths.contains_key(id)))
        {
            return Err(Error::corrupt(path, format!("postings for '{term}' reference an unknown document")));
        }
        Ok(())
    }
}

/// A built keyword snapshot plus its not-yet-committed file.
#[derive(Debug)]
pub struct StagedKeywordIndex {
    snapshot: Arc<KeywordSnapshot>,
    file: Option<StagedFile>,
}

impl StagedKeywordIndex {
    pub fn snapshot(&self) -> &KeywordSnapshot {
        &self.snapshot
    }
}

/// BM25 keyword index with wholesale-replace snapshots.
///
/// Readers take a cheap `Arc` clone of the live snapshot; rebuilds construct
/// a new snapshot off to the side and swap it in after it is on disk.
pub struct KeywordIndex {
    dir: Option<PathBuf>,
    params: Bm25Params,
    live: RwLock<Arc<KeywordSnapshot>>,
    previous: Mutex<Option<Arc<KeywordSnapshot>>>,
}

impl KeywordIndex {
    /// Open the index persisted under `dir`, or start empty if none exists.
    pub fn open(dir: impl Into<PathBuf>, params: Bm25Params) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(KEYWORD_INDEX_FILE);
        let snapshot = match read_if_exists(&path)? {
            Some(bytes) => {
                let snap: KeywordSnapshot =
                    serde_json::from_slice(&bytes).map_err(|e| Error::serialization(&path, e))?;
                snap.validate(&path)?;
                info!(docs = snap.total_docs, terms = snap.vocabulary_size(), "loaded keyword index from {}", path.display());
                snap
            }
            None => {
                debug!("no keyword index at {}, starting empty", path.display());
                KeywordSnapshot::default()
            }
        };
        Ok(Self::with_snapshot(Some(dir), params, snapshot))
    }

    /// An index that is never persisted.
    pub fn in_memory(params: Bm25Params) -> Self {
        Self::with_snapshot(None, params, KeywordSnapshot::default())
    }

    fn with_snapshot(dir: Option<PathBuf>, params: Bm25Params, snapshot: KeywordSnapshot) -> Self {
        Self { dir, params, live: RwLock::new(Arc::new(snapshot)), previous: Mutex::new(None) }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn snapshot(&self) -> Arc<KeywordSnapshot> {
        Arc::clone(&self.live.read())
    }

    pub fn count(&self) -> usize {
        self.live.read().total_docs
    }

    pub fn vocabulary_size(&self) -> usize {
        self.live.read().vocabulary_size()
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.live.read().avg_doc_length
    }

    /// BM25 top-`k` as `(id, score)`.
    pub fn search(&self, query: &str, k: usize) -> Vec<(DocId, f32)> {
        let snapshot = self.snapshot();
        let hits = bm25_search(&snapshot, self.params, query, k);
        debug!(query, hits = hits.len(), "bm25 search");
        hits
    }

    /// Build a new snapshot and write it to a temp file without publishing.
    pub fn stage(&self, documents: &[(DocId, String)]) -> Result<StagedKeywordIndex> {
        let mut seen = std::collections::HashSet::with_capacity(documents.len());
        for (id, _) in documents {
            if id.is_empty() {
                return Err(Error::InvalidDocument("empty document id".into()));
            }
            if !seen.insert(id.as_str()) {
                return Err(Error::InvalidDocument(format!("duplicate document id '{id}'")));
            }
        }

        let snapshot = Arc::new(KeywordSnapshot::build(documents));
        let file = match &self.dir {
            Some(dir) => Some(self.stage_file(dir, &snapshot)?),
            None => None,
        };
        Ok(StagedKeywordIndex { snapshot, file })
    }

    fn stage_file(&self, dir: &Path, snapshot: &KeywordSnapshot) -> Result<StagedFile> {
        let path = dir.join(KEYWORD_INDEX_FILE);
        let bytes = serde_json::to_vec(snapshot).map_err(|e| Error::serialization(&path, e))?;
        stage_bytes(&path, &bytes)
    }

    /// Commit the staged file, then swap the live snapshot. Both happen under
    /// the live write guard, so concurrent publishes land in the same order
    /// on disk and in memory.
    pub fn publish(&self, staged: StagedKeywordIndex) -> Result<()> {
        let mut live = self.live.write();
        if let Some(file) = staged.file {
            file.commit()?;
        }
        let docs = staged.snapshot.total_docs;
        let old = std::mem::replace(&mut *live, staged.snapshot);
        *self.previous.lock() = Some(old);
        drop(live);
        info!(docs, "keyword index published");
        Ok(())
    }

    pub fn discard(&self, staged: StagedKeywordIndex) {
        if let Some(file) = staged.file {
            file.discard();
        }
    }

    /// Reinstate the snapshot replaced by the last publish, on disk and in
    /// memory. Memory is restored even if the disk write fails.
    pub fn rollback(&self) -> Result<()> {
        let mut live = self.live.write();
        let Some(prev) = self.previous.lock().take() else {
            return Ok(());
        };
        let persisted = match &self.dir {
            Some(dir) => self.stage_file(dir, &prev).and_then(StagedFile::commit),
            None => Ok(()),
        };
        *live = prev;
        drop(live);
        if let Err(e) = &persisted {
            warn!("keyword rollback restored memory but not disk: {e}");
        }
        persisted
    }

    /// Release the snapshot kept for [`rollback`](Self::rollback) once the
    /// publish it guards is final.
    pub fn forget_previous(&self) {
        self.previous.lock().take();
    }

    pub fn rebuild(&self, documents: &[(DocId, String)]) -> Result<()> {
        let staged = self.stage(documents)?;
        self.publish(staged)
    }
}

impl TextIndexer for KeywordIndex {
    type Staged = StagedKeywordIndex;

    fn stage(&self, documents: &[(DocId, String)]) -> Result<Self::Staged> {
        Self::stage(self, documents)
    }
    fn publish(&self, staged: Self::Staged) -> Result<()> {
        Self::publish(self, staged)
    }
    fn discard(&self, staged: Self::Staged) {
        Self::discard(self, staged);
    }
    fn rollback(&self) -> Result<()> {
        Self::rollback(self)
    }
    fn forget_previous(&self) {
        Self::forget_previous(self);
    }
    fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        Self::search(self, query, k)
            .into_iter()
            .map(|(id, score)| SearchHit::new(id, score, SourceKind::Text))
            .collect()
    }
    fn count(&self) -> usize {
        Self::count(self)
    }
    fn vocabulary_size(&self) -> usize {
        Self::vocabulary_size(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(pairs: &[(&str, &str)]) -> Vec<(DocId, String)> {
        pairs.iter().map(|(id, t)| ((*id).to_string(), (*t).to_string())).collect()
    }

    #[test]
    fn build_counts_terms_and_lengths() {
        let snap = KeywordSnapshot::build(&docs(&[("d1", "hello hello world"), ("d2", "hello rust")]));
        assert_eq!(snap.total_docs, 2);
        assert_eq!(snap.inverted_index["hello"]["d1"], 2);
        assert_eq!(snap.inverted_index["hello"].len(), 2);
        assert_eq!(snap.doc_lengths["d1"], 3);
        assert!((snap.avg_doc_length - 2.5).abs() < 1e-12);
    }

    #[test]
    fn empty_corpus_is_legal() {
        let idx = KeywordIndex::in_memory(Bm25Params::default());
        idx.rebuild(&[]).expect("rebuild");
        assert_eq!(idx.count(), 0);
        assert!(idx.search("anything", 5).is_empty());
    }

    #[test]
    fn rebuild_replaces_wholesale() {
        let idx = KeywordIndex::in_memory(Bm25Params::default());
        idx.rebuild(&docs(&[("a", "payment gateway")])).expect("first");
        idx.rebuild(&docs(&[("b", "audit logging")])).expect("second");
        assert_eq!(idx.count(), 1);
        assert!(idx.search("payment", 5).is_empty());
        assert_eq!(idx.search("audit", 5)[0].0, "b");
    }

    #[test]
    fn duplicate_ids_are_rejected_before_mutation() {
        let idx = KeywordIndex::in_memory(Bm25Params::default());
        idx.rebuild(&docs(&[("a", "payment")])).expect("seed");
        let err = idx.rebuild(&docs(&[("x", "one"), ("x", "two")])).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument(_)));
        assert_eq!(idx.search("payment", 5).len(), 1);
    }

    #[test]
    fn rollback_restores_previous_snapshot() {
        let idx = KeywordIndex::in_memory(Bm25Params::default());
        idx.rebuild(&docs(&[("a", "payment")])).expect("first");
        idx.rebuild(&docs(&[("b", "audit")])).expect("second");
        idx.rollback().expect("rollback");
        assert_eq!(idx.search("payment", 5)[0].0, "a");
        // Nothing left to roll back to.
        idx.rollback().expect("noop");
        assert_eq!(idx.count(), 1);
    }

    #[test]
    fn forgotten_snapshot_cannot_be_rolled_back_to() {
        let idx = KeywordIndex::in_memory(Bm25Params::default());
        idx.rebuild(&docs(&[("a", "payment")])).expect("first");
        let first = idx.snapshot();
        idx.rebuild(&docs(&[("b", "audit")])).expect("second");
        idx.forget_previous();
        assert_eq!(Arc::strong_count(&first), 1, "index no longer holds the replaced snapshot");
        idx.rollback().expect("noop");
        assert_eq!(idx.search("audit", 5)[0].0, "b");
    }

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let idx = KeywordIndex::in_memory(Bm25Params::default());
        idx.rebuild(&docs(&[("a", "payment")])).expect("first");
        let held = idx.snapshot();
        idx.rebuild(&docs(&[("b", "audit"), ("c", "audit")])).expect("second");
        assert_eq!(held.total_docs, 1);
        assert_eq!(idx.count(), 2);
    }
}
