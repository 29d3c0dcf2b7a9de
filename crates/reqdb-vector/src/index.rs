use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use reqdb_core::error::{Error, Result};
use reqdb_core::storage::{read_if_exists, stage_bytes, StagedFile};
use reqdb_core::traits::VectorIndexer;
use reqdb_core::types::{DocId, DocumentMetadata, SearchHit, SourceKind, VectorEntry};

use crate::schema::{decode_matrix, encode_matrix, VECTORS_FILE, VECTORS_META_FILE};
use crate::search::l2_normalize;

/// Immutable vector index version: normalized rows plus metadata, same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorSnapshot {
    dimension: usize,
    ids: Vec<DocId>,
    values: Vec<f32>,
    metadata: Vec<DocumentMetadata>,
    positions: HashMap<DocId, usize>,
}

impl VectorSnapshot {
    /// Validate and normalize `entries`. Nothing is mutated on error.
    pub fn build(entries: Vec<VectorEntry>, expected_dim: Option<usize>) -> Result<Self> {
        let Some(first) = entries.first() else {
            return Ok(Self { dimension: expected_dim.unwrap_or(0), ..Self::default() });
        };
        let dimension = expected_dim.unwrap_or(first.embedding.len());
        if dimension == 0 {
            return Err(Error::InvalidDocument(format!("document '{}' has an empty embedding", first.id)));
        }

        let mut positions = HashMap::with_capacity(entries.len());
        for (i, e) in entries.iter().enumerate() {
            if e.id.is_empty() {
                return Err(Error::InvalidDocument("empty document id".into()));
            }
            if e.embedding.len() != dimension {
                return Err(Error::DimensionMismatch {
                    expected: dimension,
                    actual: e.embedding.len(),
                    context: format!("document '{}'", e.id),
                });
            }
            if positions.insert(e.id.clone(), i).is_some() {
                return Err(Error::InvalidDocument(format!("duplicate document id '{}'", e.id)));
            }
        }

        let mut ids = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len() * dimension);
        let mut metadata = Vec::with_capacity(entries.len());
        for VectorEntry { id, mut embedding, metadata: meta } in entries {
            l2_normalize(&mut embedding);
            values.extend_from_slice(&embedding);
            ids.push(id);
            metadata.push(meta);
        }
        Ok(Self { dimension, ids, values, metadata, positions })
    }

    /// Reassemble a persisted snapshot. Rows are taken as already normalized.
    fn from_parts(
        path: &Path,
        dimension: usize,
        values: Vec<f32>,
        metadata: Vec<DocumentMetadata>,
    ) -> Result<Self> {
        let count = if dimension == 0 { 0 } else { values.len() / dimension };
        if metadata.len() != count {
            return Err(Error::corrupt(
                path,
                format!("{} metadata records for {count} vectors", metadata.len()),
            ));
        }
        let ids: Vec<DocId> = metadata.iter().map(|m| m.id.clone()).collect();
        let mut positions = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), i).is_some() {
                return Err(Error::corrupt(path, format!("duplicate document id '{id}'")));
            }
        }
        Ok(Self { dimension, ids, values, metadata, positions })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn ids(&self) -> &[DocId] {
        &self.ids
    }

    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        let i = *self.positions.get(id)?;
        Some(&self.values[i * self.dimension..(i + 1) * self.dimension])
    }

    pub fn metadata(&self, id: &str) -> Option<&DocumentMetadata> {
        self.positions.get(id).map(|&i| &self.metadata[i])
    }

    pub(crate) fn metadata_at(&self, i: usize) -> &DocumentMetadata {
        &self.metadata[i]
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // `max(1)` keeps `chunks_exact` happy on a dimensionless empty snapshot.
        self.values.chunks_exact(self.dimension.max(1))
    }
}

/// A built vector snapshot plus its not-yet-committed files.
#[derive(Debug)]
pub struct StagedVectorIndex {
    snapshot: Arc<VectorSnapshot>,
    files: Option<(StagedFile, StagedFile)>,
}

impl StagedVectorIndex {
    pub fn snapshot(&self) -> &VectorSnapshot {
        &self.snapshot
    }
}

/// Brute-force cosine index with wholesale-replace snapshots.
pub struct VectorIndex {
    dir: Option<PathBuf>,
    expected_dim: Option<usize>,
    live: RwLock<Arc<VectorSnapshot>>,
}

impl VectorIndex {
    /// Open the snapshot persisted under `dir`, or start empty if none exists.
    ///
    /// With `expected_dim` set, a persisted snapshot of another dimension is
    /// rejected.
    pub fn open(dir: impl Into<PathBuf>, expected_dim: Option<usize>) -> Result<Self> {
        let dir = dir.into();
        let snapshot = load_snapshot(&dir)?.unwrap_or_default();
        if let Some(expected) = expected_dim {
            if !snapshot.is_empty() && snapshot.dimension != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: snapshot.dimension,
                    context: format!("snapshot {}", dir.join(VECTORS_FILE).display()),
                });
            }
        }
        Ok(Self { dir: Some(dir), expected_dim, live: RwLock::new(Arc::new(snapshot)) })
    }

    pub fn in_memory(expected_dim: Option<usize>) -> Self {
        Self { dir: None, expected_dim, live: RwLock::new(Arc::new(VectorSnapshot::default())) }
    }

    pub fn snapshot(&self) -> Arc<VectorSnapshot> {
        Arc::clone(&self.live.read())
    }

    pub fn count(&self) -> usize {
        self.live.read().len()
    }

    /// Dimension of the live snapshot, `None` while it is empty.
    pub fn dimension(&self) -> Option<usize> {
        let snap = self.live.read();
        (!snap.is_empty()).then_some(snap.dimension)
    }

    pub fn metadata(&self, id: &str) -> Option<DocumentMetadata> {
        self.live.read().metadata(id).cloned()
    }

    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<(DocId, f32, DocumentMetadata)>> {
        let snapshot = self.snapshot();
        let hits = snapshot.search(query, k, threshold)?;
        debug!(k, threshold, hits = hits.len(), "vector search");
        Ok(hits)
    }

    pub fn stage(&self, entries: Vec<VectorEntry>) -> Result<StagedVectorIndex> {
        let snapshot = Arc::new(VectorSnapshot::build(entries, self.expected_dim)?);
        let files = match &self.dir {
            Some(dir) => Some(stage_files(dir, &snapshot)?),
            None => None,
        };
        Ok(StagedVectorIndex { snapshot, files })
    }

    /// Commit both files, then swap the live snapshot.
    ///
    /// Renames and swap happen under the live write guard, so concurrent
    /// publishes land whole and in the same order on disk and in memory.
    /// The two renames are not one atomic step. If the metadata rename fails
    /// the previous matrix is written back, or removed when no snapshot was
    /// persisted before; memory is untouched either way.
    pub fn publish(&self, staged: StagedVectorIndex) -> Result<()> {
        let mut live = self.live.write();
        if let (Some((matrix, meta)), Some(dir)) = (staged.files, &self.dir) {
            let persisted = dir.join(VECTORS_FILE).exists();
            if let Err(e) = matrix.commit() {
                meta.discard();
                return Err(e);
            }
            if let Err(e) = meta.commit() {
                restore_matrix(dir, persisted.then_some(&**live));
                return Err(e);
            }
        }
        let count = staged.snapshot.len();
        let dimension = staged.snapshot.dimension;
        *live = staged.snapshot;
        drop(live);
        info!(count, dimension, "vector index published");
        Ok(())
    }

    pub fn discard(&self, staged: StagedVectorIndex) {
        if let Some((matrix, meta)) = staged.files {
            matrix.discard();
            meta.discard();
        }
    }

    pub fn replace_all(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let staged = self.stage(entries)?;
        self.publish(staged)
    }
}

fn load_snapshot(dir: &Path) -> Result<Option<VectorSnapshot>> {
    let matrix_path = dir.join(VECTORS_FILE);
    let meta_path = dir.join(VECTORS_META_FILE);
    let matrix = read_if_exists(&matrix_path)?;
    let meta = read_if_exists(&meta_path)?;

    let (matrix, meta) = match (matrix, meta) {
        (None, None) => {
            debug!("no vector snapshot under {}, starting empty", dir.display());
            return Ok(None);
        }
        (Some(m), Some(j)) => (m, j),
        (Some(_), None) => return Err(Error::corrupt(&meta_path, "missing; vectors.bin exists without it")),
        (None, Some(_)) => return Err(Error::corrupt(&matrix_path, "missing; metadata exists without it")),
    };

    let (count, dimension, values) = decode_matrix(&matrix_path, &matrix)?;
    let metadata: Vec<DocumentMetadata> =
        serde_json::from_slice(&meta).map_err(|e| Error::serialization(&meta_path, e))?;
    if metadata.len() != count {
        return Err(Error::corrupt(&meta_path, format!("{} records but vectors.bin holds {count}", metadata.len())));
    }
    let snapshot = VectorSnapshot::from_parts(&matrix_path, dimension, values, metadata)?;
    info!(count, dimension, "loaded vector snapshot from {}", dir.display());
    Ok(Some(snapshot))
}

/// Undo a matrix rename whose metadata rename failed: write `previous` back,
/// or remove the matrix when nothing was persisted before.
fn restore_matrix(dir: &Path, previous: Option<&VectorSnapshot>) {
    let matrix_path = dir.join(VECTORS_FILE);
    let restored = match previous {
        Some(snapshot) => stage_matrix(dir, snapshot).and_then(StagedFile::commit),
        None => fs::remove_file(&matrix_path).map_err(|e| Error::io(&matrix_path, e)),
    };
    if let Err(e) = restored {
        warn!("could not restore {} after failed publish: {e}", matrix_path.display());
    }
}

fn stage_matrix(dir: &Path, snapshot: &VectorSnapshot) -> Result<StagedFile> {
    let bytes = encode_matrix(snapshot.len(), snapshot.dimension, &snapshot.values)?;
    stage_bytes(&dir.join(VECTORS_FILE), &bytes)
}

fn stage_files(dir: &Path, snapshot: &VectorSnapshot) -> Result<(StagedFile, StagedFile)> {
    let meta_path = dir.join(VECTORS_META_FILE);
    let meta_bytes = serde_json::to_vec(&snapshot.metadata).map_err(|e| Error::serialization(&meta_path, e))?;
    let matrix = stage_matrix(dir, snapshot)?;
    match stage_bytes(&meta_path, &meta_bytes) {
        Ok(meta) => Ok((matrix, meta)),
        Err(e) => {
            matrix.discard();
            Err(e)
        }
    }
}

impl VectorIndexer for VectorIndex {
    type Staged = StagedVectorIndex;

    fn stage(&self, entries: Vec<VectorEntry>) -> Result<Self::Staged> {
        Self::stage(self, entries)
    }
    fn publish(&self, staged: Self::Staged) -> Result<()> {
        Self::publish(self, staged)
    }
    fn discard(&self, staged: Self::Staged) {
        Self::discard(self, staged);
    }
    fn search_vec(&self, query: &[f32], k: usize, score_threshold: f32) -> Result<Vec<SearchHit>> {
        Ok(self
            .search(query, k, score_threshold)?
            .into_iter()
            .map(|(id, score, meta)| SearchHit { id, score, source: SourceKind::Vector, metadata: Some(meta) })
            .collect())
    }
    fn metadata(&self, id: &str) -> Option<DocumentMetadata> {
        Self::metadata(self, id)
    }
    fn dimension(&self) -> Option<usize> {
        Self::dimension(self)
    }
    fn count(&self) -> usize {
        Self::count(self)
    }
}
