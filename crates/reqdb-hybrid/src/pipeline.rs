use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{error, info};

use reqdb_core::error::{Error, Result};
use reqdb_core::traits::{TextIndexer, VectorIndexer};
use reqdb_core::types::{DocId, Requirement, VectorEntry};

const FIELD_SEPARATOR: &str = " | ";

/// Text that is both tokenized for BM25 and handed to the embedding provider.
///
/// Normalized text, raw text, then the tagged fields (`action: ...`,
/// `classification: ...`, `constraint: ...` and one `tag: a, b` part per
/// entity tag), blank parts skipped, joined with `" | "` and lowercased.
pub fn build_searchable_text(req: &Requirement) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut push = |part: String| {
        if !part.trim().is_empty() {
            parts.push(part);
        }
    };

    push(req.normalized_text.clone());
    push(req.raw_text.clone());
    let tagged = [
        ("action", &req.action),
        ("classification", &req.classification),
        ("constraint", &req.constraint_description),
    ];
    for (tag, value) in tagged {
        if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            push(format!("{tag}: {v}"));
        }
    }
    for (tag, values) in &req.entities {
        let values: Vec<&str> = values.iter().map(String::as_str).filter(|v| !v.trim().is_empty()).collect();
        if !values.is_empty() {
            push(format!("{tag}: {}", values.join(", ")));
        }
    }

    parts.join(FIELD_SEPARATOR).to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    /// Corpus dimension after the ingestion, `None` for an empty corpus.
    pub dimension: Option<usize>,
    pub vocabulary_size: usize,
    pub elapsed: Duration,
}

/// Write side of the hybrid index. Every ingestion replaces both indexes.
pub struct IngestionPipeline<TI, VI>
where
    TI: TextIndexer,
    VI: VectorIndexer,
{
    text: Arc<TI>,
    vector: Arc<VI>,
    gate: Arc<RwLock<()>>,
    writer: Mutex<()>,
}

impl<TI, VI> IngestionPipeline<TI, VI>
where
    TI: TextIndexer,
    VI: VectorIndexer,
{
    pub fn new(text: Arc<TI>, vector: Arc<VI>, gate: Arc<RwLock<()>>) -> Self {
        Self { text, vector, gate, writer: Mutex::new(()) }
    }

    /// Rebuild both indexes from `requirements`, `embeddings[i]` belonging to
    /// `requirements[i]`.
    ///
    /// Both snapshots are staged before either is published, so validation
    /// and write failures leave the live indexes untouched. If the vector
    /// publish fails after the keyword publish went through, the keyword
    /// index is rolled back before the error is returned. Once both publishes
    /// succeed the replaced keyword snapshot is released.
    pub fn ingest(&self, requirements: &[Requirement], embeddings: Vec<Vec<f32>>) -> Result<IngestReport> {
        if embeddings.len() != requirements.len() {
            return Err(Error::CountMismatch { documents: requirements.len(), embeddings: embeddings.len() });
        }

        let _writer = self.writer.lock();
        let started = Instant::now();

        let documents: Vec<(DocId, String)> =
            requirements.iter().map(|r| (r.id.clone(), build_searchable_text(r))).collect();
        let entries: Vec<VectorEntry> = requirements
            .iter()
            .zip(embeddings)
            .map(|(r, embedding)| VectorEntry { id: r.id.clone(), embedding, metadata: r.metadata() })
            .collect();

        let staged_text = self.text.stage(&documents)?;
        let staged_vector = match self.vector.stage(entries) {
            Ok(staged) => staged,
            Err(e) => {
                self.text.discard(staged_text);
                return Err(e);
            }
        };

        {
            let _gate = self.gate.write();
            if let Err(e) = self.text.publish(staged_text) {
                self.vector.discard(staged_vector);
                return Err(e);
            }
            if let Err(e) = self.vector.publish(staged_vector) {
                if let Err(rollback) = self.text.rollback() {
                    error!("keyword rollback after failed vector publish also failed: {rollback}");
                }
                return Err(e);
            }
            self.text.forget_previous();
        }

        let report = IngestReport {
            documents: requirements.len(),
            dimension: self.vector.dimension(),
            vocabulary_size: self.text.vocabulary_size(),
            elapsed: started.elapsed(),
        };
        info!(
            documents = report.documents,
            dimension = ?report.dimension,
            terms = report.vocabulary_size,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingestion published"
        );
        Ok(report)
    }
}
