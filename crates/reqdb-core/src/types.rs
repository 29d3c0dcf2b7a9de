//! Domain types shared by the keyword and vector engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DocId = String;

/// A structured requirement record as supplied by the document source.
///
/// - `normalized_text`: cleaned requirement sentence used for retrieval
/// - `raw_text`: the requirement exactly as written in the source
/// - `action`/`classification`/`constraint_description`: tagged fields folded
///   into the searchable text
/// - `constraint_type`/`requirement_type`/`criticality`: carried as metadata
/// - `entities`: tag (e.g. "systems", "actors") to extracted entity strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: DocId,
    pub normalized_text: String,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub constraint_type: Option<String>,
    #[serde(default)]
    pub constraint_description: Option<String>,
    #[serde(default)]
    pub requirement_type: Option<String>,
    #[serde(default)]
    pub criticality: Option<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<String>>,
}

impl Requirement {
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            id: self.id.clone(),
            normalized_text: self.normalized_text.clone(),
            raw_text: self.raw_text.clone(),
            constraint_type: self.constraint_type.clone(),
            requirement_type: self.requirement_type.clone(),
            criticality: self.criticality.clone(),
        }
    }
}

/// Payload returned alongside hits. Never scored.
///
/// This is also the element type of the vector metadata sidecar file, so its
/// field names are part of the on-disk format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: DocId,
    pub normalized_text: String,
    pub raw_text: String,
    pub constraint_type: Option<String>,
    pub requirement_type: Option<String>,
    pub criticality: Option<String>,
}

/// One entry handed to the vector index on rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: DocId,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Text,
    Hybrid,
}

/// The minimal surface returned by all engines.
///
/// `score` is engine-specific (cosine, BM25 or fused RRF) but higher is
/// always better. `source` labels the origin engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub score: f32,
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

impl SearchHit {
    pub fn new(id: impl Into<DocId>, score: f32, source: SourceKind) -> Self {
        Self { id: id.into(), score, source, metadata: None }
    }
}

/// Which backend(s) a query is routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Vector,
    Keyword,
}

impl std::str::FromStr for SearchMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "vector" | "semantic" => Ok(Self::Vector),
            "keyword" | "bm25" | "text" => Ok(Self::Keyword),
            other => Err(crate::error::Error::InvalidConfig(format!("unknown search mode '{other}'"))),
        }
    }
}
