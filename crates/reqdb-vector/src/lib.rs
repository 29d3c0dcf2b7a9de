//! reqdb-vector
//!
//! Exact (brute-force) cosine similarity index over unit-normalized `f32`
//! embeddings, persisted as a row-major binary matrix plus a JSON metadata
//! sidecar. See `schema` for the file layout.

pub mod schema;
pub mod index;
pub mod search;

pub use index::{StagedVectorIndex, VectorIndex, VectorSnapshot};
pub use schema::{VECTORS_FILE, VECTORS_META_FILE};
pub use search::{cosine_similarity, dot, l2_normalize, NORM_EPSILON};
