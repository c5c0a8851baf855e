//! Document loading, chunking and the SQLite-backed vector index.

pub mod document;
pub mod error;
pub mod index;

pub use error::IndexError;
pub use index::{IndexDirectory, IndexMeta, RebuildGuard, RetrievedChunk, VectorIndex};
