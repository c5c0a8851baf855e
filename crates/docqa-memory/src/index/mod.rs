//! Persistent vector index stored in a single `SQLite` file.
//!
//! Rows are written once by [`VectorIndex::build`] and never updated. Search is an
//! exhaustive cosine-similarity scan, which is adequate for one document.

mod swap;

use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::document::EmbeddedChunk;
use crate::error::IndexError;

pub use swap::{
    INDEX_DIR, IndexDirectory, LOCK_FILE, PREVIOUS_DIR, RebuildGuard, STAGING_DIR,
};

/// File name of the database inside an index directory.
pub const INDEX_FILE: &str = "index.db";

/// Build-time facts recorded in the `meta` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    /// blake3 hex digest of the uploaded file.
    pub document_hash: String,
}

/// A chunk returned by [`VectorIndex::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub ordinal: usize,
    pub text: String,
    pub score: f32,
    pub source: String,
    pub page: Option<u32>,
    pub chunk_index: usize,
}

#[derive(Debug)]
pub struct VectorIndex {
    pool: SqlitePool,
    dir: PathBuf,
    meta: IndexMeta,
}

impl VectorIndex {
    /// Write a fresh index into `dir`, which must not already hold one.
    ///
    /// Ordinals follow the order of `rows`.
    ///
    /// # Errors
    ///
    /// Returns an error if `rows` is empty, embeddings disagree on dimension,
    /// or the database cannot be written.
    pub async fn build(
        dir: &Path,
        rows: &[EmbeddedChunk],
        embedding_model: &str,
        document_hash: &str,
    ) -> Result<Self, IndexError> {
        let dimension = rows.first().ok_or(IndexError::Empty)?.embedding.len();
        if dimension == 0 {
            return Err(IndexError::Corrupt("embedding has zero dimensions".into()));
        }
        if let Some(bad) = rows.iter().find(|r| r.embedding.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.embedding.len(),
            });
        }

        tokio::fs::create_dir_all(dir).await?;
        let pool = connect(&dir.join(INDEX_FILE), true).await?;

        let mut tx = pool.begin().await?;
        for (ordinal, row) in rows.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (ordinal, source, page, chunk_index, start_offset, content, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(i64::try_from(ordinal)?)
            .bind(&row.chunk.metadata.source)
            .bind(row.chunk.metadata.page)
            .bind(i64::try_from(row.chunk.chunk_index)?)
            .bind(i64::try_from(row.chunk.start)?)
            .bind(&row.chunk.content)
            .bind(encode_vector(&row.embedding))
            .execute(&mut *tx)
            .await?;
        }

        let meta = IndexMeta {
            embedding_model: embedding_model.to_owned(),
            dimension,
            chunk_count: rows.len(),
            document_hash: document_hash.to_owned(),
        };
        for (key, value) in [
            ("embedding_model", meta.embedding_model.clone()),
            ("dimension", meta.dimension.to_string()),
            ("chunk_count", meta.chunk_count.to_string()),
            ("document_hash", meta.document_hash.clone()),
        ] {
            sqlx::query("INSERT INTO meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(dir = %dir.display(), chunks = meta.chunk_count, dimension, "index written");

        Ok(Self {
            pool,
            dir: dir.to_path_buf(),
            meta,
        })
    }

    /// Open a previously built index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Missing`] if `dir` holds no index, or an error if
    /// the database or its metadata cannot be read.
    pub async fn open(dir: &Path) -> Result<Self, IndexError> {
        let file = dir.join(INDEX_FILE);
        if !tokio::fs::try_exists(&file).await? {
            return Err(IndexError::Missing(dir.to_path_buf()));
        }
        let pool = connect(&file, false).await?;
        let meta = read_meta(&pool).await?;
        Ok(Self {
            pool,
            dir: dir.to_path_buf(),
            meta,
        })
    }

    /// Return up to `k` chunks ranked by cosine similarity to `query`.
    ///
    /// Equal scores keep ordinal order. Chunks scoring below `min_score` are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` has the wrong dimension or rows cannot be read.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        if query.len() != self.meta.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.meta.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64, String, Option<u32>, i64, String, Vec<u8>)> = sqlx::query_as(
            "SELECT ordinal, source, page, chunk_index, content, embedding FROM chunks ORDER BY ordinal",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for (ordinal, source, page, chunk_index, text, blob) in rows {
            let embedding = decode_vector(&blob)?;
            let score = cosine_similarity(query, &embedding);
            if min_score.is_some_and(|min| score < min) {
                continue;
            }
            hits.push(RetrievedChunk {
                ordinal: usize::try_from(ordinal)?,
                text,
                score,
                source,
                page,
                chunk_index: usize::try_from(chunk_index)?,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        hits.truncate(k);
        Ok(hits)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.meta.chunk_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meta.chunk_count == 0
    }

    #[must_use]
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Close the pool so every write reaches the database file.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn connect(file: &Path, create: bool) -> Result<SqlitePool, IndexError> {
    let opts = SqliteConnectOptions::new()
        .filename(file)
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(opts)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    Ok(pool)
}

async fn read_meta(pool: &SqlitePool) -> Result<IndexMeta, IndexError> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM meta")
        .fetch_all(pool)
        .await?;

    let get = |key: &str| {
        rows.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| IndexError::Corrupt(format!("missing meta key {key}")))
    };
    let parse = |key: &str| -> Result<usize, IndexError> {
        get(key)?
            .parse()
            .map_err(|e| IndexError::Corrupt(format!("invalid meta value for {key}: {e}")))
    };

    Ok(IndexMeta {
        embedding_model: get("embedding_model")?,
        dimension: parse("dimension")?,
        chunk_count: parse("chunk_count")?,
        document_hash: get("document_hash")?,
    })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Result<Vec<f32>, IndexError> {
    if blob.len() % 4 != 0 {
        return Err(IndexError::Corrupt(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
