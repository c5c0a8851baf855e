//! Single-document question-answering session.
//!
//! A session owns its directory, the committed index handle and the state machine
//! `Idle -> Indexing -> Ready -> Answering -> Ready`. Only one operation runs at a
//! time; a second one fails with [`SessionError::Busy`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use docqa_llm::LlmError;
use docqa_llm::provider::{LlmProvider, Message};
use docqa_memory::document::{
    EmbedFn, IngestionPipeline, SplitterConfig, TextSplitter, loader_for_extension,
};
use docqa_memory::{IndexDirectory, RebuildGuard, RetrievedChunk, VectorIndex};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{Config, TimeoutConfig};
use crate::error::SessionError;
use crate::prompt::build_prompt;
use crate::upload::{UploadedFile, save_upload, validate_extension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Indexing,
    Ready,
    Answering,
}

impl SessionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Answering => "answering",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer text returned verbatim from the model, plus the retrieved context.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

/// The document behind the committed index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub name: String,
    /// Stored copy of the upload; `None` once a later failed upload overwrote it.
    pub path: Option<PathBuf>,
    pub records: usize,
    pub chunks: usize,
    pub document_hash: String,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub document: Option<DocumentInfo>,
    pub embedding_model: String,
}

/// Values a session needs, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub dir: PathBuf,
    pub embedding_model: String,
    pub splitter: SplitterConfig,
    pub max_file_size: u64,
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub timeouts: TimeoutConfig,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            dir: config.session.dir.clone(),
            embedding_model: config.embedding.effective_model().to_owned(),
            splitter: SplitterConfig {
                chunk_size: config.chunking.chunk_size,
                chunk_overlap: config.chunking.chunk_overlap,
            },
            max_file_size: config.chunking.max_file_size,
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
            timeouts: config.timeouts,
        }
    }
}

pub struct Session<P> {
    settings: SessionSettings,
    index_dir: IndexDirectory,
    generator: P,
    embedder: P,
    state: Mutex<SessionState>,
    index: RwLock<Option<VectorIndex>>,
    document: Mutex<Option<DocumentInfo>>,
    cancel: Mutex<CancellationToken>,
}

impl<P> std::fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dir", &self.settings.dir)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Resets the session state when an operation ends, including on early return or drop.
/// Ending in `Idle` also forgets the indexed document.
struct OperationGuard<'a> {
    state: &'a Mutex<SessionState>,
    document: &'a Mutex<Option<DocumentInfo>>,
    on_exit: SessionState,
}

impl OperationGuard<'_> {
    fn finish(mut self, state: SessionState) {
        self.on_exit = state;
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if self.on_exit == SessionState::Idle {
            *self.document.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = self.on_exit;
    }
}

impl<P> Session<P> {
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.settings.dir
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state(),
            document: self
                .document
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            embedding_model: self.settings.embedding_model.clone(),
        }
    }

    /// Cancel the operation in flight, if any.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn begin(
        &self,
        next: SessionState,
    ) -> Result<(OperationGuard<'_>, CancellationToken), SessionError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match (*state, next) {
            (SessionState::Indexing | SessionState::Answering, _) => {
                return Err(SessionError::Busy);
            }
            (SessionState::Idle, SessionState::Answering) => return Err(SessionError::NoIndex),
            _ => {}
        }
        let prior = *state;
        *state = next;

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();

        Ok((
            OperationGuard {
                state: &self.state,
                document: &self.document,
                on_exit: prior,
            },
            token,
        ))
    }
}

impl<P> Session<P>
where
    P: LlmProvider + Clone + 'static,
{
    /// Create a session. `generator` answers questions, `embedder` embeds chunks and questions.
    ///
    /// # Errors
    ///
    /// Returns an error if the splitter settings are invalid or `embedder` cannot embed.
    pub fn new(settings: SessionSettings, generator: P, embedder: P) -> Result<Self, SessionError> {
        settings.splitter.validate()?;
        if !embedder.supports_embeddings() {
            return Err(SessionError::EmbeddingUnsupported(embedder.name().to_owned()));
        }
        Ok(Self {
            index_dir: IndexDirectory::new(settings.dir.clone()),
            settings,
            generator,
            embedder,
            state: Mutex::new(SessionState::Idle),
            index: RwLock::new(None),
            document: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Save an uploaded file, parse it and rebuild the index from it.
    ///
    /// The previous index stays usable if the rebuild fails.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnsupportedFileType`] before touching the disk for a
    /// rejected extension, [`SessionError::Busy`] while another operation runs, and
    /// the underlying failure otherwise.
    pub async fn upload(&self, file: UploadedFile) -> Result<DocumentInfo, SessionError> {
        let ext = validate_extension(&file.name)?;
        let (mut guard, cancel) = self.begin(SessionState::Indexing)?;

        let span = tracing::info_span!("upload", file = %file.name, bytes = file.bytes.len());
        let result = self
            .index_upload(&file, &ext, &mut guard, &cancel)
            .instrument(span)
            .await;

        match result {
            Ok(info) => {
                guard.finish(SessionState::Ready);
                Ok(info)
            }
            Err(e) => {
                tracing::warn!(state = %guard.on_exit, "upload failed: {e}");
                Err(e)
            }
        }
    }

    /// Runs the indexing pipeline, keeping `guard.on_exit` at the state a failure
    /// or a dropped future must leave behind.
    async fn index_upload(
        &self,
        file: &UploadedFile,
        ext: &str,
        guard: &mut OperationGuard<'_>,
        cancel: &CancellationToken,
    ) -> Result<DocumentInfo, SessionError> {
        let prior = guard.on_exit;

        let path = save_upload(&self.settings.dir, file).await?;
        self.forget_overwritten(&path);
        let document_hash = blake3::hash(&file.bytes).to_hex().to_string();

        let loader = loader_for_extension(ext, self.settings.max_file_size)?;
        let documents = loader.load(&path).await?;

        let pipeline = IngestionPipeline::new(
            TextSplitter::new(self.settings.splitter.clone()),
            self.guarded_embed_fn(cancel.clone()),
        );
        let chunks = pipeline.split(&documents);
        if chunks.is_empty() {
            return Err(SessionError::EmptyDocument);
        }
        tracing::info!(records = documents.len(), chunks = chunks.len(), "document split");

        let mut index = self.index.write().await;
        // No open handle from here until one is installed again.
        guard.on_exit = SessionState::Idle;
        if let Some(old) = index.take() {
            old.close().await;
        }

        let rebuild = match self.index_dir.begin().await {
            Ok(rebuild) => rebuild,
            Err(e) => {
                guard.on_exit = self.reopen(&mut index, prior, None).await;
                return Err(e.into());
            }
        };

        tracing::debug!(replacing = rebuild.had_previous(), "index rebuild started");

        let staging = rebuild.staging_path();
        let built: Result<(), SessionError> = async {
            let rows = pipeline.embed(chunks).await?;
            let new_index = VectorIndex::build(
                &staging,
                &rows,
                &self.settings.embedding_model,
                &document_hash,
            )
            .await?;
            new_index.close().await;
            Ok(())
        }
        .await;

        if let Err(e) = built {
            guard.on_exit = self.reopen(&mut index, prior, Some(rebuild)).await;
            return Err(e);
        }

        if let Err(e) = rebuild.commit().await {
            guard.on_exit = self.reopen(&mut index, prior, None).await;
            return Err(e.into());
        }

        let committed = VectorIndex::open(&self.index_dir.committed_path()).await?;
        let info = DocumentInfo {
            name: file.name.clone(),
            path: Some(path),
            records: documents.len(),
            chunks: committed.len(),
            document_hash,
        };
        tracing::info!(chunks = info.chunks, hash = %info.document_hash, "index committed");

        *index = Some(committed);
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
        Ok(info)
    }

    /// The stored copy of the indexed document no longer exists once `path` is rewritten.
    fn forget_overwritten(&self, path: &Path) {
        let mut document = self.document.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(doc) = document.as_mut()
            && doc.path.as_deref() == Some(path)
        {
            doc.path = None;
        }
    }

    /// Roll back a failed rebuild and reopen the previous index if this session built one.
    /// Returns the state the session falls back to.
    async fn reopen(
        &self,
        index: &mut Option<VectorIndex>,
        prior: SessionState,
        rebuild: Option<RebuildGuard>,
    ) -> SessionState {
        let restored = match rebuild {
            Some(rebuild) => rebuild.rollback().await,
            None => self.index_dir.has_committed(),
        };
        if prior != SessionState::Ready || !restored {
            return SessionState::Idle;
        }
        match VectorIndex::open(&self.index_dir.committed_path()).await {
            Ok(previous) => {
                *index = Some(previous);
                SessionState::Ready
            }
            Err(e) => {
                tracing::error!("failed to reopen previous index: {e}");
                SessionState::Idle
            }
        }
    }

    /// Answer a question against the committed index.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoIndex`] before any successful upload,
    /// [`SessionError::Busy`] while another operation runs, and model or index
    /// failures otherwise.
    pub async fn ask(&self, question: &str) -> Result<Answer, SessionError> {
        let (guard, cancel) = self.begin(SessionState::Answering)?;

        let span = tracing::info_span!("question", chars = question.chars().count());
        let answer = self.answer(question, &cancel).instrument(span).await?;

        guard.finish(SessionState::Ready);
        Ok(answer)
    }

    async fn answer(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer, SessionError> {
        let index = self.index.read().await;
        let index = index.as_ref().ok_or(SessionError::NoIndex)?;

        let query = guarded(
            self.embedder.embed(question),
            self.settings.timeouts.embedding_seconds,
            cancel,
        )
        .await
        .map_err(SessionError::from_embedding)?;

        let sources = index
            .search(&query, self.settings.top_k, self.settings.min_score)
            .await?;
        tracing::debug!(hits = sources.len(), "retrieved context");

        let prompt = build_prompt(&sources, question);
        let text = guarded(
            self.generator.chat(&[Message::user(prompt)]),
            self.settings.timeouts.llm_seconds,
            cancel,
        )
        .await
        .map_err(SessionError::from_generation)?;

        Ok(Answer { text, sources })
    }

    fn guarded_embed_fn(&self, cancel: CancellationToken) -> EmbedFn {
        let embedder = self.embedder.clone();
        let seconds = self.settings.timeouts.embedding_seconds;
        Box::new(move |text: &str| {
            let embedder = embedder.clone();
            let cancel = cancel.clone();
            let text = text.to_owned();
            Box::pin(async move { guarded(embedder.embed(&text), seconds, &cancel).await })
        })
    }
}

/// Race a model call against its timeout and the cancellation token.
async fn guarded<T>(
    fut: impl Future<Output = Result<T, LlmError>>,
    seconds: u64,
    cancel: &CancellationToken,
) -> Result<T, LlmError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::info!("model call cancelled by user");
            Err(LlmError::Cancelled)
        }
        r = tokio::time::timeout(Duration::from_secs(seconds), fut) => {
            r.map_err(|_| LlmError::Timeout { seconds })?
        }
    }
}
