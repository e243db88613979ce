//! The stateful chat session: one index, one chain, one transcript.
//!
//! A [`ChatSession`] is owned by its caller and passed by `&mut` into
//! [`ChatSession::ingest`], [`ChatSession::ask`] and [`ChatSession::reset`].
//! Ingest is replace-then-build: the previous index and chain are dropped
//! before the new ones are constructed, so a failed ingest leaves the
//! session with neither.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chain::RetrievalChain;
use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::llm::LlmConnector;
use crate::models::{Chunk, SourceSnippet, Turn};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Conversation chain not initialized. Process data first.")]
    Uninitialized,
    #[error("No text chunks to index")]
    EmptyCorpus,
    #[error("Error creating vector store: {0}")]
    IndexBuild(String),
    #[error("Error setting up conversation chain: {0}")]
    ChainSetup(String),
    #[error("Error processing question: {0}")]
    Ask(String),
}

/// External services an ingest binds the session to.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmConnector>,
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub chunk_count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub transcript: Vec<Turn>,
    pub sources: Vec<SourceSnippet>,
}

#[derive(Default)]
pub struct ChatSession {
    index: Option<Arc<VectorIndex>>,
    chain: Option<RetrievalChain>,
    transcript: Vec<Turn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.chain.is_some()
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_deref()
    }

    /// Index `chunks` and bind a fresh chain with empty memory.
    pub async fn ingest(
        &mut self,
        chunks: Vec<Chunk>,
        providers: &Providers,
    ) -> Result<IngestReport, SessionError> {
        self.index = None;
        self.chain = None;
        self.transcript.clear();

        if chunks.is_empty() {
            return Err(SessionError::EmptyCorpus);
        }
        let chunk_count = chunks.len();

        let index = VectorIndex::build(chunks, providers.embedder.as_ref())
            .await
            .map_err(|e| {
                warn!(error = %e, "vector index build failed");
                SessionError::IndexBuild(format!("{:#}", e))
            })?;
        let index = Arc::new(index);

        let llm = providers.llm.connect().map_err(|e| {
            warn!(error = %e, "LLM client setup failed");
            SessionError::ChainSetup(format!("{:#}", e))
        })?;

        self.chain = Some(RetrievalChain::new(
            Arc::clone(&index),
            Arc::clone(&providers.embedder),
            llm,
            providers.top_k,
        ));
        self.index = Some(index);

        info!(chunks = chunk_count, "session ready");
        Ok(IngestReport {
            chunk_count,
            message: format!(
                "Data processed successfully! Created {} chunks for searching.",
                chunk_count
            ),
        })
    }

    /// Answer `question` against the indexed corpus. The transcript only
    /// grows when an answer is produced.
    pub async fn ask(&mut self, question: &str) -> Result<AskResponse, SessionError> {
        let chain = self.chain.as_mut().ok_or(SessionError::Uninitialized)?;

        let result = chain.ask(question).await.map_err(|e| {
            warn!(error = %e, "question failed");
            SessionError::Ask(format!("{:#}", e))
        })?;

        self.transcript.push(Turn::user(question));
        self.transcript.push(Turn::assistant(result.answer.clone()));

        Ok(AskResponse {
            answer: result.answer,
            transcript: self.transcript.clone(),
            sources: result.sources,
        })
    }

    /// Clear the conversation memory and transcript. `false` when there is
    /// no chain to clear. The index is kept.
    pub fn reset(&mut self) -> bool {
        match self.chain.as_mut() {
            Some(chain) => {
                chain.clear_memory();
                self.transcript.clear();
                true
            }
            None => false,
        }
    }
}
