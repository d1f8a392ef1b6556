use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::chunker::{split_into_chunks, ChunkerConfig};
use crate::embedding::{EmbeddingClient, EmbeddingError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub policy_id: String,
    pub version: u32,
    pub effective_date: NaiveDate,
}

/// Raw document handed over by the document-store collaborator.
#[derive(Clone, Debug)]
pub struct SourceDocument {
    pub document_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Immutable indexed fragment of a policy document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

#[derive(Clone, Debug)]
pub struct RetrievalHit {
    pub chunk: PolicyChunk,
    pub score: f32,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("document `{0}` produced no chunks")]
    EmptyDocument(String),
}

/// In-memory vector index over policy chunks.
///
/// Reads are concurrent; a (re-)ingestion embeds the replacement chunk set
/// outside the lock and publishes it in one write-locked swap, so a search
/// never observes a half-updated document.
pub struct PolicyIndex {
    chunks: RwLock<Vec<PolicyChunk>>,
    embedder: Arc<dyn EmbeddingClient>,
    chunker: ChunkerConfig,
}

impl PolicyIndex {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, chunker: ChunkerConfig) -> Self {
        Self { chunks: RwLock::new(Vec::new()), embedder, chunker }
    }

    /// Ingest (or re-ingest) a document. Any chunks of a previous version
    /// are removed in the same publish, so the index never holds
    /// duplicates or orphans for a document id.
    pub async fn ingest(&self, document: SourceDocument) -> Result<usize, IndexError> {
        let pieces = split_into_chunks(&document.text, &self.chunker);
        if pieces.is_empty() {
            return Err(IndexError::EmptyDocument(document.document_id));
        }

        // Stage the full replacement set before touching the index.
        let mut staged = Vec::with_capacity(pieces.len());
        for (sequence, text) in pieces.into_iter().enumerate() {
            let embedding = self.embedder.embed(&text).await?;
            staged.push(PolicyChunk {
                chunk_id: format!("{}#{sequence:04}", document.document_id),
                document_id: document.document_id.clone(),
                text,
                embedding,
                metadata: document.metadata.clone(),
            });
        }

        let staged_len = staged.len();
        {
            let mut chunks = self.chunks.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            chunks.retain(|chunk| chunk.document_id != document.document_id);
            chunks.extend(staged);
        }

        info!(
            event_name = "index.document_ingested",
            document_id = %document.document_id,
            chunk_count = staged_len,
            "policy document ingested"
        );
        Ok(staged_len)
    }

    /// Rebuild the whole index from a document set. The replacement is
    /// staged fully before the swap, so concurrent searches see either the
    /// old index or the new one, never a mixture.
    pub async fn rebuild(&self, documents: Vec<SourceDocument>) -> Result<usize, IndexError> {
        let mut staged = Vec::new();
        for document in documents {
            let pieces = split_into_chunks(&document.text, &self.chunker);
            if pieces.is_empty() {
                return Err(IndexError::EmptyDocument(document.document_id));
            }
            for (sequence, text) in pieces.into_iter().enumerate() {
                let embedding = self.embedder.embed(&text).await?;
                staged.push(PolicyChunk {
                    chunk_id: format!("{}#{sequence:04}", document.document_id),
                    document_id: document.document_id.clone(),
                    text,
                    embedding,
                    metadata: document.metadata.clone(),
                });
            }
        }

        let staged_len = staged.len();
        *self.chunks.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = staged;

        info!(event_name = "index.rebuilt", chunk_count = staged_len, "policy index rebuilt");
        Ok(staged_len)
    }

    /// Remove every chunk for a document id. Returns the number removed.
    pub fn remove(&self, document_id: &str) -> usize {
        let mut chunks = self.chunks.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = chunks.len();
        chunks.retain(|chunk| chunk.document_id != document_id);
        before - chunks.len()
    }

    /// Top-k chunks by cosine similarity. Ties rank the newer document
    /// version first, then the lexically smaller document id, then chunk
    /// order, so results are fully deterministic.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>, IndexError> {
        let query_vector = self.embedder.embed(query).await?;

        let chunks = self.chunks.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut hits: Vec<RetrievalHit> = chunks
            .iter()
            .map(|chunk| RetrievalHit {
                score: cosine_similarity(&query_vector, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();
        drop(chunks);

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.chunk.metadata.version.cmp(&a.chunk.metadata.version))
                .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count() == 0
    }

    pub fn document_ids(&self) -> Vec<String> {
        let chunks = self.chunks.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut ids: Vec<String> = chunks.iter().map(|chunk| chunk.document_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Snapshot of the chunk ids currently indexed for a document.
    pub fn chunk_ids(&self, document_id: &str) -> Vec<String> {
        let chunks = self.chunks.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .map(|chunk| chunk.chunk_id.clone())
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
