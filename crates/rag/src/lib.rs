//! Retrieval index over HR policy documents.
//!
//! Documents are split into overlapping chunks, embedded through an
//! external embedding service, and held in an in-memory index that is
//! always a pure function of the currently ingested document set:
//! re-ingesting a document first drops every chunk of its previous
//! version, and the replacement set is published atomically.

pub mod answer;
pub mod chunker;
pub mod embedding;
pub mod index;

pub use answer::{
    compose_policy_prompt, sources_footer, GroundingPolicy, PromptBundle, UNGROUNDED_REPLY,
};
pub use chunker::ChunkerConfig;
pub use embedding::{EmbeddingClient, EmbeddingError, HttpEmbeddingClient};
pub use index::{
    DocumentMetadata, IndexError, PolicyChunk, PolicyIndex, RetrievalHit, SourceDocument,
};
