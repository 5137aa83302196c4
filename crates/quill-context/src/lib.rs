//! Quill context crate - persisted key/value data, retrieval, and query
//! assembly.
//!
//! The `ContextAssembler` turns a raw transcript into the final query sent
//! to the completion service: clipboard substitution first, then the
//! update-command short circuit, then top-k retrieval merged into the
//! system context.

pub mod assembler;
pub mod clipboard;
pub mod completion;
pub mod retrieval;
pub mod store;

pub use assembler::{Assembled, ContextAssembler};
pub use clipboard::{ClipboardAccess, MemoryClipboard};
pub use completion::{CompletionRequest, CompletionService};
pub use retrieval::{
    Chunk, EmbeddingService, HashedEmbedding, MemoryRetriever, Retriever, SourceDocument,
};
pub use store::KeyValueStore;
