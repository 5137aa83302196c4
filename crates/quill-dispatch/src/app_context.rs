//! Application context owned by the dispatcher.
//!
//! The mutable state the control panel operates on - selected completion
//! model, source-document list, retriever handle, key/value store - lives in
//! one explicit object instead of ambient globals, so concurrent triggers
//! share it through a single owner.

use std::sync::{Arc, Mutex};

use quill_core::error::{QuillError, Result};

use quill_context::retrieval::{Retriever, SourceDocument};
use quill_context::store::KeyValueStore;

/// Shared application state behind the dispatcher and the control panel.
pub struct AppContext {
    model: Mutex<String>,
    sources: Mutex<Vec<SourceDocument>>,
    retriever: Arc<dyn Retriever>,
    store: Arc<KeyValueStore>,
}

impl AppContext {
    pub fn new(
        model: impl Into<String>,
        retriever: Arc<dyn Retriever>,
        store: Arc<KeyValueStore>,
    ) -> Self {
        Self {
            model: Mutex::new(model.into()),
            sources: Mutex::new(Vec::new()),
            retriever,
            store,
        }
    }

    /// The currently selected completion model.
    pub fn model(&self) -> String {
        self.model.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Snapshot of the registered source documents.
    pub fn sources(&self) -> Vec<SourceDocument> {
        self.sources.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    /// Add a source document (URL page or uploaded file) and rebuild the
    /// retrieval index wholesale.
    pub async fn add_source(&self, document: SourceDocument) -> Result<usize> {
        {
            let mut sources = self
                .sources
                .lock()
                .map_err(|e| QuillError::Retrieval(format!("Sources mutex poisoned: {}", e)))?;
            sources.push(document);
        }
        self.rebuild_index().await
    }

    /// Switch the completion model and rebuild the retrieval index, matching
    /// the control panel's model-selector behavior.
    pub async fn set_model(&self, name: &str) -> Result<usize> {
        {
            let mut model = self
                .model
                .lock()
                .map_err(|e| QuillError::Completion(format!("Model mutex poisoned: {}", e)))?;
            *model = name.to_string();
        }
        tracing::info!(model = %name, "Completion model switched");
        self.rebuild_index().await
    }

    async fn rebuild_index(&self) -> Result<usize> {
        // Snapshot before awaiting; the sources lock must not be held across
        // the index call.
        let snapshot = self.sources();
        self.retriever.index(&snapshot).await
    }
}

// =============================================================================
// Tests
// =============================================================================
