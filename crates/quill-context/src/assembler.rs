//! Context assembly for outgoing queries.
//!
//! Three steps, in order: clipboard substitution, the update-command short
//! circuit, and top-k retrieval. The update check wins over everything
//! downstream: when it fires, no retrieval or completion call happens and
//! the response is a confirmation string naming the stored key.

use std::sync::Arc;

use regex::Regex;

use quill_core::error::Result;

use crate::clipboard::ClipboardAccess;
use crate::retrieval::Retriever;
use crate::store::KeyValueStore;

/// Outcome of assembling one raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// Send to the completion service.
    Query {
        final_query: String,
        system_context: String,
    },
    /// Update command handled locally; nothing goes to the completion service.
    Updated { key: String, confirmation: String },
}

/// Builds the final query from a raw transcript, the persisted store, the
/// clipboard, and the retrieval index.
pub struct ContextAssembler {
    store: Arc<KeyValueStore>,
    retriever: Arc<dyn Retriever>,
    clipboard: Arc<dyn ClipboardAccess>,
    clipboard_phrases: Vec<Regex>,
    update_command: Regex,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<KeyValueStore>,
        retriever: Arc<dyn Retriever>,
        clipboard: Arc<dyn ClipboardAccess>,
    ) -> Self {
        let clipboard_phrases = ["clipboard", "clip board"]
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)).expect("Invalid trigger-phrase regex"))
            .collect();
        let update_command = Regex::new("(?i)update").expect("Invalid update-command regex");
        Self {
            store,
            retriever,
            clipboard,
            clipboard_phrases,
            update_command,
        }
    }

    /// The store this assembler reads from and writes update commands to.
    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    /// Run the assembly pipeline on `raw_text`.
    pub async fn assemble(&self, raw_text: &str, k: usize) -> Result<Assembled> {
        // Step 1: clipboard substitution.
        let text = self.substitute_clipboard(raw_text);

        // Step 2: update command takes priority over all further processing.
        if let Some(key) = self.update_key(&text) {
            let value = self.read_clipboard();
            self.store.set(key.clone(), value)?;
            tracing::info!(key = %key, "Stored clipboard content from update command");
            return Ok(Assembled::Updated {
                confirmation: format!("Updated {} with the clipboard contents.", key),
                key,
            });
        }

        // Step 3: retrieval. Failure degrades to an empty context.
        let system_context = match self.retriever.retrieve(&text, k).await {
            Ok(chunks) => chunks
                .iter()
                .map(|c| c.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed; continuing without context");
                String::new()
            }
        };

        Ok(Assembled::Query {
            final_query: text,
            system_context,
        })
    }

    /// Replace the first occurrence of each trigger phrase with the current
    /// clipboard content, verbatim.
    fn substitute_clipboard(&self, text: &str) -> String {
        if !self
            .clipboard_phrases
            .iter()
            .any(|phrase| phrase.is_match(text))
        {
            return text.to_string();
        }

        let content = self.read_clipboard();
        let mut text = text.to_string();
        for phrase in &self.clipboard_phrases {
            if let Some(range) = phrase.find(&text).map(|m| m.range()) {
                text.replace_range(range, &content);
            }
        }
        text
    }

    /// Everything after the first "update" token, trimmed and lowercased.
    /// An empty key is accepted verbatim.
    fn update_key(&self, text: &str) -> Option<String> {
        self.update_command
            .find(text)
            .map(|found| text[found.end()..].trim().to_lowercase())
    }

    fn read_clipboard(&self) -> String {
        match self.clipboard.read() {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "Clipboard read failed; treating as empty");
                String::new()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::clipboard::MemoryClipboard;
    use crate::retrieval::{Chunk, SourceDocument};

    /// Retriever returning fixed chunks and counting calls.
    struct FixedRetriever {
        chunks: Vec<String>,
        calls: AtomicUsize,
    }

    impl FixedRetriever {
        fn new(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn index(&self, _documents: &[SourceDocument]) -> Result<usize> {
            Ok(0)
        }

        async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<Chunk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .chunks
                .iter()
                .take(k)
                .map(|c| Chunk {
                    content: c.clone(),
                    origin: "fixed".to_string(),
                    score: 1.0,
                })
                .collect())
        }
    }

    fn assembler_with(
        clipboard: &str,
        chunks: &[&str],
    ) -> (tempfile::TempDir, Arc<FixedRetriever>, ContextAssembler) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KeyValueStore::open(dir.path().join("data.json")));
        let retriever = Arc::new(FixedRetriever::new(chunks));
        let assembler = ContextAssembler::new(
            store,
            Arc::clone(&retriever) as Arc<dyn Retriever>,
            Arc::new(MemoryClipboard::new(clipboard)),
        );
        (dir, retriever, assembler)
    }

    #[tokio::test]
    async fn test_plain_query_gets_retrieval_context() {
        let (_dir, retriever, assembler) =
            assembler_with("", &["A is true.", "B is false."]);

        let result = assembler.assemble("what is a", 2).await.unwrap();
        match result {
            Assembled::Query {
                final_query,
                system_context,
            } => {
                assert_eq!(final_query, "what is a");
                assert_eq!(system_context, "A is true.\n\nB is false.");
            }
            other => panic!("expected query, got {:?}", other),
        }
        assert_eq!(retriever.call_count(), 1);
    }

    #[tokio::test]
    async fn test_clipboard_phrase_substituted_before_retrieval() {
        let (_dir, _retriever, assembler) = assembler_with("42 Main St", &[]);

        let result = assembler
            .assemble("please use my clipboard info", 2)
            .await
            .unwrap();
        match result {
            Assembled::Query { final_query, .. } => {
                assert_eq!(final_query, "please use my 42 Main St info");
            }
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clipboard_substitution_case_insensitive() {
        let (_dir, _retriever, assembler) = assembler_with("X", &[]);

        let result = assembler.assemble("paste the CLIPBOARD here", 2).await.unwrap();
        match result {
            Assembled::Query { final_query, .. } => {
                assert_eq!(final_query, "paste the X here");
            }
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clipboard_substitution_first_occurrence_only() {
        let (_dir, _retriever, assembler) = assembler_with("X", &[]);

        let result = assembler
            .assemble("clipboard and clipboard again", 2)
            .await
            .unwrap();
        match result {
            Assembled::Query { final_query, .. } => {
                assert_eq!(final_query, "X and clipboard again");
            }
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spaced_phrase_substituted() {
        let (_dir, _retriever, assembler) = assembler_with("X", &[]);

        let result = assembler.assemble("use the clip board now", 2).await.unwrap();
        match result {
            Assembled::Query { final_query, .. } => {
                assert_eq!(final_query, "use the X now");
            }
            other => panic!("expected query, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_command_short_circuits() {
        let (_dir, retriever, assembler) = assembler_with("Senior Engineer", &["chunk"]);

        let result = assembler.assemble("update resume", 2).await.unwrap();
        match result {
            Assembled::Updated { key, confirmation } => {
                assert_eq!(key, "resume");
                assert!(confirmation.contains("resume"));
            }
            other => panic!("expected update, got {:?}", other),
        }

        assert_eq!(
            assembler.store().get("resume").as_deref(),
            Some("Senior Engineer")
        );
        // No retrieval step ran.
        assert_eq!(retriever.call_count(), 0);
    }

    #[tokio::test]
    async fn test_update_command_case_insensitive_and_lowercased() {
        let (_dir, _retriever, assembler) = assembler_with("val", &[]);

        let result = assembler.assemble("please Update My Address", 2).await.unwrap();
        match result {
            Assembled::Updated { key, .. } => assert_eq!(key, "my address"),
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(assembler.store().get("my address").as_deref(), Some("val"));
    }

    #[tokio::test]
    async fn test_update_with_empty_key_accepted() {
        let (_dir, _retriever, assembler) = assembler_with("orphan value", &[]);

        let result = assembler.assemble("update", 2).await.unwrap();
        match result {
            Assembled::Updated { key, .. } => assert_eq!(key, ""),
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(assembler.store().get("").as_deref(), Some("orphan value"));
    }

    #[tokio::test]
    async fn test_update_preserves_other_entries() {
        let (_dir, _retriever, assembler) = assembler_with("new", &[]);
        assembler.store().set("existing", "kept").unwrap();

        assembler.assemble("update fresh", 2).await.unwrap();
        assert_eq!(assembler.store().get("existing").as_deref(), Some("kept"));
        assert_eq!(assembler.store().get("fresh").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_retrieval_respects_k() {
        let (_dir, _retriever, assembler) =
            assembler_with("", &["one", "two", "three"]);

        let result = assembler.assemble("anything", 2).await.unwrap();
        match result {
            Assembled::Query { system_context, .. } => {
                assert_eq!(system_context, "one\n\ntwo");
            }
            other => panic!("expected query, got {:?}", other),
        }
    }

    /// Retriever that always fails.
    struct BrokenRetriever;

    #[async_trait]
    impl Retriever for BrokenRetriever {
        async fn index(&self, _documents: &[SourceDocument]) -> Result<usize> {
            Err(quill_core::QuillError::Retrieval("down".to_string()))
        }

        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<Chunk>> {
            Err(quill_core::QuillError::Retrieval("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = ContextAssembler::new(
            Arc::new(KeyValueStore::open(dir.path().join("data.json"))),
            Arc::new(BrokenRetriever),
            Arc::new(MemoryClipboard::default()),
        );

        let result = assembler.assemble("hello", 2).await.unwrap();
        match result {
            Assembled::Query { system_context, .. } => assert!(system_context.is_empty()),
            other => panic!("expected query, got {:?}", other),
        }
    }
}
