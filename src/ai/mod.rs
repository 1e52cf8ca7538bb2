//! AI collaborator and vector index
//!
//! Both are opaque async capabilities. The daemon only needs tags, answers
//! and image descriptions from the collaborator, and embed/search/remove
//! from the index. `sidecar::SidecarClient` implements both against a local
//! HTTP service; tests substitute fakes.

pub mod sidecar;

use crate::config::AiConfig;
use crate::error::AiError;
use crate::item::ClipboardItem;
use std::sync::Arc;

pub use sidecar::SidecarClient;

/// Text generation capability
#[async_trait::async_trait]
pub trait AiCollaborator: Send + Sync {
    /// Tags for `content`. `context` holds short previews of recent items.
    async fn generate_tags(
        &self,
        content: &str,
        app_name: Option<&str>,
        context: &[String],
    ) -> Result<Vec<String>, AiError>;

    /// Answer `question` using `context` as clipboard history.
    /// `Ok(None)` means the collaborator had nothing to say.
    async fn generate_answer(
        &self,
        question: &str,
        app_name: Option<&str>,
        context: &[ClipboardItem],
    ) -> Result<Option<String>, AiError>;

    /// Plain-text description of a PNG image
    async fn describe_image(&self, png: Vec<u8>) -> Result<String, AiError>;
}

/// Semantic search over stored items
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Index `item` and return its vector id
    async fn embed(&self, item: &ClipboardItem) -> Result<String, AiError>;

    /// Vector ids with raw similarity scores, best first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>, AiError>;

    async fn remove(&self, vector_id: &str) -> Result<(), AiError>;
}

/// Collaborator and optional index built from configuration
pub struct AiBackends {
    pub collaborator: Arc<dyn AiCollaborator>,
    pub index: Option<Arc<dyn VectorIndex>>,
}

/// Build the configured backends. The index is `None` when
/// `vector_search` is off, which keeps ranking in fallback mode.
pub fn create_backends(config: &AiConfig) -> Result<AiBackends, AiError> {
    let client = Arc::new(SidecarClient::new(config)?);
    let index: Option<Arc<dyn VectorIndex>> = if config.vector_search {
        Some(client.clone())
    } else {
        tracing::info!("Vector search disabled; ranking uses keyword overlap");
        None
    };
    Ok(AiBackends {
        collaborator: client,
        index,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted collaborator and index for tests
    #[derive(Default)]
    pub struct FakeAi {
        pub tags: Vec<String>,
        pub answer: Option<String>,
        pub description: String,
        pub fail: bool,
        pub similarities: Vec<(String, f32)>,
        pub embedded: Mutex<Vec<String>>,
        pub removed: Mutex<Vec<String>>,
        pub questions: Mutex<Vec<(String, usize)>>,
    }

    impl FakeAi {
        fn check(&self) -> Result<(), AiError> {
            if self.fail {
                Err(AiError::Network("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl AiCollaborator for FakeAi {
        async fn generate_tags(
            &self,
            _content: &str,
            _app_name: Option<&str>,
            _context: &[String],
        ) -> Result<Vec<String>, AiError> {
            self.check()?;
            Ok(self.tags.clone())
        }

        async fn generate_answer(
            &self,
            question: &str,
            _app_name: Option<&str>,
            context: &[ClipboardItem],
        ) -> Result<Option<String>, AiError> {
            self.check()?;
            self.questions
                .lock()
                .unwrap()
                .push((question.to_string(), context.len()));
            Ok(self.answer.clone())
        }

        async fn describe_image(&self, png: Vec<u8>) -> Result<String, AiError> {
            self.check()?;
            assert!(!png.is_empty());
            Ok(self.description.clone())
        }
    }

    #[async_trait::async_trait]
    impl VectorIndex for FakeAi {
        async fn embed(&self, item: &ClipboardItem) -> Result<String, AiError> {
            self.check()?;
            let vector_id = format!("vec-{}", item.id);
            self.embedded.lock().unwrap().push(vector_id.clone());
            Ok(vector_id)
        }

        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<(String, f32)>, AiError> {
            self.check()?;
            Ok(self.similarities.iter().take(limit).cloned().collect())
        }

        async fn remove(&self, vector_id: &str) -> Result<(), AiError> {
            self.removed.lock().unwrap().push(vector_id.to_string());
            Ok(())
        }
    }

    /// Similarities as the ranking engine expects them
    pub fn similarity_map(pairs: &[(String, f32)]) -> HashMap<String, f32> {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_backends_without_vector_search() {
        let config = AiConfig {
            vector_search: false,
            ..AiConfig::default()
        };
        let backends = create_backends(&config).unwrap();
        assert!(backends.index.is_none());

        let backends = create_backends(&AiConfig::default()).unwrap();
        assert!(backends.index.is_some());
    }

    #[test]
    fn test_similarity_map() {
        let map = similarity_map(&[("a".to_string(), 0.5), ("b".to_string(), 0.25)]);
        assert_eq!(map.get("a"), Some(&0.5));
        assert_eq!(map.len(), 2);
    }
}
