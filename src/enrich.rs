//! Enrichment pipeline
//!
//! Every stored item gets one background job:
//! 1. images are described by the AI collaborator and the placeholder
//!    content is replaced with the description
//! 2. tags are generated and normalized
//! 3. the item is embedded in the vector index, when one is configured
//!
//! Each step that fails is logged and leaves the item as it was. Jobs are
//! independent tasks and are never retried.

use crate::ai::{AiCollaborator, VectorIndex};
use crate::item::{normalize_tags, ClipboardItem, ContentType};
use crate::store::ItemStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Previews of recent items sent as tagging context
const TAG_CONTEXT_ITEMS: usize = 3;
const TAG_CONTEXT_CHARS: usize = 100;

/// What a job managed to do
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub described: bool,
    pub tags: Vec<String>,
    pub vector_id: Option<String>,
}

#[derive(Clone)]
pub struct Enricher {
    ai: Arc<dyn AiCollaborator>,
    index: Option<Arc<dyn VectorIndex>>,
    store: Arc<ItemStore>,
}

impl Enricher {
    pub fn new(
        ai: Arc<dyn AiCollaborator>,
        index: Option<Arc<dyn VectorIndex>>,
        store: Arc<ItemStore>,
    ) -> Self {
        Self { ai, index, store }
    }

    /// Enrich `item` in a background task
    pub fn submit(&self, item: ClipboardItem) -> JoinHandle<EnrichReport> {
        let this = self.clone();
        tokio::spawn(async move { this.enrich(item).await })
    }

    /// Run every step for `item`
    pub async fn enrich(&self, mut item: ClipboardItem) -> EnrichReport {
        let mut report = EnrichReport::default();

        if item.content_type == ContentType::Image {
            match self.describe(&item).await {
                Some(description) => {
                    item.content = description;
                    item.content_type = ContentType::VisionExtracted;
                    report.described = true;
                }
                // Tagging or embedding the placeholder is pointless
                None => return report,
            }
        }

        if let Some(tags) = self.tag(&item).await {
            item.tags = tags.clone();
            report.tags = tags;
        }

        report.vector_id = self.embed(&item).await;

        tracing::debug!(
            "Enriched {}: described={}, tags={:?}, vector={:?}",
            item.id,
            report.described,
            report.tags,
            report.vector_id
        );
        report
    }

    async fn describe(&self, item: &ClipboardItem) -> Option<String> {
        let path = item.image_path.as_ref()?;
        let png = match tokio::fs::read(path).await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!("Cannot read image {:?}: {}", path, e);
                return None;
            }
        };

        let description = match self.ai.describe_image(png).await {
            Ok(d) if !d.trim().is_empty() => d.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Empty description for image {}", item.id);
                return None;
            }
            Err(e) => {
                tracing::warn!("Image description failed for {}: {}", item.id, e);
                return None;
            }
        };

        if let Err(e) = self.store.update_content(&item.id, &description) {
            tracing::warn!("Failed to store description for {}: {}", item.id, e);
            return None;
        }
        Some(description)
    }

    async fn tag(&self, item: &ClipboardItem) -> Option<Vec<String>> {
        let context: Vec<String> = match self.store.fetch_recent(TAG_CONTEXT_ITEMS + 1) {
            Ok(recent) => recent
                .iter()
                .filter(|other| other.id != item.id)
                .take(TAG_CONTEXT_ITEMS)
                .map(|other| other.preview(TAG_CONTEXT_CHARS))
                .collect(),
            Err(e) => {
                tracing::debug!("No tagging context: {}", e);
                Vec::new()
            }
        };

        let raw = match self
            .ai
            .generate_tags(&item.content, item.source_app.as_deref(), &context)
            .await
        {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!("Tag generation failed for {}: {}", item.id, e);
                return None;
            }
        };

        let tags = normalize_tags(raw);
        if tags.is_empty() {
            return None;
        }
        if let Err(e) = self.store.update_tags(&item.id, &tags) {
            tracing::warn!("Failed to store tags for {}: {}", item.id, e);
            return None;
        }
        Some(tags)
    }

    async fn embed(&self, item: &ClipboardItem) -> Option<String> {
        let index = self.index.as_ref()?;
        let vector_id = match index.embed(item).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Embedding failed for {}: {}", item.id, e);
                return None;
            }
        };
        if let Err(e) = self.store.set_vector_id(&item.id, &vector_id) {
            // Usually the item was deleted while the job ran; nothing would
            // ever point at this vector again
            tracing::warn!("Failed to store vector id for {}: {}", item.id, e);
            if let Err(e) = index.remove(&vector_id).await {
                tracing::warn!("Failed to drop orphaned vector {}: {}", vector_id, e);
            }
            return None;
        }
        Some(vector_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::tests::FakeAi;
    use crate::item::{ItemId, IMAGE_PLACEHOLDER};

    fn enricher(ai: FakeAi, with_index: bool) -> (Enricher, Arc<FakeAi>, Arc<ItemStore>) {
        let ai = Arc::new(ai);
        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        let index: Option<Arc<dyn VectorIndex>> = if with_index {
            Some(ai.clone())
        } else {
            None
        };
        (Enricher::new(ai.clone(), index, store.clone()), ai, store)
    }

    #[tokio::test]
    async fn test_text_item_gets_tags_and_vector() {
        let (enricher, _ai, store) = enricher(
            FakeAi {
                tags: vec!["Shipping".to_string(), " UPS ".to_string(), "shipping".to_string()],
                ..FakeAi::default()
            },
            true,
        );
        let item = ClipboardItem::text("1Z999AA10123456784", None);
        store.insert(&item).unwrap();

        let report = enricher.submit(item.clone()).await.unwrap();
        assert_eq!(report.tags, vec!["shipping", "ups"]);
        assert_eq!(report.vector_id, Some(format!("vec-{}", item.id)));

        let stored = store.get(&item.id).unwrap().unwrap();
        assert_eq!(stored.tags, vec!["shipping", "ups"]);
        assert_eq!(stored.vector_id, report.vector_id);
    }

    #[tokio::test]
    async fn test_failures_leave_item_unchanged() {
        let (enricher, _ai, store) = enricher(
            FakeAi {
                fail: true,
                ..FakeAi::default()
            },
            true,
        );
        let item = ClipboardItem::text("some text", None);
        store.insert(&item).unwrap();

        let report = enricher.enrich(item.clone()).await;
        assert_eq!(report, EnrichReport::default());
        assert_eq!(store.get(&item.id).unwrap().unwrap(), item);
    }

    #[tokio::test]
    async fn test_no_index_skips_embedding() {
        let (enricher, ai, store) = enricher(
            FakeAi {
                tags: vec!["code".to_string()],
                ..FakeAi::default()
            },
            false,
        );
        let item = ClipboardItem::text("fn main() {}", None);
        store.insert(&item).unwrap();

        let report = enricher.enrich(item).await;
        assert_eq!(report.tags, vec!["code"]);
        assert!(report.vector_id.is_none());
        assert!(ai.embedded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_image_is_described_then_tagged() {
        let dir = tempfile::TempDir::new().unwrap();
        let id = ItemId::new();
        let path = dir.path().join(format!("{}.png", id));
        image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let (enricher, _ai, store) = enricher(
            FakeAi {
                description: "A red square".to_string(),
                tags: vec!["image".to_string()],
                ..FakeAi::default()
            },
            true,
        );
        let item = ClipboardItem::image(id, path, Some("Preview".to_string()));
        assert_eq!(item.content, IMAGE_PLACEHOLDER);
        store.insert(&item).unwrap();

        let report = enricher.enrich(item).await;
        assert!(report.described);

        let stored = store.get(&id).unwrap().unwrap();
        assert_eq!(stored.content, "A red square");
        assert_eq!(stored.content_type, ContentType::VisionExtracted);
        assert_eq!(stored.tags, vec!["image"]);
        assert!(stored.vector_id.is_some());
    }

    #[tokio::test]
    async fn test_item_deleted_mid_job_drops_its_vector() {
        let (enricher, ai, store) = enricher(FakeAi::default(), true);
        // Never stored, as if deleted before the embedding came back
        let item = ClipboardItem::text("gone before embedding", None);

        let report = enricher.enrich(item.clone()).await;
        assert!(report.vector_id.is_none());

        let vector_id = format!("vec-{}", item.id);
        assert_eq!(*ai.embedded.lock().unwrap(), vec![vector_id.clone()]);
        assert_eq!(*ai.removed.lock().unwrap(), vec![vector_id]);
        assert!(store.get(&item.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_image_file_stops_the_job() {
        let (enricher, ai, store) = enricher(FakeAi::default(), true);
        let id = ItemId::new();
        let item = ClipboardItem::image(id, "/nonexistent/clippy.png".into(), None);
        store.insert(&item).unwrap();

        let report = enricher.enrich(item).await;
        assert!(!report.described);
        assert!(ai.embedded.lock().unwrap().is_empty());
        assert_eq!(store.get(&id).unwrap().unwrap().content, IMAGE_PLACEHOLDER);
    }
}
