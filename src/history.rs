//! History management on top of the item store
//!
//! Deleting an item also removes its vector entry and its image side file.
//! Both are best effort: the row is gone either way, leftovers are logged.

use crate::ai::VectorIndex;
use crate::error::StoreError;
use crate::item::{ClipboardItem, ItemId};
use crate::store::ItemStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct History {
    store: Arc<ItemStore>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl History {
    pub fn new(store: Arc<ItemStore>, index: Option<Arc<dyn VectorIndex>>) -> Self {
        Self { store, index }
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.store
    }

    /// Most recent items first
    pub fn list(&self, limit: usize) -> Result<Vec<ClipboardItem>, StoreError> {
        self.store.fetch_recent(limit)
    }

    /// Delete one item and its side data
    pub async fn delete(&self, id: &ItemId) -> Result<ClipboardItem, StoreError> {
        let item = self
            .store
            .delete(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.cascade(&item).await;
        tracing::info!("Deleted item {}", id);
        Ok(item)
    }

    /// Delete everything, optionally sparing favourites. Returns the count removed.
    pub async fn clear(&self, keep_favorites: bool) -> Result<usize, StoreError> {
        let removed = self.store.clear(keep_favorites)?;
        for item in &removed {
            self.cascade(item).await;
        }
        tracing::info!(
            "Cleared {} items{}",
            removed.len(),
            if keep_favorites { " (favourites kept)" } else { "" }
        );
        Ok(removed.len())
    }

    /// Record that a surfaced item was accepted
    pub fn accept(&self, id: &ItemId) -> Result<(), StoreError> {
        self.store.increment_usage(id)
    }

    pub fn set_favorite(&self, id: &ItemId, favorite: bool) -> Result<(), StoreError> {
        self.store.set_favorite(id, favorite)
    }

    async fn cascade(&self, item: &ClipboardItem) {
        if let (Some(index), Some(vector_id)) = (&self.index, &item.vector_id) {
            if let Err(e) = index.remove(vector_id).await {
                tracing::warn!("Failed to remove vector {} for {}: {}", vector_id, item.id, e);
            }
        }

        if let Some(ref path) = item.image_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!("Removed image {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove image {:?}: {}", path, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::tests::FakeAi;

    fn history() -> (History, Arc<FakeAi>) {
        let ai = Arc::new(FakeAi::default());
        let store = Arc::new(ItemStore::open_in_memory().unwrap());
        (History::new(store, Some(ai.clone())), ai)
    }

    #[tokio::test]
    async fn test_delete_cascades_to_vector_and_image() {
        let (history, ai) = history();
        let dir = tempfile::TempDir::new().unwrap();
        let id = ItemId::new();
        let path = dir.path().join(format!("{}.png", id));
        std::fs::write(&path, b"png").unwrap();

        let mut item = ClipboardItem::image(id, path.clone(), None);
        item.vector_id = Some("vec-1".to_string());
        history.store().insert(&item).unwrap();

        let removed = history.delete(&id).await.unwrap();
        assert_eq!(removed.id, id);
        assert!(!path.exists());
        assert_eq!(*ai.removed.lock().unwrap(), vec!["vec-1".to_string()]);
        assert!(history.store().get(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (history, _) = history();
        let err = history.delete(&ItemId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clear_keeps_favorites() {
        let (history, ai) = history();
        let keep = ClipboardItem::text("keep me", None);
        let mut drop = ClipboardItem::text("drop me", None);
        drop.vector_id = Some("vec-drop".to_string());
        history.store().insert(&keep).unwrap();
        history.store().insert(&drop).unwrap();
        history.set_favorite(&keep.id, true).unwrap();

        assert_eq!(history.clear(true).await.unwrap(), 1);
        assert_eq!(history.list(10).unwrap().len(), 1);
        assert_eq!(*ai.removed.lock().unwrap(), vec!["vec-drop".to_string()]);

        assert_eq!(history.clear(false).await.unwrap(), 1);
        assert!(history.list(10).unwrap().is_empty());
    }

    #[test]
    fn test_accept_counts_usage() {
        let (history, _) = history();
        let item = ClipboardItem::text("hello", None);
        history.store().insert(&item).unwrap();
        history.accept(&item.id).unwrap();
        history.accept(&item.id).unwrap();
        assert_eq!(history.store().get(&item.id).unwrap().unwrap().usage_count, 2);
    }

    #[test]
    fn test_favorite_missing_item() {
        let (history, _) = history();
        assert!(history.set_favorite(&ItemId::new(), true).is_err());
    }
}
