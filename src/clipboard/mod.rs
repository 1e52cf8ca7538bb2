//! Clipboard monitor
//!
//! Polls the pasteboard on a fixed interval, filters out noise, stores new
//! items and hands them to the enrichment pipeline.
//!
//! Filter chain for text, in order:
//! 1. empty or whitespace only
//! 2. fewer than `min_length` non-whitespace characters
//! 3. exact match of a known debug-log signature
//! 4. identical to the most recently stored item
//!
//! Images are written to `<data>/images/<id>.png` and stored with a
//! placeholder until the AI collaborator describes them.

pub mod arboard;

use crate::config::{ClipboardConfig, NotificationConfig};
use crate::enrich::Enricher;
use crate::error::ClipboardError;
use crate::focus::FocusProvider;
use crate::item::{ClipboardItem, ItemId};
use crate::notification::{self, NotifyKind};
use crate::store::ItemStore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// What the pasteboard currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    Text(String),
    Image { width: u32, height: u32, rgba: Vec<u8> },
}

/// Access to the system pasteboard
pub trait Pasteboard: Send {
    /// Opaque counter that changes whenever the content changes
    fn change_count(&mut self) -> Result<u64, ClipboardError>;

    /// Current payload, image preferred over text
    fn read(&mut self) -> Result<Option<ClipboardPayload>, ClipboardError>;

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;

    fn write_image(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<(), ClipboardError>;
}

/// Shared handle to the pasteboard
///
/// Constructed once and passed to the monitor and the daemon, so the agent's
/// own writes go through the same backend that tracks changes.
#[derive(Clone)]
pub struct ClipboardService {
    inner: Arc<Mutex<Box<dyn Pasteboard>>>,
}

impl ClipboardService {
    pub fn new(pasteboard: Box<dyn Pasteboard>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pasteboard)),
        }
    }

    /// Service over the system clipboard
    pub fn system() -> Self {
        Self::new(Box::new(arboard::ArboardPasteboard::new()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn Pasteboard>>, ClipboardError> {
        self.inner
            .lock()
            .map_err(|_| ClipboardError::Unavailable("pasteboard lock poisoned".to_string()))
    }

    pub fn change_count(&self) -> Result<u64, ClipboardError> {
        self.lock()?.change_count()
    }

    pub fn read(&self) -> Result<Option<ClipboardPayload>, ClipboardError> {
        self.lock()?.read()
    }

    pub fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.lock()?.write_text(text)
    }

    /// Put a stored PNG back on the pasteboard
    pub fn write_png(&self, path: &Path) -> Result<(), ClipboardError> {
        let image = image::open(path)
            .map_err(|e| ClipboardError::ImageEncoding(e.to_string()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        self.lock()?.write_image(width, height, image.as_raw())
    }
}

/// Why a text payload was not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    TooShort,
    DebugSignature,
    Duplicate,
}

/// Text filter chain
#[derive(Debug, Clone)]
pub struct ContentFilter {
    min_length: usize,
    signatures: Vec<String>,
}

impl ContentFilter {
    pub fn new(min_length: usize, signatures: Vec<String>) -> Self {
        Self {
            min_length,
            signatures,
        }
    }

    pub fn from_config(config: &ClipboardConfig) -> Self {
        Self::new(config.min_length, config.ignored_signatures.clone())
    }

    /// Check `text` against the chain; `latest` is the most recent stored content
    pub fn check(&self, text: &str, latest: Option<&str>) -> Result<(), Rejection> {
        if text.trim().is_empty() {
            return Err(Rejection::Empty);
        }
        if text.chars().filter(|c| !c.is_whitespace()).count() < self.min_length {
            return Err(Rejection::TooShort);
        }
        if self.signatures.iter().any(|s| s == text) {
            return Err(Rejection::DebugSignature);
        }
        if latest == Some(text) {
            return Err(Rejection::Duplicate);
        }
        Ok(())
    }
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    /// Changed, but nothing readable was on the pasteboard
    NoContent,
    Rejected(Rejection),
    Stored(ItemId),
}

/// Polls the pasteboard and turns changes into stored items
pub struct ClipboardMonitor {
    service: ClipboardService,
    store: Arc<ItemStore>,
    focus: Arc<dyn FocusProvider>,
    enricher: Option<Arc<Enricher>>,
    filter: ContentFilter,
    images_dir: PathBuf,
    store_images: bool,
    notifications: NotificationConfig,
    last_count: Option<u64>,
}

impl ClipboardMonitor {
    pub fn new(
        service: ClipboardService,
        store: Arc<ItemStore>,
        focus: Arc<dyn FocusProvider>,
        config: &ClipboardConfig,
        images_dir: PathBuf,
    ) -> Self {
        Self {
            service,
            store,
            focus,
            enricher: None,
            filter: ContentFilter::from_config(config),
            images_dir,
            store_images: config.images,
            notifications: NotificationConfig::default(),
            last_count: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.notifications = notifications;
        self
    }

    /// Snapshot the change counter so content present at start-up is skipped
    pub fn activate(&mut self) {
        match self.service.change_count() {
            Ok(count) => {
                self.last_count = Some(count);
                tracing::debug!("Clipboard monitor armed at change count {}", count);
            }
            Err(e) => tracing::warn!("Clipboard unavailable at start-up: {}", e),
        }
    }

    /// Check the pasteboard once
    pub async fn poll_once(&mut self) -> Result<PollOutcome, ClipboardError> {
        let count = self.service.change_count()?;
        match self.last_count {
            Some(last) if last == count => return Ok(PollOutcome::Unchanged),
            None => {
                // Never armed: treat the first observation as the baseline
                self.last_count = Some(count);
                return Ok(PollOutcome::Unchanged);
            }
            Some(_) => {}
        }

        let payload = self.service.read()?;
        let latest = match payload {
            Some(ClipboardPayload::Text(_)) => self.store.latest_content()?,
            _ => None,
        };
        // Only a change that could be read counts as seen; a failed read is
        // retried on the next poll
        self.last_count = Some(count);

        let Some(payload) = payload else {
            return Ok(PollOutcome::NoContent);
        };

        let item = match payload {
            ClipboardPayload::Text(text) => {
                if let Err(rejection) = self.filter.check(&text, latest.as_deref()) {
                    tracing::debug!("Clipboard text rejected: {:?}", rejection);
                    return Ok(PollOutcome::Rejected(rejection));
                }
                let source_app = self.focus.frontmost_app().await;
                ClipboardItem::text(text, source_app)
            }
            ClipboardPayload::Image {
                width,
                height,
                rgba,
            } => {
                if !self.store_images {
                    return Ok(PollOutcome::NoContent);
                }
                let id = ItemId::new();
                let path = self.images_dir.join(format!("{}.png", id));
                write_png(&path, width, height, rgba).await?;
                let source_app = self.focus.frontmost_app().await;
                ClipboardItem::image(id, path, source_app)
            }
        };

        if let Err(e) = self.store.insert(&item) {
            tracing::error!("Failed to save clipboard item: {}", e);
            if let Some(ref path) = item.image_path {
                let _ = std::fs::remove_file(path);
            }
            notification::notify(
                &self.notifications,
                NotifyKind::SaveFailure,
                "Clippy",
                "Failed to save clipboard item",
            )
            .await;
            return Err(ClipboardError::Persist(e));
        }

        tracing::info!(
            "Stored {} item {} from {}",
            item.content_type,
            item.id,
            item.source_app.as_deref().unwrap_or("unknown app")
        );

        let id = item.id;
        if let Some(ref enricher) = self.enricher {
            enricher.submit(item);
        }
        Ok(PollOutcome::Stored(id))
    }

    /// Poll until `shutdown` flips to true. Polls never overlap.
    pub async fn run(mut self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        self.activate();
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Clipboard monitoring started ({}ms)", poll_interval.as_millis());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!("Clipboard poll failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Clipboard monitoring stopped");
    }
}

/// Encode RGBA pixels as PNG at `path`
async fn write_png(path: &Path, width: u32, height: u32, rgba: Vec<u8>) -> Result<(), ClipboardError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let image = image::RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
            ClipboardError::ImageEncoding(format!("pixel buffer does not match {}x{}", width, height))
        })?;
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| ClipboardError::ImageEncoding(e.to_string()))
    })
    .await
    .map_err(|e| ClipboardError::ImageEncoding(format!("Task join error: {}", e)))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::item::ContentType;

    /// In-memory pasteboard driven by tests
    #[derive(Default)]
    pub struct FakePasteboard {
        pub count: Arc<Mutex<u64>>,
        pub payload: Arc<Mutex<Option<ClipboardPayload>>>,
        pub written: Arc<Mutex<Vec<ClipboardPayload>>>,
        /// Reads left to fail before the payload comes through
        pub failing_reads: Arc<Mutex<u32>>,
    }

    impl Pasteboard for FakePasteboard {
        fn change_count(&mut self) -> Result<u64, ClipboardError> {
            Ok(*self.count.lock().unwrap())
        }
        fn read(&mut self) -> Result<Option<ClipboardPayload>, ClipboardError> {
            let mut failing = self.failing_reads.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(ClipboardError::Unavailable("pasteboard busy".to_string()));
            }
            Ok(self.payload.lock().unwrap().clone())
        }
        fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
            self.written
                .lock()
                .unwrap()
                .push(ClipboardPayload::Text(text.to_string()));
            Ok(())
        }
        fn write_image(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<(), ClipboardError> {
            self.written.lock().unwrap().push(ClipboardPayload::Image {
                width,
                height,
                rgba: rgba.to_vec(),
            });
            Ok(())
        }
    }

    struct FixedFocus(&'static str);

    #[async_trait::async_trait]
    impl FocusProvider for FixedFocus {
        async fn frontmost_app(&self) -> Option<String> {
            Some(self.0.to_string())
        }
        async fn activate(&self, _app: &str) -> bool {
            true
        }
    }

    /// Shared handles to a fake pasteboard wired into a monitor
    struct Harness {
        count: Arc<Mutex<u64>>,
        payload: Arc<Mutex<Option<ClipboardPayload>>>,
        failing_reads: Arc<Mutex<u32>>,
        store: Arc<ItemStore>,
        monitor: ClipboardMonitor,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let fake = FakePasteboard::default();
            let count = fake.count.clone();
            let payload = fake.payload.clone();
            let failing_reads = fake.failing_reads.clone();
            let store = Arc::new(ItemStore::open_in_memory().unwrap());
            let dir = tempfile::TempDir::new().unwrap();
            let monitor = ClipboardMonitor::new(
                ClipboardService::new(Box::new(fake)),
                store.clone(),
                Arc::new(FixedFocus("Terminal")),
                &ClipboardConfig::default(),
                dir.path().join("images"),
            );
            Self {
                count,
                payload,
                failing_reads,
                store,
                monitor,
                _dir: dir,
            }
        }

        fn copy(&self, payload: ClipboardPayload) {
            *self.payload.lock().unwrap() = Some(payload);
            *self.count.lock().unwrap() += 1;
        }

        fn copy_text(&self, text: &str) {
            self.copy(ClipboardPayload::Text(text.to_string()));
        }
    }

    #[test]
    fn test_filter_chain_order() {
        let filter = ContentFilter::new(3, vec!["DEBUG: ready".to_string()]);
        assert_eq!(filter.check("", None), Err(Rejection::Empty));
        assert_eq!(filter.check(" \n\t ", None), Err(Rejection::Empty));
        assert_eq!(filter.check("a b", None), Err(Rejection::TooShort));
        assert_eq!(filter.check("DEBUG: ready", None), Err(Rejection::DebugSignature));
        assert_eq!(filter.check("hello", Some("hello")), Err(Rejection::Duplicate));
        assert_eq!(filter.check("hello", Some("world")), Ok(()));
        // Short-but-duplicate is reported as too short
        assert_eq!(filter.check("ab", Some("ab")), Err(Rejection::TooShort));
    }

    #[test]
    fn test_signature_match_is_exact() {
        let filter = ContentFilter::new(3, vec!["DEBUG: ready".to_string()]);
        assert_eq!(filter.check("DEBUG: ready now", None), Ok(()));
    }

    #[tokio::test]
    async fn test_preexisting_content_is_skipped() {
        let mut h = Harness::new();
        h.copy_text("copied before start");
        h.monitor.activate();
        assert_eq!(h.monitor.poll_once().await.unwrap(), PollOutcome::Unchanged);
        assert_eq!(h.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_new_text_is_stored_with_source_app() {
        let mut h = Harness::new();
        h.monitor.activate();
        h.copy_text("ssh deploy@example.com");

        let PollOutcome::Stored(id) = h.monitor.poll_once().await.unwrap() else {
            panic!("text not stored");
        };
        let item = h.store.get(&id).unwrap().unwrap();
        assert_eq!(item.content, "ssh deploy@example.com");
        assert_eq!(item.source_app.as_deref(), Some("Terminal"));

        // No change since: nothing happens
        assert_eq!(h.monitor.poll_once().await.unwrap(), PollOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_failed_read_is_retried() {
        let mut h = Harness::new();
        h.monitor.activate();
        h.copy_text("copied while the pasteboard was busy");
        *h.failing_reads.lock().unwrap() = 1;

        assert!(matches!(
            h.monitor.poll_once().await,
            Err(ClipboardError::Unavailable(_))
        ));
        assert_eq!(h.store.count().unwrap(), 0);

        let PollOutcome::Stored(id) = h.monitor.poll_once().await.unwrap() else {
            panic!("change lost after a failed read");
        };
        let item = h.store.get(&id).unwrap().unwrap();
        assert_eq!(item.content, "copied while the pasteboard was busy");
        assert_eq!(h.monitor.poll_once().await.unwrap(), PollOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_duplicate_copy_creates_no_item() {
        let mut h = Harness::new();
        h.monitor.activate();
        h.copy_text("same thing twice");
        h.monitor.poll_once().await.unwrap();
        h.copy_text("same thing twice");
        assert_eq!(
            h.monitor.poll_once().await.unwrap(),
            PollOutcome::Rejected(Rejection::Duplicate)
        );
        assert_eq!(h.store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_short_and_empty_payloads_rejected() {
        let mut h = Harness::new();
        h.monitor.activate();
        h.copy_text("   ");
        assert_eq!(
            h.monitor.poll_once().await.unwrap(),
            PollOutcome::Rejected(Rejection::Empty)
        );
        h.copy_text("ok");
        assert_eq!(
            h.monitor.poll_once().await.unwrap(),
            PollOutcome::Rejected(Rejection::TooShort)
        );
        assert_eq!(h.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_image_written_as_png() {
        let mut h = Harness::new();
        h.monitor.activate();
        h.copy(ClipboardPayload::Image {
            width: 2,
            height: 1,
            rgba: vec![255, 0, 0, 255, 0, 255, 0, 255],
        });

        let PollOutcome::Stored(id) = h.monitor.poll_once().await.unwrap() else {
            panic!("image not stored");
        };
        let item = h.store.get(&id).unwrap().unwrap();
        assert_eq!(item.content_type, ContentType::Image);
        assert_eq!(item.content, crate::item::IMAGE_PLACEHOLDER);
        let path = item.image_path.unwrap();
        assert!(path.ends_with(format!("{}.png", id)));
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
    }

    #[tokio::test]
    async fn test_bad_image_buffer_is_an_error() {
        let mut h = Harness::new();
        h.monitor.activate();
        h.copy(ClipboardPayload::Image {
            width: 10,
            height: 10,
            rgba: vec![0; 4],
        });
        assert!(matches!(
            h.monitor.poll_once().await,
            Err(ClipboardError::ImageEncoding(_))
        ));
        assert_eq!(h.store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_service_write_png_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("x.png");
        write_png(&path, 1, 1, vec![1, 2, 3, 255]).await.unwrap();

        let fake = FakePasteboard::default();
        let written = fake.written.clone();
        let service = ClipboardService::new(Box::new(fake));
        service.write_png(&path).unwrap();
        service.write_text("hello").unwrap();
        let written = written.lock().unwrap();
        assert_eq!(
            written[0],
            ClipboardPayload::Image {
                width: 1,
                height: 1,
                rgba: vec![1, 2, 3, 255]
            }
        );
        assert_eq!(written[1], ClipboardPayload::Text("hello".to_string()));
    }
}
