//! Text replacement
//!
//! Deletes what the user typed into the focused field and types the answer
//! in its place, using synthetic key events:
//!
//! 1. release modifiers
//! 2. one backspace down/up pair per captured character
//! 3. settle delay
//! 4. release modifiers again
//! 5. insert: one bulk Unicode event if the backend can carry the text,
//!    else the accessibility API, else character by character
//!
//! There is no rollback. Whatever the target app made of a partial event
//! stream is left as is.

#[cfg(target_os = "macos")]
pub mod cgevent;
#[cfg(not(target_os = "macos"))]
pub mod enigo;
pub mod accessibility;

use crate::config::ReplacementConfig;
use crate::error::InjectError;
use crate::focus::FocusProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Low-level key synthesis
///
/// Implementations are created on the blocking thread that uses them, so
/// they need not be `Send`.
pub trait KeySynth {
    /// Post key-ups for every modifier so held keys don't alter synthetic events
    fn release_modifiers(&mut self) -> Result<(), InjectError>;

    /// Backspace key-down or key-up
    fn backspace(&mut self, down: bool) -> Result<(), InjectError>;

    /// Whether `text` can go out as one Unicode event
    fn supports_bulk(&self, text: &str) -> bool;

    /// Insert `text` as one synthetic event
    fn post_unicode(&mut self, text: &str) -> Result<(), InjectError>;

    /// Key-down or key-up producing a single character
    fn char_key(&mut self, c: char, down: bool) -> Result<(), InjectError>;

    /// Cmd+V / Ctrl+V
    fn paste_shortcut(&mut self) -> Result<(), InjectError>;
}

/// Writes text straight into the focused element through the platform
/// accessibility API
pub trait FocusedTextWriter: Send + Sync {
    /// Replace the focused element's selection with `text`.
    /// Returns false when the element does not support it.
    fn try_set_focused_text(&self, text: &str) -> bool;
}

/// Creates a synthesizer on the calling thread
pub type SynthFactory = Arc<dyn Fn() -> Result<Box<dyn KeySynth>, InjectError> + Send + Sync>;

/// Delays used by the replacement sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacementTiming {
    /// Between a backspace down and its up
    pub key_pair_delay: Duration,
    /// Between deleted characters
    pub char_delay: Duration,
    /// Between deletion and insertion
    pub settle_delay: Duration,
    /// Between a character's down and up in the fallback path
    pub insert_key_delay: Duration,
    /// Between characters in the fallback path
    pub insert_char_delay: Duration,
}

impl ReplacementTiming {
    pub fn from_config(config: &ReplacementConfig) -> Self {
        Self {
            key_pair_delay: Duration::from_millis(config.key_pair_delay_ms),
            char_delay: Duration::from_millis(config.char_delay_ms),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            insert_key_delay: Duration::from_millis(config.insert_key_delay_ms),
            insert_char_delay: Duration::from_millis(config.insert_char_delay_ms),
        }
    }

    /// No delays at all
    pub fn immediate() -> Self {
        Self {
            key_pair_delay: Duration::ZERO,
            char_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            insert_key_delay: Duration::ZERO,
            insert_char_delay: Duration::ZERO,
        }
    }
}

impl Default for ReplacementTiming {
    fn default() -> Self {
        Self::from_config(&ReplacementConfig::default())
    }
}

/// How the replacement text got in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStrategy {
    /// Nothing to insert
    Skipped,
    Bulk,
    Accessibility,
    CharByChar,
}

/// Outcome of a replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacementReport {
    pub deleted: usize,
    pub inserted: usize,
    pub strategy: InsertStrategy,
}

/// Longest Unicode string one synthetic event reliably carries; longer
/// text goes out as several events
pub const UNICODE_CHUNK_UTF16: usize = 20;

/// Whether `text` can be posted as Unicode events at all. Control
/// characters need real key codes.
pub fn bulk_insertable(text: &str) -> bool {
    !text.chars().any(char::is_control)
}

/// Split `text` into pieces of at most `max_units` UTF-16 code units,
/// never splitting a character
pub fn unicode_chunks(text: &str, max_units: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut units = 0;

    for (i, c) in text.char_indices() {
        let width = c.len_utf16();
        if units > 0 && units + width > max_units {
            chunks.push(&text[start..i]);
            start = i;
            units = 0;
        }
        units += width;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

fn pause(d: Duration) {
    if !d.is_zero() {
        std::thread::sleep(d);
    }
}

/// Run the full delete/settle/insert sequence on the current thread
///
/// `abort` is checked between events; when it is set the sequence stops
/// and reports how far it got.
pub fn run_replacement(
    synth: &mut dyn KeySynth,
    writer: &dyn FocusedTextWriter,
    captured_length: usize,
    replacement: &str,
    timing: &ReplacementTiming,
    abort: &AtomicBool,
) -> Result<ReplacementReport, InjectError> {
    let aborted = |deleted, inserted| InjectError::Aborted { deleted, inserted };

    synth.release_modifiers()?;

    for deleted in 0..captured_length {
        if abort.load(Ordering::SeqCst) {
            return Err(aborted(deleted, 0));
        }
        synth.backspace(true)?;
        pause(timing.key_pair_delay);
        synth.backspace(false)?;
        pause(timing.char_delay);
    }

    if replacement.is_empty() {
        return Ok(ReplacementReport {
            deleted: captured_length,
            inserted: 0,
            strategy: InsertStrategy::Skipped,
        });
    }

    if captured_length > 0 {
        pause(timing.settle_delay);
    }
    if abort.load(Ordering::SeqCst) {
        return Err(aborted(captured_length, 0));
    }

    synth.release_modifiers()?;

    let total = replacement.chars().count();

    if synth.supports_bulk(replacement) {
        synth.post_unicode(replacement)?;
        return Ok(ReplacementReport {
            deleted: captured_length,
            inserted: total,
            strategy: InsertStrategy::Bulk,
        });
    }

    if writer.try_set_focused_text(replacement) {
        return Ok(ReplacementReport {
            deleted: captured_length,
            inserted: total,
            strategy: InsertStrategy::Accessibility,
        });
    }

    tracing::debug!("Falling back to character-by-character insertion");
    for (inserted, c) in replacement.chars().enumerate() {
        if abort.load(Ordering::SeqCst) {
            return Err(aborted(captured_length, inserted));
        }
        synth.char_key(c, true)?;
        pause(timing.insert_key_delay);
        synth.char_key(c, false)?;
        pause(timing.insert_char_delay);
    }

    Ok(ReplacementReport {
        deleted: captured_length,
        inserted: total,
        strategy: InsertStrategy::CharByChar,
    })
}

/// Clears the in-flight flag when the blocking sequence ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Serialises replacements and runs them off the async runtime
pub struct ReplacementEngine {
    synth_factory: SynthFactory,
    writer: Arc<dyn FocusedTextWriter>,
    focus: Arc<dyn FocusProvider>,
    timing: ReplacementTiming,
    in_flight: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
}

impl ReplacementEngine {
    pub fn new(
        synth_factory: SynthFactory,
        writer: Arc<dyn FocusedTextWriter>,
        focus: Arc<dyn FocusProvider>,
        timing: ReplacementTiming,
    ) -> Self {
        Self {
            synth_factory,
            writer,
            focus,
            timing,
            in_flight: Arc::new(AtomicBool::new(false)),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Engine wired to this platform's synthesizer and accessibility writer
    pub fn for_platform(focus: Arc<dyn FocusProvider>, timing: ReplacementTiming) -> Self {
        Self::new(
            platform_synth_factory(),
            accessibility::platform_writer(),
            focus,
            timing,
        )
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Ask a running replacement to stop at the next event boundary
    pub fn abort(&self) {
        if self.is_busy() {
            self.abort.store(true, Ordering::SeqCst);
        }
    }

    fn acquire(&self) -> Result<InFlightGuard, InjectError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| InjectError::Busy)?;
        self.abort.store(false, Ordering::SeqCst);
        Ok(InFlightGuard(self.in_flight.clone()))
    }

    /// Delete `captured_length` characters in `target_app` and type `replacement`
    pub async fn replace(
        &self,
        captured_length: usize,
        replacement: &str,
        target_app: Option<&str>,
    ) -> Result<ReplacementReport, InjectError> {
        let guard = self.acquire()?;

        if let Some(app) = target_app {
            if !self.focus.activate(app).await {
                tracing::debug!("Could not re-activate {}, typing into current focus", app);
            }
        }

        tracing::debug!(
            "Replacing {} chars with {} chars",
            captured_length,
            replacement.chars().count()
        );

        let factory = self.synth_factory.clone();
        let writer = self.writer.clone();
        let timing = self.timing;
        let abort = self.abort.clone();
        let text = replacement.to_string();

        let report = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut synth = factory()?;
            run_replacement(synth.as_mut(), writer.as_ref(), captured_length, &text, &timing, &abort)
        })
        .await
        .map_err(|e| InjectError::SynthesisFailed(format!("Task join error: {}", e)))??;

        tracing::info!(
            "Replaced {} chars, inserted {} via {:?}",
            report.deleted,
            report.inserted,
            report.strategy
        );
        Ok(report)
    }

    /// Send the paste shortcut to the focused app
    pub async fn paste(&self) -> Result<(), InjectError> {
        let guard = self.acquire()?;
        let factory = self.synth_factory.clone();
        let timing = self.timing;
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut synth = factory()?;
            pause(timing.settle_delay);
            synth.release_modifiers()?;
            synth.paste_shortcut()
        })
        .await
        .map_err(|e| InjectError::SynthesisFailed(format!("Task join error: {}", e)))?
    }
}

#[cfg(target_os = "macos")]
fn platform_synth_factory() -> SynthFactory {
    Arc::new(|| Ok(Box::new(cgevent::CgEventSynth::new()?) as Box<dyn KeySynth>))
}

#[cfg(not(target_os = "macos"))]
fn platform_synth_factory() -> SynthFactory {
    Arc::new(|| Ok(Box::new(enigo::EnigoSynth::new()?) as Box<dyn KeySynth>))
}
