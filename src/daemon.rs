//! Daemon module - main event loop orchestration
//!
//! Coordinates the event tap, the capture session, the clipboard monitor,
//! the answer pipeline and the replacement engine. All mutable agent state
//! lives in the `Daemon` actor; the tap thread, the clipboard monitor, the
//! enrichment jobs and the answer task talk to it through channels and
//! join handles.

use crate::ai::{self, AiCollaborator, SidecarClient, VectorIndex};
use crate::capture::{CaptureSession, KeyOutcome};
use crate::clipboard::{ClipboardMonitor, ClipboardService};
use crate::config::{Config, RankingConfig};
use crate::enrich::Enricher;
use crate::error::{AiError, ClipboardError, ClippyError, InjectError, Result, StoreError, TapError};
use crate::focus::{FocusProvider, SystemFocus};
use crate::history::History;
use crate::inject::{ReplacementEngine, ReplacementReport, ReplacementTiming};
use crate::item::{ClipboardItem, ContentType};
use crate::notification::{self, NotifyKind};
use crate::permissions;
use crate::ranking::{rank, RankRequest, RankedSuggestion};
use crate::state::{Effect, Phase, PhaseEvent};
use crate::status::{StatusHub, StatusUpdate, UiCommand};
use crate::store::ItemStore;
use crate::tap::{self, Bindings, EventTap, HotkeyAction, KeyEvent, TapHandle, TapMessage, TapRouter};
use pidlock::Pidlock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

/// Recent items used as answer context when ranking found nothing
const ANSWER_FALLBACK_CONTEXT: usize = 10;
/// How long a new replacement waits for an aborted one to wind down
const BUSY_WAIT: Duration = Duration::from_millis(500);
const BUSY_POLL: Duration = Duration::from_millis(10);

/// Write state to file for external integrations (e.g., status bars)
fn write_state_file(path: &PathBuf, state: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

/// Remove state file on shutdown
fn cleanup_state_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Write PID file for external control via signals
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::runtime_dir().join("pid");

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

/// Remove PID file on shutdown
fn cleanup_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Result of answering a captured question
#[derive(Debug)]
pub enum AnswerOutcome {
    /// The answer replaced the question
    Answered {
        suggestions: Vec<RankedSuggestion>,
        answer: String,
        report: ReplacementReport,
    },
    /// The question stays where it was; suggestions may still be accepted
    Unanswered {
        suggestions: Vec<RankedSuggestion>,
        reason: String,
    },
}

/// Rank → answer → replace
///
/// Cheap to clone; every clone shares the same engine and the same
/// latest-suggestions slot.
#[derive(Clone)]
pub struct AnswerPipeline {
    store: Arc<ItemStore>,
    ai: Arc<dyn AiCollaborator>,
    index: Option<Arc<dyn VectorIndex>>,
    history: History,
    engine: Arc<ReplacementEngine>,
    clipboard: ClipboardService,
    hub: Arc<StatusHub>,
    ranking: RankingConfig,
    latest: Arc<Mutex<Vec<RankedSuggestion>>>,
}

impl AnswerPipeline {
    pub fn new(
        store: Arc<ItemStore>,
        ai: Arc<dyn AiCollaborator>,
        index: Option<Arc<dyn VectorIndex>>,
        engine: Arc<ReplacementEngine>,
        clipboard: ClipboardService,
        hub: Arc<StatusHub>,
        ranking: RankingConfig,
    ) -> Self {
        Self {
            history: History::new(store.clone(), index.clone()),
            store,
            ai,
            index,
            engine,
            clipboard,
            hub,
            ranking,
            latest: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    pub fn abort_replacement(&self) {
        self.engine.abort();
    }

    /// Suggestion `n` from the last published set
    pub fn suggestion(&self, n: usize) -> Option<RankedSuggestion> {
        self.latest.lock().ok()?.get(n).cloned()
    }

    async fn similarities(&self, query: &str) -> HashMap<String, f32> {
        let Some(ref index) = self.index else {
            return HashMap::new();
        };
        if query.trim().is_empty() {
            return HashMap::new();
        }
        match index.search(query, self.ranking.search_limit).await {
            Ok(hits) => hits.into_iter().collect(),
            Err(e) => {
                tracing::warn!("Vector search failed, ranking by keywords: {}", e);
                HashMap::new()
            }
        }
    }

    /// Rank history for `query` and publish the result
    pub async fn suggest(
        &self,
        query: &str,
        current_app: Option<&str>,
    ) -> std::result::Result<Vec<RankedSuggestion>, StoreError> {
        let mut candidates = self.store.fetch_recent(self.ranking.candidate_limit)?;
        let similarities = self.similarities(query).await;

        // Vector hits older than the recent window still count
        if !similarities.is_empty() {
            let ids: Vec<String> = similarities.keys().cloned().collect();
            for item in self.store.fetch_by_vector_id(&ids)? {
                if !candidates.iter().any(|c| c.id == item.id) {
                    candidates.push(item);
                }
            }
        }

        let request = RankRequest::new(query, current_app.map(String::from))
            .with_top_k(self.ranking.top_k);
        let ranked = rank(&request, &candidates, &similarities);

        if let Ok(mut latest) = self.latest.lock() {
            *latest = ranked.clone();
        }
        self.hub.publish(StatusUpdate::Suggestions(ranked.clone()));
        Ok(ranked)
    }

    async fn context_for(&self, suggestions: &[RankedSuggestion]) -> Vec<ClipboardItem> {
        if !suggestions.is_empty() {
            return suggestions.iter().map(|s| s.item.clone()).collect();
        }
        self.store
            .fetch_recent(ANSWER_FALLBACK_CONTEXT)
            .unwrap_or_else(|e| {
                tracing::warn!("No answer context: {}", e);
                Vec::new()
            })
    }

    /// Rank and ask without touching the focused app
    pub async fn ask(
        &self,
        question: &str,
        current_app: Option<&str>,
    ) -> (Vec<RankedSuggestion>, std::result::Result<Option<String>, AiError>) {
        let suggestions = self.suggest(question, current_app).await.unwrap_or_else(|e| {
            tracing::warn!("Ranking failed: {}", e);
            Vec::new()
        });
        let context = self.context_for(&suggestions).await;
        let answer = self.ai.generate_answer(question, current_app, &context).await;
        (suggestions, answer)
    }

    /// Answer `question` and replace the `captured_length` characters typed
    /// into `target_app` with it
    pub async fn answer(
        &self,
        question: &str,
        captured_length: usize,
        target_app: Option<&str>,
    ) -> AnswerOutcome {
        let (suggestions, answer) = self.ask(question, target_app).await;

        let answer = match answer {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => {
                return AnswerOutcome::Unanswered {
                    suggestions,
                    reason: "No answer found".to_string(),
                }
            }
            Err(e) => {
                tracing::warn!("Answer generation failed: {}", e);
                return AnswerOutcome::Unanswered {
                    suggestions,
                    reason: format!("Answer failed: {}", e),
                };
            }
        };

        match self.replace_text(captured_length, &answer, target_app).await {
            Ok(report) => {
                self.hub.publish(StatusUpdate::Message(answer.clone()));
                AnswerOutcome::Answered {
                    suggestions,
                    answer,
                    report,
                }
            }
            Err(e) => AnswerOutcome::Unanswered {
                suggestions,
                reason: e.to_string(),
            },
        }
    }

    /// Replace the captured text with suggestion `n`
    pub async fn accept(
        &self,
        n: usize,
        captured_length: usize,
        target_app: Option<&str>,
    ) -> Result<ReplacementReport> {
        let suggestion = self
            .suggestion(n)
            .ok_or_else(|| StoreError::NotFound(format!("suggestion #{}", n + 1)))?;
        let report = self
            .insert_item(&suggestion.item, captured_length, target_app)
            .await?;

        if let Err(e) = self.history.accept(&suggestion.item.id) {
            tracing::warn!("Failed to record usage of {}: {}", suggestion.item.id, e);
        }
        Ok(report)
    }

    /// Replace the captured text with `text`
    pub async fn inject(
        &self,
        text: &str,
        captured_length: usize,
        target_app: Option<&str>,
    ) -> Result<ReplacementReport> {
        Ok(self.replace_text(captured_length, text, target_app).await?)
    }

    /// Images are pasted: the question is deleted, the PNG goes on the
    /// pasteboard and the paste shortcut is sent.
    async fn insert_item(
        &self,
        item: &ClipboardItem,
        captured_length: usize,
        target_app: Option<&str>,
    ) -> Result<ReplacementReport> {
        let image = match (item.content_type, &item.image_path) {
            (ContentType::Image | ContentType::VisionExtracted, Some(path)) => path.clone(),
            _ => {
                return Ok(self
                    .replace_text(captured_length, &item.content, target_app)
                    .await?)
            }
        };

        let report = self.replace_text(captured_length, "", target_app).await?;
        let clipboard = self.clipboard.clone();
        tokio::task::spawn_blocking(move || clipboard.write_png(&image))
            .await
            .map_err(|e| ClipboardError::Unavailable(format!("Task join error: {}", e)))??;
        self.engine.paste().await?;
        Ok(report)
    }

    async fn replace_text(
        &self,
        captured_length: usize,
        text: &str,
        target_app: Option<&str>,
    ) -> std::result::Result<ReplacementReport, InjectError> {
        let deadline = Instant::now() + BUSY_WAIT;
        while self.engine.is_busy() && Instant::now() < deadline {
            tokio::time::sleep(BUSY_POLL).await;
        }
        self.engine.replace(captured_length, text, target_app).await
    }
}

/// What the background task reports back to the actor
#[derive(Debug)]
enum TaskResult {
    Answer(AnswerOutcome),
    Replaced(Result<ReplacementReport>),
}

async fn wait_task(task: &mut Option<JoinHandle<TaskResult>>) -> std::result::Result<TaskResult, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Main daemon that orchestrates all components
pub struct Daemon {
    config: Config,
    state_file_path: Option<PathBuf>,
    pid_file_path: Option<PathBuf>,
    hub: Arc<StatusHub>,
    commands: Option<mpsc::Receiver<UiCommand>>,
    phase: Phase,
    reset_at: Option<Instant>,
    session: CaptureSession,
    /// Shared with the tap thread: open while capturing
    gate: Arc<AtomicBool>,
    task: Option<JoinHandle<TaskResult>>,
    tap_warned: bool,
}

impl Daemon {
    /// Create a new daemon with the given configuration
    pub fn new(config: Config) -> Self {
        let state_file_path = config.resolve_state_file();
        let (hub, commands) = StatusHub::new();

        Self {
            config,
            state_file_path,
            pid_file_path: None,
            hub: Arc::new(hub),
            commands: Some(commands),
            phase: Phase::Idle,
            reset_at: None,
            session: CaptureSession::new(),
            gate: Arc::new(AtomicBool::new(false)),
            task: None,
            tap_warned: false,
        }
    }

    /// Hub front ends subscribe to (and send commands through)
    pub fn status_hub(&self) -> Arc<StatusHub> {
        self.hub.clone()
    }

    /// Update the state file if configured
    fn update_state(&self, state_name: &str) {
        if let Some(ref path) = self.state_file_path {
            write_state_file(path, state_name);
        }
    }

    /// Feed the phase machine and carry out the effects
    fn apply(&mut self, event: PhaseEvent) {
        let transition = self.phase.on(event);
        self.phase = transition.phase;

        for effect in transition.effects {
            match effect {
                Effect::Publish => {
                    tracing::debug!("Phase: {}", self.phase);
                    self.update_state(self.phase.as_str());
                    self.hub.publish(StatusUpdate::Phase(self.phase.clone()));
                    self.reset_at = None;
                }
                Effect::Notify { title, body } => {
                    let config = self.config.notification.clone();
                    tokio::spawn(async move {
                        notification::notify(&config, NotifyKind::Error, &title, &body).await;
                    });
                }
                Effect::ScheduleReset => {
                    let delay = Duration::from_millis(self.config.capture.reset_delay_ms);
                    self.reset_at = Some(Instant::now() + delay);
                }
            }
        }
    }

    /// Cancel the answer task and any replacement it started
    fn abort_task(&mut self, pipeline: &AnswerPipeline) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tracing::debug!("Aborting pending answer");
            }
            task.abort();
            pipeline.abort_replacement();
        }
    }

    fn start_tap(
        &mut self,
        tap: &mut Box<dyn EventTap>,
        bindings: &Bindings,
        tx: &mpsc::UnboundedSender<TapMessage>,
    ) -> Option<TapHandle> {
        let router = TapRouter::new(
            bindings.clone(),
            self.gate.clone(),
            self.config.capture.consume_keys,
            tx.clone(),
        );
        match tap.start(router) {
            Ok(handle) => {
                tracing::info!("Listening for hotkey: {}", self.config.hotkey.capture);
                if self.tap_warned {
                    self.hub
                        .publish(StatusUpdate::Message("Hotkeys enabled".to_string()));
                }
                self.tap_warned = false;
                Some(handle)
            }
            Err(e) => {
                if !self.tap_warned {
                    tracing::warn!("{}", e);
                    if matches!(e, TapError::PermissionDenied) {
                        self.apply(PhaseEvent::Failed(
                            "Input monitoring permission required for hotkeys".to_string(),
                        ));
                    }
                    self.tap_warned = true;
                } else {
                    tracing::debug!("Event tap still unavailable: {}", e);
                }
                None
            }
        }
    }

    async fn on_hotkey(
        &mut self,
        action: HotkeyAction,
        pipeline: &AnswerPipeline,
        focus: &dyn FocusProvider,
    ) {
        match action {
            HotkeyAction::ToggleCapture => {
                if self.session.is_active() {
                    self.finish_capture(pipeline);
                } else {
                    self.start_capture(pipeline, focus).await;
                }
            }
            HotkeyAction::SuggestForApp => self.suggest_for_frontmost(pipeline, focus).await,
        }
    }

    async fn start_capture(&mut self, pipeline: &AnswerPipeline, focus: &dyn FocusProvider) {
        if pipeline.is_busy() {
            tracing::info!("Replacement in progress, capture ignored");
            self.gate.store(false, Ordering::SeqCst);
            return;
        }
        self.abort_task(pipeline);

        // The tap already opened the gate; make sure it is open for
        // captures started by other means too
        self.gate.store(true, Ordering::SeqCst);
        let source_app = focus.frontmost_app().await;
        tracing::info!(
            "Capture started in {}",
            source_app.as_deref().unwrap_or("unknown app")
        );
        self.session.begin(source_app);
        self.apply(PhaseEvent::CaptureStarted);
    }

    fn finish_capture(&mut self, pipeline: &AnswerPipeline) {
        self.gate.store(false, Ordering::SeqCst);
        let outcome = self.session.finish();

        let Some(question) = outcome.query else {
            tracing::debug!("Capture ended with nothing typed");
            self.session.release();
            self.apply(PhaseEvent::CaptureCancelled);
            return;
        };

        tracing::info!("Question captured ({} chars)", outcome.captured_length);
        self.apply(PhaseEvent::QuerySubmitted);

        let pipeline = pipeline.clone();
        let captured_length = outcome.captured_length;
        let target_app = outcome.source_app;
        self.task = Some(tokio::spawn(async move {
            TaskResult::Answer(
                pipeline
                    .answer(&question, captured_length, target_app.as_deref())
                    .await,
            )
        }));
    }

    fn on_key(&mut self, event: KeyEvent, pipeline: &AnswerPipeline) {
        if !self.session.is_active() {
            return;
        }
        match self.session.handle_key(&event) {
            KeyOutcome::Edited {
                typing_started: true,
            } => self.hub.publish(StatusUpdate::TypingStarted),
            KeyOutcome::Edited { .. } | KeyOutcome::Ignored => {}
            KeyOutcome::Cancelled(_) => {
                tracing::info!("Capture cancelled");
                self.gate.store(false, Ordering::SeqCst);
                self.abort_task(pipeline);
                self.session.release();
                self.apply(PhaseEvent::CaptureCancelled);
            }
        }
    }

    async fn suggest_for_frontmost(&mut self, pipeline: &AnswerPipeline, focus: &dyn FocusProvider) {
        let app = focus.frontmost_app().await;
        match pipeline.suggest("", app.as_deref()).await {
            Ok(suggestions) => tracing::info!(
                "Published {} suggestions for {}",
                suggestions.len(),
                app.as_deref().unwrap_or("unknown app")
            ),
            Err(e) => tracing::warn!("Suggestions unavailable: {}", e),
        }
    }

    fn on_command(&mut self, command: UiCommand, pipeline: &AnswerPipeline) {
        tracing::debug!("UI command: {:?}", command);

        if self.session.is_active() {
            if command == UiCommand::Cancel {
                self.gate.store(false, Ordering::SeqCst);
                self.session.cancel();
                self.session.release();
                self.apply(PhaseEvent::CaptureCancelled);
            } else {
                self.hub.publish(StatusUpdate::Message(
                    "Finish the question before inserting".to_string(),
                ));
            }
            return;
        }

        match command {
            UiCommand::Cancel => self.abort_task(pipeline),
            UiCommand::Accept(n) => {
                if pipeline.suggestion(n).is_none() {
                    self.hub
                        .publish(StatusUpdate::Message(format!("No suggestion #{}", n + 1)));
                    return;
                }
                self.abort_task(pipeline);
                let (pipeline, length, app) = self.replacement_target(pipeline);
                self.task = Some(tokio::spawn(async move {
                    TaskResult::Replaced(pipeline.accept(n, length, app.as_deref()).await)
                }));
            }
            UiCommand::Inject(text) => {
                self.abort_task(pipeline);
                let (pipeline, length, app) = self.replacement_target(pipeline);
                self.task = Some(tokio::spawn(async move {
                    TaskResult::Replaced(pipeline.inject(&text, length, app.as_deref()).await)
                }));
            }
        }
    }

    fn replacement_target(&self, pipeline: &AnswerPipeline) -> (AnswerPipeline, usize, Option<String>) {
        (
            pipeline.clone(),
            self.session.captured_length(),
            self.session.source_app().map(String::from),
        )
    }

    fn on_task_done(&mut self, result: std::result::Result<TaskResult, JoinError>) {
        self.task = None;

        match result {
            Err(e) if e.is_cancelled() => tracing::debug!("Answer task cancelled"),
            Err(e) => {
                tracing::error!("Answer task failed: {}", e);
                self.apply(PhaseEvent::Failed("Answer task failed".to_string()));
            }
            Ok(TaskResult::Answer(AnswerOutcome::Answered { answer, report, .. })) => {
                tracing::info!("Answer injected ({} chars)", report.inserted);
                self.session.release();
                self.apply(PhaseEvent::AnswerInjected);

                let config = self.config.notification.clone();
                tokio::spawn(async move {
                    notification::notify(&config, NotifyKind::Answer, "Clippy", &answer).await;
                });
            }
            Ok(TaskResult::Answer(AnswerOutcome::Unanswered { reason, suggestions })) => {
                tracing::info!("{} ({} suggestions available)", reason, suggestions.len());
                self.apply(PhaseEvent::Failed(reason));
            }
            Ok(TaskResult::Replaced(Ok(report))) => {
                tracing::info!("Inserted {} chars", report.inserted);
                self.session.release();
                self.apply(PhaseEvent::AnswerInjected);
            }
            Ok(TaskResult::Replaced(Err(e))) => {
                tracing::warn!("Insertion failed: {}", e);
                self.apply(PhaseEvent::Failed(e.to_string()));
            }
        }
    }

    /// Done/Error has been shown long enough
    fn on_reset(&mut self) {
        self.reset_at = None;
        self.apply(PhaseEvent::ResetElapsed);
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting clippy-agent daemon");

        // Single instance
        let runtime_dir = Config::runtime_dir();
        std::fs::create_dir_all(&runtime_dir)?;
        let lock_path = runtime_dir.join("daemon.lock");
        let mut pidlock = Pidlock::new(&lock_path.to_string_lossy());
        if pidlock.acquire().is_err() {
            return Err(ClippyError::Config(
                "Another clippy-agent daemon is already running".to_string(),
            ));
        }

        self.pid_file_path = write_pid_file();

        let mut sigusr1 = signal(SignalKind::user_defined1())
            .map_err(|e| ClippyError::Config(format!("Failed to set up SIGUSR1 handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| ClippyError::Config(format!("Failed to set up SIGTERM handler: {}", e)))?;

        self.config
            .ensure_directories()
            .map_err(|e| ClippyError::Config(format!("Failed to create directories: {}", e)))?;

        if let Some(ref path) = self.state_file_path {
            tracing::info!("State file: {:?}", path);
        }

        // Storage and AI
        let database = self.config.database_path();
        tracing::info!("History: {:?}", database);
        let store = Arc::new(ItemStore::open(&database)?);
        let backends = ai::create_backends(&self.config.ai)?;

        let health = SidecarClient::new(&self.config.ai)?;
        tokio::task::spawn_blocking(move || match health.health() {
            Ok(_) => tracing::info!("AI sidecar reachable at {}", health.endpoint()),
            Err(e) => tracing::warn!(
                "AI sidecar not reachable at {} ({}). Tags and answers unavailable until it starts.",
                health.endpoint(),
                e
            ),
        });

        let focus: Arc<dyn FocusProvider> = Arc::new(SystemFocus);
        let clipboard = ClipboardService::system();

        // Clipboard monitor
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor_task = if self.config.clipboard.enabled {
            let enricher = Arc::new(Enricher::new(
                backends.collaborator.clone(),
                backends.index.clone(),
                store.clone(),
            ));
            let monitor = ClipboardMonitor::new(
                clipboard.clone(),
                store.clone(),
                focus.clone(),
                &self.config.clipboard,
                self.config.images_dir(),
            )
            .with_enricher(enricher)
            .with_notifications(self.config.notification.clone());
            let interval = Duration::from_millis(self.config.clipboard.poll_interval_ms.max(50));
            Some(tokio::spawn(monitor.run(interval, shutdown_rx)))
        } else {
            tracing::info!("Clipboard monitoring disabled");
            None
        };

        // Answers and replacement
        let engine = Arc::new(ReplacementEngine::for_platform(
            focus.clone(),
            ReplacementTiming::from_config(&self.config.replacement),
        ));
        let pipeline = AnswerPipeline::new(
            store,
            backends.collaborator,
            backends.index,
            engine,
            clipboard,
            self.hub.clone(),
            self.config.ranking.clone(),
        );

        // Event tap
        let (tap_tx, mut tap_rx) = mpsc::unbounded_channel();
        let mut event_tap = tap::create_tap();
        let bindings = if self.config.hotkey.enabled {
            Some(Bindings::from_config(&self.config.hotkey)?)
        } else {
            tracing::info!("Built-in hotkey disabled, use 'clippy-agent suggest' or the status hub");
            None
        };
        let mut tap_handle = match bindings {
            Some(ref bindings) => self.start_tap(&mut event_tap, bindings, &tap_tx),
            None => None,
        };
        let mut tap_retry = tokio::time::interval(Duration::from_secs(
            self.config.hotkey.retry_interval_secs.max(1),
        ));
        tap_retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut commands = self
            .commands
            .take()
            .ok_or_else(|| ClippyError::Config("Daemon already ran".to_string()))?;

        self.update_state("idle");

        loop {
            let tap_down = bindings.is_some() && !tap_handle.as_ref().is_some_and(|h| h.is_running());

            tokio::select! {
                Some(message) = tap_rx.recv() => {
                    match message {
                        TapMessage::Hotkey(action) => {
                            self.on_hotkey(action, &pipeline, focus.as_ref()).await;
                        }
                        TapMessage::Key(event) => self.on_key(event, &pipeline),
                    }
                }

                Some(command) = commands.recv() => {
                    self.on_command(command, &pipeline);
                }

                result = wait_task(&mut self.task), if self.task.is_some() => {
                    self.on_task_done(result);
                }

                _ = tokio::time::sleep_until(self.reset_at.unwrap_or_else(Instant::now)), if self.reset_at.is_some() => {
                    self.on_reset();
                }

                // Re-create the tap once input monitoring is granted
                _ = tap_retry.tick(), if tap_down => {
                    if permissions::has_input_monitoring() {
                        if let Some(ref bindings) = bindings {
                            tap_handle = self.start_tap(&mut event_tap, bindings, &tap_tx);
                        }
                    }
                }

                // SIGUSR1 - publish suggestions for the focused app
                _ = sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1 (suggest)");
                    self.suggest_for_frontmost(&pipeline, focus.as_ref()).await;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Cleanup
        self.abort_task(&pipeline);
        if let Some(handle) = tap_handle {
            handle.stop();
        }
        let _ = shutdown_tx.send(true);
        if let Some(task) = monitor_task {
            let _ = task.await;
        }

        if let Some(ref path) = self.state_file_path {
            cleanup_state_file(path);
        }
        if let Some(ref path) = self.pid_file_path {
            cleanup_pid_file(path);
        }
        let _ = pidlock.release();

        tracing::info!("Daemon stopped");

        Ok(())
    }
}
