//! Agent phase machine
//!
//! The phase published to the status hub and the state file:
//! Idle → Capturing → Thinking → Done → Idle
//!
//! Transitions are pure. `Phase::on` returns the next phase together with
//! the side effects the daemon has to carry out.

/// Published agent phase
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for the capture hotkey
    #[default]
    Idle,

    /// Keystrokes are being captured as a question
    Capturing,

    /// Ranking history and waiting for an answer
    Thinking,

    /// Answer injected, showing briefly before returning to idle
    Done,

    /// Something failed, showing briefly before returning to idle
    Error(String),
}

/// Inputs driving the phase machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Capture hotkey pressed while not capturing
    CaptureStarted,
    /// Escape pressed, or capture finished with nothing typed
    CaptureCancelled,
    /// Capture finished with a non-empty question
    QuerySubmitted,
    /// The answer replaced the captured question
    AnswerInjected,
    /// Any failure worth surfacing to the user
    Failed(String),
    /// The done/error display period elapsed
    ResetElapsed,
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Publish the new phase to observers and the state file
    Publish,
    /// Show a desktop notification
    Notify { title: String, body: String },
    /// Schedule a `ResetElapsed` after the configured delay
    ScheduleReset,
}

/// Result of feeding an event to a phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub phase: Phase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(phase: Phase, effects: Vec<Effect>) -> Self {
        Self { phase, effects }
    }

    fn unchanged(phase: &Phase) -> Self {
        Self {
            phase: phase.clone(),
            effects: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        self.effects.contains(&Effect::Publish)
    }
}

impl Phase {
    pub fn new() -> Self {
        Phase::Idle
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Phase::Capturing)
    }

    /// Name written to the state file
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::Thinking => "thinking",
            Phase::Done => "done",
            Phase::Error(_) => "error",
        }
    }

    /// Compute the transition for `event`
    pub fn on(&self, event: PhaseEvent) -> Transition {
        use Effect::*;
        match (self, event) {
            (Phase::Capturing, PhaseEvent::CaptureStarted) => Transition::unchanged(self),
            (_, PhaseEvent::CaptureStarted) => Transition::to(Phase::Capturing, vec![Publish]),

            (Phase::Capturing, PhaseEvent::CaptureCancelled) => {
                Transition::to(Phase::Idle, vec![Publish])
            }
            (Phase::Capturing, PhaseEvent::QuerySubmitted) => {
                Transition::to(Phase::Thinking, vec![Publish])
            }

            // From Error: a suggestion was picked after the answer failed
            (Phase::Thinking | Phase::Error(_), PhaseEvent::AnswerInjected) => {
                Transition::to(Phase::Done, vec![Publish, ScheduleReset])
            }

            (_, PhaseEvent::Failed(message)) => Transition::to(
                Phase::Error(message.clone()),
                vec![
                    Publish,
                    Notify {
                        title: "Clippy".to_string(),
                        body: message,
                    },
                    ScheduleReset,
                ],
            ),

            (Phase::Done | Phase::Error(_), PhaseEvent::ResetElapsed) => {
                Transition::to(Phase::Idle, vec![Publish])
            }

            _ => Transition::unchanged(self),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Capturing => write!(f, "Capturing"),
            Phase::Thinking => write!(f, "Thinking..."),
            Phase::Done => write!(f, "Done"),
            Phase::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}
