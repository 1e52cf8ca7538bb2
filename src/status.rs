//! Presentation hub
//!
//! The daemon publishes what a UI would show (phase, suggestions, the
//! typing signal) on a broadcast channel, and accepts user commands on an
//! mpsc channel. Nothing here renders anything; a front end subscribes.

use crate::ranking::RankedSuggestion;
use crate::state::Phase;
use tokio::sync::{broadcast, mpsc};

const STATUS_CAPACITY: usize = 64;
const COMMAND_CAPACITY: usize = 16;

/// Updates published to observers
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Phase(Phase),
    /// Best candidates for the current question, best first
    Suggestions(Vec<RankedSuggestion>),
    /// The first keystroke of a capture arrived
    TypingStarted,
    /// Free-form status text (answers, warnings)
    Message(String),
}

/// Commands a front end may send to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiCommand {
    /// Replace the captured question with suggestion `n` (0-based)
    Accept(usize),
    /// Abandon the current capture or answer
    Cancel,
    /// Replace the captured question with this text
    Inject(String),
}

pub struct StatusHub {
    updates: broadcast::Sender<StatusUpdate>,
    commands: mpsc::Sender<UiCommand>,
}

impl StatusHub {
    /// Create the hub together with the receiving end for commands
    pub fn new() -> (Self, mpsc::Receiver<UiCommand>) {
        let (updates, _) = broadcast::channel(STATUS_CAPACITY);
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        (Self { updates, commands }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    /// Sender for front ends
    pub fn commands(&self) -> mpsc::Sender<UiCommand> {
        self.commands.clone()
    }

    /// Publish to every current subscriber. Having none is fine.
    pub fn publish(&self, update: StatusUpdate) {
        if self.updates.send(update).is_err() {
            tracing::trace!("No status subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let (hub, _rx) = StatusHub::new();
        let mut sub = hub.subscribe();
        hub.publish(StatusUpdate::Phase(Phase::Capturing));
        hub.publish(StatusUpdate::TypingStarted);

        assert!(matches!(sub.recv().await.unwrap(), StatusUpdate::Phase(Phase::Capturing)));
        assert!(matches!(sub.recv().await.unwrap(), StatusUpdate::TypingStarted));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let (hub, _rx) = StatusHub::new();
        hub.publish(StatusUpdate::Message("nobody listening".to_string()));
    }

    #[tokio::test]
    async fn test_commands_reach_daemon() {
        let (hub, mut rx) = StatusHub::new();
        hub.commands().send(UiCommand::Accept(1)).await.unwrap();
        assert_eq!(rx.recv().await, Some(UiCommand::Accept(1)));
    }
}
