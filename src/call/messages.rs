//! Command, phase, and event types for the call controller.

use crate::transcript::TranscriptEntry;

/// Host-facing commands driving a call.
#[derive(Debug, Clone)]
pub enum CallCommand {
    /// Begin a new call. No-op while a call is already active.
    Start,
    /// End the current call. Valid from any state.
    Stop,
    /// Submit a typed caller utterance (microphone-free path).
    SubmitText(String),
}

/// Authoritative controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// No call in progress.
    Idle,
    /// Waiting on session bootstrap.
    Connecting,
    /// Waiting on the caller's next utterance.
    Listening,
    /// Waiting on the backend's reply to a caller utterance.
    Processing,
    /// The agent ended the call.
    Ended,
}

impl CallPhase {
    /// Whether a call is currently in progress.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Listening | Self::Processing)
    }
}

/// Presentational call state: the authoritative phase plus the
/// speaking/listening overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    /// No call in progress.
    #[default]
    Idle,
    /// Session bootstrap in flight.
    Connecting,
    /// The microphone is (or is about to be) open for the caller.
    Listening,
    /// The agent is audibly speaking.
    AgentSpeaking,
    /// A caller turn is being exchanged with the backend.
    Processing,
    /// The agent ended the call.
    Ended,
}

impl CallState {
    /// Derive the displayed state from the phase and overlay flags.
    ///
    /// While in a call, an audibly speaking agent wins over an open
    /// microphone, which wins over the bare phase.
    #[must_use]
    pub fn derive(phase: CallPhase, speaking: bool, listening: bool) -> Self {
        match phase {
            CallPhase::Idle => Self::Idle,
            CallPhase::Connecting => Self::Connecting,
            CallPhase::Ended => Self::Ended,
            CallPhase::Listening | CallPhase::Processing => {
                if speaking {
                    Self::AgentSpeaking
                } else if listening {
                    Self::Listening
                } else if phase == CallPhase::Processing {
                    Self::Processing
                } else {
                    Self::Listening
                }
            }
        }
    }
}

/// Observable call events broadcast to hosts.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// A transcript entry was appended.
    Entry(TranscriptEntry),
    /// The authoritative phase changed.
    Phase(CallPhase),
    /// A call was aborted; the message is user-displayable.
    Failed {
        /// Why the call was aborted.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn idle_connecting_ended_ignore_overlays() {
        assert_eq!(CallState::derive(CallPhase::Idle, true, true), CallState::Idle);
        assert_eq!(
            CallState::derive(CallPhase::Connecting, true, false),
            CallState::Connecting
        );
        assert_eq!(
            CallState::derive(CallPhase::Ended, false, true),
            CallState::Ended
        );
    }

    #[test]
    fn speaking_wins_over_listening_in_call() {
        assert_eq!(
            CallState::derive(CallPhase::Listening, true, true),
            CallState::AgentSpeaking
        );
        assert_eq!(
            CallState::derive(CallPhase::Processing, true, false),
            CallState::AgentSpeaking
        );
    }

    #[test]
    fn listening_overlay_wins_over_bare_phase() {
        assert_eq!(
            CallState::derive(CallPhase::Processing, false, true),
            CallState::Listening
        );
        assert_eq!(
            CallState::derive(CallPhase::Processing, false, false),
            CallState::Processing
        );
        assert_eq!(
            CallState::derive(CallPhase::Listening, false, false),
            CallState::Listening
        );
    }

    #[test]
    fn only_in_call_phases_are_active() {
        assert!(!CallPhase::Idle.is_active());
        assert!(CallPhase::Connecting.is_active());
        assert!(CallPhase::Listening.is_active());
        assert!(CallPhase::Processing.is_active());
        assert!(!CallPhase::Ended.is_active());
    }
}
