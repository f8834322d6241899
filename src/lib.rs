//! Lumen: voice-call turn orchestration for an AI concierge agent.
//!
//! Simulates a live phone call between an automated agent and a human
//! caller: agent text is voiced through a speech output queue, the caller's
//! reply is captured through a single-shot speech input listener, each turn
//! is exchanged with a remote dialogue backend, and an append-only
//! transcript records the conversation in event-arrival order.
//!
//! # Architecture
//!
//! The engine is built from independent components connected by async
//! channels:
//! - **Call controller**: the turn-taking state machine; sole owner of the
//!   session, the phase, and the transcript
//! - **Speech output queue**: serializes agent utterances into the TTS
//!   capability, one playing at a time
//! - **Speech input listener**: single-shot recognition attempts with
//!   bounded silence retry
//! - **Agent backend client**: session bootstrap and turn exchange over HTTP
//! - **Transcript log**: append-only ordered record of the conversation
//!
//! The speech capabilities are traits ([`speech::TtsEngine`],
//! [`speech::SttEngine`]); hosts supply the platform engines, and
//! [`speech::scripted`] provides deterministic variants for tests.

pub mod backend;
pub mod call;
pub mod config;
pub mod error;
pub mod listener;
pub mod output;
pub mod speech;
pub mod transcript;

pub use backend::{BackendClient, SessionBootstrap, SessionId, TurnReply};
pub use call::messages::{CallCommand, CallEvent, CallPhase, CallState};
pub use call::{CALL_ENDED_NOTICE, CallController, CallHandle, SILENCE_NOTICE};
pub use config::CallConfig;
pub use error::{CallError, Result};
pub use transcript::{Role, TranscriptEntry, TranscriptLog};
