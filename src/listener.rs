//! Speech input listener.
//!
//! Manages one single-shot recognition attempt at a time: a result hands
//! the caller's words to the controller, caller silence schedules a single
//! bounded retry, and any other engine error aborts the call. A natural end
//! without a result deactivates silently; only the controller decides when
//! to re-arm.

use crate::speech::{NO_SPEECH, SttEngine, SttEvent, SttEventRx};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Commands accepted by the listener.
#[derive(Debug, Clone, Copy)]
pub enum ListenerCommand {
    /// Begin a capture attempt. Ignored while one is already active.
    Start,
    /// Abort the current attempt and cancel any pending retry.
    Stop,
}

/// Events the listener reports to the call controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    /// A caller utterance was captured.
    Utterance(String),
    /// The caller said nothing within the capture window; a retry has been
    /// scheduled.
    Silence,
    /// Recognition failed with a non-recoverable engine code.
    Fatal {
        /// The engine's error code.
        code: String,
    },
    /// Capture-activity transition, for presentational status only.
    Active(bool),
}

/// Handle for sending commands to a spawned listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    cmd_tx: mpsc::UnboundedSender<ListenerCommand>,
}

impl ListenerHandle {
    /// Begin a capture attempt.
    pub fn start(&self) {
        let _ = self.cmd_tx.send(ListenerCommand::Start);
    }

    /// Abort the current attempt and cancel any pending retry.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(ListenerCommand::Stop);
    }
}

/// Spawn the listener task.
///
/// `engine_rx` is the event stream of `engine`; listener outcomes are
/// reported on `event_tx`.
pub fn spawn(
    engine: Box<dyn SttEngine>,
    engine_rx: SttEventRx,
    retry_delay: Duration,
    event_tx: mpsc::UnboundedSender<ListenerEvent>,
    cancel: CancellationToken,
) -> ListenerHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(engine, engine_rx, retry_delay, cmd_rx, event_tx, cancel));
    ListenerHandle { cmd_tx }
}

struct ListenerState {
    active: bool,
    /// Deadline of the single pending silence retry, if any.
    retry_at: Option<Instant>,
}

impl ListenerState {
    fn set_active(&mut self, active: bool, event_tx: &mpsc::UnboundedSender<ListenerEvent>) {
        if self.active != active {
            self.active = active;
            let _ = event_tx.send(ListenerEvent::Active(active));
        }
    }
}

async fn run(
    mut engine: Box<dyn SttEngine>,
    mut engine_rx: SttEventRx,
    retry_delay: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<ListenerCommand>,
    event_tx: mpsc::UnboundedSender<ListenerEvent>,
    cancel: CancellationToken,
) {
    let mut state = ListenerState {
        active: false,
        retry_at: None,
    };

    loop {
        let retry_at = state.retry_at;
        let retry_timer = async {
            match retry_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                handle_command(&mut state, engine.as_mut(), &event_tx, cmd);
            }
            ev = engine_rx.recv() => {
                let Some(ev) = ev else { break };
                handle_engine_event(&mut state, &event_tx, retry_delay, ev);
            }
            () = retry_timer => {
                state.retry_at = None;
                if state.active {
                    warn!("skipping silence retry: an attempt is already active");
                } else {
                    debug!("retrying capture after silence");
                    state.set_active(true, &event_tx);
                    engine.start();
                }
            }
        }
    }
    info!("speech input listener stopped");
}

fn handle_command(
    state: &mut ListenerState,
    engine: &mut dyn SttEngine,
    event_tx: &mpsc::UnboundedSender<ListenerEvent>,
    cmd: ListenerCommand,
) {
    match cmd {
        ListenerCommand::Start => {
            // Invariant: the engine is never started while an attempt is active.
            if state.active {
                warn!("listener start ignored: attempt already active");
                return;
            }
            state.retry_at = None;
            state.set_active(true, event_tx);
            engine.start();
        }
        ListenerCommand::Stop => {
            state.retry_at = None;
            engine.stop();
            state.set_active(false, event_tx);
        }
    }
}

fn handle_engine_event(
    state: &mut ListenerState,
    event_tx: &mpsc::UnboundedSender<ListenerEvent>,
    retry_delay: Duration,
    ev: SttEvent,
) {
    match ev {
        SttEvent::Result(text) => {
            state.set_active(false, event_tx);
            let text = text.trim().to_owned();
            if text.is_empty() {
                debug!("discarding empty recognition result");
            } else {
                let _ = event_tx.send(ListenerEvent::Utterance(text));
            }
        }
        SttEvent::Error { code } => {
            state.set_active(false, event_tx);
            if code == NO_SPEECH {
                let _ = event_tx.send(ListenerEvent::Silence);
                if state.retry_at.is_none() {
                    state.retry_at = Some(Instant::now() + retry_delay);
                } else {
                    warn!("silence retry already pending");
                }
            } else {
                let _ = event_tx.send(ListenerEvent::Fatal { code });
            }
        }
        SttEvent::End => {
            // Natural end without a result: deactivate silently. Re-arming
            // is the controller's decision alone.
            state.set_active(false, event_tx);
        }
    }
}
