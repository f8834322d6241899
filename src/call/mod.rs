//! Call controller: the turn-taking state machine.
//!
//! Consumes events from the speech output queue, the speech input listener,
//! and in-flight backend requests, and drives one conversation at a time
//! through Connecting → Listening ⇄ Processing until the agent hangs up or
//! the host stops the call. The controller task is the sole owner of the
//! session, the phase, and the transcript.
//!
//! ```rust,no_run
//! use lumen::call::CallController;
//! use lumen::config::CallConfig;
//! use lumen::speech::RecognitionSettings;
//! use lumen::speech::scripted::{scripted_stt, scripted_tts};
//!
//! # fn example() -> lumen::Result<()> {
//! let config = CallConfig::default();
//! let (tts, _tts_drive, tts_rx) = scripted_tts();
//! let (stt, _stt_drive, stt_rx) =
//!     scripted_stt(RecognitionSettings::single_shot(config.voice.lang.as_str()));
//!
//! let handle = CallController::new(config, tts, tts_rx, stt, stt_rx)?.spawn();
//! handle.start_call();
//! # Ok(())
//! # }
//! ```

pub mod messages;

use crate::backend::{BackendClient, SessionBootstrap, SessionId, TurnReply};
use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::listener::{self, ListenerEvent, ListenerHandle};
use crate::output::{self, OutputEvent, OutputHandle};
use crate::speech::{SttEngine, SttEventRx, TtsEngine, TtsEventRx};
use crate::transcript::{IdSource, Role, TranscriptEntry, TranscriptLog, UuidIdSource};
use messages::{CallCommand, CallEvent, CallPhase, CallState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// System notice appended when a capture window heard nothing.
pub const SILENCE_NOTICE: &str = "Didn't catch that. Let's try once more.";

/// System notice appended by every stop sequence.
pub const CALL_ENDED_NOTICE: &str =
    "Call ended. Start a new session whenever you're ready.";

/// Outcome of an in-flight backend request, tagged so results that arrive
/// after the call moved on are discarded instead of applied.
#[derive(Debug)]
enum NetOutcome {
    Bootstrap {
        call_seq: u64,
        result: Result<SessionBootstrap>,
    },
    Respond {
        session: SessionId,
        result: Result<TurnReply>,
    },
}

/// Builds a call controller ready to be spawned.
pub struct CallController {
    config: CallConfig,
    backend: BackendClient,
    tts_engine: Box<dyn TtsEngine>,
    tts_events: TtsEventRx,
    stt_engine: Box<dyn SttEngine>,
    stt_events: SttEventRx,
    ids: Arc<dyn IdSource>,
    cancel: CancellationToken,
}

impl CallController {
    /// Create a controller over the given speech engines and their event
    /// streams. The backend client is built from `config.backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend HTTP client cannot be constructed.
    pub fn new(
        config: CallConfig,
        tts_engine: impl TtsEngine,
        tts_events: TtsEventRx,
        stt_engine: impl SttEngine,
        stt_events: SttEventRx,
    ) -> Result<Self> {
        let backend = BackendClient::new(&config.backend)?;
        Ok(Self {
            config,
            backend,
            tts_engine: Box::new(tts_engine),
            tts_events,
            stt_engine: Box::new(stt_engine),
            stt_events,
            ids: Arc::new(UuidIdSource),
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the transcript identifier source (deterministic ids in tests).
    #[must_use]
    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Get a clone of the cancellation token for external shutdown.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the controller and its component tasks, returning the handle
    /// hosts drive the call through.
    pub fn spawn(self) -> CallHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (listener_tx, listener_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);
        let (state_tx, state_rx) = watch::channel(CallState::Idle);
        let transcript = Arc::new(Mutex::new(TranscriptLog::new(Arc::clone(&self.ids))));

        let output = output::spawn(
            self.tts_engine,
            self.tts_events,
            self.config.voice.clone(),
            output_tx,
            self.cancel.clone(),
        );
        let listener = listener::spawn(
            self.stt_engine,
            self.stt_events,
            Duration::from_millis(self.config.timing.silence_retry_delay_ms),
            listener_tx,
            self.cancel.clone(),
        );

        let task = CallTask {
            backend: self.backend,
            transcript: Arc::clone(&transcript),
            output,
            listener,
            phase: CallPhase::Idle,
            session: None,
            call_seq: 0,
            speaking: false,
            listening: false,
            arm_at: None,
            arm_delay: Duration::from_millis(self.config.timing.listen_arm_delay_ms),
            events: events.clone(),
            state_tx,
            net_tx,
        };
        tokio::spawn(task.run(cmd_rx, listener_rx, output_rx, net_rx, self.cancel.clone()));

        CallHandle {
            cmd_tx,
            events,
            state_rx,
            transcript,
            cancel: self.cancel,
        }
    }
}

/// Handle to a running call controller.
#[derive(Clone)]
pub struct CallHandle {
    cmd_tx: mpsc::UnboundedSender<CallCommand>,
    events: broadcast::Sender<CallEvent>,
    state_rx: watch::Receiver<CallState>,
    transcript: Arc<Mutex<TranscriptLog>>,
    cancel: CancellationToken,
}

impl CallHandle {
    /// Begin a new call. No-op while a call is already active.
    pub fn start_call(&self) {
        let _ = self.cmd_tx.send(CallCommand::Start);
    }

    /// End the current call. Valid from any state.
    pub fn stop_call(&self) {
        let _ = self.cmd_tx.send(CallCommand::Stop);
    }

    /// Submit a typed caller utterance (microphone-free path).
    pub fn submit_text(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(CallCommand::SubmitText(text.into()));
    }

    /// Subscribe to the observable call event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// The current presentational state.
    #[must_use]
    pub fn state(&self) -> CallState {
        *self.state_rx.borrow()
    }

    /// Watch presentational state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<CallState> {
        self.state_rx.clone()
    }

    /// Snapshot of the transcript, in append order.
    #[must_use]
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries()
            .to_vec()
    }

    /// Terminate the controller and its component tasks.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct CallTask {
    backend: BackendClient,
    transcript: Arc<Mutex<TranscriptLog>>,
    output: OutputHandle,
    listener: ListenerHandle,
    phase: CallPhase,
    session: Option<SessionId>,
    /// Bumped on every accepted start; tags in-flight bootstraps.
    call_seq: u64,
    speaking: bool,
    listening: bool,
    /// Deadline for arming the listener, when one is scheduled.
    arm_at: Option<Instant>,
    arm_delay: Duration,
    events: broadcast::Sender<CallEvent>,
    state_tx: watch::Sender<CallState>,
    net_tx: mpsc::UnboundedSender<NetOutcome>,
}

impl CallTask {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<CallCommand>,
        mut listener_rx: mpsc::UnboundedReceiver<ListenerEvent>,
        mut output_rx: mpsc::UnboundedReceiver<OutputEvent>,
        mut net_rx: mpsc::UnboundedReceiver<NetOutcome>,
        cancel: CancellationToken,
    ) {
        info!("call controller started");
        loop {
            let arm_at = self.arm_at;
            let arm_timer = async {
                match arm_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd);
                }
                ev = listener_rx.recv() => {
                    let Some(ev) = ev else { break };
                    self.handle_listener(ev);
                }
                ev = output_rx.recv() => {
                    let Some(ev) = ev else { break };
                    self.handle_output(ev);
                }
                outcome = net_rx.recv() => {
                    let Some(outcome) = outcome else { break };
                    self.handle_net(outcome);
                }
                () = arm_timer => {
                    self.arm_at = None;
                    if self.phase == CallPhase::Listening {
                        self.listener.start();
                    }
                }
            }
        }
        info!("call controller stopped");
    }

    fn handle_command(&mut self, cmd: CallCommand) {
        match cmd {
            CallCommand::Start => self.start_call(),
            CallCommand::Stop => {
                info!("call stopped by host");
                self.finish_call(CallPhase::Idle);
            }
            CallCommand::SubmitText(text) => self.submit_text(text),
        }
    }

    fn start_call(&mut self) {
        if self.phase.is_active() {
            debug!("start ignored: a call is already active");
            return;
        }
        info!("starting call");
        self.call_seq += 1;

        let pair = self
            .transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
        for entry in pair {
            let _ = self.events.send(CallEvent::Entry(entry));
        }

        self.set_phase(CallPhase::Connecting);
        self.spawn_bootstrap();
    }

    fn submit_text(&mut self, text: String) {
        let text = text.trim().to_owned();
        if text.is_empty() {
            return;
        }
        if self.phase != CallPhase::Listening {
            debug!("typed input ignored outside the listening phase");
            return;
        }
        // Close the open capture attempt so a later re-arm can never
        // overlap with it.
        self.listener.stop();
        self.accept_caller_utterance(text);
    }

    fn handle_listener(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Utterance(text) => {
                if self.phase != CallPhase::Listening {
                    warn!("dropping caller utterance outside the listening phase");
                    return;
                }
                self.accept_caller_utterance(text);
            }
            ListenerEvent::Silence => {
                if self.phase == CallPhase::Listening {
                    self.append(Role::System, SILENCE_NOTICE);
                }
            }
            ListenerEvent::Fatal { code } => {
                if self.phase.is_active() {
                    self.abort_call(CallError::Recognition(code));
                }
            }
            ListenerEvent::Active(active) => {
                self.listening = active;
                self.refresh_state();
            }
        }
    }

    fn handle_output(&mut self, event: OutputEvent) {
        // Presentational only: speaking state never drives turn transitions.
        match event {
            OutputEvent::SpeakingStarted => self.speaking = true,
            OutputEvent::SpeakingEnded => self.speaking = false,
        }
        self.refresh_state();
    }

    fn handle_net(&mut self, outcome: NetOutcome) {
        match outcome {
            NetOutcome::Bootstrap { call_seq, result } => {
                if call_seq != self.call_seq || self.phase != CallPhase::Connecting {
                    warn!("discarding bootstrap result for a superseded call");
                    return;
                }
                match result {
                    Ok(bootstrap) => self.begin_conversation(bootstrap),
                    Err(e) => self.abort_call(e),
                }
            }
            NetOutcome::Respond { session, result } => {
                if self.session.as_ref() != Some(&session) {
                    warn!(
                        session = %session,
                        "discarding response for a session that is no longer active"
                    );
                    return;
                }
                if self.phase != CallPhase::Processing {
                    warn!("discarding response outside the processing phase");
                    return;
                }
                match result {
                    Ok(reply) => self.apply_reply(reply),
                    Err(e) => self.abort_call(e),
                }
            }
        }
    }

    fn begin_conversation(&mut self, bootstrap: SessionBootstrap) {
        info!(session = %bootstrap.session_id, "session established");
        self.session = Some(bootstrap.session_id);
        self.append(Role::Agent, &bootstrap.opening_line);
        self.output.speak(vec![bootstrap.opening_line]);
        self.set_phase(CallPhase::Listening);
        self.schedule_arm();
    }

    fn accept_caller_utterance(&mut self, text: String) {
        self.append(Role::Caller, &text);
        self.arm_at = None;
        self.set_phase(CallPhase::Processing);

        let Some(session) = self.session.clone() else {
            error!("listening phase reached without an active session");
            self.abort_call(CallError::Validation);
            return;
        };
        self.spawn_respond(session, text);
    }

    fn apply_reply(&mut self, reply: TurnReply) {
        self.append(Role::Agent, &reply.reply);
        let mut utterances = vec![reply.reply];
        if let Some(follow_up) = reply.follow_up {
            self.append(Role::Agent, &follow_up);
            utterances.push(follow_up);
        }
        self.output.speak(utterances);

        if reply.ended {
            info!("agent ended the call");
            self.finish_call(CallPhase::Ended);
        } else {
            self.set_phase(CallPhase::Listening);
            self.schedule_arm();
        }
    }

    fn abort_call(&mut self, error: CallError) {
        error!("call aborted: {error}");
        let _ = self.events.send(CallEvent::Failed {
            message: error.to_string(),
        });
        self.finish_call(CallPhase::Idle);
    }

    /// The stop sequence: total and safe from any state.
    fn finish_call(&mut self, final_phase: CallPhase) {
        self.listener.stop();
        self.output.cancel();
        self.session = None;
        self.arm_at = None;
        self.append(Role::System, CALL_ENDED_NOTICE);
        self.set_phase(final_phase);
    }

    fn spawn_bootstrap(&self) {
        let backend = self.backend.clone();
        let net_tx = self.net_tx.clone();
        let call_seq = self.call_seq;
        tokio::spawn(async move {
            let result = backend.bootstrap_session().await;
            let _ = net_tx.send(NetOutcome::Bootstrap { call_seq, result });
        });
    }

    fn spawn_respond(&self, session: SessionId, message: String) {
        let backend = self.backend.clone();
        let net_tx = self.net_tx.clone();
        tokio::spawn(async move {
            let result = backend.respond(&session, &message).await;
            let _ = net_tx.send(NetOutcome::Respond { session, result });
        });
    }

    fn schedule_arm(&mut self) {
        self.arm_at = Some(Instant::now() + self.arm_delay);
    }

    fn append(&mut self, role: Role, content: &str) {
        let entry = self
            .transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append(role, content);
        let _ = self.events.send(CallEvent::Entry(entry));
    }

    fn set_phase(&mut self, phase: CallPhase) {
        if self.phase != phase {
            self.phase = phase;
            let _ = self.events.send(CallEvent::Phase(phase));
        }
        self.refresh_state();
    }

    fn refresh_state(&mut self) {
        let next = CallState::derive(self.phase, self.speaking, self.listening);
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}
