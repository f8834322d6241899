//! Speech output queue.
//!
//! Serializes agent utterances into the TTS capability: one utterance
//! playing at a time, FIFO drain within a turn, and full backlog
//! replacement when a new turn interrupts. Speaking-state events are
//! presentational only and never drive turn transitions.

use crate::config::VoiceConfig;
use crate::speech::{SpeakRequest, TtsEngine, TtsEvent, TtsEventRx, UtteranceId};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Commands accepted by the output queue.
#[derive(Debug)]
pub enum OutputCommand {
    /// Voice the utterances of one turn in order, interrupting playback and
    /// discarding whatever was queued before.
    Speak(Vec<String>),
    /// Stop playback immediately and clear the backlog.
    Cancel,
}

/// Speaking-state transitions, consumed for presentational status only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// An utterance began playing.
    SpeakingStarted,
    /// Playback went idle (backlog drained or cancelled).
    SpeakingEnded,
}

/// Handle for sending commands to a spawned output queue.
#[derive(Debug, Clone)]
pub struct OutputHandle {
    cmd_tx: mpsc::UnboundedSender<OutputCommand>,
}

impl OutputHandle {
    /// Voice one turn's utterances in order, replacing any prior backlog.
    pub fn speak(&self, texts: Vec<String>) {
        let _ = self.cmd_tx.send(OutputCommand::Speak(texts));
    }

    /// Stop playback and clear the backlog.
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(OutputCommand::Cancel);
    }
}

/// Spawn the output queue task.
///
/// `engine_rx` is the event stream of `engine`; speaking-state transitions
/// are reported on `event_tx`.
pub fn spawn(
    engine: Box<dyn TtsEngine>,
    engine_rx: TtsEventRx,
    voice: VoiceConfig,
    event_tx: mpsc::UnboundedSender<OutputEvent>,
    cancel: CancellationToken,
) -> OutputHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(engine, engine_rx, voice, cmd_rx, event_tx, cancel));
    OutputHandle { cmd_tx }
}

struct QueueState {
    backlog: VecDeque<String>,
    /// Utterance currently handed to the engine, if any.
    current: Option<UtteranceId>,
    next_utterance: u64,
}

impl QueueState {
    fn next_request(&mut self, voice: &VoiceConfig, text: String) -> SpeakRequest {
        self.next_utterance += 1;
        SpeakRequest {
            utterance: UtteranceId(self.next_utterance),
            text,
            lang: voice.lang.clone(),
            rate: voice.rate,
            pitch: voice.pitch,
        }
    }
}

async fn run(
    mut engine: Box<dyn TtsEngine>,
    mut engine_rx: TtsEventRx,
    voice: VoiceConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<OutputCommand>,
    event_tx: mpsc::UnboundedSender<OutputEvent>,
    cancel: CancellationToken,
) {
    let mut state = QueueState {
        backlog: VecDeque::new(),
        current: None,
        next_utterance: 0,
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                handle_command(&mut state, engine.as_mut(), &voice, &event_tx, cmd);
            }
            ev = engine_rx.recv() => {
                let Some(ev) = ev else { break };
                handle_engine_event(&mut state, engine.as_mut(), &voice, &event_tx, ev);
            }
        }
    }
    info!("speech output queue stopped");
}

fn handle_command(
    state: &mut QueueState,
    engine: &mut dyn TtsEngine,
    voice: &VoiceConfig,
    event_tx: &mpsc::UnboundedSender<OutputEvent>,
    cmd: OutputCommand,
) {
    match cmd {
        OutputCommand::Speak(texts) => {
            if texts.is_empty() {
                return;
            }
            if state.current.take().is_some() {
                engine.cancel();
            }
            if !state.backlog.is_empty() {
                debug!(
                    "discarding {} stale queued utterances on interruption",
                    state.backlog.len()
                );
                state.backlog.clear();
            }
            state.backlog.extend(texts);
            play_next(state, engine, voice);
        }
        OutputCommand::Cancel => {
            state.backlog.clear();
            if state.current.take().is_some() {
                engine.cancel();
                let _ = event_tx.send(OutputEvent::SpeakingEnded);
            }
        }
    }
}

fn handle_engine_event(
    state: &mut QueueState,
    engine: &mut dyn TtsEngine,
    voice: &VoiceConfig,
    event_tx: &mpsc::UnboundedSender<OutputEvent>,
    ev: TtsEvent,
) {
    match ev {
        TtsEvent::Started(id) => {
            if state.current == Some(id) {
                let _ = event_tx.send(OutputEvent::SpeakingStarted);
            } else {
                debug!("ignoring started event for stale utterance {id}");
            }
        }
        TtsEvent::Ended(id) => {
            if state.current != Some(id) {
                debug!("ignoring ended event for stale utterance {id}");
                return;
            }
            state.current = None;
            if !play_next(state, engine, voice) {
                let _ = event_tx.send(OutputEvent::SpeakingEnded);
            }
        }
    }
}

/// Hand the next backlog entry to the engine. Returns whether one started.
fn play_next(state: &mut QueueState, engine: &mut dyn TtsEngine, voice: &VoiceConfig) -> bool {
    match state.backlog.pop_front() {
        Some(text) => {
            let request = state.next_request(voice, text);
            state.current = Some(request.utterance);
            engine.speak(request);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::speech::scripted::scripted_tts;
    use std::time::Duration;

    struct Fixture {
        handle: OutputHandle,
        tts: crate::speech::scripted::ScriptedTtsHandle,
        events: mpsc::UnboundedReceiver<OutputEvent>,
    }

    fn fixture() -> Fixture {
        let (engine, tts, engine_rx) = scripted_tts();
        let (event_tx, events) = mpsc::unbounded_channel();
        let handle = spawn(
            Box::new(engine),
            engine_rx,
            VoiceConfig::default(),
            event_tx,
            CancellationToken::new(),
        );
        Fixture { handle, tts, events }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<OutputEvent>) -> OutputEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for output event")
            .expect("output queue closed its event channel")
    }

    async fn wait_for_spoken(
        tts: &crate::speech::scripted::ScriptedTtsHandle,
        count: usize,
    ) -> Vec<String> {
        for _ in 0..200 {
            if tts.spoken().len() >= count {
                return tts.spoken_texts();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("engine never received {count} utterances: {:?}", tts.spoken_texts());
    }

    #[tokio::test]
    async fn drains_one_turn_in_fifo_order() {
        let mut f = fixture();
        f.handle
            .speak(vec!["first".to_owned(), "second".to_owned()]);

        assert_eq!(wait_for_spoken(&f.tts, 1).await, vec!["first".to_owned()]);
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingStarted);

        // Second utterance only starts after the first ends naturally.
        f.tts.finish_playback();
        let spoken = wait_for_spoken(&f.tts, 2).await;
        assert_eq!(spoken, vec!["first".to_owned(), "second".to_owned()]);
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingStarted);

        f.tts.finish_playback();
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingEnded);
    }

    #[tokio::test]
    async fn new_turn_interrupts_and_clears_stale_backlog() {
        let mut f = fixture();
        f.handle
            .speak(vec!["old reply".to_owned(), "old follow-up".to_owned()]);
        wait_for_spoken(&f.tts, 1).await;
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingStarted);

        // Interrupt mid-playback; the queued "old follow-up" must never be voiced.
        f.handle.speak(vec!["new reply".to_owned()]);
        let spoken = wait_for_spoken(&f.tts, 2).await;
        assert_eq!(spoken, vec!["old reply".to_owned(), "new reply".to_owned()]);
        assert_eq!(f.tts.cancel_count(), 1);
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingStarted);

        f.tts.finish_playback();
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingEnded);
        assert!(!f.tts.spoken_texts().contains(&"old follow-up".to_owned()));
    }

    #[tokio::test]
    async fn cancel_stops_playback_and_reports_idle() {
        let mut f = fixture();
        f.handle.speak(vec!["goodbye".to_owned()]);
        wait_for_spoken(&f.tts, 1).await;
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingStarted);

        f.handle.cancel();
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingEnded);
        assert!(f.tts.cancel_count() >= 1);
        assert!(!f.tts.is_playing());
    }

    #[tokio::test]
    async fn cancel_while_idle_is_a_no_op() {
        let mut f = fixture();
        f.handle.cancel();
        f.handle.speak(vec!["hello".to_owned()]);
        // The first event must be the start of "hello", not a stray idle
        // notification from the no-op cancel.
        assert_eq!(next_event(&mut f.events).await, OutputEvent::SpeakingStarted);
        assert_eq!(f.tts.cancel_count(), 0);
    }

    #[tokio::test]
    async fn requests_carry_voice_parameters() {
        let (engine, tts, engine_rx) = scripted_tts();
        let (event_tx, _events) = mpsc::unbounded_channel();
        let voice = VoiceConfig {
            lang: "en-GB".to_owned(),
            rate: 0.9,
            pitch: 1.2,
        };
        let handle = spawn(
            Box::new(engine),
            engine_rx,
            voice,
            event_tx,
            CancellationToken::new(),
        );

        handle.speak(vec!["check".to_owned()]);
        let spoken = wait_for_spoken(&tts, 1).await;
        assert_eq!(spoken, vec!["check".to_owned()]);
        let request = &tts.spoken()[0];
        assert_eq!(request.lang, "en-GB");
        assert!((request.rate - 0.9).abs() < f32::EPSILON);
        assert!((request.pitch - 1.2).abs() < f32::EPSILON);
    }
}
