//! Deterministic scripted speech engines.
//!
//! These variants implement the capability traits without any audio
//! hardware: every call is recorded, and the driver decides when playback
//! finishes or what a capture attempt hears. The test suite is built on
//! them; headless hosts can use them for dry runs.

use super::{
    RecognitionSettings, SpeakRequest, SttEngine, SttEvent, TtsEngine, TtsEvent, UtteranceId,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ── Text-to-speech ────────────────────────────────────────────

#[derive(Debug)]
struct TtsShared {
    events: mpsc::UnboundedSender<TtsEvent>,
    spoken: Mutex<Vec<SpeakRequest>>,
    cancels: AtomicUsize,
    playing: Mutex<Option<UtteranceId>>,
}

/// Scripted TTS engine: records `speak`/`cancel` calls and emits `Started`
/// immediately; the paired [`ScriptedTtsHandle`] fires `Ended`.
#[derive(Debug)]
pub struct ScriptedTts {
    shared: Arc<TtsShared>,
}

/// Driver-side handle for a [`ScriptedTts`].
#[derive(Debug, Clone)]
pub struct ScriptedTtsHandle {
    shared: Arc<TtsShared>,
}

/// Create a scripted TTS engine with its driver handle and event stream.
#[must_use]
pub fn scripted_tts() -> (ScriptedTts, ScriptedTtsHandle, super::TtsEventRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(TtsShared {
        events: tx,
        spoken: Mutex::new(Vec::new()),
        cancels: AtomicUsize::new(0),
        playing: Mutex::new(None),
    });
    (
        ScriptedTts {
            shared: Arc::clone(&shared),
        },
        ScriptedTtsHandle { shared },
        rx,
    )
}

impl TtsEngine for ScriptedTts {
    fn speak(&mut self, request: SpeakRequest) {
        let utterance = request.utterance;
        self.shared
            .spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        *self
            .shared
            .playing
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(utterance);
        let _ = self.shared.events.send(TtsEvent::Started(utterance));
    }

    fn cancel(&mut self) {
        self.shared.cancels.fetch_add(1, Ordering::Relaxed);
        *self
            .shared
            .playing
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl ScriptedTtsHandle {
    /// Complete the current playback naturally, emitting `Ended`.
    ///
    /// Returns `false` if nothing was playing (e.g. already cancelled).
    pub fn finish_playback(&self) -> bool {
        let utterance = self
            .shared
            .playing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match utterance {
            Some(id) => {
                let _ = self.shared.events.send(TtsEvent::Ended(id));
                true
            }
            None => false,
        }
    }

    /// Every request passed to `speak`, in call order.
    #[must_use]
    pub fn spoken(&self) -> Vec<SpeakRequest> {
        self.shared
            .spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The text of every request passed to `speak`, in call order.
    #[must_use]
    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken().into_iter().map(|r| r.text).collect()
    }

    /// How many times `cancel` was called.
    #[must_use]
    pub fn cancel_count(&self) -> usize {
        self.shared.cancels.load(Ordering::Relaxed)
    }

    /// Whether an utterance is currently playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.shared
            .playing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

// ── Speech-to-text ────────────────────────────────────────────

#[derive(Debug)]
struct SttShared {
    events: mpsc::UnboundedSender<SttEvent>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    active: AtomicBool,
}

/// Scripted STT engine: records `start`/`stop` calls; the paired
/// [`ScriptedSttHandle`] injects results, error codes, and natural ends.
#[derive(Debug)]
pub struct ScriptedStt {
    settings: RecognitionSettings,
    shared: Arc<SttShared>,
}

/// Driver-side handle for a [`ScriptedStt`].
#[derive(Debug, Clone)]
pub struct ScriptedSttHandle {
    shared: Arc<SttShared>,
}

/// Create a scripted STT engine with its driver handle and event stream.
#[must_use]
pub fn scripted_stt(
    settings: RecognitionSettings,
) -> (ScriptedStt, ScriptedSttHandle, super::SttEventRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(SttShared {
        events: tx,
        starts: AtomicUsize::new(0),
        stops: AtomicUsize::new(0),
        active: AtomicBool::new(false),
    });
    (
        ScriptedStt {
            settings,
            shared: Arc::clone(&shared),
        },
        ScriptedSttHandle { shared },
        rx,
    )
}

impl SttEngine for ScriptedStt {
    fn start(&mut self) {
        self.shared.starts.fetch_add(1, Ordering::Relaxed);
        self.shared.active.store(true, Ordering::Relaxed);
    }

    fn stop(&mut self) {
        self.shared.stops.fetch_add(1, Ordering::Relaxed);
        self.shared.active.store(false, Ordering::Relaxed);
    }
}

impl ScriptedStt {
    /// The capture settings this engine was configured with.
    #[must_use]
    pub fn settings(&self) -> &RecognitionSettings {
        &self.settings
    }
}

impl ScriptedSttHandle {
    /// Deliver a recognition result, deactivating the attempt.
    pub fn hear(&self, text: impl Into<String>) {
        self.shared.active.store(false, Ordering::Relaxed);
        let _ = self.shared.events.send(SttEvent::Result(text.into()));
    }

    /// Fail the attempt with an engine error code.
    pub fn raise_error(&self, code: impl Into<String>) {
        self.shared.active.store(false, Ordering::Relaxed);
        let _ = self.shared.events.send(SttEvent::Error { code: code.into() });
    }

    /// End the attempt naturally without a result.
    pub fn end(&self) {
        self.shared.active.store(false, Ordering::Relaxed);
        let _ = self.shared.events.send(SttEvent::End);
    }

    /// How many times `start` was called.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.shared.starts.load(Ordering::Relaxed)
    }

    /// How many times `stop` was called.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.shared.stops.load(Ordering::Relaxed)
    }

    /// Whether a capture attempt is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Relaxed)
    }
}
