//! Speech capability interfaces.
//!
//! The call engine never touches audio hardware directly: it speaks and
//! listens through these traits. The production variants wrap the host
//! platform's native speech engines; [`scripted`] provides deterministic
//! variants for tests and headless hosts. Implementations report lifecycle
//! events on the channel handed out at construction.

pub mod scripted;

use tokio::sync::mpsc;

/// Monotonic identifier the output queue assigns to each utterance.
///
/// Engines echo it back in [`TtsEvent`]s so lifecycle events can never be
/// attributed to the wrong utterance, even across an interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(pub u64);

impl std::fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "utt-{}", self.0)
    }
}

/// One unit of text to voice, with the voice parameters to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakRequest {
    /// Identifier echoed back in playback events.
    pub utterance: UtteranceId,
    /// The text to synthesize.
    pub text: String,
    /// BCP-47 language tag.
    pub lang: String,
    /// Playback rate multiplier.
    pub rate: f32,
    /// Pitch multiplier.
    pub pitch: f32,
}

/// Playback lifecycle events emitted by a [`TtsEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsEvent {
    /// Playback of the utterance began.
    Started(UtteranceId),
    /// Playback of the utterance ran to natural completion.
    ///
    /// Not emitted for utterances stopped via [`TtsEngine::cancel`].
    Ended(UtteranceId),
}

/// Capture settings every [`SttEngine`] is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    /// BCP-47 language tag.
    pub lang: String,
    /// Whether to deliver partial hypotheses. Always `false` here.
    pub interim_results: bool,
    /// Maximum alternatives per result. Always `1` here.
    pub max_alternatives: u8,
    /// Whether capture continues past the first result. Always `false` here.
    pub continuous: bool,
}

impl RecognitionSettings {
    /// Single-shot, single-alternative capture in the given language.
    #[must_use]
    pub fn single_shot(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            interim_results: false,
            max_alternatives: 1,
            continuous: false,
        }
    }
}

/// Engine error code reported when the caller said nothing within the
/// capture window.
pub const NO_SPEECH: &str = "no-speech";

/// Recognition lifecycle events emitted by an [`SttEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SttEvent {
    /// A transcript was obtained for the capture attempt.
    Result(String),
    /// The attempt failed with an engine error code.
    Error {
        /// Engine-specific code; [`NO_SPEECH`] marks caller silence.
        code: String,
    },
    /// The attempt ended without producing a result.
    End,
}

/// Text-to-speech capability.
///
/// `speak` begins playback of one utterance; `cancel` stops any current
/// playback immediately without emitting `Ended`.
pub trait TtsEngine: Send + 'static {
    /// Begin voicing one utterance.
    fn speak(&mut self, request: SpeakRequest);

    /// Stop any current playback immediately.
    fn cancel(&mut self);
}

/// Speech-to-text capability: one single-shot capture attempt at a time.
pub trait SttEngine: Send + 'static {
    /// Begin one capture attempt.
    fn start(&mut self);

    /// Abort the current attempt, if any. Must be safe to call when idle.
    fn stop(&mut self);
}

/// Event stream of a [`TtsEngine`].
pub type TtsEventRx = mpsc::UnboundedReceiver<TtsEvent>;

/// Event stream of an [`SttEngine`].
pub type SttEventRx = mpsc::UnboundedReceiver<SttEvent>;
