//! Append-only conversation transcript.
//!
//! Entries are immutable once created and appended in strict chronological
//! order; the call controller is the only writer. Entry identifiers come
//! from an injected [`IdSource`] so hosts get unique ids while tests can
//! assert deterministic ones.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The automated concierge agent.
    Agent,
    /// The human caller, heard or typed.
    Caller,
    /// Notices produced by the call engine itself.
    System,
}

/// Opaque identifier of a transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single immutable conversation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Opaque identifier assigned at creation.
    pub id: EntryId,
    /// Who produced the entry.
    pub role: Role,
    /// The spoken, typed, or notice text.
    pub content: String,
}

/// Source of transcript entry identifiers.
pub trait IdSource: Send + Sync {
    /// Produce the next identifier.
    fn next_id(&self) -> EntryId;
}

/// Production identifier source backed by UUID v4.
#[derive(Debug, Default)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_id(&self) -> EntryId {
        EntryId::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Deterministic identifier source (`id-0`, `id-1`, ...) for tests and
/// replay tooling.
#[derive(Debug, Default)]
pub struct SequentialIdSource {
    next: AtomicU64,
}

impl IdSource for SequentialIdSource {
    fn next_id(&self) -> EntryId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        EntryId::new(format!("id-{n}"))
    }
}

/// Agent greeting every call opens with.
pub const INTRO_GREETING: &str = "Hello, this is Lumen, your AI concierge. \
Thanks for picking up! To make sure I can help, I'll just need to ask a \
couple of quick questions.";

/// Microphone tip shown alongside the greeting.
pub const INTRO_TIP: &str = "Tip: stay close to your microphone and speak \
clearly so the AI can capture your answers.";

/// Append-only ordered record of conversation entries.
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
    ids: Arc<dyn IdSource>,
}

impl TranscriptLog {
    /// Create a log pre-populated with the fixed introductory pair.
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        let mut log = Self {
            entries: Vec::new(),
            ids,
        };
        log.reset();
        log
    }

    /// Append a new entry and return a copy of it.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> TranscriptEntry {
        let entry = TranscriptEntry {
            id: self.ids.next_id(),
            role,
            content: content.into(),
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Reinitialize to the fixed greeting pair, returning copies of the
    /// freshly created entries.
    pub fn reset(&mut self) -> Vec<TranscriptEntry> {
        self.entries.clear();
        vec![
            self.append(Role::Agent, INTRO_GREETING),
            self.append(Role::System, INTRO_TIP),
        ]
    }

    /// All entries, in append order.
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn sequential_log() -> TranscriptLog {
        TranscriptLog::new(Arc::new(SequentialIdSource::default()))
    }

    #[test]
    fn new_log_opens_with_greeting_pair() {
        let log = sequential_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].role, Role::Agent);
        assert_eq!(log.entries()[0].content, INTRO_GREETING);
        assert_eq!(log.entries()[1].role, Role::System);
        assert_eq!(log.entries()[1].content, INTRO_TIP);
    }

    #[test]
    fn append_preserves_arrival_order() {
        let mut log = sequential_log();
        log.append(Role::Agent, "Hi there");
        log.append(Role::Caller, "Hello");
        log.append(Role::System, "notice");

        let contents: Vec<&str> = log.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![INTRO_GREETING, INTRO_TIP, "Hi there", "Hello", "notice"]
        );
    }

    #[test]
    fn sequential_ids_are_deterministic() {
        let mut log = sequential_log();
        let entry = log.append(Role::Caller, "hey");
        assert_eq!(log.entries()[0].id.as_str(), "id-0");
        assert_eq!(log.entries()[1].id.as_str(), "id-1");
        assert_eq!(entry.id.as_str(), "id-2");
    }

    #[test]
    fn reset_discards_history_and_reinstalls_pair() {
        let mut log = sequential_log();
        log.append(Role::Caller, "old turn");

        let pair = log.reset();
        assert_eq!(pair.len(), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].content, INTRO_GREETING);
        // Fresh ids, not reused ones.
        assert_eq!(log.entries()[0].id.as_str(), "id-3");
    }

    #[test]
    fn uuid_source_yields_unique_ids() {
        let ids = UuidIdSource;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
