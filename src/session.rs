use crate::artifact::Artifact;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const MIN_DURATION_SECONDS: u8 = 5;
pub const MAX_DURATION_SECONDS: u8 = 60;
pub const MIN_TEMPO_BPM: u16 = 60;
pub const MAX_TEMPO_BPM: u16 = 180;
pub const MIN_DENSITY: f32 = 0.0;
pub const MAX_DENSITY: f32 = 1.0;

/// Generation parameters sent with every prompt. Writes are clamped into
/// range, so a stored value is always valid; density additionally snaps to
/// the 0.1 grid the backend expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    duration_seconds: u8,
    tempo_bpm: u16,
    density: f32,
}

impl Settings {
    pub fn duration_seconds(&self) -> u8 {
        self.duration_seconds
    }

    pub fn tempo_bpm(&self) -> u16 {
        self.tempo_bpm
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn set_duration(&mut self, seconds: u8) {
        self.duration_seconds = seconds.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS);
    }

    pub fn set_tempo(&mut self, bpm: u16) {
        self.tempo_bpm = bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM);
    }

    pub fn set_density(&mut self, density: f32) {
        self.density = snap_density(density.clamp(MIN_DENSITY, MAX_DENSITY));
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self { duration_seconds: 15, tempo_bpm: 90, density: 0.5 }
    }
}

fn snap_density(density: f32) -> f32 {
    (density * 10.0).round() / 10.0
}

#[derive(Debug)]
pub struct UserTurn {
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ResultTurn {
    pub summary: String,
    pub artifact: Artifact,
    pub settings: Settings,
    pub prompt: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ErrorTurn {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One conversational entry. Immutable once appended to the log.
#[derive(Debug)]
pub enum Turn {
    User(UserTurn),
    Result(ResultTurn),
    Error(ErrorTurn),
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserTurn { text: text.into(), at: Utc::now() })
    }

    pub fn result(
        summary: impl Into<String>,
        artifact: Artifact,
        settings: Settings,
        prompt: impl Into<String>,
    ) -> Self {
        Self::Result(ResultTurn {
            summary: summary.into(),
            artifact,
            settings,
            prompt: prompt.into(),
            at: Utc::now(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorTurn { message: message.into(), at: Utc::now() })
    }

    pub fn as_result(&self) -> Option<&ResultTurn> {
        match self {
            Self::Result(turn) => Some(turn),
            _ => None,
        }
    }
}

/// Append-only record of the conversation. Entries are never edited or
/// reordered; append order is display order.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn append(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Dropping a result turn revokes its audio handle, so clearing also
    /// releases every materialized payload.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Prompt and parameters frozen at the moment a request was dispatched.
#[derive(Debug, Clone)]
pub struct Submission {
    pub prompt: String,
    pub settings: Settings,
}

/// The session aggregate: settings, the conversation log, and the in-flight
/// flag. At most one generation request may be pending at a time; the guard
/// lives here so the invariant holds for programmatic callers too, not just
/// when the UI disables its send trigger.
#[derive(Debug)]
pub struct Session {
    settings: Settings,
    log: ConversationLog,
    pending: bool,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self { settings, log: ConversationLog::default(), pending: false }
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_duration(&mut self, seconds: u8) {
        self.settings.set_duration(seconds);
    }

    pub fn set_tempo(&mut self, bpm: u16) {
        self.settings.set_tempo(bpm);
    }

    pub fn set_density(&mut self, density: f32) {
        self.settings.set_density(density);
    }

    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Starts a submission: validates the prompt, appends the user turn and
    /// raises the pending flag. Returns `None` (a no-op) for a blank prompt
    /// or while another request is in flight — rejected, never queued.
    pub fn begin_submit(&mut self, raw: &str) -> Option<Submission> {
        if self.pending {
            return None;
        }
        let prompt = raw.trim();
        if prompt.is_empty() {
            return None;
        }
        let prompt = prompt.to_string();
        self.log.append(Turn::user(prompt.clone()));
        self.pending = true;
        Some(Submission { prompt, settings: self.settings })
    }

    /// Records the outcome of the in-flight submission and clears the
    /// pending flag. Every dispatch path converges here.
    pub fn finish_submit(&mut self, turn: Turn) -> usize {
        self.pending = false;
        self.log.append(turn)
    }

    /// Full session reset: drops the whole conversation (revoking artifact
    /// handles) and clears the pending flag.
    pub fn reset(&mut self) {
        self.log.clear();
        self.pending = false;
    }

    pub fn latest_result(&self) -> Option<(usize, &ResultTurn)> {
        self.log
            .turns()
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, turn)| turn.as_result().map(|result| (index, result)))
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// Locks the shared session, recovering the guard if a panicking thread
/// poisoned the mutex.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
