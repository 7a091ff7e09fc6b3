//! Per-connection state and the registry that owns it.
//!
//! A session is created on connect and dropped on disconnect or when it
//! has been idle too long. Each session sits behind its own `Mutex`, so
//! frames of one connection are handled one at a time, in arrival order,
//! while different connections proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::arbiter::{ArbiterConfig, Clock, ConfidenceArbiter, Prediction};
use crate::landmarks::Frame;
use crate::utils::BoundedBuffer;

pub const DEFAULT_BUFFER_SIZE: usize = 30;
pub const DEFAULT_HISTORY_SIZE: usize = 20;

const PHRASES: [(&str, &str); 3] = [
    ("I NEED HELP", "I need help"),
    ("THANK YOU", "Thank you"),
    ("HOW ARE YOU", "How are you?"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub label: String,
    pub confidence: f32,
    #[serde(skip)]
    pub at: Duration,
}

/// Emitted signs, oldest first, for sentence assembly.
#[derive(Debug, Clone)]
pub struct GestureHistory {
    entries: BoundedBuffer<HistoryEntry>,
}

impl GestureHistory {
    pub fn new(capacity: usize) -> GestureHistory {
        GestureHistory {
            entries: BoundedBuffer::new(capacity.max(1)),
        }
    }

    pub fn push(&mut self, prediction: &Prediction, at: Duration) {
        self.entries.push(HistoryEntry {
            label: prediction.label.clone(),
            confidence: prediction.confidence,
            at,
        });
    }

    pub fn words(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.replace('_', " ")).collect()
    }

    /// Space-joined labels with a few fixed phrases rewritten.
    pub fn sentence(&self) -> String {
        let mut sentence = self.words().join(" ");
        for (from, to) in PHRASES {
            sentence = sentence.replace(from, to);
        }
        sentence
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct SessionState {
    id: String,
    pub(crate) frames: BoundedBuffer<Frame>,
    pub(crate) arbiter: ConfidenceArbiter,
    pub(crate) history: GestureHistory,
    prediction_count: u64,
    connected_at: Duration,
    last_seen: Duration,
}

impl SessionState {
    pub fn new(
        id: impl Into<String>,
        buffer_size: usize,
        history_size: usize,
        arbiter: ConfidenceArbiter,
        now: Duration,
    ) -> SessionState {
        SessionState {
            id: id.into(),
            frames: BoundedBuffer::new(buffer_size.max(1)),
            arbiter,
            history: GestureHistory::new(history_size),
            prediction_count: 0,
            connected_at: now,
            last_seen: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&mut self) -> &[Frame] {
        self.frames.as_slice()
    }

    pub fn record(&mut self, prediction: &Prediction, at: Duration) {
        self.history.push(prediction, at);
        self.prediction_count += 1;
    }

    pub fn history(&self) -> &GestureHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut GestureHistory {
        &mut self.history
    }

    pub fn arbiter(&self) -> &ConfidenceArbiter {
        &self.arbiter
    }

    pub fn prediction_count(&self) -> u64 {
        self.prediction_count
    }

    pub fn touch(&mut self, now: Duration) {
        self.last_seen = now;
    }

    pub fn idle_for(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_seen)
    }

    pub fn connected_for(&self, now: Duration) -> Duration {
        now.saturating_sub(self.connected_at)
    }
}

/// Settings every new session is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub buffer_size: usize,
    pub history_size: usize,
    pub arbiter: ArbiterConfig,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            buffer_size: DEFAULT_BUFFER_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
            arbiter: ArbiterConfig::default(),
        }
    }
}

pub type SharedSession = Arc<Mutex<SessionState>>;

/// Lock a session, recovering the state if another handler panicked.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, SessionState> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegistryStats {
    pub active_sessions: usize,
    pub total_predictions: u64,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SharedSession>>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings, clock: Arc<dyn Clock>) -> SessionRegistry {
        SessionRegistry {
            sessions: Mutex::new(HashMap::new()),
            settings,
            clock,
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, SharedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the session and whether it was newly created. Connecting an
    /// existing id keeps its state.
    pub fn connect(&self, id: &str) -> (SharedSession, bool) {
        let mut sessions = self.map();
        if let Some(session) = sessions.get(id) {
            return (session.clone(), false);
        }

        let now = self.clock.now();
        let arbiter = ConfidenceArbiter::new(self.settings.arbiter.clone(), self.clock.clone());
        let session = Arc::new(Mutex::new(SessionState::new(
            id,
            self.settings.buffer_size,
            self.settings.history_size,
            arbiter,
            now,
        )));
        sessions.insert(id.to_string(), session.clone());
        info!(session = %id, active = sessions.len(), "session connected");
        (session, true)
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        self.map().get(id).cloned()
    }

    /// Drop the session and its buffers. Returns false for unknown ids.
    pub fn disconnect(&self, id: &str) -> bool {
        let mut sessions = self.map();
        let removed = sessions.remove(id).is_some();
        if removed {
            info!(session = %id, active = sessions.len(), "session disconnected");
        }
        removed
    }

    /// Remove sessions idle for at least `max_idle`. Sessions currently
    /// locked by a handler are in use and are skipped.
    pub fn reap_idle(&self, max_idle: Duration) -> Vec<String> {
        let now = self.clock.now();
        let mut sessions = self.map();
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| {
                s.try_lock()
                    .map_or(false, |state| state.idle_for(now) >= max_idle)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            sessions.remove(id);
            info!(session = %id, "session reaped after idling");
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.map().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> RegistryStats {
        let sessions: Vec<SharedSession> = self.map().values().cloned().collect();
        RegistryStats {
            active_sessions: sessions.len(),
            total_predictions: sessions
                .iter()
                .map(|s| lock_session(s).prediction_count())
                .sum(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
