//! Conversation memory.
//!
//! A [`ConversationMemory`] is an append-only log of turns. The
//! [`SessionStore`] hands out one memory per session key and keeps the
//! unnamed default session for the life of the process.

use ragchat_prompt::{Role, Turn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Ordered, append-only log of conversation turns.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: RwLock<Vec<Turn>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, turn: Turn) {
        self.turns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(turn);
    }

    /// Append a user turn and its assistant reply under one write lock.
    pub fn append_exchange(&self, question: impl Into<String>, answer: impl Into<String>) {
        let mut turns = self.turns.write().unwrap_or_else(|e| e.into_inner());
        turns.push(Turn::user(question));
        turns.push(Turn::assistant(answer));
    }

    /// Snapshot of all turns in insertion order.
    pub fn history(&self) -> Vec<Turn> {
        self.turns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.turns.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of completed user/assistant exchanges.
    pub fn exchanges(&self) -> usize {
        self.turns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count()
    }
}

struct SessionEntry {
    memory: Arc<ConversationMemory>,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<String, SessionEntry>,
    clock: u64,
}

/// Session key → conversation memory, with LRU eviction of named sessions.
pub struct SessionStore {
    default_session: Arc<ConversationMemory>,
    sessions: Mutex<Sessions>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            default_session: Arc::new(ConversationMemory::new()),
            sessions: Mutex::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// The process-wide session used when a request names none.
    pub fn default_session(&self) -> Arc<ConversationMemory> {
        self.default_session.clone()
    }

    /// Memory for `session_id`, creating it on first use.
    ///
    /// `None` and the empty string both select the default session.
    pub fn session(&self, session_id: Option<&str>) -> Arc<ConversationMemory> {
        let key = match session_id.map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return self.default_session(),
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.clock += 1;
        let now = sessions.clock;

        if let Some(entry) = sessions.entries.get_mut(key) {
            entry.last_used = now;
            return entry.memory.clone();
        }

        if sessions.entries.len() >= self.max_sessions {
            let oldest = sessions
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                sessions.entries.remove(&oldest);
                tracing::debug!("Evicted conversation session '{}'", oldest);
            }
        }

        let memory = Arc::new(ConversationMemory::new());
        sessions.entries.insert(
            key.to_string(),
            SessionEntry {
                memory: memory.clone(),
                last_used: now,
            },
        );
        memory
    }

    /// Number of named sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
