//! Conversation state
//!
//! One [`SessionContext`] per conversation id. The store hands out an owned
//! lock per conversation so turns of one conversation run strictly one after
//! another while different conversations proceed concurrently.
//!
//! Credentials are never part of a session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agents::HandlerOutcome;
use crate::config::SessionConfig;
use crate::intelligence::{DispatchDecision, HistoryEntry};

/// What one handler contributed to a turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub capability: String,
    pub answer: String,
    pub needs_clarification: bool,
}

impl From<&HandlerOutcome> for OutcomeRecord {
    fn from(outcome: &HandlerOutcome) -> Self {
        Self {
            capability: outcome.capability_name.clone(),
            answer: outcome
                .clarification_prompt
                .clone()
                .unwrap_or_else(|| outcome.answer.clone()),
            needs_clarification: outcome.needs_clarification,
        }
    }
}

/// One completed turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub query: String,
    pub decision: DispatchDecision,
    pub outcomes: Vec<OutcomeRecord>,
    pub response: String,
    pub at: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(
        query: impl Into<String>,
        decision: DispatchDecision,
        outcomes: &[HandlerOutcome],
        response: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            decision,
            outcomes: outcomes.iter().map(OutcomeRecord::from).collect(),
            response: response.into(),
            at: Utc::now(),
        }
    }
}

/// Per-conversation state
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub conversation_id: String,
    pub turns: Vec<TurnRecord>,
    /// Clarification the last turn asked for
    pub pending_clarification: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    max_history: usize,
}

impl SessionContext {
    pub fn new(conversation_id: impl Into<String>, max_history: usize) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            turns: Vec::new(),
            pending_clarification: None,
            created_at: now,
            updated_at: now,
            max_history,
        }
    }

    /// Append a turn, dropping the oldest beyond the history cap
    pub fn record(&mut self, turn: TurnRecord, pending_clarification: Option<String>) {
        self.turns.push(turn);
        if self.turns.len() > self.max_history {
            let excess = self.turns.len() - self.max_history;
            self.turns.drain(..excess);
        }
        self.pending_clarification = pending_clarification;
        self.updated_at = Utc::now();
    }

    /// Earlier turns as classifier history
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.turns
            .iter()
            .map(|turn| HistoryEntry {
                query: turn.query.clone(),
                response: turn.response.clone(),
            })
            .collect()
    }

    pub fn last_turn(&self) -> Option<&TurnRecord> {
        self.turns.last()
    }

    /// Idle for at least `ttl`
    pub fn is_expired(&self, ttl: Duration) -> bool {
        (Utc::now() - self.updated_at)
            .to_std()
            .map(|idle| idle >= ttl)
            .unwrap_or(false)
    }
}

/// Sessions keyed by conversation id
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<SessionContext>>>,
    ttl: Duration,
    max_history: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_history: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            max_history,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_history)
    }

    /// Lock a conversation for one turn, creating it if needed.
    ///
    /// The guard is held for the whole turn. An expired conversation is
    /// started afresh.
    pub async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<SessionContext> {
        let slot = self
            .sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SessionContext::new(conversation_id, self.max_history))))
            .clone();

        let mut guard = slot.lock_owned().await;
        if !guard.turns.is_empty() && guard.is_expired(self.ttl) {
            debug!(conversation_id, "Session expired, starting over");
            *guard = SessionContext::new(conversation_id, self.max_history);
        }
        guard
    }

    /// Copy of a conversation's state, waiting for a running turn to finish
    pub async fn snapshot(&self, conversation_id: &str) -> Option<SessionContext> {
        let slot = self.sessions.get(conversation_id).map(|entry| entry.value().clone())?;
        let guard = slot.lock().await;
        Some(guard.clone())
    }

    /// Remove idle conversations.
    ///
    /// A slot referenced outside the map belongs to a turn that has taken it
    /// and may not hold its lock yet; such slots are kept.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(session) => !session.is_expired(self.ttl),
                Err(_) => true,
            }
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Sweep every `interval` until `cancel` fires
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            info!(removed, remaining = self.len(), "Expired sessions removed");
                        }
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(query: &str) -> TurnRecord {
        TurnRecord::new(query, DispatchDecision::direct("ok"), &[], "ok")
    }

    #[test]
    fn test_history_is_capped() {
        let mut session = SessionContext::new("c1", 2);
        session.record(turn("one"), None);
        session.record(turn("two"), None);
        session.record(turn("three"), Some("Which namespace?".to_string()));

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "two");
        assert_eq!(session.pending_clarification.as_deref(), Some("Which namespace?"));
    }

    #[tokio::test]
    async fn test_lock_serializes_one_conversation() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60), 10));

        let guard = store.lock("c1").await;
        let waiting = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut session = store.lock("c1").await;
                session.record(turn("second"), None);
            })
        };

        // Other conversations are not blocked
        let other = tokio::time::timeout(Duration::from_millis(200), store.lock("c2")).await;
        assert!(other.is_ok());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());
        drop(guard);
        waiting.await.unwrap();

        let snapshot = store.snapshot("c1").await.unwrap();
        assert_eq!(snapshot.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_sessions() {
        let store = SessionStore::new(Duration::ZERO, 10);
        {
            let mut session = store.lock("idle").await;
            session.record(turn("hi"), None);
        }
        let busy = store.lock("busy").await;

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        drop(busy);
    }

    #[tokio::test]
    async fn test_sweep_keeps_slot_taken_by_a_turn() {
        let store = SessionStore::new(Duration::ZERO, 10);
        {
            let mut session = store.lock("c1").await;
            session.record(turn("hi"), None);
        }

        // A turn that has taken the slot but not locked it yet
        let taken = store.sessions.get("c1").map(|entry| entry.value().clone()).unwrap();
        assert_eq!(store.sweep(), 0);

        let guard = taken.clone().lock_owned().await;
        let current = store.sessions.get("c1").map(|entry| entry.value().clone()).unwrap();
        assert!(Arc::ptr_eq(&current, &taken));
        assert_eq!(guard.turns.len(), 1);

        drop(guard);
        drop(current);
        drop(taken);
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_starts_over() {
        let store = SessionStore::new(Duration::ZERO, 10);
        {
            let mut session = store.lock("c1").await;
            session.record(turn("hi"), Some("Which one?".to_string()));
        }
        let session = store.lock("c1").await;
        assert!(session.turns.is_empty());
        assert!(session.pending_clarification.is_none());
    }
}
