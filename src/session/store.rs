//! Registry of live authenticated sessions, indexed by session id and by
//! user id. A single lock guards both indices so cross-index mutations are
//! atomic: a lookup racing a removal sees either the live session or
//! nothing, never a half-removed one.

use crate::common::clock::{Clock, SystemClock};
use crate::common::config::SessionConfig;
use crate::model::{AccessLevel, UserAccount};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user: Arc<UserAccount>,
    pub login_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub origin: String,
    pub auth_score: f64,
    pub active: bool,
}

impl Session {
    fn new(user: Arc<UserAccount>, origin: &str, auth_score: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user,
            login_time: now,
            last_activity: now,
            origin: origin.to_string(),
            auth_score,
            active: true,
        }
    }

    pub fn has_access(&self, required: AccessLevel) -> bool {
        self.active && self.user.level.can_access(required)
    }

    pub fn duration_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.login_time).num_minutes()
    }

    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity).num_minutes()
    }

    fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }
}

struct Indexes {
    by_id: HashMap<String, Session>,
    by_user: HashMap<String, String>,
}

pub struct SessionStore {
    inner: RwLock<Indexes>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Indexes { by_id: HashMap::new(), by_user: HashMap::new() }),
            timeout: Duration::minutes(config.timeout_minutes as i64),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a session for a freshly authenticated user, evicting any
    /// session the user already holds (at most one live session per user).
    pub fn create_session(&self, user: Arc<UserAccount>, origin: &str, auth_score: f64) -> Session {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        if let Some(old_id) = inner.by_user.remove(&user.id) {
            inner.by_id.remove(&old_id);
            tracing::debug!(user_id = %user.id, session_id = %old_id, "evicted previous session");
        }

        let session = Session::new(user, origin, auth_score, now);
        inner.by_user.insert(session.user.id.clone(), session.id.clone());
        inner.by_id.insert(session.id.clone(), session.clone());

        tracing::info!(session_id = %session.id, user = %session.user.name, "session created");
        session
    }

    /// Fetch by session id. Expired sessions are evicted as a side effect;
    /// a live hit extends the inactivity window.
    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        let expired = match inner.by_id.get_mut(session_id) {
            Some(session) if session.active && !session.is_expired(now, self.timeout) => {
                session.last_activity = now;
                return Some(session.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            Self::evict(&mut inner, session_id);
        }
        None
    }

    /// Fetch the session a user currently holds, with the same lazy
    /// expiration and activity touch as [`get_session`](Self::get_session).
    pub fn get_user_session(&self, user_id: &str) -> Option<Session> {
        let session_id = self.inner.read().by_user.get(user_id).cloned()?;
        self.get_session(&session_id)
    }

    pub fn has_active_session(&self, user_id: &str) -> bool {
        self.get_user_session(user_id).is_some()
    }

    /// Invalidate and drop a session from both indices. Returns the removed
    /// session, if any.
    pub fn remove_session(&self, session_id: &str) -> Option<Session> {
        let mut inner = self.inner.write();
        let removed = Self::evict(&mut inner, session_id);
        if let Some(session) = &removed {
            tracing::info!(session_id = %session.id, user = %session.user.name, "session removed");
        }
        removed
    }

    pub fn remove_user_session(&self, user_id: &str) -> Option<Session> {
        let mut inner = self.inner.write();
        let session_id = inner.by_user.get(user_id).cloned()?;
        let removed = Self::evict(&mut inner, &session_id);
        if removed.is_some() {
            tracing::info!(user_id, session_id = %session_id, "user session removed");
        }
        removed
    }

    fn evict(inner: &mut Indexes, session_id: &str) -> Option<Session> {
        let mut session = inner.by_id.remove(session_id)?;
        session.active = false;
        inner.by_user.remove(&session.user.id);
        Some(session)
    }

    /// Sweep every expired session out of both indices. Returns how many
    /// were evicted.
    pub fn clean_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        let expired: Vec<String> = inner
            .by_id
            .values()
            .filter(|s| !s.active || s.is_expired(now, self.timeout))
            .map(|s| s.id.clone())
            .collect();

        for session_id in &expired {
            Self::evict(&mut inner, session_id);
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired sessions cleaned");
        }
        expired.len()
    }

    /// Snapshot of the currently live sessions, sweeping first.
    pub fn active_sessions(&self) -> Vec<Session> {
        self.clean_expired();
        self.inner.read().by_id.values().cloned().collect()
    }

    pub fn active_session_count(&self) -> usize {
        self.clean_expired();
        self.inner.read().by_id.len()
    }

    /// Invalidate everything, e.g. on administrative shutdown.
    pub fn clear_all(&self) {
        let mut inner = self.inner.write();
        let count = inner.by_id.len();
        inner.by_id.clear();
        inner.by_user.clear();
        tracing::info!(count, "all sessions cleared");
    }

    /// Size of the id index without triggering a sweep or lazy eviction.
    #[cfg(test)]
    pub(crate) fn raw_session_count(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn session_report(&self) -> String {
        let sessions = self.active_sessions();
        let now = self.clock.now();

        let mut report = String::new();
        report.push_str("===== SESSION REPORT =====\n");
        report.push_str(&format!("Active sessions: {}\n\n", sessions.len()));

        for session in &sessions {
            report.push_str(&format!("Session {}\n", session.id));
            report.push_str(&format!("  User: {}\n", session.user.name));
            report.push_str(&format!("  Level: {}\n", session.user.level));
            report.push_str(&format!("  Origin: {}\n", session.origin));
            report.push_str(&format!("  Login: {}\n", session.login_time.to_rfc3339()));
            report.push_str(&format!("  Duration: {} min\n", session.duration_minutes(now)));
            report.push_str(&format!("  Idle: {} min\n", session.idle_minutes(now)));
            report.push_str(&format!("  Auth score: {:.2}%\n\n", session.auth_score * 100.0));
        }

        report.push_str("==========================\n");
        report
    }
}
