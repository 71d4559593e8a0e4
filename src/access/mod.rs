//! Maps a session to a grant/deny decision against a required clearance
//! tier, and serves the tiered data reports behind each gate. Holds no
//! state of its own beyond a handle to the session store.

use crate::model::AccessLevel;
use crate::session::SessionStore;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    Granted,
    /// No session with that id (including ones evicted on expiry).
    NoSession,
    /// Session exists but was invalidated.
    SessionInactive,
    InsufficientLevel,
}

#[derive(Debug, Clone)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: AccessReason,
    pub user_level: Option<AccessLevel>,
    pub required_level: AccessLevel,
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self.reason {
            AccessReason::Granted => "access granted",
            AccessReason::NoSession => "no active session",
            AccessReason::SessionInactive => "session expired",
            AccessReason::InsufficientLevel => "insufficient clearance",
        };
        write!(
            f,
            "access {}: {} (user: {}, required: {})",
            if self.granted { "GRANTED" } else { "DENIED" },
            reason,
            self.user_level.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
            self.required_level
        )
    }
}

pub struct AccessController {
    sessions: Arc<SessionStore>,
}

impl AccessController {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    /// Grant iff the session is live and its user's tier covers the
    /// required tier. Expired sessions surface as `NoSession` because the
    /// store evicts them on read.
    pub fn check_access(&self, session_id: &str, required: AccessLevel) -> AccessDecision {
        let session = match self.sessions.get_session(session_id) {
            Some(session) => session,
            None => {
                return AccessDecision {
                    granted: false,
                    reason: AccessReason::NoSession,
                    user_level: None,
                    required_level: required,
                }
            }
        };

        if !session.active {
            return AccessDecision {
                granted: false,
                reason: AccessReason::SessionInactive,
                user_level: Some(session.user.level),
                required_level: required,
            };
        }

        if session.has_access(required) {
            AccessDecision {
                granted: true,
                reason: AccessReason::Granted,
                user_level: Some(session.user.level),
                required_level: required,
            }
        } else {
            AccessDecision {
                granted: false,
                reason: AccessReason::InsufficientLevel,
                user_level: Some(session.user.level),
                required_level: required,
            }
        }
    }

    pub fn check_public_access(&self, session_id: &str) -> AccessDecision {
        self.check_access(session_id, AccessLevel::Public)
    }

    pub fn check_director_access(&self, session_id: &str) -> AccessDecision {
        self.check_access(session_id, AccessLevel::Director)
    }

    pub fn check_minister_access(&self, session_id: &str) -> AccessDecision {
        self.check_access(session_id, AccessLevel::Minister)
    }

    /// Highest tier the session may read, if it is live at all.
    pub fn max_access_level(&self, session_id: &str) -> Option<AccessLevel> {
        self.sessions.get_session(session_id).map(|s| s.user.level)
    }

    /// The data report a given tier unlocks. Higher tiers include the
    /// reports below them.
    pub fn report_for(&self, level: AccessLevel) -> String {
        match level {
            AccessLevel::Public => public_report(),
            AccessLevel::Director => director_report(),
            AccessLevel::Minister => minister_report(),
        }
    }
}

fn public_report() -> String {
    let mut report = String::new();
    report.push_str("===== PUBLIC DATA - LEVEL 1 =====\n\n");
    report.push_str("Registered rural properties: 15,234\n");
    report.push_str("Monitored area: 2,450,000 hectares\n");
    report.push_str("Properties in compliance: 12,890 (84.6%)\n");
    report.push_str("Monitored regions: 5, covering 342 municipalities\n");
    report.push_str("\n=================================\n");
    report
}

fn director_report() -> String {
    let mut report = public_report();
    report.push_str("\n===== RESTRICTED DATA - LEVEL 2 =====\n\n");
    report.push_str("Properties with registered agrochemical use: 8,456\n");
    report.push_str("Inspections performed: 1,245\n");
    report.push_str("Irregularities found: 234 (18.8%)\n");
    report.push_str("Fines issued: 4,567,890.00\n");
    report.push_str("Open enforcement cases: 156\n");
    report.push_str("\n=====================================\n");
    report
}

fn minister_report() -> String {
    let mut report = director_report();
    report.push_str("\n===== CONFIDENTIAL DATA - LEVEL 3 =====\n\n");
    report.push_str("Banned substances detected in use:\n");
    report.push_str("  - Paraquat: 45 properties (groundwater risk, embargo recommended)\n");
    report.push_str("  - Carbofuran: 23 properties (criminal proceedings opened)\n");
    report.push_str("  - Endosulfan: 12 properties (river contamination, under watch)\n");
    report.push_str("Properties flagged for immediate interdiction: 5\n");
    report.push_str("Investigations in progress: 34\n");
    report.push_str("\nCLASSIFIED - RESTRICTED CIRCULATION\n");
    report.push_str("=======================================\n");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::FixedClock;
    use crate::common::config::SessionConfig;
    use crate::model::UserAccount;
    use chrono::Duration;

    fn setup(level: AccessLevel) -> (AccessController, Arc<SessionStore>, Arc<FixedClock>, String) {
        let clock = Arc::new(FixedClock::default());
        let store = Arc::new(SessionStore::with_clock(&SessionConfig::default(), clock.clone()));
        let user = Arc::new(UserAccount::new("Ana", "ana@example.gov", "111", level, "ops"));
        let session = store.create_session(user, "10.0.0.1", 0.9);
        (AccessController::new(Arc::clone(&store)), store, clock, session.id)
    }

    #[test]
    fn unknown_session_is_denied_with_no_session() {
        let (controller, _store, _clock, _sid) = setup(AccessLevel::Public);
        let decision = controller.check_access("not-a-session", AccessLevel::Public);

        assert!(!decision.granted);
        assert_eq!(decision.reason, AccessReason::NoSession);
        assert!(decision.user_level.is_none());
    }

    #[test]
    fn expired_session_is_denied_and_evicted() {
        let (controller, store, clock, sid) = setup(AccessLevel::Minister);

        clock.advance(Duration::minutes(31));
        let decision = controller.check_access(&sid, AccessLevel::Public);

        assert!(!decision.granted);
        assert_eq!(decision.reason, AccessReason::NoSession);
        assert!(store.get_session(&sid).is_none());
    }

    #[test]
    fn tier_ordering_gates_access() {
        let (controller, _store, _clock, sid) = setup(AccessLevel::Director);

        assert!(controller.check_public_access(&sid).granted);
        assert!(controller.check_director_access(&sid).granted);

        let denied = controller.check_minister_access(&sid);
        assert!(!denied.granted);
        assert_eq!(denied.reason, AccessReason::InsufficientLevel);
        assert_eq!(denied.user_level, Some(AccessLevel::Director));
        assert_eq!(denied.required_level, AccessLevel::Minister);
    }

    #[test]
    fn max_level_reflects_the_session_user() {
        let (controller, _store, _clock, sid) = setup(AccessLevel::Minister);
        assert_eq!(controller.max_access_level(&sid), Some(AccessLevel::Minister));
        assert_eq!(controller.max_access_level("missing"), None);
    }

    #[test]
    fn reports_nest_cumulatively() {
        let (controller, _store, _clock, _sid) = setup(AccessLevel::Public);

        let public = controller.report_for(AccessLevel::Public);
        let director = controller.report_for(AccessLevel::Director);
        let minister = controller.report_for(AccessLevel::Minister);

        assert!(director.contains(&public));
        assert!(minister.contains(&director));
        assert!(minister.contains("CLASSIFIED"));
        assert!(!director.contains("CLASSIFIED"));
    }
}
