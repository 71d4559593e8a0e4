//! Application façade: wires the biometric authenticator, session store,
//! access controller and audit sink together, and owns the background
//! cleanup task for the life of the service.

use crate::access::{AccessController, AccessDecision};
use crate::common::clock::{Clock, SystemClock};
use crate::common::config::Config;
use crate::common::error::{BioGateError, Result};
use crate::core::auth::BiometricAuthenticator;
use crate::core::capture::BiometricCapture;
use crate::model::{AccessLevel, AuditAction, AuditEvent, BiometricTemplate, Modality};
use crate::session::{CleanupTask, Session, SessionStore};
use crate::storage::{AuditSink, TemplateRepository, UserRepository};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct AuthenticationService {
    authenticator: BiometricAuthenticator,
    sessions: Arc<SessionStore>,
    access: AccessController,
    users: Arc<dyn UserRepository>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    cleanup: Option<CleanupTask>,
}

impl AuthenticationService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        templates: Arc<dyn TemplateRepository>,
        audit: Arc<dyn AuditSink>,
        config: &Config,
    ) -> Self {
        Self::with_clock(users, templates, audit, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        users: Arc<dyn UserRepository>,
        templates: Arc<dyn TemplateRepository>,
        audit: Arc<dyn AuditSink>,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::with_clock(&config.session, clock.clone()));
        let cleanup = CleanupTask::start(
            Arc::clone(&sessions),
            Duration::from_secs(config.session.cleanup_interval_minutes * 60),
        );

        let authenticator = BiometricAuthenticator::new(
            Arc::clone(&users),
            templates,
            BiometricCapture::new(&config.capture),
            &config.matcher,
            &config.enrollment,
        );

        Self {
            authenticator,
            access: AccessController::new(Arc::clone(&sessions)),
            sessions,
            users,
            audit,
            clock,
            cleanup: Some(cleanup),
        }
    }

    pub fn authenticator(&self) -> &BiometricAuthenticator {
        &self.authenticator
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Verification login. On success the user gets a fresh session and a
    /// clean failure counter; every expected failure counts against the
    /// claimed account.
    pub fn login(&self, user_id: &str, image: &DynamicImage, origin: &str) -> Result<Session> {
        self.record(AuditEvent::new(
            user_id,
            "",
            AuditAction::LoginAttempt,
            true,
            origin,
            "biometric verification login",
            0.0,
            self.clock.now(),
        ));

        match self.authenticator.authenticate(user_id, image) {
            Ok(auth) => {
                self.users.reset_failed_attempts(&auth.user.id)?;
                self.users.update_last_access(&auth.user.id, self.clock.now())?;

                let score = auth.result.score;
                let user = Arc::new(auth.user);
                let session = self.sessions.create_session(Arc::clone(&user), origin, score);

                self.record(
                    AuditEvent::new(
                        &user.id,
                        &user.name,
                        AuditAction::LoginSuccess,
                        true,
                        origin,
                        "biometric verification succeeded",
                        score,
                        self.clock.now(),
                    )
                    .with_level(user.level),
                );

                tracing::info!(user = %user.name, session_id = %session.id, "login succeeded");
                Ok(session)
            }
            Err(err) => {
                self.note_login_failure(user_id, origin, &err);
                Err(err)
            }
        }
    }

    pub fn login_from_file(&self, user_id: &str, path: &Path, origin: &str) -> Result<Session> {
        let image = self.authenticator.capture().capture_from_file(path)?;
        self.login(user_id, &image, origin)
    }

    /// Identification login: no claimed identity, so failures are recorded
    /// against no account.
    pub fn login_by_identification(&self, image: &DynamicImage, origin: &str) -> Result<Session> {
        match self.authenticator.identify(image) {
            Ok(auth) => {
                self.users.reset_failed_attempts(&auth.user.id)?;
                self.users.update_last_access(&auth.user.id, self.clock.now())?;

                let score = auth.result.score;
                let user = Arc::new(auth.user);
                let session = self.sessions.create_session(Arc::clone(&user), origin, score);

                self.record(
                    AuditEvent::new(
                        &user.id,
                        &user.name,
                        AuditAction::LoginSuccess,
                        true,
                        origin,
                        "biometric identification succeeded",
                        score,
                        self.clock.now(),
                    )
                    .with_level(user.level),
                );

                Ok(session)
            }
            Err(err) => {
                self.record(AuditEvent::new(
                    "unknown",
                    "unknown",
                    AuditAction::LoginFailed,
                    false,
                    origin,
                    format!("identification failed: {}", err),
                    failure_score(&err),
                    self.clock.now(),
                ));
                Err(err)
            }
        }
    }

    /// Enroll through the service so the event lands in the audit trail.
    pub fn enroll(
        &self,
        user_id: &str,
        image: &DynamicImage,
        modality: Modality,
        origin: &str,
    ) -> Result<BiometricTemplate> {
        let template = self.authenticator.enroll(user_id, image, modality)?;
        self.record(AuditEvent::new(
            user_id,
            "",
            AuditAction::BiometricEnrolled,
            true,
            origin,
            format!("{} template enrolled, quality {:.1}", template.modality, template.quality_score),
            template.quality_score / 100.0,
            self.clock.now(),
        ));
        Ok(template)
    }

    pub fn update_template(
        &self,
        template_id: &str,
        image: &DynamicImage,
        origin: &str,
    ) -> Result<BiometricTemplate> {
        let template = self.authenticator.update_template(template_id, image)?;
        self.record(AuditEvent::new(
            &template.user_id,
            "",
            AuditAction::BiometricUpdated,
            true,
            origin,
            format!("template {} updated, quality {:.1}", template.id, template.quality_score),
            template.quality_score / 100.0,
            self.clock.now(),
        ));
        Ok(template)
    }

    pub fn logout(&self, session_id: &str) -> bool {
        match self.sessions.get_session(session_id) {
            Some(session) => {
                self.record(
                    AuditEvent::new(
                        &session.user.id,
                        &session.user.name,
                        AuditAction::Logout,
                        true,
                        &session.origin,
                        "logout",
                        session.auth_score,
                        self.clock.now(),
                    )
                    .with_level(session.user.level),
                );
                self.sessions.remove_session(session_id).is_some()
            }
            None => false,
        }
    }

    /// Administrative logout by user id, e.g. when an operator disables an
    /// account with a session still open.
    pub fn force_logout(&self, user_id: &str) -> bool {
        match self.sessions.get_user_session(user_id) {
            Some(session) => {
                self.record(
                    AuditEvent::new(
                        &session.user.id,
                        &session.user.name,
                        AuditAction::Logout,
                        true,
                        &session.origin,
                        "forced logout",
                        session.auth_score,
                        self.clock.now(),
                    )
                    .with_level(session.user.level),
                );
                self.sessions.remove_user_session(user_id).is_some()
            }
            None => false,
        }
    }

    pub fn is_session_active(&self, session_id: &str) -> bool {
        self.sessions.get_session(session_id).is_some()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get_session(session_id)
    }

    /// Access check with an audit record of the grant or denial.
    pub fn check_access(
        &self,
        session_id: &str,
        required: AccessLevel,
        description: &str,
    ) -> AccessDecision {
        let decision = self.access.check_access(session_id, required);

        if let Some(session) = self.sessions.get_session(session_id) {
            let action = if decision.granted {
                AuditAction::AccessGranted
            } else {
                AuditAction::AccessDenied
            };
            self.record(
                AuditEvent::new(
                    &session.user.id,
                    &session.user.name,
                    action,
                    decision.granted,
                    &session.origin,
                    format!("{} | {}", description, decision),
                    session.auth_score,
                    self.clock.now(),
                )
                .with_level(session.user.level),
            );
        }

        decision
    }

    /// The tier's data report, if the session clears the gate.
    pub fn fetch_report(
        &self,
        session_id: &str,
        required: AccessLevel,
    ) -> std::result::Result<String, AccessDecision> {
        let decision =
            self.check_access(session_id, required, &format!("data access at {}", required));
        if decision.granted {
            Ok(self.access.report_for(required))
        } else {
            Err(decision)
        }
    }

    pub fn session_report(&self) -> String {
        self.sessions.session_report()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.active_session_count()
    }

    pub fn clean_expired_sessions(&self) -> usize {
        self.sessions.clean_expired()
    }

    /// Stop the background cleanup task and join its thread.
    pub fn shutdown(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.stop();
        }
        self.sessions.clear_all();
    }

    fn note_login_failure(&self, user_id: &str, origin: &str, err: &BioGateError) {
        // Input errors are caller bugs; everything else counts against the
        // claimed account when one exists
        if !err.is_input_error() && !matches!(err, BioGateError::Storage(_)) {
            match self.users.find_by_id(user_id) {
                Ok(Some(_)) => {
                    if let Err(inc_err) = self.users.increment_failed_attempts(user_id) {
                        tracing::error!(user_id, error = %inc_err, "failed to record login failure");
                    }
                }
                Ok(None) => {}
                Err(lookup_err) => {
                    tracing::error!(user_id, error = %lookup_err, "failed to look up user for failure accounting");
                }
            }
        }

        self.record(AuditEvent::new(
            user_id,
            "",
            AuditAction::LoginFailed,
            false,
            origin,
            format!("login failed: {}", err),
            failure_score(err),
            self.clock.now(),
        ));

        tracing::warn!(user_id, error = %err, "login failed");
    }

    fn record(&self, event: AuditEvent) {
        if let Err(err) = self.audit.record(event) {
            tracing::error!(error = %err, "failed to record audit event");
        }
    }
}

impl Drop for AuthenticationService {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.stop();
        }
    }
}

/// The comparison score carried by a failure, where the failure got as far
/// as a comparison.
fn failure_score(err: &BioGateError) -> f64 {
    match err {
        BioGateError::MatchRejected { score, .. } => *score,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::FixedClock;
    use crate::model::UserAccount;
    use crate::storage::{MemoryAuditSink, MemoryTemplateRepository, MemoryUserRepository};
    use chrono::Duration as ChronoDuration;
    use image::{ImageBuffer, Luma};

    fn checkerboard(size: u32, cell: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_fn(size, size, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Luma([230])
            } else {
                Luma([25])
            }
        }))
    }

    fn flat(size: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(ImageBuffer::from_pixel(size, size, Luma([value])))
    }

    struct Fixture {
        users: Arc<MemoryUserRepository>,
        audit: Arc<MemoryAuditSink>,
        clock: Arc<FixedClock>,
        service: AuthenticationService,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserRepository::new());
        let templates = Arc::new(MemoryTemplateRepository::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(FixedClock::default());

        let service = AuthenticationService::with_clock(
            users.clone(),
            templates,
            audit.clone(),
            &Config::default(),
            clock.clone(),
        );

        Fixture { users, audit, clock, service }
    }

    fn enrolled_user(fx: &Fixture, name: &str, level: AccessLevel) -> UserAccount {
        let user = UserAccount::new(name, format!("{}@example.gov", name), "123", level, "ops");
        fx.users.create(&user).unwrap();
        fx.service.enroll(&user.id, &checkerboard(128, 8), Modality::Fingerprint, "10.0.0.1").unwrap();
        user
    }

    #[test]
    fn login_creates_a_session_and_resets_failures() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Director);

        // Seed some failures first
        fx.users.increment_failed_attempts(&user.id).unwrap();
        let session = fx.service.login(&user.id, &checkerboard(128, 8), "10.0.0.1").unwrap();

        assert!(fx.service.is_session_active(&session.id));
        let stored = fx.users.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 0);
        assert!(stored.last_access_at.is_some());

        let actions: Vec<_> = fx.audit.events().iter().map(|e| e.action).collect();
        assert!(actions.contains(&AuditAction::LoginAttempt));
        assert!(actions.contains(&AuditAction::LoginSuccess));
    }

    #[test]
    fn exactly_the_third_failure_locks_the_account() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Public);
        let wrong = flat(128, 128);

        for expected_attempts in 1..=2u32 {
            let err = fx.service.login(&user.id, &wrong, "10.0.0.1").unwrap_err();
            assert!(matches!(err, BioGateError::MatchRejected { .. }));
            let stored = fx.users.find_by_id(&user.id).unwrap().unwrap();
            assert_eq!(stored.failed_attempts, expected_attempts);
            assert!(!stored.locked);
        }

        let err = fx.service.login(&user.id, &wrong, "10.0.0.1").unwrap_err();
        assert!(matches!(err, BioGateError::MatchRejected { .. }));
        let stored = fx.users.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 3);
        assert!(stored.locked);

        // The fourth attempt is refused before any comparison, even with
        // the correct capture
        let err = fx.service.login(&user.id, &checkerboard(128, 8), "10.0.0.1").unwrap_err();
        assert!(matches!(err, BioGateError::LockedUser(_)));
    }

    #[test]
    fn input_errors_do_not_consume_the_attempt_budget() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Public);

        let err = fx.service.login(&user.id, &flat(32, 128), "10.0.0.1").unwrap_err();
        assert!(matches!(err, BioGateError::InvalidInput(_)));

        let stored = fx.users.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 0);
    }

    #[test]
    fn quality_failures_do_consume_the_attempt_budget() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Public);

        let err = fx.service.login(&user.id, &flat(128, 250), "10.0.0.1").unwrap_err();
        assert!(matches!(err, BioGateError::ImageQuality(_)));

        let stored = fx.users.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 1);
    }

    #[test]
    fn identification_login_finds_the_owner() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Minister);

        let session =
            fx.service.login_by_identification(&checkerboard(128, 8), "10.0.0.9").unwrap();
        assert_eq!(session.user.id, user.id);
        assert_eq!(session.origin, "10.0.0.9");
    }

    #[test]
    fn session_expires_after_idle_window_despite_earlier_activity() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Minister);
        let session = fx.service.login(&user.id, &checkerboard(128, 8), "10.0.0.1").unwrap();

        // Accesses at T+10m and T+25m keep the session alive
        fx.clock.advance(ChronoDuration::minutes(10));
        assert!(fx.service.check_access(&session.id, AccessLevel::Director, "report").granted);

        fx.clock.advance(ChronoDuration::minutes(15));
        assert!(fx.service.check_access(&session.id, AccessLevel::Director, "report").granted);

        // Then idle past the 30-minute window: T+56m
        fx.clock.advance(ChronoDuration::minutes(31));
        let decision = fx.service.check_access(&session.id, AccessLevel::Director, "report");
        assert!(!decision.granted);
        assert_eq!(decision.reason, crate::access::AccessReason::NoSession);
        assert!(!fx.service.is_session_active(&session.id));
    }

    #[test]
    fn access_decisions_are_audited() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Public);
        let session = fx.service.login(&user.id, &checkerboard(128, 8), "10.0.0.1").unwrap();

        assert!(fx.service.fetch_report(&session.id, AccessLevel::Public).is_ok());
        let denied = fx.service.fetch_report(&session.id, AccessLevel::Minister).unwrap_err();
        assert!(!denied.granted);

        let actions: Vec<_> = fx.audit.events().iter().map(|e| e.action).collect();
        assert!(actions.contains(&AuditAction::AccessGranted));
        assert!(actions.contains(&AuditAction::AccessDenied));
    }

    #[test]
    fn logout_removes_the_session_and_audits() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Public);
        let session = fx.service.login(&user.id, &checkerboard(128, 8), "10.0.0.1").unwrap();

        assert!(fx.service.logout(&session.id));
        assert!(!fx.service.is_session_active(&session.id));
        assert!(!fx.service.logout(&session.id));

        let actions: Vec<_> = fx.audit.events().iter().map(|e| e.action).collect();
        assert!(actions.contains(&AuditAction::Logout));
    }

    #[test]
    fn force_logout_evicts_by_user_id() {
        let fx = fixture();
        let user = enrolled_user(&fx, "ana", AccessLevel::Public);
        let session = fx.service.login(&user.id, &checkerboard(128, 8), "10.0.0.1").unwrap();

        assert!(fx.service.force_logout(&user.id));
        assert!(!fx.service.is_session_active(&session.id));
        assert!(!fx.service.force_logout(&user.id));
    }

    #[test]
    fn shutdown_stops_the_cleanup_task() {
        let fx = fixture();
        let started = std::time::Instant::now();
        fx.service.shutdown();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
