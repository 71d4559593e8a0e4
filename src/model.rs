//! Domain types shared across the biometric pipeline, session layer and
//! persistence boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consecutive failed logins after which an account locks.
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

/// Ordinal clearance tier. A higher tier is a strict superset of the access
/// granted by the tiers below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessLevel {
    Public = 1,
    Director = 2,
    Minister = 3,
}

impl AccessLevel {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn can_access(self, required: AccessLevel) -> bool {
        self.level() >= required.level()
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(AccessLevel::Public),
            2 => Some(AccessLevel::Director),
            3 => Some(AccessLevel::Minister),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AccessLevel::Public => "Public",
            AccessLevel::Director => "Director",
            AccessLevel::Minister => "Minister",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Level {} - {}", self.level(), self.display_name())
    }
}

/// Biometric modality a template was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    Fingerprint,
    Face,
    Iris,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Fingerprint => "fingerprint",
            Modality::Face => "face",
            Modality::Iris => "iris",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fingerprint" => Ok(Modality::Fingerprint),
            "face" => Ok(Modality::Face),
            "iris" => Ok(Modality::Iris),
            other => Err(format!("unknown modality: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub name: String,
    pub email: String,
    pub national_id: String,
    pub level: AccessLevel,
    pub department: String,
    pub active: bool,
    pub failed_attempts: u32,
    pub locked: bool,
    pub registered_at: DateTime<Utc>,
    pub last_access_at: Option<DateTime<Utc>>,
}

impl UserAccount {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        national_id: impl Into<String>,
        level: AccessLevel,
        department: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            email: email.into(),
            national_id: national_id.into(),
            level,
            department: department.into(),
            active: true,
            failed_attempts: 0,
            locked: false,
            registered_at: Utc::now(),
            last_access_at: None,
        }
    }

    /// Count one failed login. Locks the account once the attempt budget
    /// is exhausted.
    pub fn register_failure(&mut self) {
        self.failed_attempts += 1;
        if self.failed_attempts >= MAX_FAILED_ATTEMPTS {
            self.locked = true;
        }
    }

    /// Clears the failure counter and any lock it caused.
    pub fn reset_failures(&mut self) {
        self.failed_attempts = 0;
        self.locked = false;
    }

    pub fn can_access(&self, required: AccessLevel) -> bool {
        if !self.active || self.locked {
            return false;
        }
        self.level.can_access(required)
    }
}

/// The stored descriptor for one biometric enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricTemplate {
    pub id: String,
    pub user_id: String,
    pub modality: Modality,
    /// Fixed-length descriptor, L2-normalized unless the source image was
    /// degenerate (then all zeros).
    pub feature_vector: Vec<f64>,
    /// Serialized keypoint list, kept for audit and diagnostics only.
    pub keypoint_blob: String,
    /// Heuristic signal estimate in [0, 100].
    pub quality_score: f64,
    pub captured_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
}

impl BiometricTemplate {
    pub fn quality_level(&self) -> &'static str {
        if self.quality_score >= 80.0 {
            "excellent"
        } else if self.quality_score >= 60.0 {
            "good"
        } else if self.quality_score >= 40.0 {
            "fair"
        } else {
            "low"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    LoginAttempt,
    LoginSuccess,
    LoginFailed,
    Logout,
    AccessGranted,
    AccessDenied,
    BiometricEnrolled,
    BiometricUpdated,
}

/// Immutable audit record handed to the configured sink. The core emits one
/// per login attempt and outcome, logout, and access decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub action: AuditAction,
    pub level: Option<AccessLevel>,
    pub success: bool,
    pub origin: String,
    pub description: String,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        action: AuditAction,
        success: bool,
        origin: impl Into<String>,
        description: impl Into<String>,
        score: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            action,
            level: None,
            success,
            origin: origin.into(),
            description: description.into(),
            score,
            timestamp,
        }
    }

    pub fn with_level(mut self, level: AccessLevel) -> Self {
        self.level = Some(level);
        self
    }
}
