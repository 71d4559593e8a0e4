//! Persistence boundary. The core only ever talks to these traits; the
//! in-memory implementations back tests and single-process deployments,
//! the file store persists enrollments between CLI runs.

pub mod file_store;
pub mod memory;

use crate::common::error::Result;
use crate::model::{AuditEvent, BiometricTemplate, UserAccount};
use chrono::{DateTime, Utc};

pub use file_store::{FileAuditSink, FileStore};
pub use memory::{MemoryAuditSink, MemoryTemplateRepository, MemoryUserRepository};

pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>>;
    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>>;
    fn create(&self, user: &UserAccount) -> Result<()>;
    fn update(&self, user: &UserAccount) -> Result<()>;
    /// Count one failed login attempt, locking the account when the budget
    /// is exhausted.
    fn increment_failed_attempts(&self, id: &str) -> Result<()>;
    /// Clear the failure counter and any lock.
    fn reset_failed_attempts(&self, id: &str) -> Result<()>;
    fn update_last_access(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

pub trait TemplateRepository: Send + Sync {
    fn create(&self, template: &BiometricTemplate) -> Result<()>;
    fn update(&self, template: &BiometricTemplate) -> Result<()>;
    fn find_by_id(&self, id: &str) -> Result<Option<BiometricTemplate>>;
    /// Active templates for one user.
    fn find_by_user_id(&self, user_id: &str) -> Result<Vec<BiometricTemplate>>;
    /// Every active template in the system.
    fn find_all(&self) -> Result<Vec<BiometricTemplate>>;
    /// Flip the active flag; the record itself is kept for audit references.
    fn soft_delete(&self, id: &str) -> Result<bool>;
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<()>;
}
