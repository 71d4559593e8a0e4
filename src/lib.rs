// Core modules
pub mod access;
pub mod common;
pub mod core;
pub mod model;
pub mod service;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use access::{AccessController, AccessDecision, AccessReason};
pub use common::{BioGateError, Clock, Config, Result, SystemClock};
pub use core::{
    Authentication, BiometricAuthenticator, BiometricCapture, BiometricMatcher, FeatureExtractor,
    MatchResult, VECTOR_LENGTH,
};
pub use model::{AccessLevel, AuditAction, AuditEvent, BiometricTemplate, Modality, UserAccount};
pub use service::AuthenticationService;
pub use session::{CleanupTask, Session, SessionStore};
pub use storage::{
    AuditSink, FileAuditSink, FileStore, MemoryAuditSink, MemoryTemplateRepository,
    MemoryUserRepository, TemplateRepository, UserRepository,
};
