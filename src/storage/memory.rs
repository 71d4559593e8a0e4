//! Lock-protected in-memory repositories. Enough for tests and for
//! single-process deployments that do not need durable storage.

use crate::common::error::{BioGateError, Result};
use crate::model::{AuditEvent, BiometricTemplate, UserAccount};
use crate::storage::{AuditSink, TemplateRepository, UserRepository};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, UserAccount>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(&self, id: &str, apply: impl FnOnce(&mut UserAccount) -> T) -> Result<T> {
        let mut users = self.users.write();
        let user = users
            .get_mut(id)
            .ok_or_else(|| BioGateError::Storage(format!("no such user: {}", id)))?;
        Ok(apply(user))
    }
}

impl UserRepository for MemoryUserRepository {
    fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>> {
        Ok(self.users.read().get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        Ok(self.users.read().values().find(|u| u.email == email).cloned())
    }

    fn create(&self, user: &UserAccount) -> Result<()> {
        let mut users = self.users.write();
        if users.contains_key(&user.id) {
            return Err(BioGateError::Storage(format!("user already exists: {}", user.id)));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn update(&self, user: &UserAccount) -> Result<()> {
        self.with_user(&user.id, |stored| *stored = user.clone())
    }

    fn increment_failed_attempts(&self, id: &str) -> Result<()> {
        self.with_user(id, |user| user.register_failure())
    }

    fn reset_failed_attempts(&self, id: &str) -> Result<()> {
        self.with_user(id, |user| user.reset_failures())
    }

    fn update_last_access(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_user(id, |user| user.last_access_at = Some(at))
    }
}

#[derive(Default)]
pub struct MemoryTemplateRepository {
    templates: RwLock<HashMap<String, BiometricTemplate>>,
}

impl MemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateRepository for MemoryTemplateRepository {
    fn create(&self, template: &BiometricTemplate) -> Result<()> {
        let mut templates = self.templates.write();
        if templates.contains_key(&template.id) {
            return Err(BioGateError::Storage(format!(
                "template already exists: {}",
                template.id
            )));
        }
        templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    fn update(&self, template: &BiometricTemplate) -> Result<()> {
        let mut templates = self.templates.write();
        match templates.get_mut(&template.id) {
            Some(stored) => {
                *stored = template.clone();
                Ok(())
            }
            None => Err(BioGateError::Storage(format!("no such template: {}", template.id))),
        }
    }

    fn find_by_id(&self, id: &str) -> Result<Option<BiometricTemplate>> {
        Ok(self.templates.read().get(id).cloned())
    }

    fn find_by_user_id(&self, user_id: &str) -> Result<Vec<BiometricTemplate>> {
        Ok(self
            .templates
            .read()
            .values()
            .filter(|t| t.user_id == user_id && t.active)
            .cloned()
            .collect())
    }

    fn find_all(&self) -> Result<Vec<BiometricTemplate>> {
        Ok(self.templates.read().values().filter(|t| t.active).cloned().collect())
    }

    fn soft_delete(&self, id: &str) -> Result<bool> {
        let mut templates = self.templates.write();
        match templates.get_mut(id) {
            Some(template) => {
                template.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Collects events in memory; tests assert against the recorded history.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccessLevel;

    #[test]
    fn user_failure_accounting_round_trips() {
        let repo = MemoryUserRepository::new();
        let user = UserAccount::new("Ana", "ana@example.gov", "111", AccessLevel::Public, "ops");
        repo.create(&user).unwrap();

        for _ in 0..3 {
            repo.increment_failed_attempts(&user.id).unwrap();
        }
        let stored = repo.find_by_id(&user.id).unwrap().unwrap();
        assert!(stored.locked);

        repo.reset_failed_attempts(&user.id).unwrap();
        let stored = repo.find_by_id(&user.id).unwrap().unwrap();
        assert!(!stored.locked);
        assert_eq!(stored.failed_attempts, 0);
    }

    #[test]
    fn soft_deleted_templates_disappear_from_queries() {
        let repo = MemoryTemplateRepository::new();
        let extractor = crate::core::extractor::FeatureExtractor::new();
        let image = image::DynamicImage::ImageLuma8(image::ImageBuffer::from_pixel(
            128,
            128,
            image::Luma([120]),
        ));

        let template = extractor.extract(&image, "u1");
        repo.create(&template).unwrap();
        assert_eq!(repo.find_by_user_id("u1").unwrap().len(), 1);
        assert_eq!(repo.find_all().unwrap().len(), 1);

        assert!(repo.soft_delete(&template.id).unwrap());
        assert!(repo.find_by_user_id("u1").unwrap().is_empty());
        assert!(repo.find_all().unwrap().is_empty());
        // The record itself survives for audit references
        assert!(repo.find_by_id(&template.id).unwrap().is_some());
    }

    #[test]
    fn duplicate_user_creation_is_a_storage_error() {
        let repo = MemoryUserRepository::new();
        let user = UserAccount::new("Bo", "bo@example.gov", "222", AccessLevel::Public, "ops");
        repo.create(&user).unwrap();
        assert!(matches!(repo.create(&user), Err(BioGateError::Storage(_))));
    }
}
