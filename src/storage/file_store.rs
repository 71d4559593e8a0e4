//! Durable single-node storage: bincode files under a data directory, one
//! template file per user, plus a JSON-lines audit log. Suitable for the
//! CLI; larger deployments would put a real database behind the same
//! traits.

use crate::common::error::{BioGateError, Result};
use crate::model::{AuditEvent, BiometricTemplate, UserAccount};
use crate::storage::{AuditSink, TemplateRepository, UserRepository};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const STORAGE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct UserFile {
    version: u32,
    users: Vec<UserAccount>,
}

#[derive(Serialize, Deserialize)]
struct TemplateFile {
    version: u32,
    user_id: String,
    templates: Vec<BiometricTemplate>,
}

pub struct FileStore {
    data_dir: PathBuf,
    templates_dir: PathBuf,
    // One writer at a time; reads go through the same guard since every
    // operation is a load-modify-save over small files.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let templates_dir = data_dir.join("templates");
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&templates_dir)?;

        Ok(Self { data_dir, templates_dir, lock: Mutex::new(()) })
    }

    fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.bincode")
    }

    fn template_file(&self, user_id: &str) -> PathBuf {
        self.templates_dir.join(format!("{}.bincode", user_id))
    }

    fn load_users(&self) -> Result<Vec<UserAccount>> {
        let path = self.users_file();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let data = fs::read(path)?;
        let mut file: UserFile = bincode::deserialize(&data)
            .map_err(|e| BioGateError::Storage(format!("failed to deserialize users: {}", e)))?;

        if file.version < STORAGE_VERSION {
            // Future migration logic would go here
            file.version = STORAGE_VERSION;
        }

        Ok(file.users)
    }

    fn save_users(&self, users: &[UserAccount]) -> Result<()> {
        let file = UserFile { version: STORAGE_VERSION, users: users.to_vec() };
        let encoded = bincode::serialize(&file)
            .map_err(|e| BioGateError::Storage(format!("failed to serialize users: {}", e)))?;
        fs::write(self.users_file(), encoded)?;
        Ok(())
    }

    fn load_templates(&self, user_id: &str) -> Result<Vec<BiometricTemplate>> {
        Self::load_template_file(&self.template_file(user_id))
    }

    fn load_template_file(path: &Path) -> Result<Vec<BiometricTemplate>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let data = fs::read(path)?;
        let file: TemplateFile = bincode::deserialize(&data)
            .map_err(|e| BioGateError::Storage(format!("failed to deserialize templates: {}", e)))?;

        Ok(file.templates)
    }

    fn save_templates(&self, user_id: &str, templates: &[BiometricTemplate]) -> Result<()> {
        let file = TemplateFile {
            version: STORAGE_VERSION,
            user_id: user_id.to_string(),
            templates: templates.to_vec(),
        };
        let encoded = bincode::serialize(&file)
            .map_err(|e| BioGateError::Storage(format!("failed to serialize templates: {}", e)))?;
        fs::write(self.template_file(user_id), encoded)?;
        Ok(())
    }

    fn template_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.templates_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "bincode").unwrap_or(false) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn with_user<T>(&self, id: &str, apply: impl FnOnce(&mut UserAccount) -> T) -> Result<T> {
        let _guard = self.lock.lock();
        let mut users = self.load_users()?;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| BioGateError::Storage(format!("no such user: {}", id)))?;
        let value = apply(user);
        self.save_users(&users)?;
        Ok(value)
    }
}

impl UserRepository for FileStore {
    fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>> {
        let _guard = self.lock.lock();
        Ok(self.load_users()?.into_iter().find(|u| u.id == id))
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        let _guard = self.lock.lock();
        Ok(self.load_users()?.into_iter().find(|u| u.email == email))
    }

    fn create(&self, user: &UserAccount) -> Result<()> {
        let _guard = self.lock.lock();
        let mut users = self.load_users()?;
        if users.iter().any(|u| u.id == user.id) {
            return Err(BioGateError::Storage(format!("user already exists: {}", user.id)));
        }
        users.push(user.clone());
        self.save_users(&users)
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

impl TemplateRepository for FileStore {
    fn create(&self, template: &BiometricTemplate) -> Result<()> {
        let _guard = self.lock.lock();
        let mut templates = self.load_templates(&template.user_id)?;
        if templates.iter().any(|t| t.id == template.id) {
            return Err(BioGateError::Storage(format!(
                "template already exists: {}",
                template.id
            )));
        }
        templates.push(template.clone());
        self.save_templates(&template.user_id, &templates)
    }

    fn update(&self, template: &BiometricTemplate) -> Result<()> {
        let _guard = self.lock.lock();
        let mut templates = self.load_templates(&template.user_id)?;
        match templates.iter_mut().find(|t| t.id == template.id) {
            Some(stored) => {
                *stored = template.clone();
                self.save_templates(&template.user_id, &templates)
            }
            None => Err(BioGateError::Storage(format!("no such template: {}", template.id))),
        }
    }

    fn find_by_id(&self, id: &str) -> Result<Option<BiometricTemplate>> {
        let _guard = self.lock.lock();
        for path in self.template_files()? {
            if let Some(template) =
                Self::load_template_file(&path)?.into_iter().find(|t| t.id == id)
            {
                return Ok(Some(template));
            }
        }
        Ok(None)
    }

    fn find_by_user_id(&self, user_id: &str) -> Result<Vec<BiometricTemplate>> {
        let _guard = self.lock.lock();
        Ok(self.load_templates(user_id)?.into_iter().filter(|t| t.active).collect())
    }

    fn find_all(&self) -> Result<Vec<BiometricTemplate>> {
        let _guard = self.lock.lock();
        let mut all = Vec::new();
        for path in self.template_files()? {
            all.extend(Self::load_template_file(&path)?.into_iter().filter(|t| t.active));
        }
        Ok(all)
    }

    fn soft_delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        for path in self.template_files()? {
            let mut templates = Self::load_template_file(&path)?;
            if let Some(template) = templates.iter_mut().find(|t| t.id == id) {
                template.active = false;
                let user_id = template.user_id.clone();
                self.save_templates(&user_id, &templates)?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Appends audit events as JSON lines, one file per store.
pub struct FileAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { path: data_dir.join("audit.jsonl"), lock: Mutex::new(()) })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        let line = serde_json::to_string(&event)
            .map_err(|e| BioGateError::Storage(format!("failed to serialize audit event: {}", e)))?;

        let _guard = self.lock.lock();
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessLevel, AuditAction};

    fn sample_template(user_id: &str) -> BiometricTemplate {
        let extractor = crate::core::extractor::FeatureExtractor::new();
        let image = image::DynamicImage::ImageLuma8(image::ImageBuffer::from_fn(
            128,
            128,
            |x, y| image::Luma([((x * 7 + y * 13) % 256) as u8]),
        ));
        extractor.extract(&image, user_id)
    }

    #[test]
    fn users_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let user = UserAccount::new("Ana", "ana@example.gov", "111", AccessLevel::Director, "ops");
        UserRepository::create(&store, &user).unwrap();

        let loaded = UserRepository::find_by_id(&store, &user.id).unwrap().unwrap();
        assert_eq!(loaded.email, "ana@example.gov");
        assert_eq!(loaded.level, AccessLevel::Director);

        assert!(store.find_by_email("ana@example.gov").unwrap().is_some());
        assert!(store.find_by_email("nobody@example.gov").unwrap().is_none());
    }

    #[test]
    fn failure_counter_persists_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserAccount::new("Bo", "bo@example.gov", "222", AccessLevel::Public, "ops");
        {
            let store = FileStore::new(dir.path()).unwrap();
            UserRepository::create(&store, &user).unwrap();
            store.increment_failed_attempts(&user.id).unwrap();
            store.increment_failed_attempts(&user.id).unwrap();
        }

        let store = FileStore::new(dir.path()).unwrap();
        let loaded = UserRepository::find_by_id(&store, &user.id).unwrap().unwrap();
        assert_eq!(loaded.failed_attempts, 2);
        assert!(!loaded.locked);
    }

    #[test]
    fn templates_round_trip_and_soft_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let template = sample_template("u1");
        TemplateRepository::create(&store, &template).unwrap();

        assert_eq!(store.find_by_user_id("u1").unwrap().len(), 1);
        assert_eq!(store.find_all().unwrap().len(), 1);
        assert!(TemplateRepository::find_by_id(&store, &template.id).unwrap().is_some());

        assert!(store.soft_delete(&template.id).unwrap());
        assert!(store.find_by_user_id("u1").unwrap().is_empty());
        assert!(store.find_all().unwrap().is_empty());
        // Soft-deleted records stay addressable by id
        assert!(TemplateRepository::find_by_id(&store, &template.id).unwrap().is_some());
    }

    #[test]
    fn audit_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAuditSink::new(dir.path()).unwrap();

        for action in [AuditAction::LoginAttempt, AuditAction::LoginSuccess] {
            sink.record(AuditEvent::new(
                "u1", "Ana", action, true, "10.0.0.1", "test", 0.9, Utc::now(),
            ))
            .unwrap();
        }

        let contents = fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("LoginSuccess"));
    }
}
