//! Orchestration of the biometric flows: enrollment, 1:1 verification
//! login, 1:N identification login, template update and removal. Identity
//! checks run before any image work; persistence stays behind the
//! repository traits.

use crate::common::config::{EnrollmentConfig, MatcherConfig};
use crate::common::error::{BioGateError, Result};
use crate::core::capture::BiometricCapture;
use crate::core::extractor::FeatureExtractor;
use crate::core::matcher::{BiometricMatcher, MatchResult};
use crate::model::{BiometricTemplate, Modality, UserAccount};
use crate::storage::{TemplateRepository, UserRepository};
use chrono::Utc;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;

/// A successful authentication: the account plus the match that admitted it.
#[derive(Debug, Clone)]
pub struct Authentication {
    pub user: UserAccount,
    pub result: MatchResult,
}

pub struct BiometricAuthenticator {
    capture: BiometricCapture,
    extractor: FeatureExtractor,
    matcher: BiometricMatcher,
    users: Arc<dyn UserRepository>,
    templates: Arc<dyn TemplateRepository>,
    min_quality: f64,
}

impl BiometricAuthenticator {
    pub fn new(
        users: Arc<dyn UserRepository>,
        templates: Arc<dyn TemplateRepository>,
        capture: BiometricCapture,
        matcher_config: &MatcherConfig,
        enrollment_config: &EnrollmentConfig,
    ) -> Self {
        Self {
            capture,
            extractor: FeatureExtractor::new(),
            matcher: BiometricMatcher::new(matcher_config),
            users,
            templates,
            min_quality: enrollment_config.min_quality,
        }
    }

    pub fn matcher(&self) -> &BiometricMatcher {
        &self.matcher
    }

    pub fn capture(&self) -> &BiometricCapture {
        &self.capture
    }

    /// Extract and persist a template for a user. Rejects captures that
    /// fail the image gate or extract below the quality floor.
    pub fn enroll(
        &self,
        user_id: &str,
        image: &DynamicImage,
        modality: Modality,
    ) -> Result<BiometricTemplate> {
        self.capture.validate_quality(image)?;

        let mut template = self.extractor.extract(image, user_id);
        template.modality = modality;

        if template.quality_score < self.min_quality {
            return Err(BioGateError::QualityTooLow {
                score: template.quality_score,
                minimum: self.min_quality,
            });
        }

        self.templates.create(&template)?;
        tracing::info!(
            template_id = %template.id,
            user_id,
            quality = template.quality_score,
            "biometric enrolled"
        );
        Ok(template)
    }

    pub fn enroll_from_file(
        &self,
        user_id: &str,
        path: &Path,
        modality: Modality,
    ) -> Result<BiometricTemplate> {
        let image = self.capture.capture_from_file(path)?;
        self.enroll(user_id, &image, modality)
    }

    /// Verification login: does this capture match the claimed identity?
    /// Account state is checked before any image work.
    pub fn authenticate(&self, user_id: &str, image: &DynamicImage) -> Result<Authentication> {
        let user = self
            .users
            .find_by_id(user_id)?
            .ok_or_else(|| BioGateError::UnknownUser(user_id.to_string()))?;

        if !user.active {
            return Err(BioGateError::InactiveUser(user_id.to_string()));
        }
        if user.locked {
            return Err(BioGateError::LockedUser(user_id.to_string()));
        }

        self.capture.validate_quality(image)?;
        let sample = self.extractor.extract(image, user_id);

        let enrolled = self.templates.find_by_user_id(user_id)?;
        if enrolled.is_empty() {
            return Err(BioGateError::NoEnrollment(format!(
                "no templates enrolled for user {}",
                user_id
            )));
        }

        // Compare against the best enrollment the user has
        let best = enrolled
            .iter()
            .max_by(|a, b| {
                a.quality_score
                    .partial_cmp(&b.quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty template list");

        let result = self.matcher.verify(&sample, best)?;
        tracing::debug!(
            user_id,
            score = result.score,
            matched = result.matched,
            "verification completed"
        );

        if result.matched {
            Ok(Authentication { user, result })
        } else {
            Err(BioGateError::MatchRejected {
                score: result.score,
                threshold: self.matcher.verification_threshold(),
            })
        }
    }

    pub fn authenticate_from_file(&self, user_id: &str, path: &Path) -> Result<Authentication> {
        let image = self.capture.capture_from_file(path)?;
        self.authenticate(user_id, &image)
    }

    /// Identification login: which identity, if any, does this capture
    /// match? A matched template whose owner is locked or inactive counts
    /// as a failure, not a success.
    pub fn identify(&self, image: &DynamicImage) -> Result<Authentication> {
        self.capture.validate_quality(image)?;
        let sample = self.extractor.extract(image, "unknown");

        let population = self.templates.find_all()?;
        if population.is_empty() {
            return Err(BioGateError::NoEnrollment(
                "no templates enrolled in the system".to_string(),
            ));
        }

        let result = self.matcher.identify(&sample, &population)?;

        if result.matched {
            if let Some(matched_id) = &result.matched_user_id {
                if let Some(user) = self.users.find_by_id(matched_id)? {
                    if user.active && !user.locked {
                        tracing::info!(
                            user_id = %user.id,
                            score = result.score,
                            "user identified"
                        );
                        return Ok(Authentication { user, result });
                    }
                    tracing::warn!(user_id = %user.id, "identified user is locked or inactive");
                }
            }
        }

        Err(BioGateError::MatchRejected {
            score: result.score,
            threshold: self.matcher.identification_threshold(),
        })
    }

    pub fn identify_from_file(&self, path: &Path) -> Result<Authentication> {
        let image = self.capture.capture_from_file(path)?;
        self.identify(&image)
    }

    /// Re-extract from a fresh capture and replace an existing template's
    /// vector, blob and quality in place. The template id is preserved.
    pub fn update_template(
        &self,
        template_id: &str,
        image: &DynamicImage,
    ) -> Result<BiometricTemplate> {
        let mut existing = self
            .templates
            .find_by_id(template_id)?
            .filter(|t| t.active)
            .ok_or_else(|| {
                BioGateError::InvalidInput(format!("no active template: {}", template_id))
            })?;

        self.capture.validate_quality(image)?;
        let fresh = self.extractor.extract(image, &existing.user_id);
        if fresh.quality_score < self.min_quality {
            return Err(BioGateError::QualityTooLow {
                score: fresh.quality_score,
                minimum: self.min_quality,
            });
        }

        existing.feature_vector = fresh.feature_vector;
        existing.keypoint_blob = fresh.keypoint_blob;
        existing.quality_score = fresh.quality_score;
        existing.updated_at = Utc::now();

        self.templates.update(&existing)?;
        tracing::info!(template_id, "biometric template updated");
        Ok(existing)
    }

    /// Soft-delete only; the record stays addressable for audit history.
    pub fn remove_template(&self, template_id: &str) -> Result<bool> {
        self.templates.soft_delete(template_id)
    }
}
