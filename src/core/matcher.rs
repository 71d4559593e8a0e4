//! Descriptor comparison: 1:1 verification, 1:N identification, and the
//! closed-form error-rate diagnostics reported alongside match decisions.

use crate::common::config::MatcherConfig;
use crate::common::error::{BioGateError, Result};
use crate::model::BiometricTemplate;

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Quality-adjusted similarity in [0, 1].
    pub score: f64,
    pub confidence: f64,
    pub matched_user_id: Option<String>,
}

impl MatchResult {
    fn no_match(score: f64) -> Self {
        Self { matched: false, score, confidence: 0.0, matched_user_id: None }
    }
}

impl std::fmt::Display for MatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "match: {} | score: {:.2}% | confidence: {:.2}% | user: {}",
            if self.matched { "yes" } else { "no" },
            self.score * 100.0,
            self.confidence * 100.0,
            self.matched_user_id.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone)]
pub struct BiometricMatcher {
    verification_threshold: f64,
    identification_threshold: f64,
}

impl Default for BiometricMatcher {
    fn default() -> Self {
        Self::new(&MatcherConfig::default())
    }
}

impl BiometricMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            verification_threshold: config.verification_threshold,
            identification_threshold: config.identification_threshold,
        }
    }

    pub fn verification_threshold(&self) -> f64 {
        self.verification_threshold
    }

    pub fn identification_threshold(&self) -> f64 {
        self.identification_threshold
    }

    /// 1:1 comparison. Similarity is distance-based, scaled by the average
    /// quality of the two templates; matched iff the adjusted score clears
    /// the verification threshold.
    pub fn verify(
        &self,
        sample: &BiometricTemplate,
        enrolled: &BiometricTemplate,
    ) -> Result<MatchResult> {
        let similarity = similarity(&sample.feature_vector, &enrolled.feature_vector)?;

        let quality_factor = (sample.quality_score + enrolled.quality_score) / 200.0;
        let score = similarity * quality_factor;

        Ok(MatchResult {
            matched: score >= self.verification_threshold,
            score,
            confidence: confidence(score, sample.quality_score),
            matched_user_id: Some(enrolled.user_id.clone()),
        })
    }

    /// 1:N comparison. Keeps the single best verification result (ties keep
    /// the first candidate seen) and only reports a match when it also
    /// clears the stricter identification threshold.
    pub fn identify(
        &self,
        sample: &BiometricTemplate,
        candidates: &[BiometricTemplate],
    ) -> Result<MatchResult> {
        if candidates.is_empty() {
            return Ok(MatchResult::no_match(0.0));
        }

        let mut best: Option<MatchResult> = None;
        let mut best_score = 0.0f64;

        for enrolled in candidates {
            let result = self.verify(sample, enrolled)?;
            if result.score > best_score {
                best_score = result.score;
                best = Some(result);
            }
        }

        match best {
            Some(result) if result.score >= self.identification_threshold => Ok(result),
            _ => Ok(MatchResult::no_match(best_score)),
        }
    }

    /// Closed-form false-acceptance estimate for an assumed threshold.
    /// Diagnostic placeholder curve, not part of the decision.
    pub fn estimate_far(&self, threshold: f64) -> f64 {
        (-10.0 * threshold).exp()
    }

    /// Closed-form false-rejection estimate for an assumed threshold.
    pub fn estimate_frr(&self, threshold: f64) -> f64 {
        1.0 - (-5.0 * (1.0 - threshold)).exp()
    }

    /// Threshold minimizing |FAR - FRR|, scanned in 0.01 steps.
    pub fn find_eer(&self) -> f64 {
        let mut min_diff = f64::MAX;
        let mut eer_threshold = 0.5;

        let mut step = 0u32;
        while step <= 100 {
            let t = step as f64 * 0.01;
            let diff = (self.estimate_far(t) - self.estimate_frr(t)).abs();
            if diff < min_diff {
                min_diff = diff;
                eer_threshold = t;
            }
            step += 1;
        }

        eer_threshold
    }

    /// Human-readable summary of a match outcome with the diagnostic rates.
    pub fn match_report(&self, result: &MatchResult) -> String {
        let mut report = String::new();
        report.push_str("===== BIOMETRIC MATCH REPORT =====\n");
        report.push_str(&format!(
            "Status: {}\n",
            if result.matched { "AUTHENTICATED" } else { "REJECTED" }
        ));
        report.push_str(&format!("Similarity score: {:.2}%\n", result.score * 100.0));
        report.push_str(&format!("Confidence: {:.2}%\n", result.confidence * 100.0));
        report.push_str(&format!(
            "Verification threshold: {:.2}%\n",
            self.verification_threshold * 100.0
        ));
        report.push_str(&format!(
            "Identification threshold: {:.2}%\n",
            self.identification_threshold * 100.0
        ));
        report.push_str(&format!("Estimated FAR: {:.4}%\n", self.estimate_far(result.score) * 100.0));
        report.push_str(&format!("Estimated FRR: {:.4}%\n", self.estimate_frr(result.score) * 100.0));

        if let Some(user_id) = &result.matched_user_id {
            if result.matched {
                report.push_str(&format!("Identified user: {}\n", user_id));
            }
        }

        report.push_str("==================================\n");
        report
    }
}

/// Distance-based similarity: 1 - dist / sqrt(len), clamped to [0, 1].
fn similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(BioGateError::InvalidInput(format!(
            "feature vectors differ in length: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let distance = euclidean_distance(a, b);
    let max_distance = (a.len() as f64).sqrt();
    Ok((1.0 - distance / max_distance).clamp(0.0, 1.0))
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

fn confidence(score: f64, sample_quality: f64) -> f64 {
    score * score * 0.7 + (sample_quality / 100.0) * 0.3
}
