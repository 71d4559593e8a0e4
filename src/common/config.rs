use crate::common::error::{BioGateError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_target_height")]
    pub target_height: u32,
    #[serde(default = "default_min_dimension")]
    pub min_width: u32,
    #[serde(default = "default_min_dimension")]
    pub min_height: u32,
    #[serde(default = "default_min_brightness")]
    pub min_brightness: f64,
    #[serde(default = "default_max_brightness")]
    pub max_brightness: f64,
}

fn default_target_width() -> u32 { 640 }
fn default_target_height() -> u32 { 480 }
fn default_min_dimension() -> u32 { 100 }
fn default_min_brightness() -> f64 { 10.0 }
fn default_max_brightness() -> f64 { 245.0 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: f64,
    #[serde(default = "default_identification_threshold")]
    pub identification_threshold: f64,
}

fn default_verification_threshold() -> f64 { 0.75 }
fn default_identification_threshold() -> f64 { 0.80 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,
}

fn default_min_quality() -> f64 { 60.0 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

fn default_timeout_minutes() -> u64 { 30 }
fn default_cleanup_interval_minutes() -> u64 { 5 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: std::path::PathBuf,
}

fn default_data_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("biogate-data")
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_width: default_target_width(),
            target_height: default_target_height(),
            min_width: default_min_dimension(),
            min_height: default_min_dimension(),
            min_brightness: default_min_brightness(),
            max_brightness: default_max_brightness(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            verification_threshold: default_verification_threshold(),
            identification_threshold: default_identification_threshold(),
        }
    }
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self { min_quality: default_min_quality() }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Config {
    /// Load from a TOML file, or fall back to the built-in defaults when no
    /// path is given.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Config file not found: {}", path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| BioGateError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate matching thresholds
        if self.matcher.verification_threshold < 0.0 || self.matcher.verification_threshold > 1.0 {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Verification threshold must be between 0.0 and 1.0, got {}",
                self.matcher.verification_threshold
            )));
        }
        if self.matcher.identification_threshold < 0.0 || self.matcher.identification_threshold > 1.0 {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Identification threshold must be between 0.0 and 1.0, got {}",
                self.matcher.identification_threshold
            )));
        }

        // Validate quality floor
        if self.enrollment.min_quality < 0.0 || self.enrollment.min_quality > 100.0 {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Minimum enrollment quality must be between 0 and 100, got {}",
                self.enrollment.min_quality
            )));
        }

        // Validate session timing
        if self.session.timeout_minutes == 0 {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Session timeout must be at least one minute"
            )));
        }
        if self.session.cleanup_interval_minutes == 0 {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Session cleanup interval must be at least one minute"
            )));
        }

        // Validate capture bounds
        if self.capture.min_brightness >= self.capture.max_brightness {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Capture brightness window is empty: ({}, {})",
                self.capture.min_brightness,
                self.capture.max_brightness
            )));
        }
        if self.capture.target_width == 0 || self.capture.target_height == 0 {
            return Err(BioGateError::Other(anyhow::anyhow!(
                "Capture target dimensions must be non-zero"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_decision_constants() {
        let config = Config::default();
        assert_eq!(config.matcher.verification_threshold, 0.75);
        assert_eq!(config.matcher.identification_threshold, 0.80);
        assert_eq!(config.enrollment.min_quality, 60.0);
        assert_eq!(config.session.timeout_minutes, 30);
        assert_eq!(config.session.cleanup_interval_minutes, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.matcher.verification_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_session_timeout() {
        let mut config = Config::default();
        config.session.timeout_minutes = 0;
        assert!(config.validate().is_err());
    }
}
