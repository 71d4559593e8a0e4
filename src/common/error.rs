use thiserror::Error;

#[derive(Error, Debug)]
pub enum BioGateError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image quality insufficient: {0}")]
    ImageQuality(String),

    #[error("Template quality too low: {score:.2} (minimum: {minimum:.2})")]
    QualityTooLow { score: f64, minimum: f64 },

    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error("User is inactive: {0}")]
    InactiveUser(String),

    #[error("User is locked after repeated failed attempts: {0}")]
    LockedUser(String),

    #[error("No enrolled biometrics: {0}")]
    NoEnrollment(String),

    #[error("Biometric not recognized: score {score:.3} below threshold {threshold:.2}")]
    MatchRejected { score: f64, threshold: f64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl BioGateError {
    /// True for failures that are caller bugs rather than expected
    /// authentication outcomes. These never count against a user's
    /// failed-attempt budget.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            BioGateError::InvalidInput(_)
                | BioGateError::Io(_)
                | BioGateError::Image(_)
                | BioGateError::Other(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BioGateError>;
