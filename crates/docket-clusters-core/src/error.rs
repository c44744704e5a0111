//! Error taxonomy shared by every clustering operation.
//!
//! Stores report failures through `anyhow` (as in the rest of the
//! workspace); a store that needs to say "unknown corpus" raises a
//! [`ClusterError::NotFound`] inside the `anyhow::Error`, and the
//! `From<anyhow::Error>` impl below recovers it so callers can match on
//! the variant instead of a string.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    /// Unknown corpus, document, or cluster.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rejected before any computation started.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The computation started but could not finish (timeout, exhaustion).
    #[error("computation failed: {0}")]
    ComputationFailed(String),

    /// The caller's [`CancelToken`](crate::cancel::CancelToken) was tripped.
    #[error("computation cancelled")]
    Cancelled,

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl ClusterError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidParameter(what.into())
    }

    /// True for errors that mean "the result does not exist" rather than
    /// "the system failed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<anyhow::Error> for ClusterError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ClusterError>() {
            Ok(inner) => inner,
            Err(other) => Self::Storage(other),
        }
    }
}

/// Reject cutoffs outside `[0, 1]` (NaN included).
pub fn validate_cutoff(cutoff: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(ClusterError::invalid(format!(
            "cutoff must be in [0.0, 1.0], got {}",
            cutoff
        )));
    }
    Ok(())
}

/// Reject empty, out-of-range, or non-ascending cutoff sequences.
pub fn validate_cutoffs(cutoffs: &[f64]) -> Result<()> {
    if cutoffs.is_empty() {
        return Err(ClusterError::invalid("cutoff sequence must not be empty"));
    }
    for c in cutoffs {
        validate_cutoff(*c)?;
    }
    if let Some(pair) = cutoffs.windows(2).find(|w| w[1] <= w[0]) {
        return Err(ClusterError::invalid(format!(
            "cutoff sequence must be strictly ascending, found {} followed by {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_roundtrip_keeps_variant() {
        let err: anyhow::Error = ClusterError::not_found("corpus 7").into();
        let back = ClusterError::from(err);
        assert!(back.is_not_found());
    }

    #[test]
    fn test_foreign_anyhow_becomes_storage() {
        let err = anyhow::anyhow!("disk on fire");
        match ClusterError::from(err) {
            ClusterError::Storage(e) => assert!(e.to_string().contains("disk")),
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_validate_cutoff_bounds() {
        assert!(validate_cutoff(0.0).is_ok());
        assert!(validate_cutoff(1.0).is_ok());
        assert!(validate_cutoff(-0.1).is_err());
        assert!(validate_cutoff(1.01).is_err());
        assert!(validate_cutoff(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_cutoffs_ascending() {
        assert!(validate_cutoffs(&[0.5, 0.6, 0.9]).is_ok());
        assert!(validate_cutoffs(&[]).is_err());
        assert!(validate_cutoffs(&[0.9, 0.5]).is_err());
        assert!(validate_cutoffs(&[0.5, 0.5]).is_err());
        assert!(validate_cutoffs(&[0.5, 1.5]).is_err());
    }
}
