use thiserror::Error;

/// Errors raised by the landmark repair and assessment routines.
///
/// Recoverable outcomes of the patch search (no improvement, point cap hit)
/// are not errors; see [`crate::repair::patch::PatchStatus`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    /// Fewer points than the requested operation needs.
    #[error("insufficient data for {context}: need at least {needed} points, found {found}")]
    InsufficientData {
        context: &'static str,
        needed: usize,
        found: usize,
    },

    /// A point received as many left as right votes and the tie policy rejects ties.
    #[error("ambiguous side for '{label}' ({left_votes} left / {right_votes} right votes)")]
    AmbiguousClassification {
        label: String,
        left_votes: u32,
        right_votes: u32,
    },

    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Input geometry that would silently corrupt the numerics (zero spans,
    /// zero-length curves, empty overlaps, singular systems).
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("left and right sides cannot be paired ({left} left, {right} right points)")]
    MismatchedSides { left: usize, right: usize },
}

pub type Result<T> = std::result::Result<T, LandmarkError>;

impl LandmarkError {
    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: &'static str) -> Self {
        LandmarkError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
