use thiserror::Error;

/// Errors raised while configuring or stepping a memory.
///
/// All errors are local to the call that produced them. A failed `step` never
/// touches the state it was asked to advance.
#[derive(Error, Debug)]
pub enum LmuError {
    /// Rejected at construction, before any state is allocated.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    #[error("shape mismatch: expected input of width {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    /// `A` could not be factored during discretization. Valid `(theta, q)`
    /// never produce a singular `A`, so this points at a logic fault.
    #[error("state matrix A is singular; discretization is not possible")]
    SingularMatrix,

    #[error("json error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, LmuError>;

/// Reject an input whose width disagrees with the configured width.
pub(crate) fn expect_width(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(LmuError::ShapeMismatch { expected, got });
    }
    Ok(())
}
