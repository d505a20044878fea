use thiserror::Error;

use crate::activation::ActivationKind;

/// Errors raised by nodes and layers.
/// All of them point at a defect in the caller's configuration or sequencing,
/// so none is recovered from inside this crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("expected {expected} {what} values, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("no stored time step left to retrieve from the output history")]
    HistoryUnderflow,

    #[error("{0:?} activation is only valid on an output layer")]
    InvalidActivationForRole(ActivationKind),

    #[error("weights are used before being initialized")]
    UninitializedWeights,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject a vector whose length differs from the configured one.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            what,
            expected,
            actual,
        })
    }
}
