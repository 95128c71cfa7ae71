//! Error taxonomy shared by every stage of the pipeline.

use thiserror::Error;

/// Everything that can abort a statistic computation.
///
/// None of these are retried: homomorphic evaluation is deterministic, so a
/// failed request is surfaced to the caller as-is.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Vector missing, empty, or operands of mismatched length.
    #[error("input shape error: {0}")]
    InputShape(String),

    /// Vector longer than one ciphertext can hold, or a value outside the
    /// symmetric range of the plaintext modulus.
    #[error("encoding overflow: {0}")]
    EncodingOverflow(String),

    /// Circuit needs more sequential ciphertext×ciphertext products than
    /// the configured budget.
    #[error("circuit needs multiplicative depth {required}, budget is {budget}")]
    DepthExceeded {
        /// Depth the circuit would consume.
        required: usize,
        /// Configured depth budget.
        budget: usize,
    },

    /// Missing evaluation key or any failure raised by the backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Rejected scheme or scaling parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Malformed input file.
    #[error("parse error at token {position}: {message}")]
    Parse {
        /// Zero-based index of the offending token.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// I/O failure reading inputs or writing reports.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// CSV report failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StatsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_message() {
        let e = StatsError::DepthExceeded { required: 3, budget: 2 };
        assert_eq!(
            e.to_string(),
            "circuit needs multiplicative depth 3, budget is 2"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.txt");
        let e: StatsError = io.into();
        assert!(matches!(e, StatsError::Io(_)));
    }
}
