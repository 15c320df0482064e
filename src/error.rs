//! Error types for the rankclust crate

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during rank clustering
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid input parameters
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Error message
        message: String,
    },

    /// Empty or malformed ranking data
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Error message
        message: String,
    },

    /// A cluster became empty during the M-step
    #[error("Non convergence: cluster {cluster} is empty at iteration {iteration}")]
    NonConvergence {
        /// Index of the empty cluster
        cluster: usize,
        /// SEM iteration at which it emptied
        iteration: usize,
    },

    /// Mathematical computation or state error
    #[error("Computation error: {message}")]
    ComputationError {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Create a new InvalidParameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a new InvalidData error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new NonConvergence error
    pub fn non_convergence(cluster: usize, iteration: usize) -> Self {
        Self::NonConvergence { cluster, iteration }
    }

    /// Create a new ComputationError
    pub fn computation_error(message: impl Into<String>) -> Self {
        Self::ComputationError {
            message: message.into(),
        }
    }
}
