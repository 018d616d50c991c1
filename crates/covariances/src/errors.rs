use thiserror::Error;

/// A result type for inducing covariance computations
pub type Result<T> = std::result::Result<T, KuuError>;

/// An error when building covariances through the [`CovarianceRegistry`](crate::CovarianceRegistry)
#[derive(Error, Debug)]
pub enum KuuError {
    /// When no builder is registered for the given inducing variable and kernel pair
    #[error("Dispatch error: no Kuu builder registered for ({inducing}, {kernel})")]
    DispatchError {
        /// Runtime type name of the inducing variable
        inducing: String,
        /// Runtime type name of the kernel
        kernel: String,
    },
    /// When a builder registration clashes with an existing one
    #[error("Registration conflict: {0}")]
    RegistrationConflict(String),
    /// When array dimensions are inconsistent
    #[error("Shape error: {0}")]
    ShapeError(String),
    /// When a closed form computation breaks down numerically
    #[error("Numerical error: {0}")]
    NumericalError(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    /// When serialization fails
    SaveError(#[from] serde_json::Error),
    /// When error during loading
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
