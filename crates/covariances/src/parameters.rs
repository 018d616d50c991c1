use crate::errors::{KuuError, Result};
use linfa::{Float, ParamGuard};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Default replacement value of a non positive radicand `(l + s_i)^2 + (l + s_j)^2 - l^2`
/// under the square root of the multiscale builder
pub const DEFAULT_RADICAND_FLOOR: f64 = 1e-12;

/// A set of validated `Kuu` build parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct KuuValidParams<F: Float> {
    /// Value added to the diagonal of the covariance matrix
    pub(crate) jitter: F,
    /// Replacement of non positive radicands in the multiscale closed form
    pub(crate) radicand_floor: F,
}

impl<F: Float> Default for KuuValidParams<F> {
    fn default() -> KuuValidParams<F> {
        KuuValidParams {
            jitter: F::zero(),
            radicand_floor: F::cast(DEFAULT_RADICAND_FLOOR),
        }
    }
}

impl<F: Float> KuuValidParams<F> {
    /// Get jitter value
    pub fn jitter(&self) -> F {
        self.jitter
    }

    /// Get radicand floor used by the multiscale builder
    pub fn radicand_floor(&self) -> F {
        self.radicand_floor
    }
}

#[derive(Clone, Debug, Default)]
/// The set of parameters that can be specified for the computation of
/// an inducing covariance matrix by a [`CovarianceRegistry`](crate::CovarianceRegistry).
pub struct KuuParams<F: Float>(KuuValidParams<F>);

impl<F: Float> KuuParams<F> {
    /// A constructor for default parameters: no jitter
    pub fn new() -> KuuParams<F> {
        Self(KuuValidParams::default())
    }

    /// Set jitter value.
    ///
    /// Jitter is added to the diagonal to improve numerical stability,
    /// it has to be non negative.
    pub fn jitter(mut self, jitter: F) -> Self {
        self.0.jitter = jitter;
        self
    }

    /// Set the radicand floor of the multiscale builder.
    ///
    /// Radicands brought to zero or slightly below by rounding are replaced
    /// by this value, it has to be strictly positive.
    pub fn radicand_floor(mut self, floor: F) -> Self {
        self.0.radicand_floor = floor;
        self
    }
}

impl<F: Float> From<KuuValidParams<F>> for KuuParams<F> {
    fn from(valid: KuuValidParams<F>) -> Self {
        KuuParams(valid)
    }
}

impl<F: Float> ParamGuard for KuuParams<F> {
    type Checked = KuuValidParams<F>;
    type Error = KuuError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let jitter = self.0.jitter;
        if !jitter.is_finite() || jitter < F::zero() {
            return Err(KuuError::InvalidValueError(format!(
                "`jitter` should be finite and non negative, got {jitter}"
            )));
        }
        let floor = self.0.radicand_floor;
        if !floor.is_finite() || floor <= F::zero() {
            return Err(KuuError::InvalidValueError(format!(
                "`radicand_floor` should be finite and positive, got {floor}"
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = KuuParams::<f64>::new().check().unwrap();
        assert_eq!(params.jitter(), 0.);
        assert_eq!(params.radicand_floor(), DEFAULT_RADICAND_FLOOR);
    }

    #[test]
    fn test_invalid_params() {
        assert!(KuuParams::new().jitter(-1e-6).check().is_err());
        assert!(KuuParams::new().jitter(f64::NAN).check().is_err());
        assert!(KuuParams::new().jitter(f64::INFINITY).check().is_err());
        assert!(KuuParams::new().radicand_floor(0.).check().is_err());
        assert!(KuuParams::<f32>::new().jitter(1e-6).check().is_ok());
    }
}
