//! A module for covariance kernels `k(x, x')` evaluated over sets of points.
//!
//! The following stationary kernels `k(x, x') = variance * r(|x - x'|/lengthscales)` are implemented:
//! * squared exponential,
//! * exponential,
//! * matern 3/2,
//! * matern 5/2.
//!
//! A [`Convolutional`] kernel applies a base kernel to image patches.
//!
//! Any type implementing [`Kernel`] can be used to compute inducing covariances,
//! the dispatch relies on its [`TypeTag`].

use crate::dispatch::TypeTag;
use crate::errors::{KuuError, Result};
use crate::utils::{extract_patches, pairwise_differences};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip, s};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Root tag of kernels
pub static KERNEL: TypeTag = TypeTag::root("Kernel");
/// Tag of stationary kernels
pub static STATIONARY: TypeTag = TypeTag::derived("Stationary", &KERNEL);
/// Tag of [`SquaredExponential`] kernel
pub static SQUARED_EXPONENTIAL: TypeTag = TypeTag::derived("SquaredExponential", &STATIONARY);
/// Tag of [`Exponential`] kernel
pub static EXPONENTIAL: TypeTag = TypeTag::derived("Exponential", &STATIONARY);
/// Tag of [`Matern32`] kernel
pub static MATERN32: TypeTag = TypeTag::derived("Matern32", &STATIONARY);
/// Tag of [`Matern52`] kernel
pub static MATERN52: TypeTag = TypeTag::derived("Matern52", &STATIONARY);
/// Tag of [`Convolutional`] kernel
pub static CONVOLUTIONAL: TypeTag = TypeTag::derived("Convolutional", &KERNEL);

/// A trait for kernels able to compute a covariance matrix between two sets of points
pub trait Kernel<F: Float>: fmt::Debug + fmt::Display + Send + Sync {
    /// Runtime type tag used for covariance dispatch
    fn type_tag(&self) -> &'static TypeTag;

    /// Covariance matrix between `x` (n, nx) and `y` (m, nx) points as a (n, m) matrix
    fn evaluate(&self, x: &ArrayView2<F>, y: &ArrayView2<F>) -> Result<Array2<F>>;

    /// Variances at `x` points, that is the diagonal of `evaluate(x, x)`
    fn evaluate_diag(&self, x: &ArrayView2<F>) -> Result<Array1<F>> {
        Ok(self.evaluate(x, x)?.diag().to_owned())
    }

    /// Downcasting support for covariance builders
    fn as_any(&self) -> &dyn Any;
}

/// A trait for the correlation profile `r` of a stationary kernel
pub trait CorrelationModel:
    Clone + Copy + Default + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Type tag of the kernel built upon this correlation
    fn type_tag(&self) -> &'static TypeTag;

    /// Correlation value given `r2`, the squared distance scaled by the lengthscales
    fn value<F: Float>(&self, r2: F) -> F;
}

macro_rules! declare_correlation {
    ($corr:ident, $name:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
        #[cfg_attr(
            feature = "serializable",
            derive(Serialize, Deserialize),
            serde(into = "String"),
            serde(try_from = "String")
        )]
        pub struct $corr();

        impl From<$corr> for String {
            fn from(_item: $corr) -> String {
                $name.to_string()
            }
        }

        impl TryFrom<String> for $corr {
            type Error = &'static str;
            fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
                if s == $name {
                    Ok(Self::default())
                } else {
                    Err(concat!(
                        "Bad string value for ",
                        stringify!($corr),
                        ", should be \'",
                        $name,
                        "\'"
                    ))
                }
            }
        }

        impl fmt::Display for $corr {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, $name)
            }
        }
    };
}

declare_correlation!(
    SquaredExponentialCorr,
    "SquaredExponential",
    "Squared exponential correlation"
);
declare_correlation!(ExponentialCorr, "Exponential", "Exponential correlation");
declare_correlation!(Matern32Corr, "Matern32", "Matern 3/2 correlation");
declare_correlation!(Matern52Corr, "Matern52", "Matern 5/2 correlation");

impl CorrelationModel for SquaredExponentialCorr {
    fn type_tag(&self) -> &'static TypeTag {
        &SQUARED_EXPONENTIAL
    }

    /// exp(-r^2 / 2)
    fn value<F: Float>(&self, r2: F) -> F {
        F::exp(F::cast(-0.5) * r2)
    }
}

impl CorrelationModel for ExponentialCorr {
    fn type_tag(&self) -> &'static TypeTag {
        &EXPONENTIAL
    }

    /// exp(-r)
    fn value<F: Float>(&self, r2: F) -> F {
        F::exp(-r2.sqrt())
    }
}

impl CorrelationModel for Matern32Corr {
    fn type_tag(&self) -> &'static TypeTag {
        &MATERN32
    }

    /// (1 + sqrt(3) r) exp(-sqrt(3) r)
    fn value<F: Float>(&self, r2: F) -> F {
        let sqrt3_r = (F::cast(3.) * r2).sqrt();
        (F::one() + sqrt3_r) * F::exp(-sqrt3_r)
    }
}

impl CorrelationModel for Matern52Corr {
    fn type_tag(&self) -> &'static TypeTag {
        &MATERN52
    }

    /// (1 + sqrt(5) r + 5/3 r^2) exp(-sqrt(5) r)
    fn value<F: Float>(&self, r2: F) -> F {
        let sqrt5_r = (F::cast(5.) * r2).sqrt();
        (F::one() + sqrt5_r + F::cast(5. / 3.) * r2) * F::exp(-sqrt5_r)
    }
}

/// Stationary kernel `k(x, x') = variance * r(sum_d ((x_d - x'_d) / l_d)^2)`
/// where the correlation `r` is given by a [`CorrelationModel`].
///
/// Lengthscales are either shared (one value) or given per active dimension.
/// When `active_dims` is specified, the kernel only looks at these input columns.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(
        bound(
            serialize = "F: Serialize, Corr: Serialize",
            deserialize = "F: Deserialize<'de>, Corr: Deserialize<'de>"
        ),
        try_from = "StationaryData<F, Corr>"
    )
)]
pub struct Stationary<F: Float, Corr: CorrelationModel> {
    corr: Corr,
    variance: F,
    lengthscales: Array1<F>,
    active_dims: Option<Vec<usize>>,
}

#[cfg(feature = "serializable")]
#[derive(Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>, Corr: Deserialize<'de>"))]
struct StationaryData<F: Float, Corr: CorrelationModel> {
    corr: Corr,
    variance: F,
    lengthscales: Array1<F>,
    active_dims: Option<Vec<usize>>,
}

#[cfg(feature = "serializable")]
impl<F: Float, Corr: CorrelationModel> TryFrom<StationaryData<F, Corr>> for Stationary<F, Corr> {
    type Error = KuuError;

    fn try_from(data: StationaryData<F, Corr>) -> Result<Self> {
        let kernel = Stationary {
            corr: data.corr,
            ..Stationary::new(data.variance, data.lengthscales)?
        };
        match data.active_dims {
            Some(dims) => kernel.with_active_dims(dims),
            None => Ok(kernel),
        }
    }
}

/// Squared exponential kernel, also known as RBF kernel
pub type SquaredExponential<F> = Stationary<F, SquaredExponentialCorr>;
/// Exponential kernel, that is Matern 1/2
pub type Exponential<F> = Stationary<F, ExponentialCorr>;
/// Matern 3/2 kernel
pub type Matern32<F> = Stationary<F, Matern32Corr>;
/// Matern 5/2 kernel
pub type Matern52<F> = Stationary<F, Matern52Corr>;

impl<F: Float, Corr: CorrelationModel> Default for Stationary<F, Corr> {
    fn default() -> Self {
        Stationary {
            corr: Corr::default(),
            variance: F::one(),
            lengthscales: Array1::ones(1),
            active_dims: None,
        }
    }
}

impl<F: Float, Corr: CorrelationModel> Stationary<F, Corr> {
    /// A constructor given the kernel `variance` and `lengthscales`
    ///
    /// # Errors
    ///
    /// [`KuuError::InvalidValueError`] when variance or a lengthscale is not finite and positive
    /// or when no lengthscale is given.
    pub fn new(variance: F, lengthscales: Array1<F>) -> Result<Self> {
        if !variance.is_finite() || variance <= F::zero() {
            return Err(KuuError::InvalidValueError(format!(
                "kernel variance should be finite and positive, got {variance}"
            )));
        }
        if lengthscales.is_empty() {
            return Err(KuuError::InvalidValueError(
                "at least one lengthscale is expected".to_string(),
            ));
        }
        if lengthscales.iter().any(|l| !l.is_finite() || *l <= F::zero()) {
            return Err(KuuError::InvalidValueError(format!(
                "kernel lengthscales should be finite and positive, got {lengthscales}"
            )));
        }
        Ok(Stationary {
            corr: Corr::default(),
            variance,
            lengthscales,
            active_dims: None,
        })
    }

    /// Restrict the kernel to the given input columns
    pub fn with_active_dims(mut self, active_dims: Vec<usize>) -> Result<Self> {
        if self.lengthscales.len() > 1 && self.lengthscales.len() != active_dims.len() {
            return Err(KuuError::InvalidValueError(format!(
                "{} lengthscales given for {} active dimensions",
                self.lengthscales.len(),
                active_dims.len()
            )));
        }
        self.active_dims = Some(active_dims);
        Ok(self)
    }

    /// Kernel variance
    pub fn variance(&self) -> F {
        self.variance
    }

    /// Kernel lengthscales as given at construction
    pub fn lengthscales(&self) -> &Array1<F> {
        &self.lengthscales
    }

    /// Active input columns, `None` meaning all columns
    pub fn active_dims(&self) -> Option<&[usize]> {
        self.active_dims.as_deref()
    }

    /// Correlation model
    pub fn corr(&self) -> &Corr {
        &self.corr
    }

    /// Select active columns of `x`
    pub fn slice(&self, x: &ArrayView2<F>) -> Result<Array2<F>> {
        match &self.active_dims {
            None => Ok(x.to_owned()),
            Some(dims) => {
                if let Some(d) = dims.iter().find(|d| **d >= x.ncols()) {
                    return Err(KuuError::ShapeError(format!(
                        "active dimension {d} out of range for inputs of dimension {}",
                        x.ncols()
                    )));
                }
                Ok(x.select(Axis(1), dims))
            }
        }
    }

    /// Lengthscales broadcast to `ndims` (sliced) input dimensions
    pub fn lengthscales_for(&self, ndims: usize) -> Result<Array1<F>> {
        match self.lengthscales.len() {
            1 => Ok(Array1::from_elem(ndims, self.lengthscales[0])),
            n if n == ndims => Ok(self.lengthscales.to_owned()),
            n => Err(KuuError::ShapeError(format!(
                "{n} lengthscales given for inputs of dimension {ndims}"
            ))),
        }
    }
}

impl<F: Float, Corr: CorrelationModel> Kernel<F> for Stationary<F, Corr> {
    fn type_tag(&self) -> &'static TypeTag {
        self.corr.type_tag()
    }

    fn evaluate(&self, x: &ArrayView2<F>, y: &ArrayView2<F>) -> Result<Array2<F>> {
        let (xs, ys) = (self.slice(x)?, self.slice(y)?);
        if xs.ncols() != ys.ncols() {
            return Err(KuuError::ShapeError(format!(
                "points dimensions differ: {} vs {}",
                xs.ncols(),
                ys.ncols()
            )));
        }
        let l = self.lengthscales_for(xs.ncols())?;
        let d = pairwise_differences(&xs, &ys) / &l;
        let r2 = d.mapv(|v| v * v).sum_axis(Axis(1));
        r2.mapv(|v| self.variance * self.corr.value(v))
            .into_shape_with_order((xs.nrows(), ys.nrows()))
            .map_err(|e| KuuError::ShapeError(e.to_string()))
    }

    fn evaluate_diag(&self, x: &ArrayView2<F>) -> Result<Array1<F>> {
        Ok(Array1::from_elem(x.nrows(), self.variance))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<F: Float, Corr: CorrelationModel> fmt::Display for Stationary<F, Corr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}(variance={}, lengthscales={})",
            self.corr, self.variance, self.lengthscales
        )
    }
}

/// Convolutional kernel: the response to an image is the weighted sum of the responses
/// of a base kernel to each of its patches.
///
/// With `P` patches per image and patch weights `w`:
///
/// `k(x, x') = sum_p sum_q w_p w_q k_base(x[p], x'[q]) / P^2`
///
/// Images are given as rows of flattened `image_shape` arrays.
///
/// # Reference
///
/// van der Wilk, M., Rasmussen, C. E., Hensman, J.
/// [Convolutional Gaussian Processes](https://arxiv.org/abs/1709.01894).
/// Advances in Neural Information Processing Systems 30, 2017.
#[derive(Debug)]
pub struct Convolutional<F: Float> {
    base_kernel: Box<dyn Kernel<F>>,
    image_shape: (usize, usize),
    patch_shape: (usize, usize),
    weights: Array1<F>,
}

impl<F: Float> Convolutional<F> {
    /// A constructor given the `base_kernel` applied on `patch_shape` patches of `image_shape` images,
    /// patch weights are all set to one.
    pub fn new(
        base_kernel: impl Kernel<F> + 'static,
        image_shape: (usize, usize),
        patch_shape: (usize, usize),
    ) -> Result<Self> {
        let (h, w) = image_shape;
        let (ph, pw) = patch_shape;
        if ph == 0 || pw == 0 || ph > h || pw > w {
            return Err(KuuError::InvalidValueError(format!(
                "patch shape ({ph}, {pw}) does not fit in image shape ({h}, {w})"
            )));
        }
        let n_patches = (h - ph + 1) * (w - pw + 1);
        Ok(Convolutional {
            base_kernel: Box::new(base_kernel),
            image_shape,
            patch_shape,
            weights: Array1::ones(n_patches),
        })
    }

    /// Set patch weights, one per patch
    pub fn with_weights(mut self, weights: Array1<F>) -> Result<Self> {
        if weights.len() != self.num_patches() {
            return Err(KuuError::ShapeError(format!(
                "{} weights given for {} patches",
                weights.len(),
                self.num_patches()
            )));
        }
        self.weights = weights;
        Ok(self)
    }

    /// Kernel applied on patches
    pub fn base_kernel(&self) -> &dyn Kernel<F> {
        self.base_kernel.as_ref()
    }

    /// Image shape (height, width)
    pub fn image_shape(&self) -> (usize, usize) {
        self.image_shape
    }

    /// Patch shape (height, width)
    pub fn patch_shape(&self) -> (usize, usize) {
        self.patch_shape
    }

    /// Patch weights
    pub fn weights(&self) -> &Array1<F> {
        &self.weights
    }

    /// Number of patches per image
    pub fn num_patches(&self) -> usize {
        let (h, w) = self.image_shape;
        let (ph, pw) = self.patch_shape;
        (h - ph + 1) * (w - pw + 1)
    }

    /// Length of a flattened patch
    pub fn patch_len(&self) -> usize {
        self.patch_shape.0 * self.patch_shape.1
    }

    /// Patches of `x` images as a (n * num_patches, patch_len) matrix
    pub fn get_patches(&self, x: &ArrayView2<F>) -> Result<Array2<F>> {
        extract_patches(x, self.image_shape, self.patch_shape)
    }
}

impl<F: Float> Kernel<F> for Convolutional<F> {
    fn type_tag(&self) -> &'static TypeTag {
        &CONVOLUTIONAL
    }

    fn evaluate(&self, x: &ArrayView2<F>, y: &ArrayView2<F>) -> Result<Array2<F>> {
        let xp = self.get_patches(x)?;
        let yp = self.get_patches(y)?;
        let big_k = self.base_kernel.evaluate(&xp.view(), &yp.view())?;

        let np = self.num_patches();
        let norm = F::cast(np * np);
        let mut k = Array2::zeros((x.nrows(), y.nrows()));
        Zip::indexed(&mut k).for_each(|(i, j), kij| {
            let block = big_k.slice(s![i * np..(i + 1) * np, j * np..(j + 1) * np]);
            *kij = self.weights.dot(&block.dot(&self.weights)) / norm;
        });
        Ok(k)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<F: Float> fmt::Display for Convolutional<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Convolutional(base={}, image={:?}, patch={:?})",
            self.base_kernel, self.image_shape, self.patch_shape
        )
    }
}
