//! Builders of the prior covariance `Kuu` of inducing variables.
//!
//! Each builder computes `Kuu` for a given (inducing variable, kernel) pair and
//! adds the jitter on the diagonal. Builders are registered in the default
//! [`CovarianceRegistry`] which selects the one matching the runtime types.

use crate::dispatch::{CovarianceRegistry, dispatch_error};
use crate::errors::{KuuError, Result};
use crate::inducing_variables::{
    INDUCING_PATCHES, INDUCING_POINTS, InducingVariable, MULTISCALE, Multiscale,
};
use crate::kernels::{
    CONVOLUTIONAL, Convolutional, KERNEL, Kernel, SQUARED_EXPONENTIAL, SquaredExponential,
};
use crate::parameters::KuuValidParams;
use linfa::Float;
use linfa_linalg::cholesky::Cholesky;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2, s};
use rayon::prelude::*;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

/// Register the default builders in the given registry
pub(crate) fn register_defaults<F: Float>(registry: &mut CovarianceRegistry<F>) {
    registry.insert(
        &INDUCING_POINTS,
        &KERNEL,
        Arc::new(kuu_kernel_inducingpoints::<F>),
    );
    registry.insert(
        &MULTISCALE,
        &SQUARED_EXPONENTIAL,
        Arc::new(kuu_sqexp_multiscale::<F>),
    );
    registry.insert(
        &INDUCING_PATCHES,
        &CONVOLUTIONAL,
        Arc::new(kuu_conv_patch::<F>),
    );
}

type DefaultRegistries = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

static DEFAULT_REGISTRIES: LazyLock<Mutex<DefaultRegistries>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Default registry shared by [`kuu`] calls, built once per float type
pub(crate) fn default_registry<F: Float>() -> Arc<CovarianceRegistry<F>> {
    let mut registries = DEFAULT_REGISTRIES
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let entry = registries
        .entry(TypeId::of::<F>())
        .or_insert_with(|| -> Box<dyn Any + Send + Sync> {
            Box::new(Arc::new(CovarianceRegistry::<F>::default()))
        });
    match entry.downcast_ref::<Arc<CovarianceRegistry<F>>>() {
        Some(registry) => registry.clone(),
        None => Arc::new(CovarianceRegistry::default()),
    }
}

/// Compute `Kuu` with the default registry, see [`CovarianceRegistry::build`]
///
/// ```
/// use egobox_covariances::{kuu, InducingPoints, Matern52};
/// use ndarray::array;
///
/// let z = InducingPoints::new(array![[0., 0.], [1., 0.5]]);
/// let kernel = Matern52::new(2., array![0.5, 1.]).unwrap();
/// let kzz = kuu(&z, &kernel, 1e-8).unwrap();
/// assert_eq!(kzz.dim(), (2, 2));
/// ```
pub fn kuu<F: Float>(
    inducing: &dyn InducingVariable<F>,
    kernel: &dyn Kernel<F>,
    jitter: F,
) -> Result<Array2<F>> {
    default_registry().build(inducing, kernel, jitter)
}

/// Lower Cholesky factor `L` of `Kuu = L L^T` computed with the default registry
///
/// # Errors
///
/// Besides `Kuu` computation errors, [`KuuError::LinalgError`] when `Kuu` is not
/// numerically positive definite (jitter should be increased).
pub fn kuu_cholesky<F: Float>(
    inducing: &dyn InducingVariable<F>,
    kernel: &dyn Kernel<F>,
    jitter: F,
) -> Result<Array2<F>> {
    let kzz = kuu(inducing, kernel, jitter)?;
    Ok(kzz.cholesky()?)
}

/// `Kuu = k(Z, Z) + jitter * I` for inducing points and any kernel
pub fn kuu_kernel_inducingpoints<F: Float>(
    inducing: &dyn InducingVariable<F>,
    kernel: &dyn Kernel<F>,
    params: &KuuValidParams<F>,
) -> Result<Array2<F>> {
    let z = inducing.z();
    let kzz = kernel.evaluate(&z, &z)?;
    check_square(&kzz, inducing.num_inducing(), kernel)?;
    Ok(add_jitter(kzz, params.jitter()))
}

/// `Kuu` between multiscale inducing points for a squared exponential kernel.
///
/// With `l` the kernel lengthscales and `s_i` the scales of the inducing point `z_i`,
/// for each dimension `d`:
///
/// `sc_ijd = sqrt((l_d + s_id)^2 + (l_d + s_jd)^2 - l_d^2)`
///
/// `Kuu_ij = variance * exp(-0.5 * sum_d ((z_id - z_jd) / sc_ijd)^2) * prod_d (l_d / sc_ijd)`
///
/// which reduces to the squared exponential covariance of the points when scales are zero.
///
/// Radicands are at least `l_d^2` for non negative scales. Values brought to zero or slightly
/// below by rounding are replaced by [`KuuValidParams::radicand_floor`], positive values are kept
/// as is. Significantly negative or non finite radicands, as well as non finite entries, raise a
/// [`KuuError::NumericalError`].
pub fn kuu_sqexp_multiscale<F: Float>(
    inducing: &dyn InducingVariable<F>,
    kernel: &dyn Kernel<F>,
    params: &KuuValidParams<F>,
) -> Result<Array2<F>> {
    let ms = inducing
        .as_any()
        .downcast_ref::<Multiscale<F>>()
        .ok_or_else(|| dispatch_error(inducing, kernel))?;
    let se = kernel
        .as_any()
        .downcast_ref::<SquaredExponential<F>>()
        .ok_or_else(|| dispatch_error(inducing, kernel))?;

    let zmu = se.slice(&ms.z())?;
    let zlen = se.slice(&ms.scales())?;
    if zmu.dim() != zlen.dim() {
        return Err(KuuError::ShapeError(format!(
            "multiscale scales shape {:?} should match inducing points shape {:?}",
            zlen.dim(),
            zmu.dim()
        )));
    }
    let l = se.lengthscales_for(zmu.ncols())?;
    let idlengthscales2 = (&zlen + &l).mapv(|v| v * v);
    let lengthscales2 = l.mapv(|v| v * v);
    let floor = params.radicand_floor();

    let m = zmu.nrows();
    let rows = (0..m)
        .into_par_iter()
        .map(|i| {
            (0..m)
                .map(|j| {
                    let mut dist = F::zero();
                    let mut prod = F::one();
                    let mut clamped = 0;
                    for d in 0..zmu.ncols() {
                        let (a, b) = (idlengthscales2[[i, d]], idlengthscales2[[j, d]]);
                        let l2 = lengthscales2[d];
                        let (sc2, is_clamped) = clamp_radicand(a + b - l2, a, b, l2, floor)?;
                        clamped += is_clamped as usize;
                        let sc = sc2.sqrt();
                        let diff = (zmu[[i, d]] - zmu[[j, d]]) / sc;
                        dist += diff * diff;
                        prod *= l[d] / sc;
                    }
                    let kij = se.variance() * F::exp(-dist / F::cast(2.)) * prod;
                    if !kij.is_finite() {
                        return Err(KuuError::NumericalError(format!(
                            "non finite multiscale covariance at ({i}, {j})"
                        )));
                    }
                    Ok((kij, clamped))
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let n_clamped: usize = rows.iter().flatten().map(|(_, c)| c).sum();
    if n_clamped > 0 {
        warn!("Multiscale Kuu: {n_clamped} non positive radicand(s) replaced by {floor}");
    }
    let values = rows.into_iter().flatten().map(|(v, _)| v).collect::<Vec<_>>();
    let kzz = Array2::from_shape_vec((m, m), values)
        .map_err(|e| KuuError::ShapeError(e.to_string()))?;
    Ok(add_jitter(kzz, params.jitter()))
}

/// `Kuu = k_base(P, P) + jitter * I` for inducing patches `P` and a convolutional kernel,
/// the base kernel of the convolutional kernel being evaluated on the patches.
pub fn kuu_conv_patch<F: Float>(
    inducing: &dyn InducingVariable<F>,
    kernel: &dyn Kernel<F>,
    params: &KuuValidParams<F>,
) -> Result<Array2<F>> {
    let conv = kernel
        .as_any()
        .downcast_ref::<Convolutional<F>>()
        .ok_or_else(|| dispatch_error(inducing, kernel))?;
    let patches = inducing.z();
    if patches.ncols() != conv.patch_len() {
        return Err(KuuError::ShapeError(format!(
            "inducing patches of length {} given for {:?} kernel patches",
            patches.ncols(),
            conv.patch_shape()
        )));
    }
    let kzz = conv.base_kernel().evaluate(&patches, &patches)?;
    check_square(&kzz, inducing.num_inducing(), kernel)?;
    Ok(add_jitter(kzz, params.jitter()))
}

/// Extract from `cov`, the full covariance of `latent_dim`-dimensional blocks,
/// the covariance of the blocks selected by `indices`.
///
/// Returns the (k * latent_dim, k * latent_dim) matrix made of the blocks
/// `cov[i_a * d..(i_a + 1) * d, i_b * d..(i_b + 1) * d]` for `a <= b`, lower blocks
/// being the transposes of the upper ones. When `cov` is symmetric this is the
/// principal submatrix of the selected blocks, hence PSD whenever `cov` is.
///
/// Blocks are copied one at a time, the cost is quadratic in the number of indices
/// which is fine for small inducing sets but does not scale to large index lists.
///
/// # Errors
///
/// * [`KuuError::InvalidValueError`] when `latent_dim` is zero,
/// * [`KuuError::ShapeError`] when `cov` is not square or an index is out of range.
pub fn kss<F: Float>(
    indices: &[usize],
    cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
    latent_dim: usize,
) -> Result<Array2<F>> {
    let d = latent_dim;
    if d == 0 {
        return Err(KuuError::InvalidValueError(
            "latent dimension should be positive".to_string(),
        ));
    }
    if !cov.is_square() {
        return Err(KuuError::ShapeError(format!(
            "covariance should be square, got {:?}",
            cov.dim()
        )));
    }
    if let Some(i) = indices
        .iter()
        .find(|i| i.saturating_add(1).saturating_mul(d) > cov.nrows())
    {
        return Err(KuuError::ShapeError(format!(
            "index {i} out of range for covariance of {} blocks of size {d}",
            cov.nrows() / d
        )));
    }

    let k = indices.len();
    let mut kzz = Array2::zeros((k * d, k * d));
    for (a, &ia) in indices.iter().enumerate() {
        for (b, &ib) in indices.iter().enumerate().skip(a) {
            let block = cov.slice(s![ia * d..ia * d + d, ib * d..ib * d + d]);
            kzz.slice_mut(s![a * d..a * d + d, b * d..b * d + d])
                .assign(&block);
            if a != b {
                kzz.slice_mut(s![b * d..b * d + d, a * d..a * d + d])
                    .assign(&block.t());
            }
        }
    }
    debug!("Kss extracted {k} blocks of size {d}");
    Ok(kzz)
}

fn add_jitter<F: Float>(mut kzz: Array2<F>, jitter: F) -> Array2<F> {
    kzz.diag_mut().mapv_inplace(|v| v + jitter);
    kzz
}

fn check_square<F: Float>(kzz: &Array2<F>, m: usize, kernel: &dyn Kernel<F>) -> Result<()> {
    if kzz.dim() != (m, m) {
        return Err(KuuError::ShapeError(format!(
            "{kernel} returned a {:?} matrix for {m} inducing variables",
            kzz.dim()
        )));
    }
    Ok(())
}

/// Returns the radicand, replaced by `floor` when not positive, and whether it was replaced.
///
/// `a + b - l2` may come out zero or slightly negative through cancellation or underflow,
/// such a value within `16 eps (a + b + l2)` of zero is clamped, anything below is an error.
fn clamp_radicand<F: Float>(radicand: F, a: F, b: F, l2: F, floor: F) -> Result<(F, bool)> {
    let tol = F::cast(16.) * F::epsilon() * (a + b + l2);
    if !radicand.is_finite() || radicand < -tol {
        return Err(KuuError::NumericalError(format!(
            "invalid radicand {radicand} in multiscale lengthscales"
        )));
    }
    if radicand <= F::zero() {
        Ok((floor, true))
    } else {
        Ok((radicand, false))
    }
}

/// Diagonal of `Kuu` without jitter, that is the prior variances of the inducing variables
pub fn kuu_diag<F: Float>(
    inducing: &dyn InducingVariable<F>,
    kernel: &dyn Kernel<F>,
) -> Result<Array1<F>> {
    Ok(kuu(inducing, kernel, F::zero())?.diag().to_owned())
}
