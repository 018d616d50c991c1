//! Inducing variables: the compact set of pseudo inputs of a sparse GP.
//!
//! * [`InducingPoints`]: plain inducing locations `Z` as a (M, nx) matrix,
//! * [`Multiscale`]: inducing points carrying an extra per dimension lengthscale (`scales`),
//!   see Lázaro-Gredilla and Figueiras-Vidal (2009) *Inter-domain Gaussian Processes for Sparse
//!   Inference using Inducing Features*,
//! * [`InducingPatches`]: flattened image patches used with a [`Convolutional`](crate::Convolutional) kernel.
//!
//! `Multiscale` and `InducingPatches` both derive from `InducingPoints` regarding dispatch
//! (see [`TypeTag`]).

use crate::dispatch::TypeTag;
use crate::errors::{KuuError, Result};
use crate::utils::{extract_patches, select_rows};
use linfa::Float;
use ndarray::{Array2, ArrayBase, ArrayView2, Data, Ix2};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

#[cfg(feature = "persistent")]
use serde::de::DeserializeOwned;
#[cfg(feature = "persistent")]
use std::fs;
#[cfg(feature = "persistent")]
use std::io::Write;

/// Root tag of inducing variables
pub static INDUCING_VARIABLES: TypeTag = TypeTag::root("InducingVariables");
/// Tag of [`InducingPoints`]
pub static INDUCING_POINTS: TypeTag = TypeTag::derived("InducingPoints", &INDUCING_VARIABLES);
/// Tag of [`Multiscale`]
pub static MULTISCALE: TypeTag = TypeTag::derived("Multiscale", &INDUCING_POINTS);
/// Tag of [`InducingPatches`]
pub static INDUCING_PATCHES: TypeTag = TypeTag::derived("InducingPatches", &INDUCING_POINTS);

/// A trait for inducing variables representations
pub trait InducingVariable<F: Float>: fmt::Debug + Send + Sync {
    /// Runtime type tag used for covariance dispatch
    fn type_tag(&self) -> &'static TypeTag;

    /// Number of inducing variables M
    fn num_inducing(&self) -> usize;

    /// Inducing inputs as a (M, dim) matrix
    fn z(&self) -> ArrayView2<'_, F>;

    /// Downcasting support for covariance builders
    fn as_any(&self) -> &dyn Any;
}

/// Inducing points given as a (M, nx) matrix
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct InducingPoints<F: Float> {
    z: Array2<F>,
}

impl<F: Float> InducingPoints<F> {
    /// Inducing points located at `z` rows
    pub fn new(z: Array2<F>) -> Self {
        InducingPoints { z }
    }

    /// `n` inducing points picked randomly in the `xt` training dataset.
    ///
    /// When `n` is greater than the number of training points, all the points are used.
    pub fn randomized(
        n: usize,
        xt: &ArrayBase<impl Data<Elem = F>, Ix2>,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };
        InducingPoints {
            z: select_rows(n, xt, &mut rng),
        }
    }

    /// Inducing points dimension
    pub fn dim(&self) -> usize {
        self.z.ncols()
    }
}

impl<F: Float> InducingVariable<F> for InducingPoints<F> {
    fn type_tag(&self) -> &'static TypeTag {
        &INDUCING_POINTS
    }

    fn num_inducing(&self) -> usize {
        self.z.nrows()
    }

    fn z(&self) -> ArrayView2<'_, F> {
        self.z.view()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Multiscale inducing points: each inducing point `z_i` gets its own additional
/// lengthscale `s_i` per dimension which acts as a location uncertainty.
///
/// Deserialization goes through [`Multiscale::new`] checks.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(try_from = "MultiscaleData<F>")
)]
pub struct Multiscale<F: Float> {
    points: InducingPoints<F>,
    scales: Array2<F>,
}

#[cfg(feature = "serializable")]
#[derive(Deserialize)]
struct MultiscaleData<F: Float> {
    points: InducingPoints<F>,
    scales: Array2<F>,
}

#[cfg(feature = "serializable")]
impl<F: Float> TryFrom<MultiscaleData<F>> for Multiscale<F> {
    type Error = KuuError;

    fn try_from(data: MultiscaleData<F>) -> Result<Self> {
        Multiscale::new(data.points.z, data.scales)
    }
}

impl<F: Float> Multiscale<F> {
    /// Multiscale inducing points located at `z` rows with corresponding `scales` rows.
    ///
    /// # Errors
    ///
    /// * [`KuuError::ShapeError`] when `z` and `scales` shapes differ,
    /// * [`KuuError::InvalidValueError`] when a scale is negative or not finite.
    pub fn new(z: Array2<F>, scales: Array2<F>) -> Result<Self> {
        if z.dim() != scales.dim() {
            return Err(KuuError::ShapeError(format!(
                "scales shape {:?} should match inducing points shape {:?}",
                scales.dim(),
                z.dim()
            )));
        }
        if scales.iter().any(|s| !s.is_finite() || *s < F::zero()) {
            return Err(KuuError::InvalidValueError(
                "multiscale scales should be finite and non negative".to_string(),
            ));
        }
        Ok(Multiscale {
            points: InducingPoints::new(z),
            scales,
        })
    }

    /// Underlying inducing points
    pub fn points(&self) -> &InducingPoints<F> {
        &self.points
    }

    /// Scales as a (M, nx) matrix
    pub fn scales(&self) -> ArrayView2<'_, F> {
        self.scales.view()
    }
}

impl<F: Float> InducingVariable<F> for Multiscale<F> {
    fn type_tag(&self) -> &'static TypeTag {
        &MULTISCALE
    }

    fn num_inducing(&self) -> usize {
        self.points.num_inducing()
    }

    fn z(&self) -> ArrayView2<'_, F> {
        self.points.z()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Inducing patches given as a (M, patch_len) matrix of flattened patches
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct InducingPatches<F: Float> {
    patches: Array2<F>,
}

impl<F: Float> InducingPatches<F> {
    /// Inducing patches given as rows of `patches`
    pub fn new(patches: Array2<F>) -> Self {
        InducingPatches { patches }
    }

    /// `n` inducing patches picked randomly amongst all the `patch_shape` patches
    /// of `images` given as flattened rows of `image_shape` images.
    pub fn from_images(
        images: &ArrayBase<impl Data<Elem = F>, Ix2>,
        image_shape: (usize, usize),
        patch_shape: (usize, usize),
        n: usize,
        seed: Option<u64>,
    ) -> Result<Self> {
        let all = extract_patches(images, image_shape, patch_shape)?;
        let mut rng = match seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };
        Ok(InducingPatches {
            patches: select_rows(n, &all, &mut rng),
        })
    }

    /// Length of a flattened patch
    pub fn patch_len(&self) -> usize {
        self.patches.ncols()
    }
}

impl<F: Float> InducingVariable<F> for InducingPatches<F> {
    fn type_tag(&self) -> &'static TypeTag {
        &INDUCING_PATCHES
    }

    fn num_inducing(&self) -> usize {
        self.patches.nrows()
    }

    fn z(&self) -> ArrayView2<'_, F> {
        self.patches.view()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

macro_rules! impl_persistence {
    ($($inducing:ident),*) => {
        $(
            #[cfg(feature = "persistent")]
            impl<F: Float + Serialize + DeserializeOwned> $inducing<F> {
                #[doc = concat!("Save ", stringify!($inducing), " in given file as json.")]
                pub fn save(&self, path: &str) -> Result<()> {
                    let mut file = fs::File::create(path)?;
                    let bytes = serde_json::to_vec(self)?;
                    file.write_all(&bytes)?;
                    Ok(())
                }

                #[doc = concat!("Load ", stringify!($inducing), " from given json file.")]
                pub fn load(path: &str) -> Result<Self> {
                    let data = fs::read(path)?;
                    Ok(serde_json::from_slice(&data)?)
                }
            }
        )*
    };
}

impl_persistence!(InducingPoints, Multiscale, InducingPatches);
