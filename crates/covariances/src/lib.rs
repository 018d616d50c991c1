//! This library computes the prior covariance matrix `Kuu` of the inducing variables
//! of [Sparse Gaussian Processes](https://en.wikipedia.org/wiki/Gaussian_process) (SGPs).
//!
//! SGPs approximate a full GP over N training points through M << N inducing variables `u`
//! so that `Kuu`, a (M, M) matrix, is a building block of every sparse approximation
//! (FITC, VFE, SVGP).
//!
//! The way `Kuu` is computed depends on both the kind of inducing variable and the kernel:
//!
//! * [`InducingPoints`] with any [`Kernel`]: `Kuu = k(Z, Z) + jitter * I`,
//! * [`Multiscale`] inducing points with a [`SquaredExponential`] kernel: closed form integrating
//!   the inducing point scales, see [`kuu_sqexp_multiscale`],
//! * [`InducingPatches`] with a [`Convolutional`] kernel: base kernel evaluated on patches.
//!
//! Builders are selected at runtime by a [`CovarianceRegistry`] according to the most specific
//! registered (inducing variable, kernel) pair, user builders can be registered as well.
//!
//! ```
//! use egobox_covariances::{kuu, Multiscale, SquaredExponential};
//! use ndarray::array;
//!
//! let z = Multiscale::new(array![[0.], [1.], [2.]], array![[0.1], [0.2], [0.3]]).unwrap();
//! let kernel = SquaredExponential::new(1., array![1.]).unwrap();
//! let kzz = kuu(&z, &kernel, 1e-6).unwrap();
//! assert_eq!(kzz.dim(), (3, 3));
//! ```
//!
//! Besides, [`kss`] extracts the covariance of a subset of multi-output inducing blocks
//! from a full block covariance matrix.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod dispatch;
mod errors;
pub mod inducing_variables;
pub mod kernels;
mod kuus;
mod parameters;
mod utils;

pub use dispatch::*;
pub use errors::*;
pub use inducing_variables::*;
pub use kernels::*;
pub use kuus::*;
pub use parameters::*;
pub use utils::extract_patches;
