//! Type directed dispatch of inducing covariance builders.
//!
//! Every inducing variable and every kernel exposes a [`TypeTag`], a node of a
//! single inheritance hierarchy (for instance `Multiscale` derives from
//! `InducingPoints`, `SquaredExponential` derives from `Stationary` which derives
//! from `Kernel`). A [`CovarianceRegistry`] maps pairs of tags to builder functions
//! and, given runtime values, selects the registration whose tags are the closest
//! ancestors of the runtime tags.
//!
//! Registrations which could be ambiguous for some pair of runtime types are
//! rejected when registering, so resolution always ends up with a single builder.

use crate::errors::{KuuError, Result};
use crate::inducing_variables::InducingVariable;
use crate::kernels::Kernel;
use crate::parameters::{KuuParams, KuuValidParams};
use linfa::{Float, ParamGuard};
use log::debug;
use ndarray::Array2;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A node in a single inheritance type hierarchy.
///
/// Tags are meant to be declared as `static` items, a derived tag referencing its parent:
///
/// ```
/// use egobox_covariances::TypeTag;
///
/// static SHAPE: TypeTag = TypeTag::root("Shape");
/// static CIRCLE: TypeTag = TypeTag::derived("Circle", &SHAPE);
///
/// assert!(CIRCLE.is_subtype_of(&SHAPE));
/// assert_eq!(CIRCLE.distance_to(&SHAPE), Some(1));
/// ```
///
/// Tags are compared by identity: two distinct statics never match even with the same
/// name and parent.
#[derive(Debug)]
pub struct TypeTag {
    name: &'static str,
    parent: Option<&'static TypeTag>,
}

impl TypeTag {
    /// A tag without parent
    pub const fn root(name: &'static str) -> TypeTag {
        TypeTag { name, parent: None }
    }

    /// A tag deriving from `parent`
    pub const fn derived(name: &'static str, parent: &'static TypeTag) -> TypeTag {
        TypeTag {
            name,
            parent: Some(parent),
        }
    }

    /// Type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct parent if any
    pub fn parent(&self) -> Option<&'static TypeTag> {
        self.parent
    }

    /// Iterate over this tag then its ancestors up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = &TypeTag> {
        std::iter::successors(Some(self), |tag| tag.parent)
    }

    /// Number of derivations from the root (a root tag has depth 0)
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    /// Number of derivation steps from `self` up to `ancestor`,
    /// `None` when `ancestor` is not an ancestor of (or equal to) `self`.
    pub fn distance_to(&self, ancestor: &TypeTag) -> Option<usize> {
        self.ancestors().position(|tag| tag == ancestor)
    }

    /// Whether `self` is `other` or derives from it
    pub fn is_subtype_of(&self, other: &TypeTag) -> bool {
        self.distance_to(other).is_some()
    }

    /// Compare specificity of two tags on the same inheritance chain:
    /// `Greater` when `self` is more derived than `other`, `None` when unrelated.
    fn specificity(&self, other: &TypeTag) -> Option<Ordering> {
        match (self.distance_to(other), other.distance_to(self)) {
            (Some(0), _) => Some(Ordering::Equal),
            (Some(_), _) => Some(Ordering::Greater),
            (None, Some(_)) => Some(Ordering::Less),
            (None, None) => None,
        }
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Signature of an inducing covariance builder
pub type KuuBuilder<F> = Arc<
    dyn Fn(&dyn InducingVariable<F>, &dyn Kernel<F>, &KuuValidParams<F>) -> Result<Array2<F>>
        + Send
        + Sync,
>;

/// A builder registered for an (inducing variable, kernel) pair of type tags
#[derive(Clone)]
pub struct Registration<F: Float> {
    inducing: &'static TypeTag,
    kernel: &'static TypeTag,
    builder: KuuBuilder<F>,
}

impl<F: Float> Registration<F> {
    /// Inducing variable tag
    pub fn inducing(&self) -> &'static TypeTag {
        self.inducing
    }

    /// Kernel tag
    pub fn kernel(&self) -> &'static TypeTag {
        self.kernel
    }

    /// Invoke the registered builder
    pub fn build(
        &self,
        inducing: &dyn InducingVariable<F>,
        kernel: &dyn Kernel<F>,
        params: &KuuValidParams<F>,
    ) -> Result<Array2<F>> {
        (self.builder)(inducing, kernel, params)
    }
}

impl<F: Float> fmt::Debug for Registration<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Registration")
            .field("inducing", &self.inducing.name())
            .field("kernel", &self.kernel.name())
            .finish()
    }
}

/// The `Kuu` dispatch table: computes the prior covariance of inducing variables
/// `Kuu = k(Z, Z) + jitter * I` choosing the builder according to the runtime
/// types of the inducing variable and of the kernel.
///
/// [`CovarianceRegistry::default()`] comes with the builders of [`crate::kuus`]:
///
/// | inducing variable   | kernel               | builder                             |
/// |---------------------|----------------------|-------------------------------------|
/// | `InducingPoints`    | `Kernel`             | [`crate::kuu_kernel_inducingpoints`] |
/// | `Multiscale`        | `SquaredExponential` | [`crate::kuu_sqexp_multiscale`]      |
/// | `InducingPatches`   | `Convolutional`      | [`crate::kuu_conv_patch`]            |
///
/// # Example
///
/// ```
/// use egobox_covariances::{CovarianceRegistry, InducingPoints, SquaredExponential};
/// use ndarray::array;
///
/// let registry = CovarianceRegistry::default();
/// let z = InducingPoints::new(array![[0.], [1.], [2.]]);
/// let kernel = SquaredExponential::new(1., array![1.]).unwrap();
/// let kuu = registry.build(&z, &kernel, 1e-6).unwrap();
/// assert_eq!(kuu.dim(), (3, 3));
/// ```
#[derive(Clone)]
pub struct CovarianceRegistry<F: Float> {
    entries: Vec<Registration<F>>,
}

impl<F: Float> Default for CovarianceRegistry<F> {
    fn default() -> Self {
        let mut registry = Self::new();
        crate::kuus::register_defaults(&mut registry);
        registry
    }
}

impl<F: Float> fmt::Debug for CovarianceRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl<F: Float> CovarianceRegistry<F> {
    /// An empty registry
    pub fn new() -> Self {
        CovarianceRegistry {
            entries: Vec::new(),
        }
    }

    /// Number of registered builders
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no builder is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered (inducing variable, kernel) type names in registration order
    pub fn registrations(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries
            .iter()
            .map(|e| (e.inducing.name(), e.kernel.name()))
    }

    /// Register `builder` for the pair (`inducing`, `kernel`) and their subtypes.
    ///
    /// # Errors
    ///
    /// [`KuuError::RegistrationConflict`] when a builder is already registered for the very same pair,
    /// or when an existing registration could match the same runtime pair while being more specific
    /// in one position and less specific in the other one.
    pub fn register<B>(
        &mut self,
        inducing: &'static TypeTag,
        kernel: &'static TypeTag,
        builder: B,
    ) -> Result<()>
    where
        B: Fn(&dyn InducingVariable<F>, &dyn Kernel<F>, &KuuValidParams<F>) -> Result<Array2<F>>
            + Send
            + Sync
            + 'static,
    {
        for entry in self.entries.iter() {
            let specificity = (
                inducing.specificity(entry.inducing),
                kernel.specificity(entry.kernel),
            );
            match specificity {
                (Some(Ordering::Equal), Some(Ordering::Equal)) => {
                    return Err(KuuError::RegistrationConflict(format!(
                        "a builder is already registered for ({inducing}, {kernel})"
                    )));
                }
                (Some(Ordering::Greater), Some(Ordering::Less))
                | (Some(Ordering::Less), Some(Ordering::Greater)) => {
                    return Err(KuuError::RegistrationConflict(format!(
                        "({inducing}, {kernel}) is ambiguous with ({}, {})",
                        entry.inducing, entry.kernel
                    )));
                }
                _ => (),
            }
        }
        debug!("Register Kuu builder for ({inducing}, {kernel})");
        self.insert(inducing, kernel, Arc::new(builder));
        Ok(())
    }

    pub(crate) fn insert(
        &mut self,
        inducing: &'static TypeTag,
        kernel: &'static TypeTag,
        builder: KuuBuilder<F>,
    ) {
        self.entries.push(Registration {
            inducing,
            kernel,
            builder,
        });
    }

    /// Find the most specific registration matching runtime types of `inducing` and `kernel`.
    ///
    /// # Errors
    ///
    /// [`KuuError::DispatchError`] when no registration matches.
    pub fn resolve(
        &self,
        inducing: &dyn InducingVariable<F>,
        kernel: &dyn Kernel<F>,
    ) -> Result<&Registration<F>> {
        let (itag, ktag) = (inducing.type_tag(), kernel.type_tag());
        self.entries
            .iter()
            .filter_map(|e| Some((itag.distance_to(e.inducing)?, ktag.distance_to(e.kernel)?, e)))
            .min_by_key(|(di, dk, _)| (*di, *dk))
            .map(|(_, _, e)| e)
            .ok_or_else(|| dispatch_error(inducing, kernel))
    }

    /// Compute `Kuu` for `inducing` and `kernel` adding `jitter` on the diagonal.
    ///
    /// # Errors
    ///
    /// * [`KuuError::InvalidValueError`] when `jitter` is negative or not finite,
    /// * [`KuuError::DispatchError`] when no builder matches,
    /// * any error raised by the selected builder.
    pub fn build(
        &self,
        inducing: &dyn InducingVariable<F>,
        kernel: &dyn Kernel<F>,
        jitter: F,
    ) -> Result<Array2<F>> {
        let params = KuuParams::new().jitter(jitter).check()?;
        self.build_with(inducing, kernel, &params)
    }

    /// Compute `Kuu` for `inducing` and `kernel` with the given validated parameters.
    pub fn build_with(
        &self,
        inducing: &dyn InducingVariable<F>,
        kernel: &dyn Kernel<F>,
        params: &KuuValidParams<F>,
    ) -> Result<Array2<F>> {
        let entry = self.resolve(inducing, kernel)?;
        debug!(
            "Kuu({}, {}) dispatched to builder ({}, {})",
            inducing.type_tag(),
            kernel.type_tag(),
            entry.inducing,
            entry.kernel
        );
        entry.build(inducing, kernel, params)
    }
}

pub(crate) fn dispatch_error<F: Float>(
    inducing: &dyn InducingVariable<F>,
    kernel: &dyn Kernel<F>,
) -> KuuError {
    KuuError::DispatchError {
        inducing: inducing.type_tag().name().to_string(),
        kernel: kernel.type_tag().name().to_string(),
    }
}
