use approx::{assert_abs_diff_eq, assert_relative_eq};
use egobox_covariances::{
    CovarianceRegistry, INDUCING_POINTS, InducingPoints, InducingVariable, KERNEL, Kernel,
    KuuError, KuuParams, Matern32, Multiscale, STATIONARY, SquaredExponential, TypeTag, kuu,
};
use env_logger::{Builder, Env};
use linfa::ParamGuard;
use ndarray::{Array2, ArrayView2, array};
use std::any::Any;

const KUU_LOG: &str = "KUU_LOG";

fn init_logger() {
    let env = Env::new().filter_or(KUU_LOG, "info");
    Builder::from_env(env).is_test(true).try_init().ok();
}

static SHIFTED_POINTS: TypeTag = TypeTag::derived("ShiftedPoints", &INDUCING_POINTS);

/// Inducing points whose inducing values are shifted copies of the latent function
#[derive(Debug)]
struct ShiftedPoints {
    z: Array2<f64>,
    shift: f64,
}

impl InducingVariable<f64> for ShiftedPoints {
    fn type_tag(&self) -> &'static TypeTag {
        &SHIFTED_POINTS
    }

    fn num_inducing(&self) -> usize {
        self.z.nrows()
    }

    fn z(&self) -> ArrayView2<'_, f64> {
        self.z.view()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

static NAMED_MULTISCALE: TypeTag = TypeTag::derived("Multiscale", &INDUCING_POINTS);

/// User points which happen to reuse the name of a built-in tag
#[derive(Debug)]
struct NamedPoints(Array2<f64>);

impl InducingVariable<f64> for NamedPoints {
    fn type_tag(&self) -> &'static TypeTag {
        &NAMED_MULTISCALE
    }

    fn num_inducing(&self) -> usize {
        self.0.nrows()
    }

    fn z(&self) -> ArrayView2<'_, f64> {
        self.0.view()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_user_tag_with_builtin_name_uses_generic_builder() {
    init_logger();
    let z = NamedPoints(array![[0.], [1.]]);
    let kernel = SquaredExponential::new(1., array![1.]).unwrap();
    let registry = CovarianceRegistry::default();
    let entry = registry.resolve(&z, &kernel).unwrap();
    assert_eq!(entry.inducing(), &INDUCING_POINTS);
    let expected = kuu(&InducingPoints::new(array![[0.], [1.]]), &kernel, 0.).unwrap();
    assert_eq!(kuu(&z, &kernel, 0.).unwrap(), expected);
}

#[test]
fn test_user_inducing_variable_falls_back_on_generic_builder() {
    init_logger();
    let z = ShiftedPoints {
        z: array![[0.], [0.5]],
        shift: 1.,
    };
    let kernel = SquaredExponential::new(1., array![1.]).unwrap();
    let expected = kuu(&InducingPoints::new(array![[0.], [0.5]]), &kernel, 1e-8).unwrap();
    assert_eq!(kuu(&z, &kernel, 1e-8).unwrap(), expected);
}

#[test]
fn test_user_builder_registration() {
    init_logger();
    let mut registry = CovarianceRegistry::<f64>::default();
    registry
        .register(&SHIFTED_POINTS, &KERNEL, |inducing, kernel, params| {
            let shifted = inducing
                .as_any()
                .downcast_ref::<ShiftedPoints>()
                .ok_or(KuuError::ShapeError("not shifted points".to_string()))?;
            let z = shifted.z.mapv(|v| v + shifted.shift);
            let mut kzz = kernel.evaluate(&z.view(), &z.view())?;
            kzz.diag_mut().mapv_inplace(|v| v + params.jitter());
            Ok(kzz)
        })
        .unwrap();
    assert_eq!(registry.len(), 4);

    let z = ShiftedPoints {
        z: array![[0.], [3.]],
        shift: 2.,
    };
    let kernel = Matern32::new(1., array![2.]).unwrap();
    let kzz = registry.build(&z, &kernel, 0.).unwrap();
    let expected = kernel
        .evaluate(&array![[2.], [5.]].view(), &array![[2.], [5.]].view())
        .unwrap();
    assert_abs_diff_eq!(kzz, expected, epsilon = 1e-15);

    // plain inducing points still use the generic builder
    let points = InducingPoints::new(array![[0.], [3.]]);
    let expected = kernel.evaluate(&points.z(), &points.z()).unwrap();
    assert_eq!(registry.build(&points, &kernel, 0.).unwrap(), expected);
}

#[test]
fn test_more_specific_kernel_registration() {
    init_logger();
    let mut registry = CovarianceRegistry::<f64>::default();
    registry
        .register(&INDUCING_POINTS, &STATIONARY, |inducing, _kernel, _params| {
            let m = inducing.num_inducing();
            Ok(Array2::from_elem((m, m), 7.))
        })
        .unwrap();
    let ms = Multiscale::new(array![[0.], [1.]], array![[0.], [0.]]).unwrap();
    // Matern32 is not squared exponential: the stationary builder is the closest one
    let kzz = registry
        .build(&ms, &Matern32::new(1., array![1.]).unwrap(), 0.)
        .unwrap();
    assert_eq!(kzz, Array2::from_elem((2, 2), 7.));
    // whereas the multiscale builder stays the most specific for squared exponential
    let kzz = registry
        .build(&ms, &SquaredExponential::new(1., array![1.]).unwrap(), 0.)
        .unwrap();
    assert_abs_diff_eq!(kzz[[0, 0]], 1., epsilon = 1e-14);
}

#[test]
fn test_conflicting_registration() {
    let mut registry = CovarianceRegistry::<f64>::default();
    let res = registry.register(&INDUCING_POINTS, &KERNEL, |_, _, _| Ok(Array2::zeros((0, 0))));
    assert!(matches!(res, Err(KuuError::RegistrationConflict(_))));
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_build_with_radicand_floor() {
    init_logger();
    // lengthscale squared underflows: radicands are replaced by the floor
    let ms = Multiscale::new(array![[0.], [1e-200]], array![[0.], [0.]]).unwrap();
    let kernel = SquaredExponential::new(1., array![1e-200]).unwrap();
    let registry = CovarianceRegistry::default();
    let params = KuuParams::new()
        .jitter(1e-6)
        .radicand_floor(1e-10)
        .check()
        .unwrap();
    let kzz = registry.build_with(&ms, &kernel, &params).unwrap();
    // sc = sqrt(1e-10) for every pair
    let prior = 1e-200 / 1e-5;
    assert_relative_eq!(kzz[[0, 0]], prior + 1e-6, max_relative = 1e-12);
    assert_relative_eq!(kzz[[0, 1]], prior, max_relative = 1e-12);
    assert_eq!(kzz[[0, 1]], kzz[[1, 0]]);

    // default floor of 1e-12 gives sc = 1e-6
    let kzz = kuu(&ms, &kernel, 0.).unwrap();
    assert_relative_eq!(kzz[[1, 1]], 1e-194, max_relative = 1e-12);
}

#[test]
fn test_overflowing_multiscale_is_numerical_error() {
    let ms = Multiscale::new(array![[0.], [1.]], array![[1e200], [1e-3]]).unwrap();
    let kernel = SquaredExponential::new(1., array![1.]).unwrap();
    let registry = CovarianceRegistry::default();
    let params = KuuParams::new().check().unwrap();
    assert!(matches!(
        registry.build_with(&ms, &kernel, &params),
        Err(KuuError::NumericalError(_))
    ));
}
