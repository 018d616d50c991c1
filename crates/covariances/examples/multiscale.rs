use egobox_covariances::{
    InducingPoints, InducingVariable, Multiscale, SquaredExponential, kuu, kuu_cholesky,
};
use env_logger::{Builder, Env};
use ndarray::{Array, Array2, Axis};
use ndarray_rand::RandomExt;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use rand_xoshiro::Xoshiro256Plus;

fn main() {
    let env = Env::new().filter_or("KUU_LOG", "info");
    Builder::from_env(env).init();

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array::linspace(0., 10., 200).insert_axis(Axis(1));
    let z = InducingPoints::randomized(10, &xt, Some(42));
    let kernel = SquaredExponential::new(1., Array::from_elem(1, 2.)).expect("kernel");

    let kzz = kuu(&z, &kernel, 1e-6).expect("Kuu of inducing points");
    println!("Kuu of inducing points =\n{kzz:.3}");

    let scales = Array2::random_using((10, 1), Uniform::new(0., 1.), &mut rng);
    let ms = Multiscale::new(z.z().to_owned(), scales).expect("multiscale inducing points");
    let kzz = kuu(&ms, &kernel, 1e-6).expect("Kuu of multiscale inducing points");
    println!("Kuu of multiscale inducing points =\n{kzz:.3}");

    let l = kuu_cholesky(&ms, &kernel, 1e-6).expect("Cholesky factor");
    println!("Cholesky factor diagonal = {:.3}", l.diag());
}
