use crate::errors::{KuuError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2, Zip};
use ndarray_rand::rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256Plus;

/// Computes differences between each element of x and each element of y
/// resulting in a 2d array of shape (nrows(x) * nrows(y), ncols(x));
/// *Panics* if x and y have not the same column numbers
pub fn pairwise_differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.ncols() == y.ncols());

    let nx = x.nrows();
    let ny = y.nrows();
    let ncols = x.ncols();
    let mut result = Array2::zeros((nx * ny, ncols));

    for (i, x_row) in x.rows().into_iter().enumerate() {
        for (j, y_row) in y.rows().into_iter().enumerate() {
            let idx = i * ny + j;
            for k in 0..ncols {
                result[[idx, k]] = x_row[k] - y_row[k];
            }
        }
    }

    result
}

/// Extract every `patch_shape` patch of images given as flattened rows of `image_shape` (height, width) images.
///
/// Returns a (n_images * n_patches, patch_height * patch_width) matrix where patches of image `n`
/// occupy rows `n * n_patches..(n + 1) * n_patches`, patches being enumerated row-major
/// over their top-left corner position and flattened row-major.
pub fn extract_patches<F: Float>(
    images: &ArrayBase<impl Data<Elem = F>, Ix2>,
    image_shape: (usize, usize),
    patch_shape: (usize, usize),
) -> Result<Array2<F>> {
    let (h, w) = image_shape;
    let (ph, pw) = patch_shape;
    if images.ncols() != h * w {
        return Err(KuuError::ShapeError(format!(
            "images should have {} = {h}x{w} columns, got {}",
            h * w,
            images.ncols()
        )));
    }
    if ph == 0 || pw == 0 || ph > h || pw > w {
        return Err(KuuError::InvalidValueError(format!(
            "patch shape ({ph}, {pw}) does not fit in image shape ({h}, {w})"
        )));
    }
    let (nr, nc) = (h - ph + 1, w - pw + 1);
    let n_patches = nr * nc;
    let mut patches = Array2::zeros((images.nrows() * n_patches, ph * pw));
    for (n, image) in images.rows().into_iter().enumerate() {
        for r in 0..nr {
            for c in 0..nc {
                let row = n * n_patches + r * nc + c;
                for pr in 0..ph {
                    for pc in 0..pw {
                        patches[[row, pr * pw + pc]] = image[(r + pr) * w + c + pc];
                    }
                }
            }
        }
    }
    Ok(patches)
}

/// Pick `n` distinct rows of `x` at random (all rows when `n` exceeds the row count)
pub(crate) fn select_rows<F: Float>(
    n: usize,
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    rng: &mut Xoshiro256Plus,
) -> Array2<F> {
    let mut indices = (0..x.nrows()).collect::<Vec<_>>();
    indices.shuffle(rng);
    let n = n.min(x.nrows());
    let mut z = Array2::zeros((n, x.ncols()));
    let idx = indices[..n].to_vec();
    Zip::from(z.rows_mut())
        .and(&Array1::from_vec(idx))
        .for_each(|mut zi, i| zi.assign(&x.row(*i)));
    z
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;

    #[test]
    fn test_pairwise_differences() {
        let x = array![[-0.9486833], [-0.82219219]];
        let y = array![
            [-1.26491106],
            [-0.63245553],
            [0.],
            [0.63245553],
            [1.26491106]
        ];
        assert_abs_diff_eq!(
            &array![
                [0.31622777],
                [-0.31622777],
                [-0.9486833],
                [-1.58113883],
                [-2.21359436],
                [0.44271887],
                [-0.18973666],
                [-0.82219219],
                [-1.45464772],
                [-2.08710326]
            ],
            &pairwise_differences(&x, &y),
            epsilon = 1e-6
        )
    }

    #[test]
    fn test_extract_patches() {
        // one 3x3 image, 2x2 patches
        let images = array![[1., 2., 3., 4., 5., 6., 7., 8., 9.]];
        let patches = extract_patches(&images, (3, 3), (2, 2)).unwrap();
        assert_eq!(
            patches,
            array![
                [1., 2., 4., 5.],
                [2., 3., 5., 6.],
                [4., 5., 7., 8.],
                [5., 6., 8., 9.]
            ]
        );
    }

    #[test]
    fn test_extract_patches_several_images() {
        let images = array![[1., 2., 3., 4.], [5., 6., 7., 8.]];
        let patches = extract_patches(&images, (2, 2), (1, 2)).unwrap();
        assert_eq!(patches, array![[1., 2.], [3., 4.], [5., 6.], [7., 8.]]);
    }

    #[test]
    fn test_extract_patches_bad_shapes() {
        let images = array![[1., 2., 3., 4.]];
        assert!(matches!(
            extract_patches(&images, (3, 3), (2, 2)),
            Err(KuuError::ShapeError(_))
        ));
        assert!(matches!(
            extract_patches(&images, (2, 2), (3, 1)),
            Err(KuuError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_select_rows() {
        let x = array![[0., 0.], [1., 1.], [2., 2.], [3., 3.]];
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let z = select_rows(3, &x, &mut rng);
        assert_eq!(z.dim(), (3, 2));
        for zi in z.rows() {
            assert!(x.rows().into_iter().any(|xi| xi == zi));
        }
        let mut rows = z.column(0).to_vec();
        rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
        rows.dedup();
        assert_eq!(rows.len(), 3);

        let z = select_rows(10, &x, &mut rng);
        assert_eq!(z.nrows(), 4);
    }
}
