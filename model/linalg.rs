use ndarray::Array2;
use ndarray_linalg::Inverse;
use ndarray_linalg::error::LinalgError;
use thiserror::Error;

/// Taylor/Mercator series stop once a term's 1-norm falls below this.
const SERIES_TOLERANCE: f64 = 1e-18;
const MAX_SERIES_TERMS: usize = 64;
/// The exponential is evaluated on `A / 2^s` with `||A / 2^s||_1` at most this.
const EXP_SCALING_NORM: f64 = 0.5;
/// Square roots are taken until `||A - I||_1` drops below this radius.
const LOG_SERIES_RADIUS: f64 = 0.1;
const MAX_SQUARE_ROOTS: usize = 64;
const DENMAN_BEAVERS_MAX_ITER: usize = 100;
const DENMAN_BEAVERS_TOLERANCE: f64 = 1e-15;

#[derive(Error, Debug)]
pub enum MatrixFunctionError {
    #[error("Matrix function requires a square matrix, got {rows}x{cols}.")]
    NotSquare { rows: usize, cols: usize },

    #[error("Matrix contains non-finite entries.")]
    NonFinite,

    #[error("Denman-Beavers square root did not converge within {0} iterations.")]
    SquareRootDidNotConverge(usize),

    #[error("Inverse scaling and squaring needed more than {0} square roots.")]
    TooManySquareRoots(usize),

    #[error("Matrix inversion failed: {0}")]
    Linalg(#[from] LinalgError),
}

/// Maximum absolute column sum.
pub fn one_norm(matrix: &Array2<f64>) -> f64 {
    matrix
        .columns()
        .into_iter()
        .map(|col| col.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn check_square(matrix: &Array2<f64>) -> Result<usize, MatrixFunctionError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(MatrixFunctionError::NotSquare { rows, cols });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(MatrixFunctionError::NonFinite);
    }
    Ok(rows)
}

/// Matrix exponential by scaling and squaring.
///
/// The argument is halved until its 1-norm is at most 0.5, the exponential
/// of the scaled matrix is summed as a Taylor series, and the result is
/// squared back up.
pub fn expm(matrix: &Array2<f64>) -> Result<Array2<f64>, MatrixFunctionError> {
    let n = check_square(matrix)?;

    let mut squarings = 0i32;
    let mut scaled_norm = one_norm(matrix);
    while scaled_norm > EXP_SCALING_NORM {
        scaled_norm /= 2.0;
        squarings += 1;
    }
    let scale = 2f64.powi(squarings);
    let scaled = matrix.mapv(|v| v / scale);

    let mut result = Array2::<f64>::eye(n);
    let mut term = Array2::<f64>::eye(n);
    for k in 1..=MAX_SERIES_TERMS {
        term = term.dot(&scaled).mapv(|v| v / k as f64);
        result += &term;
        if one_norm(&term) < SERIES_TOLERANCE {
            break;
        }
    }

    for _ in 0..squarings {
        result = result.dot(&result);
    }
    Ok(result)
}

/// Principal square root via the Denman-Beavers iteration.
fn sqrtm(matrix: &Array2<f64>) -> Result<Array2<f64>, MatrixFunctionError> {
    let n = matrix.nrows();
    let mut y = matrix.clone();
    let mut z = Array2::<f64>::eye(n);
    for _ in 0..DENMAN_BEAVERS_MAX_ITER {
        let y_inv = y.inv()?;
        let z_inv = z.inv()?;
        let y_next = (&y + &z_inv).mapv(|v| 0.5 * v);
        let z_next = (&z + &y_inv).mapv(|v| 0.5 * v);
        let delta = one_norm(&(&y_next - &y));
        y = y_next;
        z = z_next;
        if delta <= DENMAN_BEAVERS_TOLERANCE * one_norm(&y).max(1.0) {
            return Ok(y);
        }
    }
    Err(MatrixFunctionError::SquareRootDidNotConverge(
        DENMAN_BEAVERS_MAX_ITER,
    ))
}

/// Principal matrix logarithm by inverse scaling and squaring.
///
/// Repeated square roots bring the matrix within 0.1 of the identity, where
/// `log(I + X) = X - X^2/2 + X^3/3 - ...` converges quickly; the series is
/// then scaled back by `2^s`. The matrix must have no eigenvalues on the
/// closed negative real axis.
pub fn logm(matrix: &Array2<f64>) -> Result<Array2<f64>, MatrixFunctionError> {
    let n = check_square(matrix)?;
    let identity = Array2::<f64>::eye(n);

    let mut root = matrix.clone();
    let mut roots = 0i32;
    while one_norm(&(&root - &identity)) > LOG_SERIES_RADIUS {
        if roots as usize == MAX_SQUARE_ROOTS {
            return Err(MatrixFunctionError::TooManySquareRoots(MAX_SQUARE_ROOTS));
        }
        root = sqrtm(&root)?;
        roots += 1;
    }

    let x = &root - &identity;
    let mut result = Array2::<f64>::zeros((n, n));
    let mut power = identity;
    for k in 1..=MAX_SERIES_TERMS {
        power = power.dot(&x);
        let sign = if k % 2 == 1 { 1.0 } else { -1.0 };
        result.scaled_add(sign / k as f64, &power);
        if one_norm(&power) / (k as f64) < SERIES_TOLERANCE {
            break;
        }
    }

    let scale = 2f64.powi(roots);
    result.mapv_inplace(|v| v * scale);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn expm_of_zero_is_identity() {
        let zero = Array2::<f64>::zeros((3, 3));
        let result = expm(&zero).unwrap();
        for ((i, j), v) in result.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(*v, expected, epsilon = 1e-15);
        }
    }

    #[test]
    fn expm_matches_scalar_exponential_on_diagonal() {
        let diag = array![[-2.0, 0.0], [0.0, 0.7]];
        let result = expm(&diag).unwrap();
        assert_abs_diff_eq!(result[[0, 0]], (-2.0f64).exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(result[[1, 1]], 0.7f64.exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(result[[0, 1]], 0.0, epsilon = 1e-15);
    }

    #[test]
    fn expm_two_state_generator_has_closed_form() {
        // Q = [[-a, a], [0, 0]] => P(t) = [[e^-a, 1 - e^-a], [0, 1]]
        let a = 0.35;
        let q = array![[-a, a], [0.0, 0.0]];
        let p = expm(&q).unwrap();
        assert_abs_diff_eq!(p[[0, 0]], (-a).exp(), epsilon = 1e-13);
        assert_abs_diff_eq!(p[[0, 1]], 1.0 - (-a).exp(), epsilon = 1e-13);
        assert_abs_diff_eq!(p[[1, 1]], 1.0, epsilon = 1e-13);
    }

    #[test]
    fn logm_inverts_expm() {
        let q = array![
            [-0.4, 0.3, 0.1],
            [0.0, -0.2, 0.2],
            [0.0, 0.0, 0.0]
        ];
        let p = expm(&q).unwrap();
        let back = logm(&p).unwrap();
        for (a, b) in back.iter().zip(q.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn rejects_non_square_and_non_finite() {
        let rect = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            expm(&rect),
            Err(MatrixFunctionError::NotSquare { rows: 2, cols: 3 })
        ));
        let bad = array![[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(matches!(logm(&bad), Err(MatrixFunctionError::NonFinite)));
    }
}
