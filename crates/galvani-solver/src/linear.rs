//! Linear system solve.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// Solve a linear system Ax = z using LU decomposition with partial
/// pivoting.
///
/// Singular and near-singular systems are reported as
/// [`Error::SingularSystem`]; a solution containing NaN or infinity is
/// treated the same way, so garbage can never reach the published
/// accessors.
pub fn solve_dense(a: &DMatrix<f64>, z: &DVector<f64>) -> Result<DVector<f64>> {
    if a.nrows() != a.ncols() {
        return Err(Error::DimensionMismatch {
            expected: a.nrows(),
            actual: a.ncols(),
        });
    }
    if a.nrows() != z.len() {
        return Err(Error::DimensionMismatch {
            expected: a.nrows(),
            actual: z.len(),
        });
    }

    let x = a.clone().lu().solve(z).ok_or(Error::SingularSystem)?;
    if !x.iter().all(|v| v.is_finite()) {
        return Err(Error::SingularSystem);
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_solve_simple() {
        // 2x + y = 5
        // x + 3y = 6
        let a = dmatrix![2.0, 1.0; 1.0, 3.0];
        let z = dvector![5.0, 6.0];

        let x = solve_dense(&a, &z).unwrap();

        assert!((x[0] - 1.8).abs() < 1e-10);
        assert!((x[1] - 1.4).abs() < 1e-10);
    }

    #[test]
    fn test_singular_matrix() {
        let a = dmatrix![1.0, 2.0; 2.0, 4.0];
        let z = dvector![1.0, 2.0];

        assert!(matches!(solve_dense(&a, &z), Err(Error::SingularSystem)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = dmatrix![1.0, 2.0; 3.0, 4.0];
        let z = dvector![1.0, 2.0, 3.0];

        assert!(matches!(
            solve_dense(&a, &z),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_solution_is_rejected() {
        // A tiny pivot survives factorization but overflows the solution.
        let a = dmatrix![1e-308, 0.0; 0.0, 1.0];
        let z = dvector![1e30, 1.0];

        assert!(matches!(solve_dense(&a, &z), Err(Error::SingularSystem)));
    }
}
