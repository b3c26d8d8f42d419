//! Nonnegativity-constrained quadratic minimisation
//!
//! Solves `min ½ xᵀAx − bᵀx` subject to `x ≥ 0` for a symmetric positive
//! definite `A`. This is the normal-equation form of nonnegative least
//! squares, so the Lawson–Hanson active set method applies directly: the
//! free variables are solved with a Cholesky factorisation of the matching
//! block of `A`.

use crate::linalg::{cholesky, cholesky_solve};
use crate::{MathError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Gradient and feasibility tolerance
const TOLERANCE: f64 = 1e-10;

/// Minimiser of `½ xᵀAx − bᵀx` over the nonnegative orthant
pub fn nonnegative_minimize(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n == 0 || a.ncols() != n {
        return Err(MathError::DimensionMismatch(format!(
            "system must be a non-empty square matrix, got {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }
    if b.len() != n {
        return Err(MathError::DimensionMismatch(format!(
            "right-hand side length ({}) doesn't match system size ({})",
            b.len(),
            n
        )));
    }

    let scale = b.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    let tol = TOLERANCE * scale;

    let mut x = Array1::<f64>::zeros(n);
    let mut free = vec![false; n];
    let max_iterations = 3 * n + 10;

    for _ in 0..max_iterations {
        // Negative gradient at x
        let w = &b - &a.dot(&x);
        let entering = (0..n)
            .filter(|&j| !free[j] && w[j] > tol)
            .max_by(|&i, &j| w[i].total_cmp(&w[j]));
        let Some(entering) = entering else {
            return Ok(x);
        };
        free[entering] = true;

        loop {
            let z = solve_free(a, b, &free)?;
            let blocking = (0..n)
                .filter(|&j| free[j] && z[j] <= 0.0)
                .map(|j| x[j] / (x[j] - z[j]))
                .filter(|step| step.is_finite())
                .fold(None, |m: Option<f64>, step| Some(m.map_or(step, |m| m.min(step))));

            match blocking {
                None => {
                    x = z;
                    break;
                }
                Some(step) => {
                    x = &x + &((&z - &x) * step);
                    for j in 0..n {
                        if free[j] && x[j] <= tol {
                            free[j] = false;
                            x[j] = 0.0;
                        }
                    }
                    if !free.iter().any(|f| *f) {
                        break;
                    }
                }
            }
        }
    }

    Err(MathError::CalculationError(format!(
        "active set did not settle after {} iterations",
        max_iterations
    )))
}

/// Solve the unconstrained problem on the free variables, zero elsewhere
fn solve_free(a: ArrayView2<f64>, b: ArrayView1<f64>, free: &[bool]) -> Result<Array1<f64>> {
    let index: Vec<usize> = (0..free.len()).filter(|&j| free[j]).collect();
    let block = a.select(Axis(0), &index).select(Axis(1), &index);
    let rhs = b.select(Axis(0), &index);

    let factor = cholesky(block.view())?;
    let solved = cholesky_solve(factor.view(), rhs.view())?;

    let mut z = Array1::<f64>::zeros(free.len());
    for (&j, v) in index.iter().zip(solved.iter()) {
        z[j] = *v;
    }
    Ok(z)
}
