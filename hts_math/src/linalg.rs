//! Dense linear algebra for reconciliation
//!
//! The reconciliation projection needs `(SᵀWS)⁻¹ SᵀW ŷ` for a summing
//! matrix `S`. `SᵀWS` is symmetric positive definite whenever `S` contains
//! the identity block for the bottom level, so a Cholesky factorisation is
//! enough.

use crate::{MathError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Pivots below this are treated as a singular system
const PIVOT_EPS: f64 = 1e-12;

/// Compute `SᵀS`
pub fn gram(s: ArrayView2<f64>) -> Array2<f64> {
    s.t().dot(&s)
}

/// Compute `SᵀWS` for a diagonal weight matrix given by `weights`
pub fn weighted_gram(s: ArrayView2<f64>, weights: ArrayView1<f64>) -> Result<Array2<f64>> {
    if weights.len() != s.nrows() {
        return Err(MathError::DimensionMismatch(format!(
            "weights length ({}) doesn't match matrix rows ({})",
            weights.len(),
            s.nrows()
        )));
    }

    let mut sw = s.to_owned();
    for (mut row, &w) in sw.rows_mut().into_iter().zip(weights.iter()) {
        row *= w;
    }

    Ok(s.t().dot(&sw))
}

/// Lower-triangular Cholesky factor `L` with `A = L Lᵀ`
pub fn cholesky(a: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if n == 0 || a.ncols() != n {
        return Err(MathError::DimensionMismatch(format!(
            "Cholesky needs a non-empty square matrix, got {}x{}",
            a.nrows(),
            a.ncols()
        )));
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !diag.is_finite() || diag <= PIVOT_EPS {
            return Err(MathError::NotPositiveDefinite(format!(
                "pivot {} is {:e}",
                j, diag
            )));
        }
        let pivot = diag.sqrt();
        l[[j, j]] = pivot;

        for i in (j + 1)..n {
            let mut value = a[[i, j]];
            for k in 0..j {
                value -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = value / pivot;
        }
    }

    Ok(l)
}

/// Solve `L Lᵀ x = b` given the Cholesky factor `L`
pub fn cholesky_solve(l: ArrayView2<f64>, b: ArrayView1<f64>) -> Result<Array1<f64>> {
    let n = l.nrows();
    if b.len() != n {
        return Err(MathError::DimensionMismatch(format!(
            "right-hand side length ({}) doesn't match system size ({})",
            b.len(),
            n
        )));
    }

    // Forward substitution: L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut value = b[i];
        for k in 0..i {
            value -= l[[i, k]] * z[k];
        }
        z[i] = value / l[[i, i]];
    }

    // Back substitution: Lᵀ x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut value = z[i];
        for k in (i + 1)..n {
            value -= l[[k, i]] * x[k];
        }
        x[i] = value / l[[i, i]];
    }

    Ok(x)
}
