//! Jacobi-preconditioned conjugate gradient.

use tracing::{debug, warn};

use crate::error::{Result, SolverError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgConfig {
    /// Relative residual `|r| / |b|` at which the solve stops
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_iterations: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CgOutcome {
    pub solution: Vec<f64>,
    pub iterations: usize,
    pub relative_residual: f64,
    pub converged: bool,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solve `A x = b` for a symmetric positive (semi)definite `A` given as a
/// matrix-vector product. `diagonal` is the diagonal of `A`.
pub fn solve<F>(apply: F, diagonal: &[f64], b: &[f64], config: &CgConfig) -> Result<CgOutcome>
where
    F: Fn(&[f64], &mut [f64]),
{
    let n = b.len();
    let b_norm = dot(b, b).sqrt();
    if b_norm == 0.0 {
        return Ok(CgOutcome {
            solution: vec![0.0; n],
            iterations: 0,
            relative_residual: 0.0,
            converged: true,
        });
    }

    let inv_diag: Vec<f64> = diagonal
        .iter()
        .map(|&d| if d.abs() > 1e-12 { 1.0 / d } else { 1.0 })
        .collect();

    let mut x = vec![0.0; n];
    let mut r = b.to_vec();
    let mut z: Vec<f64> = r.iter().zip(&inv_diag).map(|(r, m)| r * m).collect();
    let mut p = z.clone();
    let mut ap = vec![0.0; n];
    let mut rz = dot(&r, &z);

    let mut iterations = 0;
    let mut relative_residual = 1.0;
    while iterations < config.max_iterations {
        apply(&p, &mut ap);
        let pap = dot(&p, &ap);
        if pap <= 0.0 || !pap.is_finite() {
            break;
        }
        let step = rz / pap;
        for i in 0..n {
            x[i] += step * p[i];
            r[i] -= step * ap[i];
        }
        iterations += 1;

        relative_residual = dot(&r, &r).sqrt() / b_norm;
        if relative_residual <= config.tolerance {
            break;
        }

        for i in 0..n {
            z[i] = r[i] * inv_diag[i];
        }
        let rz_next = dot(&r, &z);
        let beta = rz_next / rz;
        rz = rz_next;
        for i in 0..n {
            p[i] = z[i] + beta * p[i];
        }
    }

    if x.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::NonFinite { iterations });
    }

    let converged = relative_residual <= config.tolerance;
    if converged {
        debug!(iterations, relative_residual, "Conjugate gradient converged");
    } else {
        warn!(iterations, relative_residual, "Conjugate gradient stopped before reaching tolerance");
    }

    Ok(CgOutcome {
        solution: x,
        iterations,
        relative_residual,
        converged,
    })
}
