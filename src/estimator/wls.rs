//! Weighted-least-squares state estimation.
//!
//! Gauss–Newton iteration on the AC measurement equations: at each step
//! the measurement function and its analytic Jacobian are evaluated at
//! the current state, the weighted normal equations are formed, and the
//! state update is obtained from an LU solve of the gain matrix.

use std::error::Error;
use std::f64::consts::PI;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::{Rng, rngs::StdRng};

use crate::estimator::ybus::Ybus;
use crate::measurement::builder::{MeasurementKind, MeasurementSet};

/// Maximum number of solves attempted for one estimation cycle.
pub const MAX_ATTEMPTS: usize = 5;

/// Converged state: one complex voltage per per-phase node.
#[derive(Debug, Clone)]
pub struct Estimate {
    pub voltages: Vec<Complex64>,
    /// Gauss–Newton iterations actually used.
    pub iterations: usize,
}

/// Result of the bounded retry policy.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub estimate: Estimate,
    /// Solves performed, between 1 and [`MAX_ATTEMPTS`].
    pub attempts: usize,
    /// Whether the final solve landed in the expected iteration range.
    pub healthy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstimationError {
    /// The measurement set has no rows.
    Empty,
    /// The gain matrix was singular at the given iteration.
    Singular { iteration: usize },
}

impl fmt::Display for EstimationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationError::Empty => write!(f, "measurement set is empty"),
            EstimationError::Singular { iteration } => {
                write!(f, "gain matrix is singular at iteration {iteration}")
            }
        }
    }
}

impl Error for EstimationError {}

/// Runs one Gauss–Newton solve.
///
/// The state vector packs `order − 1` voltage angles (the reference
/// slot's angle is fixed at zero and not a free variable) followed by
/// `order` voltage magnitudes. The initial guess uses balanced
/// three-phase angles and unit magnitudes with a small random
/// perturbation.
///
/// # Errors
///
/// Returns [`EstimationError::Empty`] for an empty measurement set and
/// [`EstimationError::Singular`] when the gain matrix cannot be solved.
pub fn estimate(
    ybus: &Ybus,
    set: &MeasurementSet,
    max_iterations: usize,
    threshold: f64,
    rng: &mut StdRng,
) -> Result<Estimate, EstimationError> {
    if set.is_empty() {
        return Err(EstimationError::Empty);
    }
    let n = ybus.order();
    let rows = set.len();
    let states = 2 * n - 1;

    let mut x = initial_guess(n, rng);
    let mut iterations = 0;
    while iterations < max_iterations {
        let (v, th) = split_state(&x, n);
        let mut h = DVector::<f64>::zeros(rows);
        let mut jacobian = DMatrix::<f64>::zeros(rows, states);
        for (m, kind) in set.kinds.iter().enumerate() {
            fill_row(ybus, &v, &th, *kind, m, &mut h, &mut jacobian);
        }

        let residual = &set.z - &h;
        let mut weighted_jacobian = jacobian.clone();
        let mut weighted_residual = residual.clone();
        for m in 0..rows {
            let w = 1.0 / set.variances[m];
            weighted_jacobian.set_row(m, &(jacobian.row(m) * w));
            weighted_residual[m] *= w;
        }
        let gain = jacobian.transpose() * &weighted_jacobian;
        let rhs = jacobian.transpose() * &weighted_residual;

        iterations += 1;
        let delta = gain
            .lu()
            .solve(&rhs)
            .ok_or(EstimationError::Singular { iteration: iterations })?;
        x += &delta;
        if delta.amax() < threshold {
            break;
        }
    }

    let (v, th) = split_state(&x, n);
    let voltages = (0..n)
        .map(|slot| Complex64::from_polar(v[slot], th[slot]))
        .collect();
    Ok(Estimate {
        voltages,
        iterations,
    })
}

/// Runs [`estimate`] under the bounded retry policy.
///
/// An iteration count outside `(1, 10)` indicates a degenerate initial
/// guess (either no movement at all or a wander), so the solve is
/// repeated with a fresh perturbation, up to [`MAX_ATTEMPTS`] times.
/// The final attempt's result is returned even when it stays outside
/// the range; `healthy` records which case occurred.
///
/// # Errors
///
/// Returns the last solve error when every attempt fails outright.
pub fn estimate_with_retry(
    ybus: &Ybus,
    set: &MeasurementSet,
    max_iterations: usize,
    threshold: f64,
    rng: &mut StdRng,
) -> Result<RetryOutcome, EstimationError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match estimate(ybus, set, max_iterations, threshold, rng) {
            Ok(estimate) => {
                let healthy = estimate.iterations > 1 && estimate.iterations < 10;
                if healthy || attempt >= MAX_ATTEMPTS {
                    return Ok(RetryOutcome {
                        estimate,
                        attempts: attempt,
                        healthy,
                    });
                }
            }
            Err(err) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
            }
        }
    }
}

/// Balanced flat start: nominal three-phase angles, magnitudes near
/// 1 p.u. with a perturbation that keeps the first Jacobian regular.
fn initial_guess(n: usize, rng: &mut StdRng) -> DVector<f64> {
    let mut x = DVector::<f64>::zeros(2 * n - 1);
    for slot in 1..n {
        x[slot - 1] = match slot % 3 {
            1 => -2.0 * PI / 3.0,
            2 => -4.0 * PI / 3.0,
            _ => 0.0,
        };
    }
    for slot in 0..n {
        x[n - 1 + slot] = 1.0 + 1.0e-6 * gaussian(rng);
    }
    x
}

/// Standard normal sample via Box–Muller.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Unpacks the state into magnitudes and angles, restoring the fixed
/// reference angle.
fn split_state(x: &DVector<f64>, n: usize) -> (Vec<f64>, Vec<f64>) {
    let v: Vec<f64> = (0..n).map(|slot| x[n - 1 + slot]).collect();
    let mut th = vec![0.0; n];
    for slot in 1..n {
        th[slot] = x[slot - 1];
    }
    (v, th)
}

/// Evaluates one measurement row and its Jacobian entries.
///
/// Angle columns sit at `slot − 1` (the reference slot has none);
/// magnitude columns at `n − 1 + slot`.
fn fill_row(
    ybus: &Ybus,
    v: &[f64],
    th: &[f64],
    kind: MeasurementKind,
    m: usize,
    h: &mut DVector<f64>,
    jacobian: &mut DMatrix<f64>,
) {
    let n = v.len();
    match kind {
        MeasurementKind::ActivePowerInjection { slot: i } => {
            let mut sum = 0.0;
            for j in 0..n {
                let g = ybus.g(i, j);
                let b = ybus.b(i, j);
                let (sin, cos) = (th[i] - th[j]).sin_cos();
                sum += v[i] * v[j] * (g * cos + b * sin);
                if j != i {
                    if j > 0 {
                        jacobian[(m, j - 1)] = v[i] * v[j] * (g * sin - b * cos);
                    }
                    jacobian[(m, n - 1 + j)] = v[i] * (g * cos + b * sin);
                }
            }
            h[m] = sum;
            if i > 0 {
                let mut d = -v[i] * v[i] * ybus.b(i, i);
                for j in 0..n {
                    let (sin, cos) = (th[i] - th[j]).sin_cos();
                    d += v[i] * v[j] * (-ybus.g(i, j) * sin + ybus.b(i, j) * cos);
                }
                jacobian[(m, i - 1)] = d;
            }
            let mut d = v[i] * ybus.g(i, i);
            for j in 0..n {
                let (sin, cos) = (th[i] - th[j]).sin_cos();
                d += v[j] * (ybus.g(i, j) * cos + ybus.b(i, j) * sin);
            }
            jacobian[(m, n - 1 + i)] = d;
        }
        MeasurementKind::ReactivePowerInjection { slot: i } => {
            let mut sum = 0.0;
            for j in 0..n {
                let g = ybus.g(i, j);
                let b = ybus.b(i, j);
                let (sin, cos) = (th[i] - th[j]).sin_cos();
                sum += v[i] * v[j] * (g * sin - b * cos);
                if j != i {
                    if j > 0 {
                        jacobian[(m, j - 1)] = v[i] * v[j] * (-g * cos - b * sin);
                    }
                    jacobian[(m, n - 1 + j)] = v[i] * (g * sin - b * cos);
                }
            }
            h[m] = sum;
            if i > 0 {
                let mut d = -v[i] * v[i] * ybus.g(i, i);
                for j in 0..n {
                    let (sin, cos) = (th[i] - th[j]).sin_cos();
                    d += v[i] * v[j] * (ybus.g(i, j) * cos + ybus.b(i, j) * sin);
                }
                jacobian[(m, i - 1)] = d;
            }
            let mut d = -v[i] * ybus.b(i, i);
            for j in 0..n {
                let (sin, cos) = (th[i] - th[j]).sin_cos();
                d += v[j] * (ybus.g(i, j) * sin - ybus.b(i, j) * cos);
            }
            jacobian[(m, n - 1 + i)] = d;
        }
        MeasurementKind::VoltageMagnitude { slot } => {
            h[m] = v[slot];
            jacobian[(m, n - 1 + slot)] = 1.0;
        }
        MeasurementKind::VoltageAngle { slot } => {
            h[m] = th[slot];
            if slot > 0 {
                jacobian[(m, slot - 1)] = 1.0;
            }
        }
        MeasurementKind::LineCurrentReal {
            from_bus,
            to_bus,
            phase,
        } => {
            let (gl, bl) = ybus.branch_block(from_bus, to_bus);
            let mut sum = 0.0;
            for k in 0..3 {
                let s1 = 3 * from_bus + k;
                let s2 = 3 * to_bus + k;
                let g = gl[phase][k];
                let b = bl[phase][k];
                sum += g * (v[s1] * th[s1].cos() - v[s2] * th[s2].cos())
                    - b * (v[s1] * th[s1].sin() - v[s2] * th[s2].sin());
                if s1 > 0 {
                    jacobian[(m, s1 - 1)] = -g * v[s1] * th[s1].sin() - b * v[s1] * th[s1].cos();
                }
                if s2 > 0 {
                    jacobian[(m, s2 - 1)] = g * v[s2] * th[s2].sin() + b * v[s2] * th[s2].cos();
                }
                jacobian[(m, n - 1 + s1)] = g * th[s1].cos() - b * th[s1].sin();
                jacobian[(m, n - 1 + s2)] = -g * th[s2].cos() + b * th[s2].sin();
            }
            h[m] = sum;
        }
        MeasurementKind::LineCurrentImag {
            from_bus,
            to_bus,
            phase,
        } => {
            let (gl, bl) = ybus.branch_block(from_bus, to_bus);
            let mut sum = 0.0;
            for k in 0..3 {
                let s1 = 3 * from_bus + k;
                let s2 = 3 * to_bus + k;
                let g = gl[phase][k];
                let b = bl[phase][k];
                sum += g * (v[s1] * th[s1].sin() - v[s2] * th[s2].sin())
                    + b * (v[s1] * th[s1].cos() - v[s2] * th[s2].cos());
                if s1 > 0 {
                    jacobian[(m, s1 - 1)] = g * v[s1] * th[s1].cos() - b * v[s1] * th[s1].sin();
                }
                if s2 > 0 {
                    jacobian[(m, s2 - 1)] = -g * v[s2] * th[s2].cos() + b * v[s2] * th[s2].sin();
                }
                jacobian[(m, n - 1 + s1)] = g * th[s1].sin() + b * th[s1].cos();
                jacobian[(m, n - 1 + s2)] = -g * th[s2].sin() - b * th[s2].cos();
            }
            h[m] = sum;
        }
    }
}
