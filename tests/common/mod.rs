//! Shared test fixtures: a three-bus radial feeder with phase-decoupled
//! lines and a known operating point.

#![allow(dead_code)]

use std::f64::consts::PI;

use nalgebra::DMatrix;
use num_complex::Complex64;

use dse_sim::config::EstimatorConfig;
use dse_sim::estimator::ybus::Ybus;
use dse_sim::measurement::device::{Device, LineRef};
use dse_sim::measurement::pseudo::{HOURS, PseudoLoadProfile};
use dse_sim::measurement::reading::DeviceKind;

pub const BUSES: usize = 3;
pub const SLOTS: usize = 3 * BUSES;

/// Power factor shared by the config and the synthetic demands.
pub const POWER_FACTOR: f64 = 0.95;

/// Nominal balanced-sequence angle per phase.
pub const PHASE_OFFSETS: [f64; 3] = [0.0, -2.0 * PI / 3.0, -4.0 * PI / 3.0];

/// Series admittance of each line section, identical per phase.
pub fn line_admittance() -> Complex64 {
    1.0 / Complex64::new(0.01, 0.03)
}

/// Dense per-unit admittance matrix of the 0-1-2 radial feeder.
pub fn ybus_matrix() -> DMatrix<Complex64> {
    let y = line_admittance();
    let mut m = DMatrix::<Complex64>::zeros(SLOTS, SLOTS);
    for (a, b) in [(0usize, 1usize), (1, 2)] {
        for p in 0..3 {
            let i = 3 * a + p;
            let j = 3 * b + p;
            m[(i, i)] += y;
            m[(j, j)] += y;
            m[(i, j)] -= y;
            m[(j, i)] -= y;
        }
    }
    m
}

pub fn ybus() -> Ybus {
    Ybus::from_matrix(ybus_matrix())
}

/// Per-phase complex demand at each bus (positive = consumption), at
/// exactly the configured power factor so smart-meter reactive
/// synthesis stays consistent.
pub fn demands() -> [[Complex64; 3]; BUSES] {
    let ratio = POWER_FACTOR.acos().tan();
    let load = |p: f64| Complex64::new(p, p * ratio);
    [
        [Complex64::new(0.0, 0.0); 3],
        [load(0.012), load(0.010), load(0.014)],
        [load(0.008), load(0.011), load(0.009)],
    ]
}

/// True voltage magnitudes and unwrapped angles from a backward/forward
/// sweep of the radial feeder.
pub fn true_state() -> (Vec<f64>, Vec<f64>) {
    let z = 1.0 / line_admittance();
    let demands = demands();
    let mut v = vec![Complex64::new(0.0, 0.0); SLOTS];
    for bus in 0..BUSES {
        for p in 0..3 {
            v[3 * bus + p] = Complex64::from_polar(1.0, PHASE_OFFSETS[p]);
        }
    }
    for _ in 0..60 {
        for p in 0..3 {
            let i1 = (demands[1][p] / v[3 + p]).conj();
            let i2 = (demands[2][p] / v[6 + p]).conj();
            let v1 = v[p] - z * (i1 + i2);
            let v2 = v1 - z * i2;
            v[3 + p] = v1;
            v[6 + p] = v2;
        }
    }

    let magnitudes: Vec<f64> = v.iter().map(|voltage| voltage.norm()).collect();
    let angles: Vec<f64> = v
        .iter()
        .enumerate()
        .map(|(slot, voltage)| unwrap_angle(voltage.arg(), PHASE_OFFSETS[slot % 3]))
        .collect();
    (magnitudes, angles)
}

/// Moves a principal-value angle to the 2π branch nearest `target`.
pub fn unwrap_angle(mut angle: f64, target: f64) -> f64 {
    while angle - target > PI {
        angle -= 2.0 * PI;
    }
    while target - angle > PI {
        angle += 2.0 * PI;
    }
    angle
}

/// True complex voltages from [`true_state`].
pub fn true_voltages() -> Vec<Complex64> {
    let (magnitudes, angles) = true_state();
    magnitudes
        .iter()
        .zip(&angles)
        .map(|(&v, &a)| Complex64::from_polar(v, a))
        .collect()
}

/// True series current flowing from `from_bus` toward `to_bus`, per phase.
pub fn line_currents(from_bus: usize, to_bus: usize) -> [Complex64; 3] {
    let voltages = true_voltages();
    let y = line_admittance();
    let mut currents = [Complex64::new(0.0, 0.0); 3];
    for p in 0..3 {
        currents[p] = y * (voltages[3 * from_bus + p] - voltages[3 * to_bus + p]);
    }
    currents
}

pub fn phasor_device(id: &str, bus: usize) -> Device {
    Device {
        id: id.to_string(),
        kind: DeviceKind::Phasor,
        bus,
        period: 100,
        error_std: 1e-4,
        line: None,
    }
}

pub fn smart_meter_device(id: &str, bus: usize) -> Device {
    Device {
        id: id.to_string(),
        kind: DeviceKind::SmartMeter,
        bus,
        period: 100,
        error_std: 1e-3,
        line: None,
    }
}

pub fn current_device(id: &str, from_bus: usize, to_bus: usize) -> Device {
    Device {
        id: id.to_string(),
        kind: DeviceKind::Phasor,
        bus: from_bus,
        period: 100,
        error_std: 1e-4,
        line: Some(LineRef { from_bus, to_bus }),
    }
}

/// Pseudo-load profile carrying the true demands at every hour, with a
/// loose standard deviation.
pub fn exact_pseudo_profile() -> PseudoLoadProfile {
    let demands = demands();
    let mut p_mean = vec![[0.0; HOURS]; SLOTS];
    let mut q_mean = vec![[0.0; HOURS]; SLOTS];
    for slot in 0..SLOTS {
        let demand = demands[slot / 3][slot % 3];
        p_mean[slot] = [demand.re; HOURS];
        q_mean[slot] = [demand.im; HOURS];
    }
    PseudoLoadProfile::from_hourly(
        p_mean,
        vec![[0.005; HOURS]; SLOTS],
        q_mean,
        vec![[0.005; HOURS]; SLOTS],
    )
}

/// Baseline configuration pointed at a scratch results path.
pub fn test_config(results_name: &str) -> EstimatorConfig {
    let mut config = EstimatorConfig::baseline();
    config.estimation.period = 1000;
    config.estimation.accumulation_period = 100;
    config.estimation.threshold = 1e-8;
    config.bases.power_kva = 1000.0;
    config.bases.voltage_v = 2400.0;
    config.bases.power_factor = POWER_FACTOR;
    config.bases.reference_bus = 0;
    config.files.results = std::env::temp_dir().join(format!("dse-sim-{results_name}.csv"));
    config
}
