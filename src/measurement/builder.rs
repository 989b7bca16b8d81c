//! Per-cycle assembly of the measurement vector.

use nalgebra::DVector;
use num_complex::Complex64;

use crate::measurement::device::Device;
use crate::measurement::pseudo::PseudoLoadProfile;
use crate::measurement::reading::DeviceKind;
use crate::measurement::table::MeasurementTable;

/// Physical quantity represented by one row of the measurement vector.
///
/// `slot` is a per-phase node index into the admittance matrix
/// (`3 * bus + phase`); line-current rows carry bus indices and select
/// the phase within the 3×3 branch block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    ActivePowerInjection { slot: usize },
    ReactivePowerInjection { slot: usize },
    VoltageMagnitude { slot: usize },
    VoltageAngle { slot: usize },
    LineCurrentReal { from_bus: usize, to_bus: usize, phase: usize },
    LineCurrentImag { from_bus: usize, to_bus: usize, phase: usize },
}

/// Measurement vector, row descriptors, and diagonal error covariance
/// for one estimation cycle.
///
/// Invariant: `z`, `kinds`, and `variances` all have the same length,
/// and rows keep their relative order for the duration of the cycle.
#[derive(Debug, Clone)]
pub struct MeasurementSet {
    pub z: DVector<f64>,
    pub kinds: Vec<MeasurementKind>,
    /// Squared standard deviation per row.
    pub variances: DVector<f64>,
}

impl MeasurementSet {
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Measured per-unit demand covering one slot.
struct MeteredPower {
    p: f64,
    q: f64,
    variance: f64,
}

/// Assembles the measurement vector from the current table contents.
///
/// Row layout, stable within one cycle:
///
/// 1. Real/reactive power injections for every non-reference slot:
///    measured (smart meter) where a fresh reading covers the slot,
///    the hourly pseudo-load otherwise. Demands are negated into
///    injections.
/// 2. Voltage magnitude/angle pairs for every phasor phase with a fresh
///    magnitude.
/// 3. Line-current real/imaginary pairs for every device phase with a
///    fresh current phasor.
///
/// Fields absent from the table are simply skipped; the slot falls back
/// to its pseudo-measurement where applicable.
pub fn build(
    table: &MeasurementTable,
    devices: &[Device],
    pseudo: &PseudoLoadProfile,
    slots: usize,
    reference_bus: usize,
    hour_index: usize,
) -> MeasurementSet {
    let mut z = Vec::new();
    let mut kinds = Vec::new();
    let mut variances = Vec::new();

    // Injection rows.
    let mut metered: Vec<Option<MeteredPower>> = (0..slots).map(|_| None).collect();
    for (index, device) in devices.iter().enumerate() {
        if device.kind != DeviceKind::SmartMeter {
            continue;
        }
        let record = table.record(index);
        for phase in 0..3 {
            if let (Some(p), Some(q)) = (record.real_power[phase], record.reactive_power[phase]) {
                let slot = 3 * device.bus + phase;
                if slot < slots {
                    metered[slot] = Some(MeteredPower {
                        p,
                        q,
                        variance: device.error_std * device.error_std,
                    });
                }
            }
        }
    }
    let reference = 3 * reference_bus..3 * reference_bus + 3;
    for slot in (0..slots).filter(|s| !reference.contains(s)) {
        match &metered[slot] {
            Some(m) => {
                z.push(-m.p);
                kinds.push(MeasurementKind::ActivePowerInjection { slot });
                variances.push(m.variance);
                z.push(-m.q);
                kinds.push(MeasurementKind::ReactivePowerInjection { slot });
                variances.push(m.variance);
            }
            None => {
                let sample = pseudo.sample(slot, hour_index);
                z.push(-sample.p_mean);
                kinds.push(MeasurementKind::ActivePowerInjection { slot });
                variances.push(sample.p_std * sample.p_std);
                z.push(-sample.q_mean);
                kinds.push(MeasurementKind::ReactivePowerInjection { slot });
                variances.push(sample.q_std * sample.q_std);
            }
        }
    }

    // Voltage phasor rows.
    for (index, device) in devices.iter().enumerate() {
        let record = table.record(index);
        let variance = device.error_std * device.error_std;
        for phase in 0..3 {
            if let (Some(magnitude), Some(angle)) =
                (record.voltage_mag[phase], record.voltage_ang[phase])
            {
                let slot = 3 * device.bus + phase;
                z.push(magnitude);
                kinds.push(MeasurementKind::VoltageMagnitude { slot });
                variances.push(variance);
                z.push(angle);
                kinds.push(MeasurementKind::VoltageAngle { slot });
                variances.push(variance);
            }
        }
    }

    // Line current rows.
    for (index, device) in devices.iter().enumerate() {
        let Some(line) = device.line else {
            continue;
        };
        let record = table.record(index);
        let variance = device.error_std * device.error_std;
        for phase in 0..3 {
            if let (Some(magnitude), Some(angle)) =
                (record.current_mag[phase], record.current_ang[phase])
            {
                let current = Complex64::from_polar(magnitude, angle);
                z.push(current.re);
                kinds.push(MeasurementKind::LineCurrentReal {
                    from_bus: line.from_bus,
                    to_bus: line.to_bus,
                    phase,
                });
                variances.push(variance);
                z.push(current.im);
                kinds.push(MeasurementKind::LineCurrentImag {
                    from_bus: line.from_bus,
                    to_bus: line.to_bus,
                    phase,
                });
                variances.push(variance);
            }
        }
    }

    MeasurementSet {
        z: DVector::from_vec(z),
        kinds,
        variances: DVector::from_vec(variances),
    }
}
