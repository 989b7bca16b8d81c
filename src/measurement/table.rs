//! Latest-reading store, one record per device.

use std::collections::HashMap;

use crate::measurement::device::Device;
use crate::measurement::reading::{Measurand, Reading};
use crate::units::Bases;

/// Most recent per-unit quantities reported by one device.
///
/// Fields are sparse: a reading only overwrites the fields it carries,
/// everything else keeps its previous value.
#[derive(Debug, Clone, Default)]
pub struct MeasurementRecord {
    pub voltage_mag: [Option<f64>; 3],
    pub voltage_ang: [Option<f64>; 3],
    pub current_mag: [Option<f64>; 3],
    pub current_ang: [Option<f64>; 3],
    pub real_power: [Option<f64>; 3],
    pub reactive_power: [Option<f64>; 3],
    pub last_sent: Option<u64>,
}

/// Arena of measurement records addressed by dense device index.
///
/// The identity-to-index map is built once at construction; there is at
/// most one record per device identity. Raw readings are normalized to
/// per-unit on the way in, and reactive power for smart-meter readings
/// is synthesized from real power at the configured power factor.
#[derive(Debug, Clone)]
pub struct MeasurementTable {
    records: Vec<MeasurementRecord>,
    index: HashMap<String, usize>,
    messages: u64,
    bases: Bases,
    /// `tan(acos(pf))`, applied to measured real power.
    reactive_ratio: f64,
}

impl MeasurementTable {
    /// Builds an empty table with one record slot per device.
    pub fn new(devices: &[Device], bases: Bases, power_factor: f64) -> Self {
        let mut index = HashMap::with_capacity(devices.len());
        for (i, device) in devices.iter().enumerate() {
            index.insert(device.id.clone(), i);
        }
        Self {
            records: vec![MeasurementRecord::default(); devices.len()],
            index,
            messages: 0,
            bases,
            reactive_ratio: power_factor.acos().tan(),
        }
    }

    /// Number of device records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Dense index for a device identity, if known.
    pub fn device_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Record for a device index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn record(&self, index: usize) -> &MeasurementRecord {
        &self.records[index]
    }

    /// Folds one decoded reading into the device's record and counts the
    /// message.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn apply(&mut self, index: usize, reading: &Reading) {
        let record = &mut self.records[index];
        for measurand in &reading.measurands {
            match *measurand {
                Measurand::PhaseVoltage {
                    phase,
                    magnitude,
                    angle,
                } => {
                    let p = phase.index();
                    record.voltage_mag[p] = Some(magnitude / self.bases.voltage_v);
                    record.voltage_ang[p] = Some(angle);
                }
                Measurand::PhaseCurrent {
                    phase,
                    magnitude,
                    angle,
                } => {
                    let p = phase.index();
                    record.current_mag[p] = Some(magnitude / self.bases.current());
                    record.current_ang[p] = Some(angle);
                }
                Measurand::PhasePower { phase, watts } => {
                    let p = phase.index();
                    let power = watts / self.bases.power_w();
                    record.real_power[p] = Some(power);
                    record.reactive_power[p] = Some(power * self.reactive_ratio);
                }
                Measurand::SentAt { time } => {
                    record.last_sent = Some(time);
                }
            }
        }
        self.messages += 1;
    }

    /// Messages folded in since the last [`take_messages`](Self::take_messages).
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Returns the message count and resets it.
    pub fn take_messages(&mut self) -> u64 {
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::reading::{DeviceKind, Phase};

    fn devices() -> Vec<Device> {
        vec![
            Device {
                id: "Phasor_1".to_string(),
                kind: DeviceKind::Phasor,
                bus: 0,
                period: 100,
                error_std: 1e-4,
                line: None,
            },
            Device {
                id: "Meter_4".to_string(),
                kind: DeviceKind::SmartMeter,
                bus: 1,
                period: 100,
                error_std: 1e-3,
                line: None,
            },
        ]
    }

    fn table() -> MeasurementTable {
        MeasurementTable::new(&devices(), Bases::new(1000.0, 2400.0), 0.95)
    }

    #[test]
    fn readings_are_normalized_to_per_unit() {
        let mut table = table();
        let reading = Reading {
            device: "Phasor_1".to_string(),
            measurands: vec![Measurand::PhaseVoltage {
                phase: Phase::A,
                magnitude: 2400.0,
                angle: 0.1,
            }],
        };
        table.apply(0, &reading);
        let record = table.record(0);
        assert_eq!(record.voltage_mag[0], Some(1.0));
        assert_eq!(record.voltage_ang[0], Some(0.1));
        assert_eq!(record.voltage_mag[1], None);
    }

    #[test]
    fn reactive_power_is_synthesized_at_the_power_factor() {
        let mut table = table();
        let reading = Reading {
            device: "Meter_4".to_string(),
            measurands: vec![Measurand::PhasePower {
                phase: Phase::B,
                watts: 10_000.0,
            }],
        };
        table.apply(1, &reading);
        let record = table.record(1);
        let p = record.real_power[1].expect("power stored");
        let q = record.reactive_power[1].expect("reactive synthesized");
        assert!((p - 0.01).abs() < 1e-12);
        assert!((q - 0.01 * (0.95f64).acos().tan()).abs() < 1e-12);
    }

    #[test]
    fn sparse_update_keeps_prior_fields() {
        let mut table = table();
        table.apply(
            1,
            &Reading {
                device: "Meter_4".to_string(),
                measurands: vec![Measurand::PhasePower {
                    phase: Phase::A,
                    watts: 5000.0,
                }],
            },
        );
        table.apply(
            1,
            &Reading {
                device: "Meter_4".to_string(),
                measurands: vec![Measurand::PhasePower {
                    phase: Phase::B,
                    watts: 7000.0,
                }],
            },
        );
        let record = table.record(1);
        assert!(record.real_power[0].is_some());
        assert!(record.real_power[1].is_some());
    }

    #[test]
    fn message_counter_accumulates_and_resets() {
        let mut table = table();
        let reading = Reading {
            device: "Meter_4".to_string(),
            measurands: vec![Measurand::SentAt { time: 7 }],
        };
        table.apply(1, &reading);
        table.apply(1, &reading);
        assert_eq!(table.messages(), 2);
        assert_eq!(table.take_messages(), 2);
        assert_eq!(table.messages(), 0);
    }

    #[test]
    fn identity_map_resolves_known_devices_only() {
        let table = table();
        assert_eq!(table.device_index("Phasor_1"), Some(0));
        assert_eq!(table.device_index("Meter_4"), Some(1));
        assert_eq!(table.device_index("Meter_9"), None);
    }
}
