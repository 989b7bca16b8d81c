//! Sensor payload decoding.
//!
//! Payloads arrive from the transport as loosely-typed key/value fields.
//! They are decoded exactly once, at ingestion, into the closed
//! [`Measurand`] set; any unrecognized key is a schema violation and
//! aborts the run rather than silently dropping data.

use std::error::Error;
use std::fmt;

/// Kind of field device producing readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// PMU-class device reporting synchronized voltage phasors.
    Phasor,
    /// Revenue meter reporting per-phase real power.
    SmartMeter,
}

impl DeviceKind {
    /// Parses a device-table kind tag.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Phasor" | "phasor" => Some(DeviceKind::Phasor),
            "SmartMeter" | "Smartmeter" | "smartmeter" => Some(DeviceKind::SmartMeter),
            _ => None,
        }
    }
}

/// One of the three phases at a circuit location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    /// Zero-based phase offset within a bus's slot group.
    pub fn index(self) -> usize {
        match self {
            Phase::A => 0,
            Phase::B => 1,
            Phase::C => 2,
        }
    }
}

/// A single decoded quantity from a device payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurand {
    /// Voltage phasor for one phase: magnitude in volts, angle in radians.
    PhaseVoltage {
        phase: Phase,
        magnitude: f64,
        angle: f64,
    },
    /// Line current phasor for one phase: magnitude in amperes, angle in radians.
    PhaseCurrent {
        phase: Phase,
        magnitude: f64,
        angle: f64,
    },
    /// Real power draw for one phase, in watts.
    PhasePower { phase: Phase, watts: f64 },
    /// Device-side send timestamp.
    SentAt { time: u64 },
}

/// Raw payload field: a key plus one or two numeric values.
#[derive(Debug, Clone)]
pub struct RawField {
    pub key: String,
    pub primary: f64,
    /// Second value for phasor-valued keys (the angle).
    pub secondary: Option<f64>,
}

/// Undecoded payload for one device.
#[derive(Debug, Clone)]
pub struct RawReading {
    pub device: String,
    pub fields: Vec<RawField>,
}

/// Payload decoded against the reporting device's kind.
#[derive(Debug, Clone)]
pub struct Reading {
    pub device: String,
    pub measurands: Vec<Measurand>,
}

/// Mismatch between a payload and the device table.
#[derive(Debug, Clone)]
pub enum SchemaError {
    /// Field key not in the measurement vocabulary.
    UnknownField { device: String, key: String },
    /// Payload names a device absent from the device table.
    UnknownDevice { device: String },
    /// Phasor-valued key arrived without its angle component.
    MissingAngle { device: String, key: String },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownField { device, key } => {
                write!(f, "unknown measurement field \"{key}\" from device \"{device}\"")
            }
            SchemaError::UnknownDevice { device } => {
                write!(f, "reading from unknown device \"{device}\"")
            }
            SchemaError::MissingAngle { device, key } => {
                write!(f, "field \"{key}\" from device \"{device}\" is missing its angle value")
            }
        }
    }
}

impl Error for SchemaError {}

impl Reading {
    /// Decodes a raw payload into typed measurands.
    ///
    /// Voltage fields from non-phasor devices are skipped: smart meters
    /// also report voltages, but only PMU-class readings are trusted for
    /// the state estimate. `IDT`/`TYPE` identity tags pass through
    /// unused.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] for an unrecognized field key or a
    /// phasor field without its angle.
    pub fn decode(kind: DeviceKind, raw: &RawReading) -> Result<Self, SchemaError> {
        let mut measurands = Vec::with_capacity(raw.fields.len());
        for field in &raw.fields {
            match field.key.as_str() {
                "VA" | "VB" | "VC" => {
                    if kind == DeviceKind::Phasor {
                        let angle = field.secondary.ok_or_else(|| SchemaError::MissingAngle {
                            device: raw.device.clone(),
                            key: field.key.clone(),
                        })?;
                        measurands.push(Measurand::PhaseVoltage {
                            phase: phase_suffix(&field.key),
                            magnitude: field.primary,
                            angle,
                        });
                    }
                }
                "IA" | "IB" | "IC" => {
                    let angle = field.secondary.ok_or_else(|| SchemaError::MissingAngle {
                        device: raw.device.clone(),
                        key: field.key.clone(),
                    })?;
                    measurands.push(Measurand::PhaseCurrent {
                        phase: phase_suffix(&field.key),
                        magnitude: field.primary,
                        angle,
                    });
                }
                "SPA" | "SPB" | "SPC" => {
                    measurands.push(Measurand::PhasePower {
                        phase: phase_suffix(&field.key),
                        watts: field.primary,
                    });
                }
                "TS" => {
                    measurands.push(Measurand::SentAt {
                        time: field.primary as u64,
                    });
                }
                "IDT" | "TYPE" => {}
                _ => {
                    return Err(SchemaError::UnknownField {
                        device: raw.device.clone(),
                        key: field.key.clone(),
                    });
                }
            }
        }
        Ok(Reading {
            device: raw.device.clone(),
            measurands,
        })
    }
}

/// Phase designated by a key's trailing letter. Callers only pass keys
/// already matched against the vocabulary above.
fn phase_suffix(key: &str) -> Phase {
    match key.as_bytes().last() {
        Some(b'A') => Phase::A,
        Some(b'B') => Phase::B,
        _ => Phase::C,
    }
}
