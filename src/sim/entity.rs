//! The estimator entity driven by a stepped simulation host.

use std::error::Error;
use std::fmt;

use log::{debug, info, warn};
use num_complex::Complex64;
use rand::{SeedableRng, rngs::StdRng};

use crate::config::EstimatorConfig;
use crate::estimator::wls;
use crate::estimator::ybus::Ybus;
use crate::io::FileError;
use crate::io::results::ResultsWriter;
use crate::measurement::builder;
use crate::measurement::device::{Device, load_devices};
use crate::measurement::pseudo::{HOURS, PseudoLoadProfile};
use crate::measurement::reading::{RawReading, Reading, SchemaError};
use crate::measurement::table::MeasurementTable;
use crate::sim::scheduler::WakeQueue;
use crate::units::Bases;

/// Message-count snapshot emitted at each accumulation boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusRecord {
    /// Readings folded in since the previous snapshot.
    pub messages: u64,
    /// Simulated time of the snapshot.
    pub time: u64,
}

/// Outcome of one completed estimation cycle.
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub time: u64,
    /// Estimated voltage phasor per per-phase node.
    pub voltages: Vec<Complex64>,
    /// Gauss–Newton iterations used by the accepted solve.
    pub iterations: usize,
    /// Solves performed under the retry policy.
    pub attempts: usize,
    /// Whether the accepted solve landed in the expected iteration range.
    pub healthy: bool,
}

/// Error from one [`SteppedEntity::step`] call.
///
/// Schema and persistence failures stop the run; everything else is
/// contained within the affected cycle.
#[derive(Debug)]
pub enum StepError {
    Schema(SchemaError),
    Results(FileError),
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepError::Schema(e) => write!(f, "{e}"),
            StepError::Results(e) => write!(f, "{e}"),
        }
    }
}

impl Error for StepError {}

impl From<SchemaError> for StepError {
    fn from(e: SchemaError) -> Self {
        StepError::Schema(e)
    }
}

impl From<FileError> for StepError {
    fn from(e: FileError) -> Self {
        StepError::Results(e)
    }
}

/// Host-facing contract for entities advanced by a stepped simulation
/// loop.
///
/// The host calls [`step`](Self::step) synchronously; the returned wake
/// time, when present, is strictly greater than the time passed in.
/// `None` means the entity needs no further invocation for now.
pub trait SteppedEntity {
    /// Advances the entity to `time`, folding in any new readings.
    fn step(&mut self, time: u64, inputs: &[RawReading]) -> Result<Option<u64>, StepError>;

    /// Last accumulation-boundary snapshot.
    fn status(&self) -> StatusRecord;
}

/// Distribution state estimator for one feeder.
///
/// Owns every piece of mutable cycle state: the measurement table, the
/// wake-time queue, the status snapshot, the results writer, and the
/// solver RNG. Construction loads the admittance matrix, device table,
/// and pseudo-load profile; a missing file is fatal before any
/// estimation happens.
pub struct Estimator {
    config: EstimatorConfig,
    devices: Vec<Device>,
    table: MeasurementTable,
    pseudo: PseudoLoadProfile,
    ybus: Ybus,
    queue: WakeQueue,
    status: StatusRecord,
    results: ResultsWriter,
    rng: StdRng,
    last_cycle: Option<CycleRecord>,
    cycles: u64,
}

impl Estimator {
    /// Loads all collaborators named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`FileError`] when the admittance matrix, device table,
    /// or pseudo-load profile cannot be loaded.
    pub fn new(config: EstimatorConfig) -> Result<Self, FileError> {
        let bases = Bases::new(config.bases.power_kva, config.bases.voltage_v);
        let ybus = Ybus::from_csv_file(&config.files.admittance, bases)?;
        let devices = load_devices(&config.files.devices)?;
        let pseudo = PseudoLoadProfile::load(
            &config.files.pseudo_loads,
            ybus.order(),
            config.bases.reference_bus,
        )?;
        Ok(Self::from_parts(config, devices, pseudo, ybus))
    }

    /// Assembles an estimator from already-loaded collaborators.
    pub fn from_parts(
        config: EstimatorConfig,
        devices: Vec<Device>,
        pseudo: PseudoLoadProfile,
        ybus: Ybus,
    ) -> Self {
        let bases = Bases::new(config.bases.power_kva, config.bases.voltage_v);
        let table = MeasurementTable::new(&devices, bases, config.bases.power_factor);
        let results = ResultsWriter::new(config.files.results.clone());
        let rng = StdRng::seed_from_u64(config.estimation.seed);
        info!(
            "estimator ready: {} per-phase nodes, {} devices",
            ybus.order(),
            devices.len()
        );
        Self {
            config,
            devices,
            table,
            pseudo,
            ybus,
            queue: WakeQueue::new(),
            status: StatusRecord::default(),
            results,
            rng,
            last_cycle: None,
            cycles: 0,
        }
    }

    /// Most recent completed estimation cycle, if any.
    pub fn last_cycle(&self) -> Option<&CycleRecord> {
        self.last_cycle.as_ref()
    }

    /// Completed estimation cycles so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Hour-of-day index into the pseudo-load table for a cycle time.
    fn hour_index(&self, time: u64) -> usize {
        let hour = time / self.config.estimation.period + u64::from(self.config.estimation.start_hour);
        ((hour + HOURS as u64 - 1) % HOURS as u64) as usize
    }

    /// Runs the builder and the solver for one cycle and persists the
    /// result. A cycle whose every solve attempt fails is skipped with a
    /// warning; the run continues.
    fn run_cycle(&mut self, time: u64) -> Result<(), FileError> {
        let set = builder::build(
            &self.table,
            &self.devices,
            &self.pseudo,
            self.ybus.order(),
            self.config.bases.reference_bus,
            self.hour_index(time),
        );
        debug!("cycle at t={time}: {} measurement rows", set.len());

        match wls::estimate_with_retry(
            &self.ybus,
            &set,
            self.config.estimation.max_iterations,
            self.config.estimation.threshold,
            &mut self.rng,
        ) {
            Ok(outcome) => {
                if !outcome.healthy {
                    warn!(
                        "cycle at t={time} stayed outside the expected iteration range after {} attempts (last used {} iterations)",
                        outcome.attempts, outcome.estimate.iterations
                    );
                }
                self.results
                    .append(time, outcome.healthy, &outcome.estimate.voltages)?;
                info!(
                    "cycle at t={time} done in {} iterations ({} attempts)",
                    outcome.estimate.iterations, outcome.attempts
                );
                self.last_cycle = Some(CycleRecord {
                    time,
                    voltages: outcome.estimate.voltages,
                    iterations: outcome.estimate.iterations,
                    attempts: outcome.attempts,
                    healthy: outcome.healthy,
                });
                self.cycles += 1;
            }
            Err(err) => {
                warn!("cycle at t={time} abandoned: {err}");
            }
        }
        Ok(())
    }
}

impl SteppedEntity for Estimator {
    /// Advances the estimator to `time`.
    ///
    /// In order: readings are folded into the measurement table (an
    /// empty input means "no new reading" and leaves the table alone);
    /// at an accumulation boundary the status snapshot is refreshed; at
    /// an estimation boundary (excluding time zero) a full cycle runs;
    /// then the next boundaries are scheduled and the earliest
    /// strictly-future wake time is returned.
    fn step(&mut self, time: u64, inputs: &[RawReading]) -> Result<Option<u64>, StepError> {
        for raw in inputs {
            if raw.fields.is_empty() {
                continue;
            }
            let index = self
                .table
                .device_index(&raw.device)
                .ok_or_else(|| SchemaError::UnknownDevice {
                    device: raw.device.clone(),
                })?;
            let reading = Reading::decode(self.devices[index].kind, raw)?;
            self.table.apply(index, &reading);
        }

        let estimation_period = self.config.estimation.period;
        let accumulation_period = self.config.estimation.accumulation_period;

        if time % accumulation_period == 0 {
            self.status = StatusRecord {
                messages: self.table.take_messages(),
                time,
            };
            self.queue.push(time + accumulation_period);
        }
        if time > 0 && time % estimation_period == 0 {
            self.run_cycle(time)?;
        }
        if time % estimation_period == 0 {
            self.queue.push(time + estimation_period);
        }

        Ok(self.queue.next_after(time))
    }

    fn status(&self) -> StatusRecord {
        self.status
    }
}
