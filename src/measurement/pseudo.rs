//! Hourly pseudo-load profile for nodes without direct instrumentation.

use std::path::Path;

use serde::Deserialize;

use crate::io::FileError;

/// Hours in the profile's daily cycle.
pub const HOURS: usize = 24;

/// Historical mean and standard deviation for one node and hour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoSample {
    pub p_mean: f64,
    pub p_std: f64,
    pub q_mean: f64,
    pub q_std: f64,
}

/// Static hourly load statistics per per-phase node slot.
///
/// Values are per-unit demand (positive = consumption). The profile is
/// read once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct PseudoLoadProfile {
    p_mean: Vec<[f64; HOURS]>,
    p_std: Vec<[f64; HOURS]>,
    q_mean: Vec<[f64; HOURS]>,
    q_std: Vec<[f64; HOURS]>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    node: usize,
    hour: usize,
    p_mean: f64,
    p_std: f64,
    q_mean: f64,
    q_std: f64,
}

impl PseudoLoadProfile {
    /// Loads the profile for a network with `slots` per-phase nodes.
    ///
    /// Every non-reference slot must be covered for all 24 hours.
    ///
    /// # Errors
    ///
    /// Returns a [`FileError`] when the file is missing, a row is out of
    /// range, or the profile leaves a non-reference slot/hour cell empty.
    pub fn load(path: &Path, slots: usize, reference_bus: usize) -> Result<Self, FileError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| FileError::new(path, format!("cannot open pseudo-load profile: {e}")))?;

        let mut profile = Self::empty(slots);
        for row in reader.deserialize::<ProfileRow>() {
            let row = row.map_err(|e| FileError::new(path, format!("bad profile row: {e}")))?;
            if row.node >= slots {
                return Err(FileError::new(
                    path,
                    format!("profile node {} out of range (network has {slots} slots)", row.node),
                ));
            }
            if row.hour >= HOURS {
                return Err(FileError::new(
                    path,
                    format!("profile hour {} out of range", row.hour),
                ));
            }
            profile.p_mean[row.node][row.hour] = row.p_mean;
            profile.p_std[row.node][row.hour] = row.p_std;
            profile.q_mean[row.node][row.hour] = row.q_mean;
            profile.q_std[row.node][row.hour] = row.q_std;
        }

        let reference = 3 * reference_bus..3 * reference_bus + 3;
        for slot in (0..slots).filter(|s| !reference.contains(s)) {
            for hour in 0..HOURS {
                if profile.p_mean[slot][hour].is_nan() {
                    return Err(FileError::new(
                        path,
                        format!("profile is missing node {slot} hour {hour}"),
                    ));
                }
            }
        }
        Ok(profile)
    }

    /// Builds a profile from pre-assembled hourly tables, one entry per
    /// per-phase slot.
    ///
    /// # Panics
    ///
    /// Panics if the four tables differ in length.
    pub fn from_hourly(
        p_mean: Vec<[f64; HOURS]>,
        p_std: Vec<[f64; HOURS]>,
        q_mean: Vec<[f64; HOURS]>,
        q_std: Vec<[f64; HOURS]>,
    ) -> Self {
        assert!(
            p_mean.len() == p_std.len()
                && p_mean.len() == q_mean.len()
                && p_mean.len() == q_std.len(),
            "profile tables must have equal length"
        );
        Self {
            p_mean,
            p_std,
            q_mean,
            q_std,
        }
    }

    fn empty(slots: usize) -> Self {
        Self {
            p_mean: vec![[f64::NAN; HOURS]; slots],
            p_std: vec![[f64::NAN; HOURS]; slots],
            q_mean: vec![[f64::NAN; HOURS]; slots],
            q_std: vec![[f64::NAN; HOURS]; slots],
        }
    }

    /// Statistics for one slot at one hour of day.
    ///
    /// # Panics
    ///
    /// Panics if `slot` or `hour` is out of range.
    pub fn sample(&self, slot: usize, hour: usize) -> PseudoSample {
        PseudoSample {
            p_mean: self.p_mean[slot][hour],
            p_std: self.p_std[slot][hour],
            q_mean: self.q_mean[slot][hour],
            q_std: self.q_std[slot][hour],
        }
    }
}
