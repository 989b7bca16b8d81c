//! TOML-based estimator configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level estimator configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`EstimatorConfig::from_toml_file`] or use
/// [`EstimatorConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstimatorConfig {
    /// Estimation cadence and solver parameters.
    #[serde(default)]
    pub estimation: EstimationConfig,
    /// Per-unit bases and network reference parameters.
    #[serde(default)]
    pub bases: BasesConfig,
    /// Input and output file locations.
    #[serde(default)]
    pub files: FilesConfig,
}

/// Estimation cadence and solver parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimationConfig {
    /// Simulated time units between estimation cycles (must be > 0).
    pub period: u64,
    /// Simulated time units between message-count status reports (must be > 0).
    pub accumulation_period: u64,
    /// Gauss–Newton iteration cap per solve (must be > 0).
    pub max_iterations: usize,
    /// Convergence threshold on the infinity norm of the state update.
    pub threshold: f64,
    /// Wall-clock hour that simulated time zero corresponds to (0–23);
    /// aligns cycles with the hourly pseudo-load table.
    pub start_hour: u32,
    /// Seed for the solver's initial-guess perturbation.
    pub seed: u64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            period: 1000,
            accumulation_period: 100,
            max_iterations: 50,
            threshold: 1e-6,
            start_hour: 8,
            seed: 42,
        }
    }
}

/// Per-unit bases and network reference parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BasesConfig {
    /// Apparent power base (kVA).
    pub power_kva: f64,
    /// Voltage base (V).
    pub voltage_v: f64,
    /// Power factor assumed when synthesizing reactive power for
    /// smart-meter readings (0 < pf <= 1).
    pub power_factor: f64,
    /// Index of the reference bus whose phase-A angle is fixed at zero.
    pub reference_bus: usize,
}

impl Default for BasesConfig {
    fn default() -> Self {
        Self {
            power_kva: 1000.0,
            voltage_v: 2400.0,
            power_factor: 0.95,
            reference_bus: 0,
        }
    }
}

/// Input and output file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    /// Admittance matrix CSV (square, re/im interleaved).
    pub admittance: PathBuf,
    /// Device table CSV.
    pub devices: PathBuf,
    /// Hourly pseudo-load profile CSV.
    pub pseudo_loads: PathBuf,
    /// Append-only results CSV, one row per estimation cycle.
    pub results: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            admittance: PathBuf::from("data/admittance.csv"),
            devices: PathBuf::from("data/devices.csv"),
            pseudo_loads: PathBuf::from("data/pseudo_loads.csv"),
            results: PathBuf::from("state_estimates.csv"),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"estimation.period"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl EstimatorConfig {
    /// Returns the baseline configuration.
    pub fn baseline() -> Self {
        Self {
            estimation: EstimationConfig::default(),
            bases: BasesConfig::default(),
            files: FilesConfig::default(),
        }
    }

    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let e = &self.estimation;

        if e.period == 0 {
            errors.push(ConfigError {
                field: "estimation.period".into(),
                message: "must be > 0".into(),
            });
        }
        if e.accumulation_period == 0 {
            errors.push(ConfigError {
                field: "estimation.accumulation_period".into(),
                message: "must be > 0".into(),
            });
        }
        if e.max_iterations == 0 {
            errors.push(ConfigError {
                field: "estimation.max_iterations".into(),
                message: "must be > 0".into(),
            });
        }
        if e.threshold <= 0.0 {
            errors.push(ConfigError {
                field: "estimation.threshold".into(),
                message: "must be > 0".into(),
            });
        }
        if e.start_hour >= 24 {
            errors.push(ConfigError {
                field: "estimation.start_hour".into(),
                message: "must be in [0, 23]".into(),
            });
        }

        let b = &self.bases;
        if b.power_kva <= 0.0 {
            errors.push(ConfigError {
                field: "bases.power_kva".into(),
                message: "must be > 0".into(),
            });
        }
        if b.voltage_v <= 0.0 {
            errors.push(ConfigError {
                field: "bases.voltage_v".into(),
                message: "must be > 0".into(),
            });
        }
        if !(b.power_factor > 0.0 && b.power_factor <= 1.0) {
            errors.push(ConfigError {
                field: "bases.power_factor".into(),
                message: "must be in (0.0, 1.0]".into(),
            });
        }

        errors
    }
}
