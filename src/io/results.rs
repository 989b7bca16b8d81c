//! Append-only persistence of per-cycle voltage estimates.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use num_complex::Complex64;

use crate::io::FileError;

/// Writer for the results file: one CSV row per estimation cycle.
///
/// The first append creates the file and writes the header; later
/// appends stack rows onto the existing file.
#[derive(Debug, Clone)]
pub struct ResultsWriter {
    path: PathBuf,
}

impl ResultsWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one cycle row.
    ///
    /// # Errors
    ///
    /// Returns a [`FileError`] when the file cannot be opened or written.
    pub fn append(
        &self,
        time: u64,
        healthy: bool,
        voltages: &[Complex64],
    ) -> Result<(), FileError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FileError::new(&self.path, format!("cannot open results file: {e}")))?;
        let fresh = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            let mut header = vec!["time".to_string(), "healthy".to_string()];
            for slot in 0..voltages.len() {
                header.push(format!("v{slot}_re"));
                header.push(format!("v{slot}_im"));
            }
            writer
                .write_record(&header)
                .map_err(|e| FileError::new(&self.path, format!("cannot write header: {e}")))?;
        }

        let mut row = vec![time.to_string(), healthy.to_string()];
        for voltage in voltages {
            row.push(format!("{:.9}", voltage.re));
            row.push(format!("{:.9}", voltage.im));
        }
        writer
            .write_record(&row)
            .map_err(|e| FileError::new(&self.path, format!("cannot write row: {e}")))?;
        writer
            .flush()
            .map_err(|e| FileError::new(&self.path, format!("cannot flush results: {e}")))?;
        Ok(())
    }
}
