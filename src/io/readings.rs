//! Recorded reading logs for replay runs.

use std::path::Path;

use serde::Deserialize;

use crate::io::FileError;
use crate::measurement::reading::{RawField, RawReading};

#[derive(Debug, Deserialize)]
struct LogRow {
    time: u64,
    device: String,
    key: String,
    value1: f64,
    value2: Option<f64>,
}

/// All readings that arrive at one simulated time.
#[derive(Debug, Clone)]
pub struct Frame {
    pub time: u64,
    pub readings: Vec<RawReading>,
}

/// A reading log in long CSV format: `time,device,key,value1,value2`,
/// with `value2` blank for scalar keys. Rows are grouped per device and
/// per time; frames come out sorted by time.
#[derive(Debug, Clone)]
pub struct ReadingLog {
    frames: Vec<Frame>,
}

impl ReadingLog {
    /// Loads and groups a reading log.
    ///
    /// # Errors
    ///
    /// Returns a [`FileError`] when the file is missing or a row fails
    /// to parse.
    pub fn load(path: &Path) -> Result<Self, FileError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| FileError::new(path, format!("cannot open reading log: {e}")))?;

        let mut rows = Vec::new();
        for row in reader.deserialize::<LogRow>() {
            rows.push(row.map_err(|e| FileError::new(path, format!("bad log row: {e}")))?);
        }
        rows.sort_by_key(|row| row.time);

        let mut frames: Vec<Frame> = Vec::new();
        for row in rows {
            let field = RawField {
                key: row.key,
                primary: row.value1,
                secondary: row.value2,
            };
            if frames.last().map(|f| f.time) != Some(row.time) {
                frames.push(Frame {
                    time: row.time,
                    readings: Vec::new(),
                });
            }
            if let Some(frame) = frames.last_mut() {
                match frame.readings.iter_mut().find(|r| r.device == row.device) {
                    Some(reading) => reading.fields.push(field),
                    None => frame.readings.push(RawReading {
                        device: row.device,
                        fields: vec![field],
                    }),
                }
            }
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write_log(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dse-sim-log-{name}.csv"));
        fs::write(&path, content).expect("write scratch log");
        path
    }

    #[test]
    fn groups_rows_by_time_and_device() {
        let path = write_log(
            "grouping",
            "time,device,key,value1,value2\n\
             100,Phasor_1,VA,2400.0,0.0\n\
             100,Phasor_1,VB,2390.0,-2.094\n\
             100,Meter_4,SPA,1500.0,\n\
             200,Meter_4,SPA,1600.0,\n",
        );
        let log = ReadingLog::load(&path).expect("valid log");
        let frames = log.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].time, 100);
        assert_eq!(frames[0].readings.len(), 2);
        assert_eq!(frames[0].readings[0].device, "Phasor_1");
        assert_eq!(frames[0].readings[0].fields.len(), 2);
        assert_eq!(frames[0].readings[0].fields[1].secondary, Some(-2.094));
        assert_eq!(frames[1].readings[0].fields[0].secondary, None);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn frames_are_sorted_by_time() {
        let path = write_log(
            "sorting",
            "time,device,key,value1,value2\n\
             300,Meter_4,SPA,1.0,\n\
             100,Meter_4,SPA,2.0,\n\
             200,Meter_4,SPA,3.0,\n",
        );
        let log = ReadingLog::load(&path).expect("valid log");
        let times: Vec<u64> = log.frames().iter().map(|f| f.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ReadingLog::load(Path::new("/nonexistent/readings.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/readings.csv"));
    }
}
