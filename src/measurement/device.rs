//! Device descriptors and the device-table file.

use std::path::Path;

use serde::Deserialize;

use crate::io::FileError;
use crate::measurement::reading::DeviceKind;

/// Endpoints of a monitored line section, oriented sending → receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRef {
    pub from_bus: usize,
    pub to_bus: usize,
}

/// One field device. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Device {
    /// Identity string matching the `device` field of incoming payloads.
    pub id: String,
    pub kind: DeviceKind,
    /// Bus the device instruments.
    pub bus: usize,
    /// Reporting period in simulated time units.
    pub period: u64,
    /// Measurement error standard deviation, per-unit.
    pub error_std: f64,
    /// Monitored line, for devices that report branch currents.
    pub line: Option<LineRef>,
}

#[derive(Debug, Deserialize)]
struct DeviceRow {
    #[serde(rename = "type")]
    kind: String,
    src: usize,
    dst: String,
    control_index: String,
    device_index: String,
    period: u64,
    error: f64,
    circuit_element: String,
    terminal: String,
}

/// Loads the device table.
///
/// # Errors
///
/// Returns a [`FileError`] when the file is missing, a row fails to
/// parse, a device kind is unknown, or a circuit element reference is
/// malformed.
pub fn load_devices(path: &Path) -> Result<Vec<Device>, FileError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| FileError::new(path, format!("cannot open device table: {e}")))?;

    let mut devices = Vec::new();
    for row in reader.deserialize::<DeviceRow>() {
        let row = row.map_err(|e| FileError::new(path, format!("bad device row: {e}")))?;
        let kind = DeviceKind::parse(&row.kind)
            .ok_or_else(|| FileError::new(path, format!("unknown device type \"{}\"", row.kind)))?;
        let line =
            parse_line_ref(&row.circuit_element, &row.terminal).map_err(|m| FileError::new(path, m))?;
        let id = format!(
            "{}_{}-{}.{}.{}",
            row.kind, row.src, row.dst, row.control_index, row.device_index
        );
        devices.push(Device {
            id,
            kind,
            bus: row.src,
            period: row.period,
            error_std: row.error,
            line,
        });
    }
    if devices.is_empty() {
        return Err(FileError::new(path, "device table is empty"));
    }
    Ok(devices)
}

/// Derives line endpoints from a circuit element name (`"Line.<from>-<to>"`)
/// and a terminal tag (`"BUS1"`/`"BUS2"`). Terminal 1 sends from `<from>`;
/// terminal 2 flips the orientation.
fn parse_line_ref(element: &str, terminal: &str) -> Result<Option<LineRef>, String> {
    if element.is_empty() || element == "None" || element == "none" {
        return Ok(None);
    }
    let name = element
        .split_once('.')
        .map(|(_, rest)| rest)
        .unwrap_or(element);
    let (from, to) = name
        .split_once('-')
        .ok_or_else(|| format!("circuit element \"{element}\" is not of the form Line.<from>-<to>"))?;
    let from: usize = from
        .parse()
        .map_err(|_| format!("circuit element \"{element}\" has a non-numeric bus"))?;
    let to: usize = to
        .parse()
        .map_err(|_| format!("circuit element \"{element}\" has a non-numeric bus"))?;
    let index: u32 = terminal
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .map_err(|_| format!("terminal \"{terminal}\" has no index"))?;
    match index {
        1 => Ok(Some(LineRef {
            from_bus: from,
            to_bus: to,
        })),
        2 => Ok(Some(LineRef {
            from_bus: to,
            to_bus: from,
        })),
        _ => Err(format!("terminal index must be 1 or 2, got {index}")),
    }
}
