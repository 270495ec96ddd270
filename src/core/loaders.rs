//! Loaders for normalized cycler records and cycle-summary tables.
//!
//! Vendor-specific exports are converted upstream into a normalized CSV
//! layout. This module reads that layout:
//! - Record tables (`cycle_id, elapsed_time_s, voltage, current,
//!   condition_code, end_state_code`, optional `step_id`)
//! - Cycle-summary tables carrying a per-cycle capacity column
//! - Nominal capacities embedded in file or folder names (e.g. `cell_4500mAh`)

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Phase of a record as reported by the cycler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCode {
    Charge,
    Discharge,
    Rest,
    /// Constant-current constant-voltage charge
    Cccv,
}

impl ConditionCode {
    /// Numeric code used in cycler exports.
    pub fn code(self) -> i64 {
        match self {
            ConditionCode::Charge => 1,
            ConditionCode::Discharge => 2,
            ConditionCode::Rest => 3,
            ConditionCode::Cccv => 8,
        }
    }
}

impl TryFrom<i64> for ConditionCode {
    type Error = LoaderError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(ConditionCode::Charge),
            2 => Ok(ConditionCode::Discharge),
            3 => Ok(ConditionCode::Rest),
            8 => Ok(ConditionCode::Cccv),
            other => Err(LoaderError::ParseError(format!(
                "unknown condition code {}",
                other
            ))),
        }
    }
}

/// One row of a normalized record table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRecord {
    pub cycle_id: i64,
    /// Elapsed test time in seconds.
    pub elapsed_time_s: f64,
    /// Cell voltage in mV.
    pub voltage: f64,
    /// Current in mA, positive when charging.
    pub current: f64,
    pub condition: ConditionCode,
    /// Step termination code emitted by the cycler.
    pub end_state: i64,
    pub step_id: Option<i64>,
}

impl NormalizedRecord {
    /// Creates a record without a step id.
    pub fn new(
        cycle_id: i64,
        elapsed_time_s: f64,
        voltage: f64,
        current: f64,
        condition: ConditionCode,
        end_state: i64,
    ) -> Self {
        Self {
            cycle_id,
            elapsed_time_s,
            voltage,
            current,
            condition,
            end_state,
            step_id: None,
        }
    }
}

/// Capacity columns found in a cycle-summary table.
///
/// Each column is `None` when the table does not carry it, so callers can tell
/// an absent column from an empty one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    /// Discharge capacity per cycle (mAh).
    pub discharge_capacity: Option<Vec<f64>>,
    /// Generic capacity per cycle (mAh), used by cyclers that do not split charge and discharge.
    pub capacity: Option<Vec<f64>>,
}

impl CycleSummary {
    /// First recorded capacity, preferring the discharge column.
    pub fn first_capacity(&self) -> Option<f64> {
        self.discharge_capacity
            .as_ref()
            .and_then(|col| col.first().copied())
            .or_else(|| self.capacity.as_ref().and_then(|col| col.first().copied()))
    }
}

fn header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect()
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

/// NaN and infinities are rejected like any other unparsable cell.
fn parse_float(record: &StringRecord, idx: usize, column: &str) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("").trim();
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(LoaderError::ParseError(format!(
            "line {}: invalid {} value '{}'",
            line_of(record),
            column,
            raw
        ))),
    }
}

/// Integer columns are sometimes exported as floats ("64.0").
fn parse_int(record: &StringRecord, idx: usize, column: &str) -> Result<i64> {
    let raw = record.get(idx).unwrap_or("").trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 => Ok(v as i64),
        _ => Err(LoaderError::ParseError(format!(
            "line {}: invalid {} value '{}'",
            line_of(record),
            column,
            raw
        ))),
    }
}

/// Load a normalized record table from CSV.
///
/// Header names are matched case-insensitively. `step_id` is optional; an
/// empty `step_id` cell is read as `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a required column is missing,
/// a value cannot be parsed, or the file holds no records.
pub fn load_records_csv<P: AsRef<Path>>(path: P) -> Result<Vec<NormalizedRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let col_map = header_map(reader.headers()?);

    let required = [
        "cycle_id",
        "elapsed_time_s",
        "voltage",
        "current",
        "condition_code",
        "end_state_code",
    ];
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !col_map.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let cycle_idx = col_map["cycle_id"];
    let time_idx = col_map["elapsed_time_s"];
    let voltage_idx = col_map["voltage"];
    let current_idx = col_map["current"];
    let condition_idx = col_map["condition_code"];
    let end_state_idx = col_map["end_state_code"];
    let step_idx = col_map.get("step_id").copied();

    let mut records = Vec::with_capacity(4096);

    for result in reader.records() {
        let record = result?;

        let condition_raw = parse_int(&record, condition_idx, "condition_code")?;
        let condition = ConditionCode::try_from(condition_raw).map_err(|_| {
            LoaderError::ParseError(format!(
                "line {}: unknown condition code {}",
                line_of(&record),
                condition_raw
            ))
        })?;

        let step_id = match step_idx {
            Some(idx) if !record.get(idx).unwrap_or("").trim().is_empty() => {
                Some(parse_int(&record, idx, "step_id")?)
            }
            _ => None,
        };

        records.push(NormalizedRecord {
            cycle_id: parse_int(&record, cycle_idx, "cycle_id")?,
            elapsed_time_s: parse_float(&record, time_idx, "elapsed_time_s")?,
            voltage: parse_float(&record, voltage_idx, "voltage")?,
            current: parse_float(&record, current_idx, "current")?,
            condition,
            end_state: parse_int(&record, end_state_idx, "end_state_code")?,
            step_id,
        });
    }

    if records.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    log::debug!("{}: loaded {} records", path.display(), records.len());
    Ok(records)
}

/// Load the capacity columns of a cycle-summary table.
///
/// Recognized columns: `discharge_capacity` and `capacity`
/// (case-insensitive). Other columns are ignored.
///
/// # Errors
///
/// Returns an error if the file cannot be read, neither capacity column is
/// present, or a capacity value cannot be parsed.
pub fn load_cycle_summary_csv<P: AsRef<Path>>(path: P) -> Result<CycleSummary> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let col_map = header_map(reader.headers()?);
    let discharge_idx = col_map.get("discharge_capacity").copied();
    let capacity_idx = col_map.get("capacity").copied();

    if discharge_idx.is_none() && capacity_idx.is_none() {
        return Err(LoaderError::MissingColumns(
            "discharge_capacity or capacity".to_string(),
        ));
    }

    let mut summary = CycleSummary {
        discharge_capacity: discharge_idx.map(|_| Vec::new()),
        capacity: capacity_idx.map(|_| Vec::new()),
    };

    for result in reader.records() {
        let record = result?;

        if let (Some(idx), Some(col)) = (discharge_idx, summary.discharge_capacity.as_mut()) {
            col.push(parse_float(&record, idx, "discharge_capacity")?);
        }
        if let (Some(idx), Some(col)) = (capacity_idx, summary.capacity.as_mut()) {
            col.push(parse_float(&record, idx, "capacity")?);
        }
    }

    Ok(summary)
}

/// Extract a nominal capacity in mAh from a file or folder name.
///
/// Accepts forms like `4500mAh`, `4.5mAh` and `4-5mAh` (dash as decimal
/// separator). Returns `None` when the name carries no capacity.
pub fn nominal_capacity_from_name(name: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)(\d+(?:[-.]\d+)?)\s*mah").ok()?;
    let caps = re.captures(name)?;
    caps.get(1)?.as_str().replace('-', ".").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_condition_code_round_trip() {
        for code in [1, 2, 3, 8] {
            let condition = ConditionCode::try_from(code).unwrap();
            assert_eq!(condition.code(), code);
        }
        assert!(ConditionCode::try_from(5).is_err());
    }

    #[test]
    fn test_load_records_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Cycle_ID,Elapsed_Time_s,Voltage,Current,Condition_Code,End_State_Code,Step_ID").unwrap();
        writeln!(file, "0,0.0,3650.5,1000,1,64,1").unwrap();
        writeln!(file, "0,10.0,3700.0,1000,8,64.0,").unwrap();
        writeln!(file, "1,20.0,4200.0,-500,2,78,2").unwrap();
        file.flush().unwrap();

        let records = load_records_csv(file.path())?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].voltage, 3650.5);
        assert_eq!(records[0].step_id, Some(1));
        assert_eq!(records[1].condition, ConditionCode::Cccv);
        assert_eq!(records[1].end_state, 64);
        assert_eq!(records[1].step_id, None);
        assert_eq!(records[2].cycle_id, 1);
        assert_eq!(records[2].current, -500.0);
        assert_eq!(records[2].condition, ConditionCode::Discharge);

        Ok(())
    }

    #[test]
    fn test_load_records_csv_missing_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cycle_id,voltage,current").unwrap();
        writeln!(file, "0,3600,100").unwrap();
        file.flush().unwrap();

        match load_records_csv(file.path()) {
            Err(LoaderError::MissingColumns(cols)) => {
                assert!(cols.contains("elapsed_time_s"));
                assert!(cols.contains("end_state_code"));
            }
            other => panic!("Expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_load_records_csv_unknown_condition() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cycle_id,elapsed_time_s,voltage,current,condition_code,end_state_code").unwrap();
        writeln!(file, "0,0,3600,100,7,64").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_records_csv(file.path()),
            Err(LoaderError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_records_csv_rejects_non_finite_values() {
        for row in ["0,0,NaN,-2000,2,65", "0,inf,3600,100,1,64", "0,0,3600,-inf,2,65"] {
            let mut file = NamedTempFile::new().unwrap();
            writeln!(file, "cycle_id,elapsed_time_s,voltage,current,condition_code,end_state_code").unwrap();
            writeln!(file, "{}", row).unwrap();
            file.flush().unwrap();

            match load_records_csv(file.path()) {
                Err(LoaderError::ParseError(msg)) => assert!(msg.contains("line 2"), "{}", msg),
                other => panic!("Expected ParseError for '{}', got {:?}", row, other),
            }
        }
    }

    #[test]
    fn test_load_records_csv_empty() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cycle_id,elapsed_time_s,voltage,current,condition_code,end_state_code").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_records_csv(file.path()),
            Err(LoaderError::EmptyFile(_))
        ));
    }

    #[test]
    fn test_load_cycle_summary_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cycle,discharge_capacity,temperature").unwrap();
        writeln!(file, "0,4480.5,25.1").unwrap();
        writeln!(file, "1,4470.0,25.3").unwrap();
        file.flush().unwrap();

        let summary = load_cycle_summary_csv(file.path())?;
        assert_eq!(summary.discharge_capacity, Some(vec![4480.5, 4470.0]));
        assert!(summary.capacity.is_none());
        assert_eq!(summary.first_capacity(), Some(4480.5));

        Ok(())
    }

    #[test]
    fn test_cycle_summary_prefers_discharge_column() {
        let summary = CycleSummary {
            discharge_capacity: Some(vec![3000.0]),
            capacity: Some(vec![2900.0]),
        };
        assert_eq!(summary.first_capacity(), Some(3000.0));

        let summary = CycleSummary {
            discharge_capacity: Some(Vec::new()),
            capacity: Some(vec![2900.0]),
        };
        assert_eq!(summary.first_capacity(), Some(2900.0));

        assert_eq!(CycleSummary::default().first_capacity(), None);
    }

    #[test]
    fn test_nominal_capacity_from_name() {
        assert_eq!(nominal_capacity_from_name("LGES_4500mAh_ch3"), Some(4500.0));
        assert_eq!(nominal_capacity_from_name("cell 4.5mAh"), Some(4.5));
        assert_eq!(nominal_capacity_from_name("cell_4-5mAh"), Some(4.5));
        assert_eq!(nominal_capacity_from_name("3000 MAH pouch"), Some(3000.0));
        assert_eq!(nominal_capacity_from_name("channel_07"), None);
    }
}
