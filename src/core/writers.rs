//! CSV writers for categorization results.
//!
//! This module exports:
//! - Per-cycle labels (`index, cycle_id, category, n_points`)
//! - Per-cycle feature tables for offline threshold analysis

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::cycle::CycleFrame;
use crate::processors::features::CycleFeatures;
use crate::processors::labeler::CategoryPartition;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("length mismatch: {cycles_len} cycles but {labels_len} labels")]
    LengthMismatch { cycles_len: usize, labels_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Opens a CSV writer at `path`, creating parent directories as needed.
fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::Writer::from_writer(BufWriter::new(file)))
}

fn write_row<I, S>(writer: &mut csv::Writer<BufWriter<File>>, path: &Path, row: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    writer
        .write_record(row)
        .map_err(|e| WriteError::CsvError {
            path: path.display().to_string(),
            source: e,
        })
}

fn finish(mut writer: csv::Writer<BufWriter<File>>, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

/// Write one label row per cycle.
///
/// Columns: `index,cycle_id,category,n_points`.
///
/// # Errors
///
/// Returns an error if:
/// - `cycles` and `partition` cover a different number of cycles
/// - Parent directories cannot be created
/// - File cannot be created or written to
///
/// # Example
///
/// ```no_run
/// use cycler_pipeline::core::writers::write_labels_csv;
/// use cycler_pipeline::processors::labeler::categorize_cycles;
/// use std::path::Path;
///
/// let cycles = Vec::new();
/// let partition = categorize_cycles(&cycles).unwrap();
/// write_labels_csv(Path::new("labels.csv"), &cycles, &partition).unwrap();
/// ```
pub fn write_labels_csv(
    path: &Path,
    cycles: &[CycleFrame],
    partition: &CategoryPartition,
) -> Result<()> {
    if cycles.len() != partition.len() {
        return Err(WriteError::LengthMismatch {
            cycles_len: cycles.len(),
            labels_len: partition.len(),
        });
    }

    let mut writer = create_csv_writer(path)?;
    write_row(&mut writer, path, ["index", "cycle_id", "category", "n_points"])?;

    for (idx, (frame, label)) in cycles.iter().zip(partition.labels()).enumerate() {
        write_row(
            &mut writer,
            path,
            [
                idx.to_string(),
                frame.cycle_id().to_string(),
                label.to_string(),
                frame.len().to_string(),
            ],
        )?;
    }

    finish(writer, path)
}

/// Write a feature table, one row per cycle.
///
/// Duration and C-rate columns are left empty for cycles without derived fields.
pub fn write_features_csv(path: &Path, features: &[CycleFeatures]) -> Result<()> {
    let mut writer = create_csv_writer(path)?;
    write_row(
        &mut writer,
        path,
        [
            "index",
            "cycle_id",
            "n_points",
            "voltage_min",
            "voltage_max",
            "voltage_range",
            "voltage_mean",
            "current_range",
            "endstate_unique",
            "endstate_dominant",
            "endstate_64_ratio",
            "endstate_78_ratio",
            "charge_ratio",
            "discharge_ratio",
            "rest_ratio",
            "duration_s",
            "c_rate_max",
            "c_rate_mean",
        ],
    )?;

    for f in features {
        write_row(
            &mut writer,
            path,
            [
                f.cycle_index.to_string(),
                f.cycle_id.to_string(),
                f.n_points.to_string(),
                format!("{:.6}", f.voltage_min),
                format!("{:.6}", f.voltage_max),
                format!("{:.6}", f.voltage_range),
                format!("{:.6}", f.voltage_mean),
                format!("{:.6}", f.current_range),
                f.endstate_unique.to_string(),
                f.endstate_dominant.to_string(),
                format!("{:.6}", f.endstate_64_ratio),
                format!("{:.6}", f.endstate_78_ratio),
                format!("{:.6}", f.charge_ratio),
                format!("{:.6}", f.discharge_ratio),
                format!("{:.6}", f.rest_ratio),
                opt(f.duration_s),
                opt(f.c_rate_max),
                opt(f.c_rate_mean),
            ],
        )?;
    }

    finish(writer, path)
}
