//! Rule-based cycle categorization.
//!
//! Each cycle is reduced to a handful of aggregate statistics which are run
//! through a fixed decision list. Rules are evaluated top to bottom and the
//! first match wins:
//!
//! 1. `n_points > 10000` → `Resistance_Measurement`
//! 2. `endstate_78_ratio > 0.5` and `index < 500` → `SOC_Definition`
//! 3. `voltage_range < 1400` and `c_rate_max > 1.5` → `Accelerated_Aging`
//! 4. `endstate_64_ratio > 0.90` and `voltage_range > 1400` → `RPT`
//! 5. otherwise → `Unknown`
//!
//! The thresholds were calibrated against one labeled dataset and are fixed.
//! Reordering the rules changes results: a long resistance cycle can also
//! carry a high end-state 78 ratio, and rule 1 must claim it first.
//!
//! The index guard in rule 2 ties classification to the cycle's position in
//! its list. In the calibration dataset the cycle at index 501 shows an
//! SOC-definition end-state signature but is not one; the guard excludes it.
//! This is a known weakness: lists with a different layout may need a
//! different bound.

use crate::core::cycle::{Category, CycleError, CycleFrame, Result};

/// Record count above which a cycle is a resistance measurement.
pub const RESISTANCE_MIN_POINTS: usize = 10_000;
/// End-state 78 ratio above which a cycle is an SOC definition.
pub const SOC_ENDSTATE_78_RATIO: f64 = 0.5;
/// SOC definition cycles only occur before this list index.
pub const SOC_MAX_INDEX: usize = 500;
/// Voltage range (mV) separating partial-window from full-window cycles.
pub const FULL_VOLTAGE_RANGE: f64 = 1400.0;
/// |C-rate| above which a narrow-window cycle is accelerated aging.
pub const AGING_MIN_C_RATE: f64 = 1.5;
/// End-state 64 ratio above which a full-window cycle is an RPT.
pub const RPT_ENDSTATE_64_RATIO: f64 = 0.90;

/// End-state code emitted at a voltage cutoff during SOC definition steps.
pub const END_STATE_SOC_CUTOFF: i64 = 78;
/// End-state code emitted when a step ends normally.
pub const END_STATE_NORMAL: i64 = 64;

/// Aggregate statistics the decision list works on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleStats {
    pub n_points: usize,
    pub voltage_range: f64,
    pub endstate_78_ratio: f64,
    pub endstate_64_ratio: f64,
    /// Max |c_rate|, or 0 when the frame has no derived fields.
    pub c_rate_max: f64,
}

impl CycleStats {
    /// Compute statistics for the frame at `index`.
    ///
    /// Non-finite voltages are skipped when measuring the voltage range.
    ///
    /// # Errors
    ///
    /// Returns `CycleError::EmptyCycle` if the frame has no records, or
    /// `CycleError::NoFiniteVoltage` if none of its voltages is finite.
    pub fn compute(frame: &CycleFrame, index: usize) -> Result<Self> {
        let records = frame.records();
        if records.is_empty() {
            return Err(CycleError::EmptyCycle { index });
        }

        let n = records.len();
        let (v_min, v_max) = frame
            .voltage_bounds()
            .ok_or(CycleError::NoFiniteVoltage { index })?;

        let count_78 = records
            .iter()
            .filter(|r| r.end_state == END_STATE_SOC_CUTOFF)
            .count();
        let count_64 = records
            .iter()
            .filter(|r| r.end_state == END_STATE_NORMAL)
            .count();

        let c_rate_max = match frame.c_rate() {
            Some(c_rate) => c_rate.iter().fold(0.0_f64, |m, c| m.max(c.abs())),
            None => 0.0,
        };

        Ok(Self {
            n_points: n,
            voltage_range: v_max - v_min,
            endstate_78_ratio: count_78 as f64 / n as f64,
            endstate_64_ratio: count_64 as f64 / n as f64,
            c_rate_max,
        })
    }
}

/// Apply the decision list to precomputed statistics.
pub fn classify(stats: &CycleStats, index: usize) -> Category {
    if stats.n_points > RESISTANCE_MIN_POINTS {
        Category::ResistanceMeasurement
    } else if stats.endstate_78_ratio > SOC_ENDSTATE_78_RATIO && index < SOC_MAX_INDEX {
        Category::SocDefinition
    } else if stats.voltage_range < FULL_VOLTAGE_RANGE && stats.c_rate_max > AGING_MIN_C_RATE {
        Category::AcceleratedAging
    } else if stats.endstate_64_ratio > RPT_ENDSTATE_64_RATIO
        && stats.voltage_range > FULL_VOLTAGE_RANGE
    {
        Category::Rpt
    } else {
        Category::Unknown
    }
}

/// Categorize one frame given its index in the owning cycle list.
///
/// Pure: the same frame and index always give the same category.
///
/// # Errors
///
/// Returns `CycleError::EmptyCycle` if the frame has no records, or
/// `CycleError::NoFiniteVoltage` if none of its voltages is finite.
pub fn categorize_cycle(frame: &CycleFrame, index: usize) -> Result<Category> {
    let stats = CycleStats::compute(frame, index)?;
    Ok(classify(&stats, index))
}

/// Categorize the frame at `index` of a cycle list.
///
/// # Errors
///
/// Returns `CycleError::IndexOutOfRange` for an index past the end of the
/// list, or `CycleError::EmptyCycle` if the frame has no records.
pub fn categorize_at(cycles: &[CycleFrame], index: usize) -> Result<Category> {
    let frame = cycles.get(index).ok_or(CycleError::IndexOutOfRange {
        index,
        len: cycles.len(),
    })?;
    categorize_cycle(frame, index)
}
