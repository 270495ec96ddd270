//! Extended per-cycle features and per-category summaries.
//!
//! These features are wider than what the categorizer needs and are used to
//! inspect how well the fixed thresholds separate the categories of a dataset.

use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;

use super::labeler::CategoryPartition;
use crate::core::cycle::{Category, CycleError, CycleFrame, Result};
use crate::core::loaders::ConditionCode;

/// Descriptive features of a single cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleFeatures {
    pub cycle_index: usize,
    pub cycle_id: i64,
    pub n_points: usize,

    pub voltage_min: f64,
    pub voltage_max: f64,
    pub voltage_range: f64,
    pub voltage_mean: f64,
    /// Sample standard deviation; `None` for a single record.
    pub voltage_std: Option<f64>,

    pub current_min: f64,
    pub current_max: f64,
    pub current_range: f64,
    pub current_mean: f64,

    pub endstate_unique: usize,
    /// Distinct end-state codes, ascending.
    pub endstate_values: Vec<i64>,
    /// Most frequent end-state code; the smallest code wins ties.
    pub endstate_dominant: i64,
    pub endstate_64_ratio: f64,
    pub endstate_65_ratio: f64,
    pub endstate_66_ratio: f64,
    pub endstate_78_ratio: f64,

    /// Span of `time_in_cycle` in seconds, present when derived fields exist.
    pub duration_s: Option<f64>,

    pub condition_unique: usize,
    pub has_charge: bool,
    pub has_discharge: bool,
    pub has_rest: bool,
    pub charge_ratio: f64,
    pub discharge_ratio: f64,
    pub rest_ratio: f64,

    /// |c_rate| statistics, present when derived fields exist.
    pub c_rate_max: Option<f64>,
    pub c_rate_mean: Option<f64>,
    pub c_rate_std: Option<f64>,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Extract features from the frame at `index`.
///
/// # Errors
///
/// Returns `CycleError::EmptyCycle` if the frame has no records, or
/// `CycleError::NoFiniteVoltage` if none of its voltages is finite.
pub fn extract_features(frame: &CycleFrame, index: usize) -> Result<CycleFeatures> {
    let records = frame.records();
    if records.is_empty() {
        return Err(CycleError::EmptyCycle { index });
    }
    let n = records.len() as f64;

    let (voltage_min, voltage_max) = frame
        .voltage_bounds()
        .ok_or(CycleError::NoFiniteVoltage { index })?;
    let voltages: Vec<f64> = records
        .iter()
        .map(|r| r.voltage)
        .filter(|v| v.is_finite())
        .collect();
    let currents: Vec<f64> = records.iter().map(|r| r.current).collect();
    let (current_min, current_max) = min_max(&currents);

    let mut endstate_counts: BTreeMap<i64, usize> = BTreeMap::new();
    for r in records {
        *endstate_counts.entry(r.end_state).or_insert(0) += 1;
    }
    let endstate_ratio = |code: i64| endstate_counts.get(&code).copied().unwrap_or(0) as f64 / n;
    // max_by_key keeps the last maximum, so walk codes in descending order.
    let endstate_dominant = endstate_counts
        .iter()
        .rev()
        .max_by_key(|&(_, count)| *count)
        .map_or(0, |(&code, _)| code);

    let conditions: HashSet<ConditionCode> = records.iter().map(|r| r.condition).collect();
    let condition_ratio = |condition: ConditionCode| {
        records.iter().filter(|r| r.condition == condition).count() as f64 / n
    };

    let duration_s = frame
        .derived()
        .filter(|d| !d.time_in_cycle.is_empty())
        .map(|d| {
            let (start, end) = min_max(&d.time_in_cycle);
            end - start
        });

    let abs_c_rate: Option<Vec<f64>> = frame
        .c_rate()
        .map(|c| c.iter().map(|v| v.abs()).collect());

    Ok(CycleFeatures {
        cycle_index: index,
        cycle_id: frame.cycle_id(),
        n_points: records.len(),
        voltage_min,
        voltage_max,
        voltage_range: voltage_max - voltage_min,
        voltage_mean: mean(&voltages),
        voltage_std: sample_std(&voltages),
        current_min,
        current_max,
        current_range: current_max - current_min,
        current_mean: mean(&currents),
        endstate_unique: endstate_counts.len(),
        endstate_values: endstate_counts.keys().copied().collect(),
        endstate_dominant,
        endstate_64_ratio: endstate_ratio(64),
        endstate_65_ratio: endstate_ratio(65),
        endstate_66_ratio: endstate_ratio(66),
        endstate_78_ratio: endstate_ratio(78),
        duration_s,
        condition_unique: conditions.len(),
        has_charge: conditions.contains(&ConditionCode::Charge),
        has_discharge: conditions.contains(&ConditionCode::Discharge),
        has_rest: conditions.contains(&ConditionCode::Rest),
        charge_ratio: condition_ratio(ConditionCode::Charge),
        discharge_ratio: condition_ratio(ConditionCode::Discharge),
        rest_ratio: condition_ratio(ConditionCode::Rest),
        c_rate_max: abs_c_rate.as_ref().map(|c| min_max(c).1),
        c_rate_mean: abs_c_rate.as_ref().map(|c| mean(c)),
        c_rate_std: abs_c_rate.as_ref().and_then(|c| sample_std(c)),
    })
}

/// Extract features for every cycle, in index order.
pub fn extract_all_features(cycles: &[CycleFrame]) -> Result<Vec<CycleFeatures>> {
    cycles
        .par_iter()
        .enumerate()
        .map(|(idx, frame)| extract_features(frame, idx))
        .collect()
}

/// Mean, spread and bounds of one feature over a group of cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureStats {
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl FeatureStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let (min, max) = min_max(values);
        Some(Self {
            count: values.len(),
            mean: mean(values),
            std: sample_std(values),
            min,
            max,
        })
    }
}

type FeatureGetter = fn(&CycleFeatures) -> Option<f64>;

/// Numeric features included in group summaries.
const SUMMARY_FEATURES: [(&str, FeatureGetter); 15] = [
    ("n_points", |f| Some(f.n_points as f64)),
    ("voltage_min", |f| Some(f.voltage_min)),
    ("voltage_max", |f| Some(f.voltage_max)),
    ("voltage_range", |f| Some(f.voltage_range)),
    ("voltage_mean", |f| Some(f.voltage_mean)),
    ("current_range", |f| Some(f.current_range)),
    ("endstate_unique", |f| Some(f.endstate_unique as f64)),
    ("endstate_64_ratio", |f| Some(f.endstate_64_ratio)),
    ("endstate_78_ratio", |f| Some(f.endstate_78_ratio)),
    ("charge_ratio", |f| Some(f.charge_ratio)),
    ("discharge_ratio", |f| Some(f.discharge_ratio)),
    ("rest_ratio", |f| Some(f.rest_ratio)),
    ("duration_s", |f| f.duration_s),
    ("c_rate_max", |f| f.c_rate_max),
    ("c_rate_mean", |f| f.c_rate_mean),
];

/// Summarize a group of cycles feature by feature.
///
/// Features with no values in the group (e.g. C-rate on underived frames)
/// are omitted.
pub fn summarize_features(features: &[CycleFeatures]) -> Vec<(&'static str, FeatureStats)> {
    SUMMARY_FEATURES
        .iter()
        .filter_map(|(name, get)| {
            let values: Vec<f64> = features.iter().filter_map(get).collect();
            FeatureStats::from_values(&values).map(|stats| (*name, stats))
        })
        .collect()
}

/// Features of every cycle grouped by category, in reporting order.
///
/// # Errors
///
/// Returns `CycleError::IndexOutOfRange` if the partition references a cycle
/// missing from `cycles`, or `CycleError::EmptyCycle` for an empty frame.
pub fn features_by_category(
    cycles: &[CycleFrame],
    partition: &CategoryPartition,
) -> Result<Vec<(Category, Vec<CycleFeatures>)>> {
    Category::ALL
        .iter()
        .map(|&category| {
            let features = partition
                .indices(category)
                .iter()
                .map(|&idx| {
                    let frame = cycles.get(idx).ok_or(CycleError::IndexOutOfRange {
                        index: idx,
                        len: cycles.len(),
                    })?;
                    extract_features(frame, idx)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((category, features))
        })
        .collect()
}
