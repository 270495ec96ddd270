//! Within-cycle phase labeling.
//!
//! Every record of a cycle gets a phase label built from three parts: its
//! condition, the level of its |C-rate| and the id of the end-state run it
//! belongs to. A new run starts whenever the end-state code differs from the
//! previous record's, with the first run numbered 1. Labels render as
//! `Charge_Mid_01`. Frames without derived fields have level `Unknown`.

use std::collections::HashMap;
use std::fmt::{self, Write};

use rayon::prelude::*;

use crate::config::PhaseConfig;
use crate::core::cycle::{CycleError, CycleFrame, Result};
use crate::core::loaders::ConditionCode;

/// |C-rate| band of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CRateLevel {
    Low,
    Mid,
    High,
    VHigh,
}

impl CRateLevel {
    /// Bands are closed at the top: `|c| == low` is still Low.
    pub fn from_c_rate(c_rate: f64, thresholds: &PhaseConfig) -> Self {
        let c = c_rate.abs();
        if c <= thresholds.low {
            CRateLevel::Low
        } else if c <= thresholds.mid {
            CRateLevel::Mid
        } else if c <= thresholds.high {
            CRateLevel::High
        } else {
            CRateLevel::VHigh
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CRateLevel::Low => "Low",
            CRateLevel::Mid => "Mid",
            CRateLevel::High => "High",
            CRateLevel::VHigh => "VHigh",
        }
    }
}

fn condition_name(condition: ConditionCode) -> &'static str {
    match condition {
        ConditionCode::Charge => "Charge",
        ConditionCode::Discharge => "Discharge",
        ConditionCode::Rest => "Rest",
        ConditionCode::Cccv => "CCCV",
    }
}

/// Phase of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhaseLabel {
    pub condition: ConditionCode,
    /// `None` when the frame has no C-rate.
    pub level: Option<CRateLevel>,
    /// End-state run id, starting at 1.
    pub run_id: usize,
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = self.level.map_or("Unknown", CRateLevel::as_str);
        f.pad(&format!(
            "{}_{}_{:02}",
            condition_name(self.condition),
            level,
            self.run_id
        ))
    }
}

fn validate_thresholds(thresholds: &PhaseConfig) -> Result<()> {
    let PhaseConfig { low, mid, high } = *thresholds;
    let finite = low.is_finite() && mid.is_finite() && high.is_finite();
    if !finite || low < 0.0 || low > mid || mid > high {
        return Err(CycleError::Configuration(format!(
            "C-rate phase thresholds must be finite and ascending, got {} / {} / {}",
            low, mid, high
        )));
    }
    Ok(())
}

fn label_records(frame: &CycleFrame, thresholds: &PhaseConfig) -> Vec<PhaseLabel> {
    let c_rate = frame.c_rate();
    let mut run_id = 0;
    let mut prev_end_state = None;

    frame
        .records()
        .iter()
        .enumerate()
        .map(|(i, record)| {
            if prev_end_state != Some(record.end_state) {
                run_id += 1;
                prev_end_state = Some(record.end_state);
            }
            PhaseLabel {
                condition: record.condition,
                level: c_rate.map(|c| CRateLevel::from_c_rate(c[i], thresholds)),
                run_id,
            }
        })
        .collect()
}

/// Label every record of a frame with its phase.
///
/// An empty frame yields no labels.
///
/// # Errors
///
/// Returns `CycleError::Configuration` if the thresholds are not finite,
/// non-negative and ascending.
pub fn categorize_cycle_phases(
    frame: &CycleFrame,
    thresholds: &PhaseConfig,
) -> Result<Vec<PhaseLabel>> {
    validate_thresholds(thresholds)?;
    Ok(label_records(frame, thresholds))
}

/// Phase labels for every frame of a cycle list, in list order.
pub fn categorize_all_cycle_phases(
    cycles: &[CycleFrame],
    thresholds: &PhaseConfig,
) -> Result<Vec<Vec<PhaseLabel>>> {
    validate_thresholds(thresholds)?;
    let labels: Vec<Vec<PhaseLabel>> = cycles
        .par_iter()
        .map(|frame| label_records(frame, thresholds))
        .collect();

    let phases: usize = labels.iter().map(|l| count_distinct(l)).sum();
    log::debug!("{} cycles, {} phases", cycles.len(), phases);
    Ok(labels)
}

fn count_distinct(labels: &[PhaseLabel]) -> usize {
    let mut seen: Vec<PhaseLabel> = labels.to_vec();
    seen.sort_by_key(|l| (l.run_id, l.condition.code(), l.level));
    seen.dedup();
    seen.len()
}

/// Min, mean and max of one quantity over a phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.filter(|v| v.is_finite()) {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self {
            mean: sum / count as f64,
            min,
            max,
        })
    }
}

/// Aggregates of the records sharing one phase label.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    pub label: PhaseLabel,
    pub count: usize,
    /// Cycle-relative times; `None` without derived fields.
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub duration_s: Option<f64>,
    pub voltage: Option<Range>,
    pub current: Option<Range>,
    /// Signed C-rate.
    pub c_rate: Option<Range>,
    /// Cumulative capacity at the phase's last record minus at its first.
    pub capacity_change: Option<f64>,
}

/// Summarize a frame phase by phase, ordered by phase start time.
///
/// Phases keep first-appearance order when start times tie or are missing.
///
/// # Errors
///
/// Returns `CycleError::Configuration` for invalid thresholds.
pub fn summarize_phases(frame: &CycleFrame, thresholds: &PhaseConfig) -> Result<Vec<PhaseSummary>> {
    let labels = categorize_cycle_phases(frame, thresholds)?;

    let mut order: Vec<PhaseLabel> = Vec::new();
    let mut members: HashMap<PhaseLabel, Vec<usize>> = HashMap::new();
    for (i, label) in labels.iter().enumerate() {
        members
            .entry(*label)
            .or_insert_with(|| {
                order.push(*label);
                Vec::new()
            })
            .push(i);
    }

    let records = frame.records();
    let derived = frame.derived();

    let mut summaries: Vec<PhaseSummary> = order
        .into_iter()
        .map(|label| {
            let rows = members.get(&label).map(Vec::as_slice).unwrap_or(&[]);
            let times = derived.and_then(|d| Range::of(rows.iter().map(|&i| d.time_in_cycle[i])));
            let capacity_change = derived.and_then(|d| {
                let first = rows.first()?;
                let last = rows.last()?;
                Some(d.cumulative_capacity[*last] - d.cumulative_capacity[*first])
            });

            PhaseSummary {
                label,
                count: rows.len(),
                start_time: times.map(|t| t.min),
                end_time: times.map(|t| t.max),
                duration_s: times.map(|t| t.max - t.min),
                voltage: Range::of(rows.iter().map(|&i| records[i].voltage)),
                current: Range::of(rows.iter().map(|&i| records[i].current)),
                c_rate: derived.and_then(|d| Range::of(rows.iter().map(|&i| d.c_rate[i]))),
                capacity_change,
            }
        })
        .collect();

    summaries.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(summaries)
}

/// Render the phase summary of one cycle.
pub fn format_phase_report(
    frame: &CycleFrame,
    index: usize,
    thresholds: &PhaseConfig,
) -> Result<String> {
    let summaries = summarize_phases(frame, thresholds)?;
    let mut out = String::new();

    let _ = writeln!(out, "Cycle {} (id {}) phases", index, frame.cycle_id());
    let _ = writeln!(out, "  records: {}", frame.len());
    let _ = writeln!(out, "  phases: {}", summaries.len());
    if let Some(total) = frame
        .derived()
        .and_then(|d| d.time_in_cycle.iter().copied().reduce(f64::max))
    {
        let _ = writeln!(out, "  total time: {:.0} s ({:.2} h)", total, total / 3600.0);
    }

    for s in &summaries {
        let _ = writeln!(out, "[{}]", s.label);
        let _ = writeln!(out, "  points: {}", s.count);
        if let (Some(start), Some(end), Some(duration)) = (s.start_time, s.end_time, s.duration_s) {
            let _ = writeln!(out, "  time: {:.0} s ~ {:.0} s ({:.0} s)", start, end, duration);
        }
        if let Some(v) = s.voltage {
            let _ = writeln!(out, "  voltage: {:.0} mV ({:.0} ~ {:.0})", v.mean, v.min, v.max);
        }
        if let Some(c) = s.current {
            let _ = writeln!(out, "  current: {:.2} mA ({:.2} ~ {:.2})", c.mean, c.min, c.max);
        }
        if let Some(c) = s.c_rate {
            let _ = writeln!(out, "  c-rate: {:.3}C ({:.3} ~ {:.3})", c.mean, c.min, c.max);
        }
        if let Some(delta) = s.capacity_change {
            let _ = writeln!(out, "  capacity change: {:.2} mAh", delta);
        }
    }

    Ok(out)
}
