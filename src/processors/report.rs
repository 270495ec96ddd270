//! Human-readable categorization report.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::labeler::CategoryPartition;
use crate::core::cycle::{Category, CycleFrame};
use crate::core::loaders::ConditionCode;

fn condition_name(condition: ConditionCode) -> &'static str {
    match condition {
        ConditionCode::Charge => "charge",
        ConditionCode::Discharge => "discharge",
        ConditionCode::Rest => "rest",
        ConditionCode::Cccv => "cccv",
    }
}

fn describe_cycle(out: &mut String, frame: &CycleFrame) {
    let records = frame.records();
    if records.is_empty() {
        let _ = writeln!(out, "    (no records)");
        return;
    }

    match frame.voltage_bounds() {
        Some((v_min, v_max)) => {
            let _ = writeln!(
                out,
                "    voltage: {:.0} ~ {:.0} mV (range {:.0} mV)",
                v_min,
                v_max,
                v_max - v_min
            );
        }
        None => {
            let _ = writeln!(out, "    voltage: no finite values");
        }
    }

    let mut end_states: BTreeMap<i64, usize> = BTreeMap::new();
    for r in records {
        *end_states.entry(r.end_state).or_insert(0) += 1;
    }
    let mut by_count: Vec<(i64, usize)> = end_states.into_iter().collect();
    by_count.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let top: Vec<String> = by_count
        .iter()
        .take(3)
        .map(|(code, count)| format!("{}({})", code, count))
        .collect();
    let _ = writeln!(out, "    end states: {}", top.join(", "));

    let mut conditions: BTreeMap<i64, (ConditionCode, usize)> = BTreeMap::new();
    for r in records {
        conditions.entry(r.condition.code()).or_insert((r.condition, 0)).1 += 1;
    }
    let conditions: Vec<String> = conditions
        .values()
        .map(|(c, count)| format!("{}({})", condition_name(*c), count))
        .collect();
    let _ = writeln!(out, "    conditions: {}", conditions.join(", "));

    if let Some(c_rate) = frame.c_rate() {
        let max = c_rate.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
        let mean = c_rate.iter().map(|c| c.abs()).sum::<f64>() / c_rate.len() as f64;
        let _ = writeln!(out, "    c-rate: mean {:.3}C, max {:.3}C", mean, max);
    }
}

/// Render per-category counts, the first `max_listed` indices, and a short
/// description of the first cycle in each non-empty category.
pub fn format_report(
    cycles: &[CycleFrame],
    partition: &CategoryPartition,
    max_listed: usize,
) -> String {
    let mut out = String::new();

    for category in Category::ALL {
        let indices = partition.indices(category);
        let _ = writeln!(out, "[{}] {} cycles", category, indices.len());

        if indices.is_empty() {
            continue;
        }

        let shown: Vec<String> = indices.iter().take(max_listed).map(usize::to_string).collect();
        let _ = write!(out, "  indices: {}", shown.join(", "));
        if indices.len() > max_listed {
            let _ = write!(out, " ... and {} more", indices.len() - max_listed);
        }
        let _ = writeln!(out);

        if let Some(frame) = cycles.get(indices[0]) {
            let _ = writeln!(out, "  representative cycle {}:", indices[0]);
            describe_cycle(&mut out, frame);
        }
    }

    out
}
