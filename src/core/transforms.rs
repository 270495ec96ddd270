//! Reshaping of flat record tables into per-cycle frames with derived fields.
//!
//! The flat table is grouped by cycle id in first-appearance order, then each
//! frame gets a cycle-relative time axis, cumulative charge throughput and a
//! C-rate computed against one reference capacity shared by the whole list.
//! Derivation is parallelized across cycles using Rayon.

use std::collections::HashMap;

use rayon::prelude::*;

use super::cycle::{CycleError, CycleFrame, DerivedFields, ReferenceCapacity, Result};
use super::loaders::{CycleSummary, NormalizedRecord};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Group records into cycle frames.
///
/// Frames are ordered by the first appearance of each cycle id (a stable
/// group-by, not a sort by id value). Row order inside each frame follows the
/// input. Empty input yields an empty list.
///
/// # Example
///
/// ```ignore
/// let cycles = split_cycles(&records);
/// assert_eq!(cycles.iter().map(|c| c.len()).sum::<usize>(), records.len());
/// ```
pub fn split_cycles(records: &[NormalizedRecord]) -> Vec<CycleFrame> {
    let mut position: HashMap<i64, usize> = HashMap::new();
    let mut cycles: Vec<CycleFrame> = Vec::new();

    for record in records {
        let idx = *position.entry(record.cycle_id).or_insert_with(|| {
            cycles.push(CycleFrame::new(record.cycle_id, Vec::new()));
            cycles.len() - 1
        });
        cycles[idx].push(*record);
    }

    cycles
}

/// Concatenate the records of every frame in list order.
pub fn flatten_cycles(cycles: &[CycleFrame]) -> Vec<NormalizedRecord> {
    let total: usize = cycles.iter().map(CycleFrame::len).sum();
    let mut records = Vec::with_capacity(total);
    for cycle in cycles {
        records.extend_from_slice(cycle.records());
    }
    records
}

/// Choose the reference capacity for a channel.
///
/// Preference order: first value of the summary's discharge capacity column,
/// first value of its generic capacity column, the nominal capacity (if
/// positive), then `fallback`.
///
/// # Errors
///
/// Returns `CycleError::Configuration` if a supplied nominal capacity is
/// negative or not finite, or if the chosen value is not a positive, finite
/// number.
pub fn select_reference_capacity(
    summary: Option<&CycleSummary>,
    nominal: Option<f64>,
    fallback: f64,
) -> Result<ReferenceCapacity> {
    if let Some(c) = nominal {
        if !c.is_finite() || c < 0.0 {
            return Err(CycleError::Configuration(format!(
                "nominal capacity must be positive, got {}",
                c
            )));
        }
    }

    // A zero nominal capacity means "not known".
    let value = summary
        .and_then(CycleSummary::first_capacity)
        .or_else(|| nominal.filter(|&c| c > 0.0))
        .unwrap_or(fallback);

    ReferenceCapacity::new(value)
}

/// Compute the derived fields of one frame.
///
/// - `time_in_cycle[i] = t[i] - t[0]`
/// - `cumulative_capacity[i] = sum(current[j] * (t[j] - t[j-1]) / 3600)` with
///   the first delta taken as zero (rectangular, not trapezoidal)
/// - `c_rate[i] = current[i] / capacity`
///
/// An empty frame gets empty derived columns.
pub fn derive_cycle_fields(frame: &mut CycleFrame, capacity: ReferenceCapacity) {
    let records = frame.records();
    let n = records.len();
    let cap = capacity.value();

    let mut time_in_cycle = Vec::with_capacity(n);
    let mut cumulative_capacity = Vec::with_capacity(n);
    let mut c_rate = Vec::with_capacity(n);

    let start = records.first().map_or(0.0, |r| r.elapsed_time_s);
    let mut prev_time = 0.0;
    let mut running = 0.0;
    let mut time_went_back = false;

    for (i, record) in records.iter().enumerate() {
        let t = record.elapsed_time_s - start;
        let dt = if i == 0 { 0.0 } else { t - prev_time };
        if dt < 0.0 {
            time_went_back = true;
        }

        running += record.current * dt / SECONDS_PER_HOUR;

        time_in_cycle.push(t);
        cumulative_capacity.push(running);
        c_rate.push(record.current / cap);
        prev_time = t;
    }

    if time_went_back {
        log::warn!(
            "cycle {}: elapsed time decreases within the cycle",
            frame.cycle_id()
        );
    }

    frame.set_derived(DerivedFields {
        time_in_cycle,
        cumulative_capacity,
        c_rate,
    });
}

/// Derive fields for every frame against a single reference capacity.
///
/// # Errors
///
/// Returns `CycleError::Configuration` if `reference_capacity` is not positive.
pub fn derive_all_fields(cycles: &mut [CycleFrame], reference_capacity: f64) -> Result<()> {
    let capacity = ReferenceCapacity::new(reference_capacity)?;
    cycles
        .par_iter_mut()
        .for_each(|frame| derive_cycle_fields(frame, capacity));
    Ok(())
}

/// Split a flat table and derive fields for every resulting frame.
pub fn build_cycle_list(
    records: &[NormalizedRecord],
    capacity: ReferenceCapacity,
) -> Vec<CycleFrame> {
    let mut cycles = split_cycles(records);
    cycles
        .par_iter_mut()
        .for_each(|frame| derive_cycle_fields(frame, capacity));
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::ConditionCode;

    fn record(cycle_id: i64, t: f64, current: f64) -> NormalizedRecord {
        NormalizedRecord::new(cycle_id, t, 3700.0, current, ConditionCode::Charge, 64)
    }

    #[test]
    fn test_split_cycles_preserves_order() {
        let records = vec![
            record(0, 0.0, 1.0),
            record(0, 1.0, 2.0),
            record(1, 2.0, 3.0),
            record(1, 3.0, 4.0),
            record(2, 4.0, 5.0),
        ];

        let cycles = split_cycles(&records);

        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0].len(), 2);
        assert_eq!(cycles[1].len(), 2);
        assert_eq!(cycles[2].len(), 1);
        assert_eq!(flatten_cycles(&cycles), records);
    }

    #[test]
    fn test_split_cycles_first_appearance_order() {
        let records = vec![
            record(7, 0.0, 1.0),
            record(3, 1.0, 2.0),
            record(7, 2.0, 3.0),
            record(5, 3.0, 4.0),
        ];

        let cycles = split_cycles(&records);

        let ids: Vec<i64> = cycles.iter().map(CycleFrame::cycle_id).collect();
        assert_eq!(ids, vec![7, 3, 5]);
        // Late rows join their existing group, keeping input order.
        let currents: Vec<f64> = cycles[0].records().iter().map(|r| r.current).collect();
        assert_eq!(currents, vec![1.0, 3.0]);
        assert_eq!(cycles.iter().map(CycleFrame::len).sum::<usize>(), records.len());
    }

    #[test]
    fn test_split_cycles_empty() {
        assert!(split_cycles(&[]).is_empty());
    }

    #[test]
    fn test_derive_cycle_fields_rectangular_integration() {
        let records = vec![
            record(4, 100.0, 100.0),
            record(4, 110.0, 100.0),
            record(4, 120.0, -50.0),
        ];
        let mut frame = CycleFrame::new(4, records);

        derive_cycle_fields(&mut frame, ReferenceCapacity::new(1000.0).unwrap());

        let derived = frame.derived().unwrap();
        assert_eq!(derived.time_in_cycle, vec![0.0, 10.0, 20.0]);

        let expected = [0.0, 100.0 * 10.0 / 3600.0, 100.0 * 10.0 / 3600.0 - 50.0 * 10.0 / 3600.0];
        for (got, want) in derived.cumulative_capacity.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{} != {}", got, want);
        }
        // A trapezoidal rule would give 0.3472 mAh at the last record.
        assert!((derived.cumulative_capacity[2] - 0.138_888_888_9).abs() < 1e-9);

        assert_eq!(derived.c_rate, vec![0.1, 0.1, -0.05]);
    }

    #[test]
    fn test_derive_cycle_fields_empty_frame() {
        let mut frame = CycleFrame::new(0, Vec::new());
        derive_cycle_fields(&mut frame, ReferenceCapacity::new(1000.0).unwrap());

        let derived = frame.derived().unwrap();
        assert!(derived.time_in_cycle.is_empty());
        assert!(derived.cumulative_capacity.is_empty());
        assert!(derived.c_rate.is_empty());
    }

    #[test]
    fn test_derive_all_fields_rejects_non_positive_capacity() {
        let mut cycles = split_cycles(&[record(0, 0.0, 1.0)]);

        assert!(matches!(
            derive_all_fields(&mut cycles, 0.0),
            Err(CycleError::Configuration(_))
        ));
        assert!(matches!(
            derive_all_fields(&mut cycles, -1000.0),
            Err(CycleError::Configuration(_))
        ));
        assert!(cycles[0].derived().is_none());
    }

    #[test]
    fn test_derive_all_fields_shares_capacity() {
        let records = vec![record(0, 0.0, 500.0), record(1, 5.0, 2000.0)];
        let mut cycles = split_cycles(&records);

        derive_all_fields(&mut cycles, 1000.0).unwrap();

        assert_eq!(cycles[0].c_rate().unwrap(), &[0.5]);
        assert_eq!(cycles[1].c_rate().unwrap(), &[2.0]);
        // Time restarts at zero for every cycle.
        assert_eq!(cycles[1].derived().unwrap().time_in_cycle, vec![0.0]);
    }

    #[test]
    fn test_select_reference_capacity_preference() {
        let summary = CycleSummary {
            discharge_capacity: Some(vec![4400.0, 4390.0]),
            capacity: None,
        };

        let cap = select_reference_capacity(Some(&summary), Some(4500.0), 1000.0).unwrap();
        assert_eq!(cap.value(), 4400.0);

        let cap = select_reference_capacity(None, Some(4500.0), 1000.0).unwrap();
        assert_eq!(cap.value(), 4500.0);

        let cap = select_reference_capacity(None, Some(0.0), 1000.0).unwrap();
        assert_eq!(cap.value(), 1000.0);

        let cap = select_reference_capacity(None, None, 1000.0).unwrap();
        assert_eq!(cap.value(), 1000.0);
    }

    #[test]
    fn test_select_reference_capacity_rejects_invalid_nominal() {
        for bad in [-4500.0, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(
                    select_reference_capacity(None, Some(bad), 1000.0),
                    Err(CycleError::Configuration(_))
                ),
                "nominal {} should be rejected",
                bad
            );
        }

        // A bad nominal is reported even when the summary would win.
        let summary = CycleSummary {
            discharge_capacity: Some(vec![4400.0]),
            capacity: None,
        };
        assert!(select_reference_capacity(Some(&summary), Some(-1.0), 1000.0).is_err());
    }

    #[test]
    fn test_select_reference_capacity_invalid_summary_value() {
        let summary = CycleSummary {
            discharge_capacity: Some(vec![0.0]),
            capacity: None,
        };

        assert!(matches!(
            select_reference_capacity(Some(&summary), Some(4500.0), 1000.0),
            Err(CycleError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_cycle_list() {
        let records = vec![record(0, 0.0, 1000.0), record(0, 36.0, 1000.0), record(1, 40.0, -1000.0)];

        let cycles = build_cycle_list(&records, ReferenceCapacity::new(1000.0).unwrap());

        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().all(|c| c.schema().has_derived));
        assert!((cycles[0].derived().unwrap().cumulative_capacity[1] - 10.0).abs() < 1e-12);
    }
}
