//! Per-cycle frames, categories and the core pipeline error type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::loaders::NormalizedRecord;

/// Errors raised by the splitting, deriving and categorization stages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    /// A statistic that needs at least one record was requested on an empty cycle.
    #[error("cycle at index {index} has no records")]
    EmptyCycle { index: usize },

    /// Invalid reference capacity or unrecognized category name.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cycle index {index} out of range for a list of {len} cycles")]
    IndexOutOfRange { index: usize, len: usize },

    /// Every voltage of the cycle is NaN or infinite.
    #[error("cycle at index {index} has no finite voltage")]
    NoFiniteVoltage { index: usize },
}

/// Result type for cycle operations.
pub type Result<T> = std::result::Result<T, CycleError>;

/// Operational category of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Unknown,
    /// Reference Performance Test
    #[serde(rename = "RPT")]
    Rpt,
    #[serde(rename = "SOC_Definition")]
    SocDefinition,
    #[serde(rename = "Resistance_Measurement")]
    ResistanceMeasurement,
    #[serde(rename = "Accelerated_Aging")]
    AcceleratedAging,
}

impl Category {
    /// Every category, in reporting order.
    pub const ALL: [Category; 5] = [
        Category::Unknown,
        Category::Rpt,
        Category::SocDefinition,
        Category::ResistanceMeasurement,
        Category::AcceleratedAging,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Unknown => "Unknown",
            Category::Rpt => "RPT",
            Category::SocDefinition => "SOC_Definition",
            Category::ResistanceMeasurement => "Resistance_Measurement",
            Category::AcceleratedAging => "Accelerated_Aging",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CycleError::Configuration(format!("unknown category '{}'", s)))
    }
}

/// Capacity used to normalize current into C-rate, fixed for a whole cycle list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceCapacity(f64);

impl ReferenceCapacity {
    /// Validates that the capacity is finite and strictly positive.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(CycleError::Configuration(format!(
                "reference capacity must be positive, got {}",
                value
            )))
        }
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

/// Fields computed from the raw records of one cycle, one value per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFields {
    /// Seconds since the first record of the cycle.
    pub time_in_cycle: Vec<f64>,
    /// Running charge throughput in mAh (left-endpoint integration).
    pub cumulative_capacity: Vec<f64>,
    /// Current divided by the reference capacity.
    pub c_rate: Vec<f64>,
}

/// Which optional columns a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSchema {
    pub has_derived: bool,
    pub has_step_id: bool,
    pub has_category: bool,
}

/// Records of a single cycle in source order, plus derived fields once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleFrame {
    cycle_id: i64,
    records: Vec<NormalizedRecord>,
    derived: Option<DerivedFields>,
    category: Option<Category>,
}

impl CycleFrame {
    /// Creates a frame without derived fields or category.
    pub fn new(cycle_id: i64, records: Vec<NormalizedRecord>) -> Self {
        Self {
            cycle_id,
            records,
            derived: None,
            category: None,
        }
    }

    #[inline]
    pub fn cycle_id(&self) -> i64 {
        self.cycle_id
    }

    #[inline]
    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    /// Returns the number of records in the cycle.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Minimum and maximum voltage over the finite values, or `None` when the
    /// cycle has none.
    pub fn voltage_bounds(&self) -> Option<(f64, f64)> {
        self.records
            .iter()
            .map(|r| r.voltage)
            .filter(|v| v.is_finite())
            .fold(None, |bounds, v| match bounds {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }

    pub fn derived(&self) -> Option<&DerivedFields> {
        self.derived.as_ref()
    }

    /// C-rate column, if derived fields have been computed.
    pub fn c_rate(&self) -> Option<&[f64]> {
        self.derived.as_ref().map(|d| d.c_rate.as_slice())
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn schema(&self) -> FrameSchema {
        FrameSchema {
            has_derived: self.derived.is_some(),
            has_step_id: !self.records.is_empty() && self.records.iter().all(|r| r.step_id.is_some()),
            has_category: self.category.is_some(),
        }
    }

    pub(crate) fn push(&mut self, record: NormalizedRecord) {
        self.records.push(record);
    }

    pub(crate) fn set_derived(&mut self, derived: DerivedFields) {
        debug_assert_eq!(derived.c_rate.len(), self.records.len());
        self.derived = Some(derived);
    }

    pub(crate) fn set_category(&mut self, category: Category) {
        self.category = Some(category);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::ConditionCode;

    #[test]
    fn test_category_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!(Category::Rpt.to_string(), "RPT");
    }

    #[test]
    fn test_unknown_category_name_is_configuration_error() {
        match "Calendar_Aging".parse::<Category>() {
            Err(CycleError::Configuration(msg)) => assert!(msg.contains("Calendar_Aging")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_capacity_validation() {
        assert_eq!(ReferenceCapacity::new(1000.0).unwrap().value(), 1000.0);
        assert!(ReferenceCapacity::new(0.0).is_err());
        assert!(ReferenceCapacity::new(-5.0).is_err());
        assert!(ReferenceCapacity::new(f64::NAN).is_err());
        assert!(ReferenceCapacity::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_voltage_bounds_skip_non_finite() {
        let rec = |v: f64| NormalizedRecord::new(0, 0.0, v, 0.0, ConditionCode::Rest, 64);

        let frame = CycleFrame::new(0, vec![rec(3600.0), rec(f64::NAN), rec(4100.0)]);
        assert_eq!(frame.voltage_bounds(), Some((3600.0, 4100.0)));

        let frame = CycleFrame::new(0, vec![rec(f64::NAN), rec(f64::INFINITY)]);
        assert_eq!(frame.voltage_bounds(), None);
        assert_eq!(CycleFrame::new(0, Vec::new()).voltage_bounds(), None);
    }

    #[test]
    fn test_frame_schema() {
        let mut record = NormalizedRecord::new(0, 0.0, 3600.0, 100.0, ConditionCode::Charge, 64);
        let frame = CycleFrame::new(0, vec![record]);
        let schema = frame.schema();
        assert!(!schema.has_derived);
        assert!(!schema.has_step_id);
        assert!(!schema.has_category);
        assert!(frame.c_rate().is_none());

        record.step_id = Some(3);
        let mut frame = CycleFrame::new(0, vec![record]);
        frame.set_category(Category::Rpt);
        let schema = frame.schema();
        assert!(schema.has_step_id);
        assert!(schema.has_category);
        assert_eq!(frame.category(), Some(Category::Rpt));
    }
}
