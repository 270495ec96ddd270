//! End-to-end processing of one or more cycler channels.
//!
//! Each channel goes through the full pipeline independently:
//! reference capacity selection → split → derive → categorize. Channels share
//! nothing, so several channels are processed in parallel.

use std::collections::HashMap;

use rayon::prelude::*;

use super::labeler::{categorize_cycles, categorize_cycles_par, label_cycles, CategoryPartition};
use crate::config::PipelineConfig;
use crate::core::cycle::{Category, CycleError, CycleFrame, ReferenceCapacity, Result};
use crate::core::loaders::{nominal_capacity_from_name, CycleSummary, NormalizedRecord};
use crate::core::transforms::{build_cycle_list, select_reference_capacity};

/// Raw inputs of one channel.
#[derive(Debug, Clone)]
pub struct ChannelData {
    /// Channel name, typically the source folder name.
    pub name: String,
    pub records: Vec<NormalizedRecord>,
    pub summary: Option<CycleSummary>,
    /// Nominal capacity in mAh; falls back to the config, then to the name.
    pub nominal_capacity: Option<f64>,
}

impl ChannelData {
    pub fn new(name: impl Into<String>, records: Vec<NormalizedRecord>) -> Self {
        Self {
            name: name.into(),
            records,
            summary: None,
            nominal_capacity: None,
        }
    }
}

/// A channel after splitting, deriving and categorizing.
#[derive(Debug, Clone)]
pub struct ProcessedChannel {
    pub name: String,
    pub reference_capacity: ReferenceCapacity,
    pub cycles: Vec<CycleFrame>,
    pub partition: CategoryPartition,
}

impl ProcessedChannel {
    /// Frames of this channel assigned to `category`.
    pub fn cycles_in(&self, category: Category) -> Result<Vec<&CycleFrame>> {
        self.partition.cycles_in(&self.cycles, category)
    }

    /// Like [`ProcessedChannel::cycles_in`], looking the category up by name.
    pub fn cycles_in_named(&self, name: &str) -> Result<Vec<&CycleFrame>> {
        let category = name.parse()?;
        self.cycles_in(category)
    }
}

/// Run the full pipeline on one channel.
///
/// # Errors
///
/// Returns `CycleError::Configuration` if the selected reference capacity is
/// invalid, or `CycleError::EmptyCycle` from categorization.
pub fn process_channel(channel: &ChannelData, config: &PipelineConfig) -> Result<ProcessedChannel> {
    let nominal = channel
        .nominal_capacity
        .or(config.capacity.nominal_capacity)
        .or_else(|| nominal_capacity_from_name(&channel.name));

    let capacity = select_reference_capacity(
        channel.summary.as_ref(),
        nominal,
        config.capacity.fallback_capacity,
    )
    .map_err(|e| match e {
        CycleError::Configuration(msg) => {
            CycleError::Configuration(format!("channel {}: {}", channel.name, msg))
        }
        other => other,
    })?;
    log::info!(
        "{}: reference capacity {} mAh",
        channel.name,
        capacity.value()
    );

    let mut cycles = build_cycle_list(&channel.records, capacity);

    let partition = if config.processing.write_labels {
        label_cycles(&mut cycles, config.processing.parallel)?
    } else if config.processing.parallel {
        categorize_cycles_par(&cycles)?
    } else {
        categorize_cycles(&cycles)?
    };

    log::info!("{}: {} cycles categorized", channel.name, cycles.len());
    for (category, indices) in partition.non_empty() {
        log::info!("{}:   {} = {}", channel.name, category, indices.len());
    }

    Ok(ProcessedChannel {
        name: channel.name.clone(),
        reference_capacity: capacity,
        cycles,
        partition,
    })
}

/// Process every channel, keeping input order.
///
/// # Errors
///
/// Fails if any channel fails; no partial result is returned.
pub fn process_all_channels(
    channels: &[ChannelData],
    config: &PipelineConfig,
) -> Result<Vec<ProcessedChannel>> {
    let processed = channels
        .par_iter()
        .map(|channel| process_channel(channel, config))
        .collect::<Result<Vec<_>>>()?;

    let total: usize = processed.iter().map(|c| c.cycles.len()).sum();
    log::info!("{} channels, {} cycles", processed.len(), total);

    Ok(processed)
}

/// Number of cycles per category across channels. Every category is present.
pub fn category_totals(channels: &[ProcessedChannel]) -> HashMap<Category, usize> {
    let mut totals: HashMap<Category, usize> = Category::ALL.iter().map(|&c| (c, 0)).collect();
    for channel in channels {
        for category in Category::ALL {
            *totals.entry(category).or_insert(0) += channel.partition.indices(category).len();
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::ConditionCode;

    /// Cycle 0 is an RPT, cycle 1 is accelerated aging at a 1000 mAh reference.
    fn records() -> Vec<NormalizedRecord> {
        let mut records = Vec::new();
        for i in 0..50 {
            let v = if i == 0 { 3000.0 } else { 4500.0 };
            records.push(NormalizedRecord::new(0, i as f64, v, 500.0, ConditionCode::Charge, 64));
        }
        for i in 0..300 {
            let v = if i == 0 { 3200.0 } else { 4300.0 };
            records.push(NormalizedRecord::new(
                1,
                100.0 + i as f64,
                v,
                -2000.0,
                ConditionCode::Discharge,
                65,
            ));
        }
        records
    }

    #[test]
    fn test_process_channel() {
        let channel = ChannelData::new("ch01", records());
        let processed = process_channel(&channel, &PipelineConfig::default()).unwrap();

        assert_eq!(processed.reference_capacity.value(), 1000.0);
        assert_eq!(processed.cycles.len(), 2);
        assert_eq!(processed.partition.indices(Category::Rpt), &[0]);
        assert_eq!(processed.partition.indices(Category::AcceleratedAging), &[1]);
        assert!(processed.partition.is_consistent_with(&processed.cycles));
        assert_eq!(processed.cycles_in_named("RPT").unwrap().len(), 1);
        assert!(processed.cycles_in_named("Bogus").is_err());
    }

    #[test]
    fn test_capacity_from_channel_name() {
        // At 4000 mAh the aging cycle runs at 0.5C and is no longer aging.
        let channel = ChannelData::new("cell_4000mAh_ch02", records());
        let processed = process_channel(&channel, &PipelineConfig::default()).unwrap();

        assert_eq!(processed.reference_capacity.value(), 4000.0);
        assert!(processed.partition.indices(Category::AcceleratedAging).is_empty());
    }

    #[test]
    fn test_summary_capacity_wins() {
        let mut channel = ChannelData::new("cell_4000mAh", records());
        channel.summary = Some(CycleSummary {
            discharge_capacity: Some(vec![1100.0]),
            capacity: None,
        });

        let processed = process_channel(&channel, &PipelineConfig::default()).unwrap();
        assert_eq!(processed.reference_capacity.value(), 1100.0);
    }

    #[test]
    fn test_invalid_capacity_is_configuration_error() {
        let mut config = PipelineConfig::default();
        config.capacity.fallback_capacity = 0.0;
        let channel = ChannelData::new("ch03", records());

        match process_channel(&channel, &config) {
            Err(CycleError::Configuration(msg)) => assert!(msg.contains("ch03")),
            other => panic!("Expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_labels_not_written_when_disabled() {
        let mut config = PipelineConfig::default();
        config.processing.write_labels = false;
        config.processing.parallel = true;

        let processed = process_channel(&ChannelData::new("ch04", records()), &config).unwrap();
        assert!(processed.cycles.iter().all(|c| c.category().is_none()));
        assert_eq!(processed.partition.len(), 2);
    }

    #[test]
    fn test_process_all_channels_and_totals() {
        let channels = vec![
            ChannelData::new("a", records()),
            ChannelData::new("b", records()),
            ChannelData::new("c", Vec::new()),
        ];

        let processed = process_all_channels(&channels, &PipelineConfig::default()).unwrap();
        let names: Vec<&str> = processed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(processed[2].cycles.is_empty());

        let totals = category_totals(&processed);
        assert_eq!(totals.len(), Category::ALL.len());
        assert_eq!(totals[&Category::Rpt], 2);
        assert_eq!(totals[&Category::AcceleratedAging], 2);
        assert_eq!(totals[&Category::Unknown], 0);
    }
}
