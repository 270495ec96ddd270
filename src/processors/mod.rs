//! Categorization and analysis modules.

pub mod categorizer;
pub mod channels;
pub mod features;
pub mod labeler;
pub mod phases;
pub mod report;
pub mod verification;

// Re-export key types for convenience
pub use categorizer::{categorize_at, categorize_cycle, classify, CycleStats};
pub use channels::{
    category_totals, process_all_channels, process_channel, ChannelData, ProcessedChannel,
};
pub use features::{extract_all_features, extract_features, summarize_features, CycleFeatures};
pub use labeler::{
    apply_labels, categorize_cycles, categorize_cycles_par, label_cycles, CategoryPartition,
};
pub use phases::{
    categorize_all_cycle_phases, categorize_cycle_phases, summarize_phases, CRateLevel,
    PhaseLabel, PhaseSummary,
};
pub use report::format_report;
pub use verification::{reference_ground_truth, verify_partition, GroundTruth, VerificationReport};
