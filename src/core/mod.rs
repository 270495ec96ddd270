//! Core data types, I/O and reshaping.

pub mod cycle;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use cycle::{Category, CycleError, CycleFrame, DerivedFields, FrameSchema, ReferenceCapacity};
pub use loaders::{ConditionCode, CycleSummary, LoaderError, NormalizedRecord};
pub use transforms::{build_cycle_list, derive_all_fields, flatten_cycles, split_cycles};
pub use writers::{write_features_csv, write_labels_csv, WriteError};
