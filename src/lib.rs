//! Battery cycler log reshaping and cycle categorization.
//!
//! This crate provides tools for:
//! - Loading normalized cycler record tables and cycle-summary tables
//! - Splitting a flat record table into per-cycle frames
//! - Deriving cycle time, cumulative capacity and C-rate per record
//! - Categorizing cycles (RPT, SOC definition, resistance measurement,
//!   accelerated aging) with a fixed decision list
//!
//! # Example
//!
//! ```no_run
//! use cycler_pipeline::core::loaders::load_records_csv;
//! use cycler_pipeline::core::transforms::{build_cycle_list, select_reference_capacity};
//! use cycler_pipeline::processors::labeler::label_cycles;
//!
//! let records = load_records_csv("channel_01.csv").unwrap();
//! let capacity = select_reference_capacity(None, Some(4500.0), 1000.0).unwrap();
//! let mut cycles = build_cycle_list(&records, capacity);
//! let partition = label_cycles(&mut cycles, false).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{CapacityConfig, PhaseConfig, PipelineConfig, ProcessingConfig, ReportConfig};
pub use crate::core::cycle::{Category, CycleError, CycleFrame};
pub use processors::labeler::CategoryPartition;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
