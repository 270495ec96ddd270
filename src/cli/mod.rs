//! Command-line interface for the cycler pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::loaders::{load_cycle_summary_csv, load_records_csv};
use crate::processors::channels::{process_channel, ChannelData, ProcessedChannel};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "cycler-pipeline")]
#[command(about = "Battery cycler cycle categorization pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by every subcommand.
#[derive(clap::Args)]
struct ChannelArgs {
    /// Normalized record CSV for one channel
    records: PathBuf,
    /// Cycle-summary CSV used to pick the reference capacity
    #[arg(short, long)]
    summary: Option<PathBuf>,
    /// Nominal capacity in mAh
    #[arg(long)]
    capacity: Option<f64>,
    /// Categorize cycles in parallel
    #[arg(long)]
    parallel: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, derive and categorize the cycles of a channel
    Classify {
        #[command(flatten)]
        input: ChannelArgs,
        /// Write per-cycle labels to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export per-cycle features and per-category statistics
    Features {
        #[command(flatten)]
        input: ChannelArgs,
        /// Output feature CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compare the categorization with the reference dataset ground truth
    Verify {
        #[command(flatten)]
        input: ChannelArgs,
    },

    /// Break one cycle into condition, C-rate level and end-state phases
    Phases {
        #[command(flatten)]
        input: ChannelArgs,
        /// Cycle index in the channel's cycle list
        #[arg(long, default_value_t = 0)]
        cycle: usize,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Classify { input, output } => cmd_classify(&input, output.as_deref(), &config),
        Commands::Features { input, output } => cmd_features(&input, &output, &config),
        Commands::Verify { input } => cmd_verify(&input, &config),
        Commands::Phases { input, cycle } => cmd_phases(&input, cycle, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Load a channel from disk and run the pipeline on it.
///
/// The spinner is cleared on every exit path.
fn load_and_process(args: &ChannelArgs, config: &PipelineConfig) -> Result<ProcessedChannel> {
    let spinner = create_spinner("Loading records...");
    let result = load_and_process_with(args, config, &spinner);
    spinner.finish_and_clear();
    result
}

fn load_and_process_with(
    args: &ChannelArgs,
    config: &PipelineConfig,
    spinner: &ProgressBar,
) -> Result<ProcessedChannel> {
    let records = load_records_csv(&args.records)
        .with_context(|| format!("failed to load records from {}", args.records.display()))?;

    let summary = args
        .summary
        .as_ref()
        .map(|path| {
            load_cycle_summary_csv(path)
                .with_context(|| format!("failed to load cycle summary from {}", path.display()))
        })
        .transpose()?;

    let name = args
        .records
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "channel".to_string());

    let mut channel = ChannelData::new(name, records);
    channel.summary = summary;
    channel.nominal_capacity = args.capacity;

    let mut config = config.clone();
    config.processing.parallel |= args.parallel;

    spinner.set_message("Categorizing cycles...");
    process_channel(&channel, &config)
        .with_context(|| format!("failed to process channel {}", channel.name))
}

fn cmd_classify(args: &ChannelArgs, output: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    use crate::core::writers::write_labels_csv;
    use crate::processors::report::format_report;

    let start = Instant::now();
    let channel = load_and_process(args, config)?;

    println!(
        "{}",
        format_report(
            &channel.cycles,
            &channel.partition,
            config.report.max_listed_indices
        )
    );

    if let Some(path) = output {
        write_labels_csv(path, &channel.cycles, &channel.partition)
            .with_context(|| format!("failed to write labels to {}", path.display()))?;
        info!("Labels CSV -> {}", path.display());
    }

    let mut items = vec![
        ("Channel", channel.name.clone()),
        ("Reference capacity", format!("{} mAh", channel.reference_capacity.value())),
        ("Cycles", channel.cycles.len().to_string()),
    ];
    for (category, indices) in channel.partition.non_empty() {
        items.push((category.as_str(), indices.len().to_string()));
    }
    if let Some(path) = output {
        items.push(("Labels CSV", path.display().to_string()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Classification Complete", &items);
    Ok(())
}

fn cmd_features(args: &ChannelArgs, output: &Path, config: &PipelineConfig) -> Result<()> {
    use crate::core::writers::write_features_csv;
    use crate::processors::features::{extract_all_features, features_by_category, summarize_features};

    let start = Instant::now();
    let channel = load_and_process(args, config)?;

    let features = extract_all_features(&channel.cycles)?;
    write_features_csv(output, &features)
        .with_context(|| format!("failed to write features to {}", output.display()))?;

    for (category, group) in features_by_category(&channel.cycles, &channel.partition)? {
        if group.is_empty() {
            continue;
        }
        println!("[{}] n={}", category, group.len());
        for (name, stats) in summarize_features(&group) {
            println!(
                "  {:<18} mean {:>10.3} ± {:<10.3} range [{:.3}, {:.3}]",
                name,
                stats.mean,
                stats.std.unwrap_or(0.0),
                stats.min,
                stats.max
            );
        }
    }

    print_summary(
        "Feature Export Complete",
        &[
            ("Channel", channel.name.clone()),
            ("Cycles", features.len().to_string()),
            ("Features CSV", output.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_verify(args: &ChannelArgs, config: &PipelineConfig) -> Result<()> {
    use crate::processors::verification::{reference_ground_truth, verify_partition};

    let start = Instant::now();
    let channel = load_and_process(args, config)?;

    let truth = reference_ground_truth();
    let report = verify_partition(&channel.partition, &truth);

    for check in &report.checks {
        if check.matches() {
            println!("OK    {:<24} {} cycles", check.category, check.expected);
        } else {
            println!(
                "FAIL  {:<24} expected {}, got {}; missing {:?}, extra {:?}",
                check.category, check.expected, check.actual, check.missing, check.extra
            );
        }
    }

    print_summary(
        "Verification Complete",
        &[
            ("Channel", channel.name.clone()),
            ("All categories match", report.all_match().to_string()),
            ("Accuracy", format!("{:.2}%", report.accuracy() * 100.0)),
            ("Correct", format!("{}/{}", report.correct, report.total)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if !report.all_match() {
        anyhow::bail!("categorization does not match the reference ground truth");
    }
    Ok(())
}

fn cmd_phases(args: &ChannelArgs, index: usize, config: &PipelineConfig) -> Result<()> {
    use crate::core::cycle::CycleError;
    use crate::processors::phases::{categorize_all_cycle_phases, format_phase_report};

    let start = Instant::now();
    let channel = load_and_process(args, config)?;

    let frame = channel.cycles.get(index).ok_or(CycleError::IndexOutOfRange {
        index,
        len: channel.cycles.len(),
    })?;
    println!("{}", format_phase_report(frame, index, &config.phases)?);

    let labels = categorize_all_cycle_phases(&channel.cycles, &config.phases)?;
    let labeled: usize = labels.iter().map(Vec::len).sum();

    print_summary(
        "Phase Analysis Complete",
        &[
            ("Channel", channel.name.clone()),
            ("Cycle", format!("{} of {}", index, channel.cycles.len())),
            ("Category", channel.partition.category_of(index)?.to_string()),
            ("Records labeled", labeled.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn channel_args(records: PathBuf, capacity: Option<f64>) -> ChannelArgs {
        ChannelArgs {
            records,
            summary: None,
            capacity,
            parallel: false,
        }
    }

    #[test]
    fn test_load_and_process() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cell_2000mAh.csv");
        fs::write(
            &path,
            "cycle_id,elapsed_time_s,voltage,current,condition_code,end_state_code\n\
             0,0,3600,100,1,65\n\
             0,1,3650,100,1,65\n",
        )
        .unwrap();

        let channel = load_and_process(&channel_args(path, None), &PipelineConfig::default()).unwrap();
        assert_eq!(channel.name, "cell_2000mAh");
        assert_eq!(channel.reference_capacity.value(), 2000.0);
        assert_eq!(channel.cycles.len(), 1);
    }

    #[test]
    fn test_processing_error_names_the_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ch07.csv");
        fs::write(
            &path,
            "cycle_id,elapsed_time_s,voltage,current,condition_code,end_state_code\n\
             0,0,3600,100,1,65\n",
        )
        .unwrap();

        let err = load_and_process(&channel_args(path, Some(-4500.0)), &PipelineConfig::default())
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("failed to process channel ch07"), "{}", message);
        assert!(message.contains("nominal capacity"), "{}", message);
    }

    #[test]
    fn test_load_error_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.csv");

        let err = load_and_process(&channel_args(path, None), &PipelineConfig::default())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to load records from"));
    }
}
