//! Command-line entry point for the quiz ETL pipeline.
//!
//! Loads a test file and a dev file of line-delimited JSON quiz records into
//! a SQLite database, one after the other.

use clap::{Parser, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::{LevelFilter, error, info};
use quiz_etl::{
    DbLocation, DedupPolicy, FilterPolicy, KeyPolicy, Pipeline, PipelineOptions, PipelineReport,
    progress::{ProgressCallback, ProgressUpdate},
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "ETL pipeline for multiple-choice quiz questions", long_about = None)]
struct Cli {
    /// Test JSON file
    #[arg(long)]
    test_file: PathBuf,

    /// Dev JSON file
    #[arg(long)]
    dev_file: PathBuf,

    /// Database location (sqlite:///<path>, a plain path, or :memory:)
    #[arg(long, default_value = "sqlite:///etl_data.db")]
    db_path: DbLocation,

    /// Preset for key handling, filtering and deduplication
    #[arg(long, value_enum, default_value_t = Variant::Strict)]
    variant: Variant,

    /// Override the answer-key filter (any-correct, first-is-correct)
    #[arg(long)]
    filter: Option<FilterPolicy>,

    /// Override deduplication (skip-existing, always-insert)
    #[arg(long)]
    dedup: Option<DedupPolicy>,

    /// Override required-key handling (strict, lenient)
    #[arg(long)]
    keys: Option<KeyPolicy>,

    /// Set verbosity level (use -v or -vv for increasing verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Variant {
    Strict,
    Lenient,
}

impl Cli {
    fn pipeline_options(&self) -> PipelineOptions {
        let mut options = match self.variant {
            Variant::Strict => PipelineOptions::strict(),
            Variant::Lenient => PipelineOptions::lenient(),
        }
        .with_db(self.db_path.clone());

        if let Some(filter) = self.filter {
            options.filter = filter;
        }
        if let Some(dedup) = self.dedup {
            options.load.dedup = dedup;
        }
        if let Some(keys) = self.keys {
            options.key_policy = keys;
        }
        options
    }
}

/// Sets up logging based on verbosity level. `RUST_LOG` takes precedence.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, log_level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                buf.timestamp_seconds(),
                record.level(),
                record.args()
            )
        })
        .init();
}

/// Creates a progress callback that drives a single progress bar.
fn create_progress_callback(bar: ProgressBar) -> ProgressCallback {
    Box::new(move |update: ProgressUpdate| {
        if update.current_item == 0 {
            bar.reset();
            bar.set_length(update.total_items.unwrap_or(0));
            bar.set_prefix(update.stage_description);
            return;
        }
        bar.set_position(update.current_item);
        if let Some(msg) = update.message {
            bar.set_message(msg);
        }
        if let Some(total) = update.total_items {
            if update.current_item >= total {
                bar.finish_and_clear();
            }
        }
    })
}

fn new_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{prefix:>12.cyan.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {wide_msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_report(report: &PipelineReport) {
    println!(
        "\n{} {}",
        "Loaded".green().bold(),
        report.source.display().to_string().cyan()
    );
    println!(
        "  {} records extracted, {} kept after filtering",
        report.records_extracted, report.questions_kept
    );
    println!(
        "  {} questions and {} options written, {} duplicates skipped",
        report.load.questions_written.to_string().bold(),
        report.load.options_written.to_string().bold(),
        report.load.duplicates_skipped
    );
    for count in &report.topic_counts {
        println!("    {:<20} {}", count.topic.magenta(), count.question_count);
    }
}

fn process_file(pipeline: &Pipeline, path: &Path) -> quiz_etl::Result<PipelineReport> {
    let bar = new_progress_bar();
    let result = pipeline.run_with_progress(path, Some(create_progress_callback(bar.clone())));
    bar.finish_and_clear();
    result
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let options = cli.pipeline_options();
    info!(
        "Running pipeline (keys: {}, filter: {}, dedup: {}) into {}",
        options.key_policy, options.filter, options.load.dedup, options.db
    );
    let pipeline = Pipeline::new(options);

    for file in [&cli.test_file, &cli.dev_file] {
        match process_file(&pipeline, file) {
            Ok(report) => print_report(&report),
            Err(e) => {
                error!("Pipeline failed for {}: {}", file.display(), e);
                eprintln!(
                    "{}",
                    format!("Error processing '{}': {}", file.display(), e).red()
                );
                std::process::exit(1);
            }
        }
    }
}
