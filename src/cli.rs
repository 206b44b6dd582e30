use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::input::{parse_date, parse_time, RunRequest};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "swmmrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run an EPA SWMM model from an INP or GeoPackage file")]
#[command(
    long_about = "swmmrun prepares a SWMM input file (copying an .inp or converting a TUFLOW-SWMM \
                  .gpkg), optionally rewrites the simulation start and end in [OPTIONS], runs \
                  runswmm and reports the first ERROR and WARNING lines of the report file."
)]
#[command(after_help = "EXAMPLES:\n  \
    swmmrun model.inp\n  \
    swmmrun model.inp --save-as run2 --start-date 06/01/2024 --end-date 06/02/2024\n  \
    swmmrun network.gpkg --converter \"gpkg2inp {gpkg} {inp}\"\n  \
    swmmrun model.inp --swmm-exe \"C:/Program Files/EPA SWMM 5.2.4/runswmm.exe\" --background")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// SWMM input file (.inp) or TUFLOW-SWMM GeoPackage (.gpkg)
    #[arg(required_unless_present = "generate_config")]
    pub input: Option<PathBuf>,

    /// Path to runswmm (searched for when omitted)
    #[arg(long, env = "SWMM_EXE")]
    pub swmm_exe: Option<PathBuf>,

    /// Basename for the .inp, .rpt and .out files (relative to the input's folder)
    #[arg(long, value_name = "NAME")]
    pub save_as: Option<String>,

    /// Simulation start date (MM/DD/YYYY or YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, value_name = "DATE")]
    pub start_date: Option<NaiveDate>,

    /// Simulation start time (HH:MM:SS or HH:MM)
    #[arg(long, value_parser = parse_time, value_name = "TIME")]
    pub start_time: Option<NaiveTime>,

    /// Simulation end date (MM/DD/YYYY or YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, value_name = "DATE")]
    pub end_date: Option<NaiveDate>,

    /// Simulation end time (HH:MM:SS or HH:MM)
    #[arg(long, value_parser = parse_time, value_name = "TIME")]
    pub end_time: Option<NaiveTime>,

    /// Run SWMM on a background worker with a progress spinner
    #[arg(long)]
    pub background: bool,

    /// Kill SWMM after this many seconds (0 waits indefinitely)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// GeoPackage converter command with {gpkg} and {inp} placeholders
    #[arg(long, value_name = "CMD")]
    pub converter: Option<String>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only warnings, errors and the final summary)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "Show the resolved paths and executable without running SWMM")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_executable(self.swmm_exe.clone())
            .with_timeout(self.timeout)
            .with_converter(self.converter.clone())
            .with_background(self.background)
    }

    pub fn run_request(&self) -> RunRequest {
        RunRequest {
            input: self.input.clone(),
            ..RunRequest::default()
        }
        .with_executable(self.swmm_exe.clone())
        .with_output_basename(self.save_as.clone())
        .with_start_date(self.start_date)
        .with_start_time(self.start_time)
        .with_end_date(self.end_date)
        .with_end_time(self.end_time)
    }
}
