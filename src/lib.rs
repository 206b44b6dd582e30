pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod report;
pub mod runner;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{CliOverrides, Config, ConversionConfig, ReportConfig, RunConfig, SwmmConfig};
pub use error::{Result, SwmmRunError, UserFriendlyError};

// Core functionality re-exports
pub use input::{
    CommandConverter, DateTimeOverrides, GpkgConverter, InputKind, InputPlan, InputPreparer,
    PreparedInput, RunPaths, RunRequest,
};
pub use report::{MatchMode, ReportLine, ReportScan, ReportScanner, RunReport};
pub use runner::{ExecutableLocator, SwmmProcess};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use chrono::Utc;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;

/// Reports older than the run start by more than this still count as
/// written, to allow for coarse filesystem timestamps.
const REPORT_MTIME_SLACK_SECS: i64 = 2;

/// Main library interface: prepare, run and report on one SWMM model.
pub struct SwmmRun {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
    converter: Option<Box<dyn GpkgConverter>>,
}

impl SwmmRun {
    /// Create a new SwmmRun instance with the provided configuration
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let shutdown = GracefulShutdown::new()?;
        Ok(Self::with_shutdown(config, output_mode, verbose, quiet, shutdown))
    }

    /// Create a new SwmmRun instance for testing (no signal handler conflicts)
    #[cfg(test)]
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self::with_shutdown(config, output_mode, verbose, quiet, GracefulShutdown::new_for_test())
    }

    fn with_shutdown(
        config: Config,
        output_mode: OutputMode,
        verbose: u8,
        quiet: bool,
        shutdown: GracefulShutdown,
    ) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);
        let converter = config
            .conversion
            .command
            .as_ref()
            .map(|command| Box::new(CommandConverter::new(command.clone())) as Box<dyn GpkgConverter>);

        Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
            converter,
        }
    }

    /// Create SwmmRun instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        let output_mode = match cli_args.output_format {
            crate::cli::OutputFormat::Human => OutputMode::Human,
            crate::cli::OutputFormat::Json => OutputMode::Json,
            crate::cli::OutputFormat::Plain => OutputMode::Plain,
        };

        Self::new(config, output_mode, cli_args.verbose, cli_args.quiet)
    }

    /// Replaces the GeoPackage converter built from the configuration.
    pub fn with_converter(mut self, converter: Box<dyn GpkgConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Runs the model and fails unless SWMM exited cleanly and wrote a report.
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport> {
        let report = self.execute(request).await?;
        report.outcome()?;
        Ok(report)
    }

    /// Runs the model and returns what happened, including failed runs.
    ///
    /// Errors are returned only when SWMM could not be run at all; a
    /// non-zero exit code is recorded in the report instead.
    pub async fn execute(&self, request: &RunRequest) -> Result<RunReport> {
        self.shutdown.check_shutdown()?;

        let prepared = self.prepare_input(request)?;
        self.shutdown.check_shutdown()?;

        let executable = self.locate_executable(request)?;
        let process = SwmmProcess::new(&executable)
            .with_timeout(self.config.timeout_duration())
            .with_running_flag(self.shutdown.running_flag());

        let command_line = process.command_line(&prepared.paths);
        self.output_formatter
            .info(&format!("Running: {}", command_line.join(" ")));
        tracing::info!(command = %command_line.join(" "), background = self.config.run.background, "starting SWMM");

        let started_at = Utc::now();
        let run_started = FileTime::now();
        let timer = Instant::now();

        let exit_code = if self.config.run.background {
            self.run_in_background(process, &prepared.paths).await?
        } else {
            self.run_in_foreground(&process, &prepared.paths)?
        };
        let duration = timer.elapsed();
        self.shutdown.check_shutdown()?;

        let report_written = report_is_fresh(&prepared.paths.rpt, run_started);
        if !report_written {
            tracing::warn!(report = %prepared.paths.rpt.display(), "no report written by this run");
        }

        let (scan, scan_error) = self.scan_report(&prepared.paths.rpt);

        let report = RunReport {
            source: prepared.source,
            kind: prepared.kind,
            paths: prepared.paths,
            executable,
            command_line,
            exit_code,
            started_at,
            duration,
            background: self.config.run.background,
            converted: prepared.converted,
            overrides_applied: prepared.overrides_applied,
            report_written,
            messages: scan.messages,
            truncated: scan.truncated,
            scan_error,
        };
        tracing::info!(summary = %report.display_summary(), "run complete");
        Ok(report)
    }

    /// Resolves paths for a request without writing anything.
    pub fn plan(&self, request: &RunRequest) -> Result<InputPlan> {
        InputPreparer::new()
            .with_converter(self.converter.as_deref())
            .plan(request)
    }

    pub fn locate_executable(&self, request: &RunRequest) -> Result<PathBuf> {
        let override_path = request
            .executable
            .as_deref()
            .or(self.config.swmm.executable.as_deref());

        let executable = ExecutableLocator::from_config(&self.config.swmm).resolve(override_path)?;
        self.output_formatter
            .debug(&format!("Using SWMM executable: {}", executable.display()));
        Ok(executable)
    }

    fn prepare_input(&self, request: &RunRequest) -> Result<PreparedInput> {
        self.output_formatter.start_operation("Preparing SWMM input");

        let prepared = InputPreparer::new()
            .with_converter(self.converter.as_deref())
            .prepare(request)?;

        if prepared.converted {
            self.output_formatter.success(&format!(
                "Converted {} to {}",
                prepared.source.display(),
                prepared.paths.inp.display()
            ));
        } else if prepared.copied {
            self.output_formatter.info(&format!(
                "Copied {} to {}",
                prepared.source.display(),
                prepared.paths.inp.display()
            ));
        }

        if prepared.overrides_applied {
            self.output_formatter.info(&format!(
                "Updated [OPTIONS]: {}",
                request.overrides.display_summary()
            ));
        }

        tracing::info!(
            source = %prepared.source.display(),
            inp = %prepared.paths.inp.display(),
            kind = ?prepared.kind,
            "input prepared"
        );
        Ok(prepared)
    }

    fn run_in_foreground(&self, process: &SwmmProcess, paths: &RunPaths) -> Result<i32> {
        self.output_formatter.start_operation("Running SWMM");
        process.run(paths, |line| self.output_formatter.model_output(line))
    }

    /// Runs SWMM on a blocking worker while a spinner shows its latest line.
    async fn run_in_background(&self, process: SwmmProcess, paths: &RunPaths) -> Result<i32> {
        let spinner = self.progress_manager.create_spinner("Running SWMM");
        let pb = spinner.clone();
        let paths = paths.clone();
        let timer = Instant::now();

        let result = task::spawn_blocking(move || {
            process.run(&paths, |line| {
                tracing::debug!(line, "swmm");
                ui::progress::update_model_progress(&pb, line);
            })
        })
        .await
        .map_err(|e| {
            SwmmRunError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("SWMM worker failed: {}", e),
            ))
        })?;

        match result {
            Ok(exit_code) => {
                ui::progress::finish_progress_with_summary(
                    &spinner,
                    &format!("SWMM finished with exit code {}", exit_code),
                    timer.elapsed(),
                );
                Ok(exit_code)
            }
            Err(e) => {
                spinner.finish_and_clear();
                Err(e)
            }
        }
    }

    /// Scans the report and shows each match as a warning.
    ///
    /// A report that cannot be read is itself a warning and never fails the run.
    fn scan_report(&self, rpt: &Path) -> (ReportScan, Option<String>) {
        let scanner = ReportScanner::new(&self.config.report);

        match scanner.scan(rpt) {
            Ok(scan) => {
                for line in scan.display_lines() {
                    self.output_formatter.warning(&line);
                }
                tracing::debug!(
                    messages = scan.messages.len(),
                    truncated = scan.truncated,
                    "report scanned"
                );
                (scan, None)
            }
            Err(e) => {
                let message = format!("Could not read report {}: {}", rpt.display(), e);
                self.output_formatter.warning(&message);
                (ReportScan::default(), Some(message))
            }
        }
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    /// Get output formatter reference
    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    /// Check if shutdown has been requested
    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    /// Request graceful shutdown
    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    /// Handle error with user-friendly output
    pub fn handle_error(&self, error: &SwmmRunError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

/// True when `rpt` exists and was modified by a run that began at `since`.
fn report_is_fresh(rpt: &Path, since: FileTime) -> bool {
    let Ok(metadata) = std::fs::metadata(rpt) else {
        return false;
    };
    let modified = FileTime::from_last_modification_time(&metadata);
    let threshold = FileTime::from_unix_time(
        since.unix_seconds() - REPORT_MTIME_SLACK_SECS,
        since.nanoseconds(),
    );
    modified >= threshold
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        target: std::env::consts::ARCH.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_date: &'static str,
    pub target: String,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "swmmrun {} ({}) built on {} for {}",
            self.version, self.git_hash, self.build_date, self.target
        )
    }
}
