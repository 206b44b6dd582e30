use clap::Parser;
use std::process;
use swmmrun::{Cli, OutputFormatter, OutputMode, SwmmRun, SwmmRunError, UserFriendlyError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    setup_logging();
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Handle special commands first
    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    // Create SwmmRun instance
    let swmm = match SwmmRun::from_cli(&cli) {
        Ok(swmm) => swmm,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    // Handle dry run mode
    if cli.dry_run {
        return handle_dry_run(&cli, &swmm);
    }

    let request = cli.run_request();
    match swmm.execute(&request).await {
        Ok(report) => {
            swmm.output_formatter().print_run_report(&report);

            match report.outcome() {
                Ok(()) => 0,
                Err(e) => {
                    swmm.handle_error(&e);
                    exit_code_for(&e)
                }
            }
        }
        Err(e) => {
            swmm.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(error: &SwmmRunError) -> i32 {
    match error {
        SwmmRunError::Cancelled => 130, // Interrupted (SIGINT)
        SwmmRunError::MissingInput | SwmmRunError::UnsupportedInput { .. } => 2,
        SwmmRunError::InputNotFound { .. } => 3,
        SwmmRunError::ExecutableNotFound { .. } => 4,
        SwmmRunError::ExternalRunFailure { .. } | SwmmRunError::ReportMissing { .. } => 5,
        SwmmRunError::Conversion { .. } | SwmmRunError::ConversionUnavailable => 6,
        SwmmRunError::Timeout { .. } => 9,
        _ => 1, // General error
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "swmmrun.toml".to_string());

    match SwmmRun::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  swmmrun <model.inp> --config {}", config_path);
            println!("\nEdit the file to point at your SWMM installation and converter.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(cli: &Cli, swmm: &SwmmRun) -> i32 {
    let formatter = swmm.output_formatter();
    let request = cli.run_request();

    formatter.info("DRY RUN MODE - SWMM will not be run");
    formatter.print_separator();

    let plan = match swmm.plan(&request) {
        Ok(plan) => plan,
        Err(e) => {
            swmm.handle_error(&e);
            return exit_code_for(&e);
        }
    };

    let executable = match swmm.locate_executable(&request) {
        Ok(path) => Some(path.display().to_string()),
        Err(e) => {
            formatter.warning(&e.user_message());
            None
        }
    };

    formatter.print_plan(
        &plan,
        executable.as_deref(),
        &request.overrides.display_summary(),
    );

    formatter.print_separator();
    formatter.success("Dry run completed successfully");
    formatter.info("Run without --dry-run to run the model");

    0
}

fn print_startup_error(error: &SwmmRunError) {
    // Create a basic formatter for startup errors
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}

fn setup_logging() {
    // Diagnostics go to stderr so JSON output on stdout stays parseable
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use swmmrun::Config;
    use tempfile::TempDir;

    #[test]
    fn test_generate_config_command() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let cli = Cli::try_parse_from([
            "swmmrun",
            "--generate-config",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        let exit_code = handle_generate_config(&cli);
        assert_eq!(exit_code, 0);

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[swmm]"));
        assert!(Config::load_from_file(&config_path).is_ok());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&SwmmRunError::Cancelled), 130);
        assert_eq!(exit_code_for(&SwmmRunError::MissingInput), 2);
        assert_eq!(
            exit_code_for(&SwmmRunError::InputNotFound {
                path: "a.inp".to_string()
            }),
            3
        );
        assert_eq!(
            exit_code_for(&SwmmRunError::ExecutableNotFound {
                details: String::new()
            }),
            4
        );
        assert_eq!(
            exit_code_for(&SwmmRunError::ExternalRunFailure { exit_code: 1 }),
            5
        );
        assert_eq!(exit_code_for(&SwmmRunError::ConversionUnavailable), 6);
        assert_eq!(exit_code_for(&SwmmRunError::Timeout { seconds: 5 }), 9);
        assert_eq!(
            exit_code_for(&SwmmRunError::Config {
                message: String::new()
            }),
            1
        );
    }
}
