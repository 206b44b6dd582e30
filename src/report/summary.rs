use crate::error::{Result, SwmmRunError};
use crate::input::{InputKind, RunPaths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one SWMM run, printed at the end and serialized for
/// `--output-format json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub kind: InputKind,
    pub paths: RunPaths,
    pub executable: PathBuf,
    pub command_line: Vec<String>,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub background: bool,
    pub converted: bool,
    pub overrides_applied: bool,
    pub report_written: bool,
    pub messages: Vec<String>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.report_written
    }

    /// Converts the report into the run's final result.
    ///
    /// A non-zero exit code takes precedence over a missing report.
    pub fn outcome(&self) -> Result<()> {
        if self.exit_code != 0 {
            return Err(SwmmRunError::ExternalRunFailure {
                exit_code: self.exit_code,
            });
        }

        if !self.report_written {
            return Err(SwmmRunError::ReportMissing {
                path: self.paths.rpt.display().to_string(),
            });
        }

        Ok(())
    }

    pub fn display_summary(&self) -> String {
        let mut summary = format!(
            "{} -> {} (exit code {}, {:.1}s)",
            self.source.display(),
            self.paths.inp.display(),
            self.exit_code,
            self.duration.as_secs_f64()
        );
        if !self.messages.is_empty() {
            summary.push_str(&format!(", {} report message(s)", self.messages.len()));
            if self.truncated {
                summary.push('+');
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RunReport {
        RunReport {
            source: PathBuf::from("/models/base.inp"),
            kind: InputKind::Inp,
            paths: RunPaths::from_inp("/models/run2.inp"),
            executable: PathBuf::from("/opt/swmm/runswmm"),
            command_line: vec![
                "/opt/swmm/runswmm".to_string(),
                "/models/run2.inp".to_string(),
                "/models/run2.rpt".to_string(),
                "/models/run2.out".to_string(),
            ],
            exit_code: 0,
            started_at: Utc::now(),
            duration: Duration::from_millis(1500),
            background: false,
            converted: false,
            overrides_applied: true,
            report_written: true,
            messages: vec!["WARNING 04: minimum elevation drop used".to_string()],
            truncated: false,
            scan_error: None,
        }
    }

    #[test]
    fn test_successful_outcome() {
        let report = sample_report();
        assert!(report.succeeded());
        assert!(report.outcome().is_ok());
    }

    #[test]
    fn test_non_zero_exit_code_fails() {
        let mut report = sample_report();
        report.exit_code = 1;
        report.report_written = false;

        assert!(!report.succeeded());
        assert!(matches!(
            report.outcome(),
            Err(SwmmRunError::ExternalRunFailure { exit_code: 1 })
        ));
    }

    #[test]
    fn test_missing_report_fails() {
        let mut report = sample_report();
        report.report_written = false;

        let err = report.outcome().unwrap_err();
        assert!(err.is_run_failure());
        assert!(err.to_string().contains("run2.rpt"));
    }

    #[test]
    fn test_json_shape() {
        let report = sample_report();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["kind"], "inp");
        assert_eq!(json["paths"]["rpt"], "/models/run2.rpt");
        assert_eq!(json["exit_code"], 0);
        assert!(json.get("scan_error").is_none());
    }

    #[test]
    fn test_display_summary() {
        let mut report = sample_report();
        report.truncated = true;
        let summary = report.display_summary();

        assert!(summary.contains("/models/run2.inp"));
        assert!(summary.contains("exit code 0"));
        assert!(summary.contains("1 report message(s)+"));
    }
}
