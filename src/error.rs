use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwmmRunError {
    #[error("No SWMM input file was provided")]
    MissingInput,

    #[error("SWMM input file does not exist: {path}")]
    InputNotFound { path: String },

    #[error("Unsupported input type: {extension}")]
    UnsupportedInput { extension: String },

    #[error("SWMM executable not found: {details}")]
    ExecutableNotFound { details: String },

    #[error("SWMM exited with a non-zero exit code: {exit_code}")]
    ExternalRunFailure { exit_code: i32 },

    #[error("SWMM did not produce a report file: {path}")]
    ReportMissing { path: String },

    #[error("GeoPackage conversion failed: {message}")]
    Conversion { message: String },

    #[error("No GeoPackage converter is configured")]
    ConversionUnavailable,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation was cancelled by user")]
    Cancelled,

    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl SwmmRunError {
    /// True for failures of the SWMM run itself, as opposed to setup problems.
    pub fn is_run_failure(&self) -> bool {
        matches!(
            self,
            SwmmRunError::ExternalRunFailure { .. } | SwmmRunError::ReportMissing { .. }
        )
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for SwmmRunError {
    fn user_message(&self) -> String {
        match self {
            SwmmRunError::MissingInput => {
                "No SWMM input file was provided (expected an .inp or .gpkg file)".to_string()
            }
            SwmmRunError::InputNotFound { path } => {
                format!("SWMM input file does not exist: {}", path)
            }
            SwmmRunError::UnsupportedInput { extension } => {
                if extension.is_empty() {
                    "Unsupported input type: file has no extension".to_string()
                } else {
                    format!("Unsupported input type: .{}", extension)
                }
            }
            SwmmRunError::ExecutableNotFound { details } => {
                format!("SWMM executable not found: {}", details)
            }
            SwmmRunError::ExternalRunFailure { exit_code } => {
                format!("SWMM exited with a non-zero exit code: {}", exit_code)
            }
            SwmmRunError::ReportMissing { path } => {
                format!("SWMM finished but no report file was written: {}", path)
            }
            SwmmRunError::Conversion { message } => {
                format!("Failed to convert GeoPackage to SWMM input: {}", message)
            }
            SwmmRunError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            SwmmRunError::Timeout { seconds } => {
                format!("SWMM run timed out after {} seconds", seconds)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            SwmmRunError::MissingInput | SwmmRunError::UnsupportedInput { .. } => Some(
                "Pass the path to a SWMM .inp file or a TUFLOW-SWMM .gpkg file as the first argument.".to_string()
            ),
            SwmmRunError::InputNotFound { .. } => Some(
                "Check the spelling of the input path and that the file has not been moved.".to_string()
            ),
            SwmmRunError::ExecutableNotFound { .. } => Some(
                "Install EPA SWMM, add runswmm to your PATH, or pass --swmm-exe with the full path to the executable.".to_string()
            ),
            SwmmRunError::ExternalRunFailure { .. } | SwmmRunError::ReportMissing { .. } => Some(
                "Review the ERROR and WARNING lines above and the full report file for details.".to_string()
            ),
            SwmmRunError::Conversion { .. } => Some(
                "Check the converter output above; the GeoPackage may be missing required layers.".to_string()
            ),
            SwmmRunError::ConversionUnavailable => Some(
                "Set [conversion] command in the configuration file or pass --converter, e.g. --converter \"gpkg2inp {gpkg} {inp}\".".to_string()
            ),
            SwmmRunError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            SwmmRunError::Timeout { .. } => Some(
                "Increase the timeout with --timeout, or set it to 0 to wait indefinitely.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for SwmmRunError {
    fn from(error: toml::de::Error) -> Self {
        SwmmRunError::Config {
            message: error.to_string(),
        }
    }
}

impl From<tempfile::PersistError> for SwmmRunError {
    fn from(error: tempfile::PersistError) -> Self {
        SwmmRunError::Io(error.error)
    }
}

pub type Result<T> = std::result::Result<T, SwmmRunError>;
