use crate::error::{Result, SwmmRunError};
use crate::report::MatchMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub swmm: SwmmConfig,
    pub report: ReportConfig,
    pub conversion: ConversionConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SwmmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    pub search_roots: Vec<PathBuf>,
    pub install_dir_prefix: String,
    pub executable_name: String,
    pub timeout: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    pub max_messages: usize,
    pub keywords: Vec<String>,
    pub match_mode: MatchMode,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Command line with `{gpkg}` and `{inp}` placeholders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub background: bool,
}

impl Default for SwmmConfig {
    fn default() -> Self {
        Self {
            executable: None,
            search_roots: default_search_roots(),
            install_dir_prefix: "EPA SWMM".to_string(),
            executable_name: default_executable_name().to_string(),
            timeout: 0, // wait indefinitely
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            keywords: vec!["ERROR".to_string(), "WARNING".to_string()],
            match_mode: MatchMode::Contains,
            case_sensitive: true,
        }
    }
}

fn default_search_roots() -> Vec<PathBuf> {
    ["ProgramFiles", "ProgramFiles(x86)"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn default_executable_name() -> &'static str {
    if cfg!(windows) {
        "runswmm.exe"
    } else {
        "runswmm"
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SwmmRunError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| SwmmRunError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| SwmmRunError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["swmmrun.toml", ".swmmrun.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref executable) = cli_args.executable {
            self.swmm.executable = Some(executable.clone());
        }

        if let Some(timeout) = cli_args.timeout {
            self.swmm.timeout = timeout;
        }

        if let Some(ref command) = cli_args.converter {
            self.conversion.command = Some(command.clone());
        }

        if cli_args.background {
            self.run.background = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.report.max_messages == 0 {
            return Err(SwmmRunError::Config {
                message: "report.max_messages must be greater than 0".to_string(),
            });
        }

        if self.report.keywords.is_empty() {
            return Err(SwmmRunError::Config {
                message: "At least one report keyword must be specified".to_string(),
            });
        }

        if self.report.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(SwmmRunError::Config {
                message: "Report keywords must not be blank".to_string(),
            });
        }

        if self.swmm.executable_name.trim().is_empty() {
            return Err(SwmmRunError::Config {
                message: "swmm.executable_name must not be empty".to_string(),
            });
        }

        if let Some(ref command) = self.conversion.command {
            if !command.contains("{gpkg}") || !command.contains("{inp}") {
                return Err(SwmmRunError::Config {
                    message: format!(
                        "conversion.command must contain both {{gpkg}} and {{inp}} placeholders: {}",
                        command
                    ),
                });
            }
        }

        Ok(())
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        match self.swmm.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn create_sample_config() -> String {
        let mut sample_config = Self::default();
        sample_config.conversion.command = Some("gpkg2inp {gpkg} {inp}".to_string());
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub executable: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub converter: Option<String>,
    pub background: bool,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_converter(mut self, converter: Option<String>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }
}
