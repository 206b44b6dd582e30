use crate::error::{Result, SwmmRunError};
use std::path::Path;
use std::process::Command;

/// Turns a TUFLOW-SWMM GeoPackage into a SWMM `.inp` file.
pub trait GpkgConverter: Send + Sync {
    fn convert(&self, gpkg_file: &Path, inp_file: &Path) -> Result<()>;
}

/// Runs an external converter described by a command template such as
/// `gpkg2inp {gpkg} {inp}`.
///
/// The template is split on whitespace before the placeholders are
/// substituted, so paths containing spaces stay single arguments.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    template: String,
}

impl CommandConverter {
    pub fn new<S: Into<String>>(template: S) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn build_args(&self, gpkg_file: &Path, inp_file: &Path) -> Result<Vec<String>> {
        let gpkg = gpkg_file.to_string_lossy();
        let inp = inp_file.to_string_lossy();

        let args: Vec<String> = self
            .template
            .split_whitespace()
            .map(|part| part.replace("{gpkg}", &gpkg).replace("{inp}", &inp))
            .collect();

        if args.is_empty() {
            return Err(SwmmRunError::Config {
                message: "conversion.command is empty".to_string(),
            });
        }

        Ok(args)
    }
}

impl GpkgConverter for CommandConverter {
    fn convert(&self, gpkg_file: &Path, inp_file: &Path) -> Result<()> {
        let args = self.build_args(gpkg_file, inp_file)?;
        tracing::info!(command = %args.join(" "), "converting GeoPackage");

        let mut command = Command::new(&args[0]);
        command.args(&args[1..]);

        let output = command.output().map_err(|e| SwmmRunError::Conversion {
            message: format!("failed to start '{}': {}", args[0], e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| match output.status.code() {
                    Some(code) => format!("converter exited with code {}", code),
                    None => "converter was terminated by a signal".to_string(),
                });
            return Err(SwmmRunError::Conversion { message: detail });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_placeholders_are_substituted() {
        let converter = CommandConverter::new("gpkg2inp --in {gpkg} --out {inp}");
        let args = converter
            .build_args(
                &PathBuf::from("/data/my model.gpkg"),
                &PathBuf::from("/data/my model.inp"),
            )
            .unwrap();

        assert_eq!(
            args,
            vec![
                "gpkg2inp",
                "--in",
                "/data/my model.gpkg",
                "--out",
                "/data/my model.inp"
            ]
        );
    }

    #[test]
    fn test_empty_template_is_rejected() {
        let converter = CommandConverter::new("   ");
        let result = converter.build_args(Path::new("a.gpkg"), Path::new("a.inp"));
        assert!(matches!(result, Err(SwmmRunError::Config { .. })));
    }

    #[test]
    fn test_missing_converter_program() {
        let converter = CommandConverter::new("definitely-not-a-real-converter-xyz {gpkg} {inp}");
        let result = converter.convert(Path::new("a.gpkg"), Path::new("a.inp"));
        assert!(matches!(result, Err(SwmmRunError::Conversion { .. })));
    }
}
