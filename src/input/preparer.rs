use crate::error::{Result, SwmmRunError};
use crate::input::converter::GpkgConverter;
use crate::input::options::{apply_date_overrides, DateTimeOverrides};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Inp,
    GeoPackage,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "inp" => Ok(InputKind::Inp),
            "gpkg" => Ok(InputKind::GeoPackage),
            _ => Err(SwmmRunError::UnsupportedInput { extension }),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InputKind::Inp => "SWMM input (inp)",
            InputKind::GeoPackage => "GeoPackage (gpkg)",
        }
    }
}

/// Everything needed to prepare and run one SWMM simulation.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub input: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub output_basename: Option<String>,
    pub overrides: DateTimeOverrides,
}

impl RunRequest {
    pub fn new<P: Into<PathBuf>>(input: P) -> Self {
        Self {
            input: Some(input.into()),
            ..Default::default()
        }
    }

    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_output_basename(mut self, basename: Option<String>) -> Self {
        self.output_basename = basename;
        self
    }

    pub fn with_start_date(mut self, date: Option<NaiveDate>) -> Self {
        self.overrides.start_date = date;
        self
    }

    pub fn with_start_time(mut self, time: Option<NaiveTime>) -> Self {
        self.overrides.start_time = time;
        self
    }

    pub fn with_end_date(mut self, date: Option<NaiveDate>) -> Self {
        self.overrides.end_date = date;
        self
    }

    pub fn with_end_time(mut self, time: Option<NaiveTime>) -> Self {
        self.overrides.end_time = time;
        self
    }

    /// Trimmed basename, or `None` when absent or blank.
    pub fn basename(&self) -> Option<&str> {
        self.output_basename
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}

/// The `.inp` handed to SWMM and the report/output files derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPaths {
    pub inp: PathBuf,
    pub rpt: PathBuf,
    pub out: PathBuf,
}

impl RunPaths {
    pub fn from_inp<P: Into<PathBuf>>(inp: P) -> Self {
        let inp = inp.into();
        Self {
            rpt: inp.with_extension("rpt"),
            out: inp.with_extension("out"),
            inp,
        }
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.inp.parent().filter(|p| !p.as_os_str().is_empty())
    }

    fn create_parent_dirs(&self) -> Result<()> {
        for path in [&self.inp, &self.rpt, &self.out] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// What preparation decided, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPlan {
    pub kind: InputKind,
    pub source: PathBuf,
    pub paths: RunPaths,
}

impl InputPlan {
    /// An `.inp` source is copied when the target differs from it.
    pub fn requires_copy(&self) -> bool {
        self.kind == InputKind::Inp && !is_same_path(&self.source, &self.paths.inp)
    }
}

#[derive(Debug, Clone)]
pub struct PreparedInput {
    pub kind: InputKind,
    pub source: PathBuf,
    pub paths: RunPaths,
    pub copied: bool,
    pub converted: bool,
    pub overrides_applied: bool,
}

pub struct InputPreparer<'a> {
    converter: Option<&'a dyn GpkgConverter>,
}

impl<'a> InputPreparer<'a> {
    pub fn new() -> Self {
        Self { converter: None }
    }

    pub fn with_converter(mut self, converter: Option<&'a dyn GpkgConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Validates the request and derives the run paths without touching disk.
    pub fn plan(&self, request: &RunRequest) -> Result<InputPlan> {
        let input = request.input.as_ref().ok_or(SwmmRunError::MissingInput)?;
        if input.as_os_str().is_empty() {
            return Err(SwmmRunError::MissingInput);
        }

        let source = absolutize(input)?;
        if !source.is_file() {
            return Err(SwmmRunError::InputNotFound {
                path: source.display().to_string(),
            });
        }

        let kind = InputKind::from_path(&source)?;
        let inp = match resolve_basename_target(&source, request.basename()) {
            Some(target) => target,
            None => match kind {
                InputKind::Inp => source.clone(),
                InputKind::GeoPackage => source.with_extension("inp"),
            },
        };

        Ok(InputPlan {
            kind,
            source,
            paths: RunPaths::from_inp(inp),
        })
    }

    /// Produces exactly one `.inp` ready for SWMM, with overrides applied.
    pub fn prepare(&self, request: &RunRequest) -> Result<PreparedInput> {
        let plan = self.plan(request)?;
        plan.paths.create_parent_dirs()?;

        let mut copied = false;
        let mut converted = false;

        match plan.kind {
            InputKind::Inp => {
                if plan.requires_copy() {
                    fs::copy(&plan.source, &plan.paths.inp)?;
                    copied = true;
                    tracing::debug!(
                        from = %plan.source.display(),
                        to = %plan.paths.inp.display(),
                        "copied input file"
                    );
                }
            }
            InputKind::GeoPackage => {
                let converter = self.converter.ok_or(SwmmRunError::ConversionUnavailable)?;
                remove_stale_target(&plan.paths.inp)?;
                converter.convert(&plan.source, &plan.paths.inp)?;
                if !plan.paths.inp.is_file() {
                    return Err(SwmmRunError::Conversion {
                        message: format!(
                            "converter finished but did not write {}",
                            plan.paths.inp.display()
                        ),
                    });
                }
                converted = true;
            }
        }

        let overrides_applied = apply_date_overrides(&plan.paths.inp, &request.overrides)?;

        Ok(PreparedInput {
            kind: plan.kind,
            source: plan.source,
            paths: plan.paths,
            copied,
            converted,
            overrides_applied,
        })
    }
}

impl Default for InputPreparer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// `<base>.inp` next to the source (or at `base` when absolute).
///
/// A basename given with an extension loses it, so `run2.inp` and `run2`
/// both name `run2.inp`.
pub fn resolve_basename_target(source: &Path, basename: Option<&str>) -> Option<PathBuf> {
    let basename = basename.map(str::trim).filter(|b| !b.is_empty())?;

    let mut base_path = PathBuf::from(basename);
    if base_path.extension().is_some() {
        base_path.set_extension("");
    }
    if !base_path.is_absolute() {
        let parent = source.parent().unwrap_or_else(|| Path::new(""));
        base_path = parent.join(base_path);
    }
    base_path.set_extension("inp");

    Some(base_path)
}

/// Clears an `.inp` left by an earlier run so only fresh converter output counts.
fn remove_stale_target(inp: &Path) -> Result<()> {
    match fs::remove_file(inp) {
        Ok(()) => {
            tracing::debug!(inp = %inp.display(), "removed previous converter output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn is_same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
