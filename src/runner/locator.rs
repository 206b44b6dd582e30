use crate::config::SwmmConfig;
use crate::error::{Result, SwmmRunError};
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const VERSION_PATTERN: &str = r"(\d+)\.(\d+)\.(\d+)";

/// Finds the SWMM command-line engine.
///
/// Resolution order: explicit override, `<root>/<prefix>*/<name>` under each
/// search root (highest version wins), then `PATH`.
pub struct ExecutableLocator {
    search_roots: Vec<PathBuf>,
    install_dir_prefix: String,
    executable_name: String,
    path_var: Option<OsString>,
}

impl ExecutableLocator {
    pub fn new<S: Into<String>>(executable_name: S) -> Self {
        Self {
            search_roots: Vec::new(),
            install_dir_prefix: "EPA SWMM".to_string(),
            executable_name: executable_name.into(),
            path_var: std::env::var_os("PATH"),
        }
    }

    pub fn from_config(config: &SwmmConfig) -> Self {
        Self::new(config.executable_name.clone())
            .with_search_roots(config.search_roots.clone())
            .with_install_dir_prefix(config.install_dir_prefix.clone())
    }

    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    pub fn with_install_dir_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.install_dir_prefix = prefix.into();
        self
    }

    /// Replaces the `PATH` value searched as a last resort.
    pub fn with_path_var(mut self, path_var: Option<OsString>) -> Self {
        self.path_var = path_var;
        self
    }

    pub fn resolve(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = override_path {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(SwmmRunError::ExecutableNotFound {
                details: format!("SWMM executable does not exist: {}", path.display()),
            });
        }

        if let Some(installed) = self.find_installed()? {
            tracing::debug!(executable = %installed.display(), "using installed SWMM");
            return Ok(installed);
        }

        if let Some(on_path) = self.find_on_path() {
            tracing::debug!(executable = %on_path.display(), "using SWMM from PATH");
            return Ok(on_path);
        }

        Err(SwmmRunError::ExecutableNotFound {
            details: format!(
                "SWMM executable not provided and {} was not found in any '{}*' installation or on PATH",
                self.executable_name, self.install_dir_prefix
            ),
        })
    }

    /// All installed candidates, sorted so the preferred one is last.
    pub fn installed_candidates(&self) -> Result<Vec<PathBuf>> {
        let version_pattern = Regex::new(VERSION_PATTERN).map_err(|e| SwmmRunError::Config {
            message: format!("Invalid version pattern: {}", e),
        })?;
        let mut candidates = Vec::new();

        for root in &self.search_roots {
            let entries = WalkDir::new(root)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_dir());

            for entry in entries {
                let is_install_dir = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(&self.install_dir_prefix));
                if !is_install_dir {
                    continue;
                }

                let exe_path = entry.path().join(&self.executable_name);
                if exe_path.is_file() {
                    candidates.push(exe_path);
                }
            }
        }

        candidates.sort_by_cached_key(|path| {
            (
                version_key(&version_pattern, path),
                path.to_string_lossy().to_lowercase(),
            )
        });
        Ok(candidates)
    }

    pub fn find_installed(&self) -> Result<Option<PathBuf>> {
        Ok(self.installed_candidates()?.pop())
    }

    pub fn find_on_path(&self) -> Option<PathBuf> {
        let path_var = self.path_var.as_ref()?;
        std::env::split_paths(path_var)
            .map(|dir| dir.join(&self.executable_name))
            .find(|candidate| candidate.is_file())
    }
}

/// First `major.minor.patch` found in the path, or `(0, 0, 0)`.
pub fn version_key(pattern: &Regex, path: &Path) -> (u32, u32, u32) {
    let text = path.to_string_lossy();
    pattern
        .captures(&text)
        .map(|caps| {
            let part = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
            (part(1), part(2), part(3))
        })
        .unwrap_or((0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn install(root: &Path, dir_name: &str, exe_name: &str) -> PathBuf {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).unwrap();
        let exe = dir.join(exe_name);
        fs::write(&exe, b"").unwrap();
        exe
    }

    #[test]
    fn test_version_key() {
        let pattern = Regex::new(VERSION_PATTERN).unwrap();
        assert_eq!(
            version_key(&pattern, Path::new("C:/Program Files/EPA SWMM 5.2.4/runswmm.exe")),
            (5, 2, 4)
        );
        assert_eq!(version_key(&pattern, Path::new("/opt/EPA SWMM 5.10.0/runswmm")), (5, 10, 0));
        assert_eq!(version_key(&pattern, Path::new("/opt/EPA SWMM/runswmm")), (0, 0, 0));
    }

    #[test]
    fn test_override_must_exist() {
        let locator = ExecutableLocator::new("runswmm").with_path_var(None);
        let result = locator.resolve(Some(Path::new("/no/such/runswmm")));
        assert!(matches!(result, Err(SwmmRunError::ExecutableNotFound { .. })));
    }

    #[test]
    fn test_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        let exe = install(temp_dir.path(), "custom", "my-swmm");
        let locator = ExecutableLocator::new("runswmm").with_path_var(None);

        assert_eq!(locator.resolve(Some(exe.as_path())).unwrap(), exe);
    }

    #[test]
    fn test_highest_version_is_preferred() {
        let temp_dir = TempDir::new().unwrap();
        install(temp_dir.path(), "EPA SWMM 5.1.015", "runswmm");
        let newest = install(temp_dir.path(), "EPA SWMM 5.2.4", "runswmm");
        install(temp_dir.path(), "EPA SWMM 5.2.0", "runswmm");
        install(temp_dir.path(), "Other Tool 9.9.9", "runswmm");
        fs::create_dir_all(temp_dir.path().join("EPA SWMM 6.0.0")).unwrap();

        let locator = ExecutableLocator::new("runswmm")
            .with_search_roots(vec![temp_dir.path().to_path_buf()])
            .with_path_var(None);

        assert_eq!(locator.installed_candidates().unwrap().len(), 3);
        assert_eq!(locator.resolve(None).unwrap(), newest);
    }

    #[test]
    fn test_falls_back_to_path() {
        let roots_dir = TempDir::new().unwrap();
        let path_dir = TempDir::new().unwrap();
        let exe = install(path_dir.path(), "bin", "runswmm");

        let path_var = std::env::join_paths([
            roots_dir.path().to_path_buf(),
            path_dir.path().join("bin"),
        ])
        .unwrap();

        let locator = ExecutableLocator::new("runswmm")
            .with_search_roots(vec![roots_dir.path().to_path_buf()])
            .with_path_var(Some(path_var));

        assert_eq!(locator.resolve(None).unwrap(), exe);
    }

    #[test]
    fn test_nothing_found() {
        let temp_dir = TempDir::new().unwrap();
        let locator = ExecutableLocator::new("runswmm")
            .with_search_roots(vec![temp_dir.path().to_path_buf()])
            .with_path_var(None);

        let err = locator.resolve(None).unwrap_err();
        assert!(err.to_string().contains("runswmm"));
    }
}
