use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use backdropconfig::CONFIG_FILE_NAME;
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "BACKDROP_CONFIG_DIR";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        Self::discover_with(|name| env::var_os(name))
    }

    /// Resolves directories with `lookup` standing in for the process environment.
    pub fn discover_with(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let config_dir = match lookup(ENV_CONFIG_DIR) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => ProjectDirs::from("org", "Backdrop", "Backdrop")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| anyhow!("failed to determine the user config directory"))?,
        };
        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The explicit file when given, else `backdrop.toml` in the config dir.
    pub fn resolve_config(&self, explicit: Option<&Path>) -> PathBuf {
        match explicit {
            Some(path) => path.to_path_buf(),
            None => self.config_dir.join(CONFIG_FILE_NAME),
        }
    }
}
