//! Configuration loading and discovery for `stylebook.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{
    DocsConfig, MediaConfig, OutputConfig, ProjectConfig, ScriptsConfig, ServeConfig,
    StylebookConfig, StylesConfig, ToolsConfig, WatchConfig,
};
use crate::build::BuildMode;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "stylebook.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse stylebook.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override output directory
    pub out: Option<PathBuf>,
    /// Override source directory
    pub src: Option<PathBuf>,
    /// Override dev server port
    pub port: Option<u16>,
}

/// A loaded configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The parsed and validated configuration
    pub config: StylebookConfig,
    /// Path of the config file, if one was found
    pub path: Option<PathBuf>,
    /// Directory all relative config paths are resolved against
    pub project_root: PathBuf,
}

/// Find stylebook.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for stylebook.toml
/// 2. Check XDG_CONFIG_HOME/stylebook/stylebook.toml (or ~/.config/stylebook/stylebook.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find stylebook.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("stylebook").join(CONFIG_FILE_NAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find stylebook.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a stylebook.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns the default
/// configuration.
pub fn load_config(path: Option<&Path>) -> Result<StylebookConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Locate, load and validate the configuration, and work out the project root.
///
/// The project root is the directory holding the config file, or the current
/// directory when running on defaults.
pub fn load_project(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    let cwd = env::current_dir()?;
    match config_path {
        Some(p) => {
            let config = load_config_file(&p)?;
            let project_root = p
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(|parent| parent.to_path_buf())
                .unwrap_or_else(|| cwd.clone());
            let project_root = resolve_path(&cwd, &project_root);
            Ok(LoadedConfig { config, path: Some(resolve_path(&cwd, &p)), project_root })
        }
        None => Ok(LoadedConfig { config: default_config(), path: None, project_root: cwd }),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<StylebookConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration text.
pub fn parse_config(contents: &str) -> Result<StylebookConfig, ConfigError> {
    let config: StylebookConfig = toml::from_str(contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok(config)
}

/// Create a default configuration when no stylebook.toml is found.
///
/// The project name is taken from the current directory name.
pub fn default_config() -> StylebookConfig {
    let project_name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unnamed".to_string());

    StylebookConfig {
        project: ProjectConfig {
            name: project_name,
            src: PathBuf::from("sass"),
            out: PathBuf::from("dist"),
        },
        styles: StylesConfig::default(),
        docs: DocsConfig::default(),
        scripts: ScriptsConfig::default(),
        index: None,
        media: MediaConfig::default(),
        output: OutputConfig::default(),
        watch: WatchConfig::default(),
        serve: ServeConfig::default(),
        tools: ToolsConfig::default(),
    }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut StylebookConfig, overrides: &CliOverrides) {
    if let Some(ref out) = overrides.out {
        config.project.out = out.clone();
    }

    if let Some(ref src) = overrides.src {
        config.project.src = src.clone();
    }

    if let Some(port) = overrides.port {
        config.serve.port = port;
    }
}

/// Environment variable selecting the build mode.
pub const MODE_ENV_VAR: &str = "STYLEBOOK_MODE";

/// Read the build mode from the environment.
///
/// Unset or empty means development. An unrecognised value is an error
/// rather than a silent fallback.
pub fn mode_from_env() -> Result<BuildMode, ConfigError> {
    match env::var(MODE_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => value.trim().parse::<BuildMode>().map_err(|e| {
            ConfigError::Validation(vec![format!("{}: {}", MODE_ENV_VAR, e)])
        }),
        _ => Ok(BuildMode::Development),
    }
}

/// Resolve a path relative to the project root.
///
/// If the path is absolute, returns it unchanged.
/// If relative, joins it with the project root.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
