//! Build context containing configuration and paths for a build.

use crate::build::{BuildMode, OutputPlanner, PlannerError};
use crate::config::StylebookConfig;
use std::path::{Path, PathBuf};

/// Build context shared by every stage of a pipeline.
///
/// The context provides access to the configuration, the project root, the
/// output directory and the output planner for the selected mode.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: StylebookConfig,
    /// Project root directory (where stylebook.toml is located)
    project_root: PathBuf,
    /// Naming rules for the selected mode
    planner: OutputPlanner,
    /// Whether to run in verbose mode
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// Fails if the config overrides a naming rule for something that is not
    /// an artifact role.
    pub fn new(
        config: StylebookConfig,
        project_root: PathBuf,
        mode: BuildMode,
    ) -> Result<Self, PlannerError> {
        let planner = OutputPlanner::from_config(mode, &config.output)?;
        Ok(Self { config, project_root, planner, verbose: false })
    }

    /// Replace the planner.
    pub fn with_planner(mut self, planner: OutputPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &StylebookConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Build mode.
    pub fn mode(&self) -> BuildMode {
        self.planner.mode()
    }

    /// Output planner for the build mode.
    pub fn planner(&self) -> &OutputPlanner {
        &self.planner
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Get the style source directory (resolved to absolute path).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Get the output directory (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ArtifactRole;
    use crate::config::default_config;

    fn ctx(mode: BuildMode) -> BuildContext {
        BuildContext::new(default_config(), PathBuf::from("/project"), mode).unwrap()
    }

    #[test]
    fn test_build_context_paths() {
        let ctx = ctx(BuildMode::Development);
        assert_eq!(ctx.project_root(), Path::new("/project"));
        assert_eq!(ctx.src_dir(), PathBuf::from("/project/sass"));
        assert_eq!(ctx.out_dir(), PathBuf::from("/project/dist"));
        assert_eq!(ctx.resolve_path(Path::new("/other")), PathBuf::from("/other"));
        assert!(!ctx.is_verbose());
    }

    #[test]
    fn test_build_context_mode_selects_planner() {
        let ctx = ctx(BuildMode::Production);
        assert_eq!(ctx.mode(), BuildMode::Production);
        assert!(ctx.planner().rule(ArtifactRole::Style).unwrap().is_hashed());
    }

    #[test]
    fn test_build_context_rejects_bad_override() {
        let mut config = default_config();
        config.output.development.insert("fonts".to_string(), "x/[name]".to_string());
        let result = BuildContext::new(config, PathBuf::from("/project"), BuildMode::Development);
        assert!(matches!(result, Err(PlannerError::InvalidOverride(_))));
    }
}
