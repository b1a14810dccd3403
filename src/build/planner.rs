//! Output path planning.
//!
//! Maps an artifact role and logical name to a path relative to the output
//! directory. Names are templates with `[name]`, `[ext]` and `[hash]`
//! placeholders; a template containing `[hash]` can only be turned into a
//! concrete path once the artifact's content exists, so nothing downstream can
//! predict a hashed name.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::build::ArtifactRole;
use crate::config::OutputConfig;

/// Number of hex digits of the content hash embedded in file names.
pub const HASH_LEN: usize = 20;

/// Build mode, selecting naming rules and compiler optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Stable names, unminified scripts
    #[default]
    Development,
    /// Content-hashed names, minified output
    Production,
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Development => write!(f, "development"),
            BuildMode::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(BuildMode::Development),
            "production" | "prod" => Ok(BuildMode::Production),
            other => Err(format!("unknown build mode '{}'", other)),
        }
    }
}

/// Planner errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlannerError {
    /// No naming rule exists for the role in the current mode
    #[error("no output naming rule for role '{0}'")]
    UnknownRole(ArtifactRole),
    /// A rule override in the config does not name a role
    #[error("invalid naming rule override: {0}")]
    InvalidOverride(String),
}

/// A naming rule template such as `css/[name].[hash].min.css`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingRule {
    template: String,
}

impl NamingRule {
    /// Create a rule from a template.
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    /// The raw template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether paths following this rule embed a content hash.
    pub fn is_hashed(&self) -> bool {
        self.template.contains("[hash]")
    }
}

/// A path that has been planned but may still be waiting on content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPath {
    role: ArtifactRole,
    partial: String,
}

impl PlannedPath {
    /// Role this path was planned for.
    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    /// Whether the content hash is still missing.
    pub fn needs_content(&self) -> bool {
        self.partial.contains("[hash]")
    }

    /// The path when it does not depend on content.
    pub fn stable(&self) -> Option<PathBuf> {
        if self.needs_content() {
            None
        } else {
            Some(PathBuf::from(&self.partial))
        }
    }

    /// Produce the final path for the given content.
    pub fn finalize(&self, content: &[u8]) -> PathBuf {
        if self.needs_content() {
            PathBuf::from(self.partial.replace("[hash]", &content_hash(content)))
        } else {
            PathBuf::from(&self.partial)
        }
    }
}

/// Hex SHA-256 of the content, truncated to [`HASH_LEN`] digits.
pub fn content_hash(content: &[u8]) -> String {
    let mut hex = format!("{:x}", Sha256::digest(content));
    hex.truncate(HASH_LEN);
    hex
}

/// Plans output paths for one build mode.
#[derive(Debug, Clone)]
pub struct OutputPlanner {
    mode: BuildMode,
    rules: BTreeMap<ArtifactRole, NamingRule>,
}

impl OutputPlanner {
    /// Create a planner with the default rules for `mode`.
    pub fn new(mode: BuildMode) -> Self {
        let rules = default_rules(mode)
            .into_iter()
            .map(|(role, template)| (role, NamingRule::new(template)))
            .collect();
        Self { mode, rules }
    }

    /// Create a planner with no rules at all.
    pub fn empty(mode: BuildMode) -> Self {
        Self { mode, rules: BTreeMap::new() }
    }

    /// Create a planner for `mode`, applying the config's overrides.
    ///
    /// An override with an empty template removes the rule for that role.
    pub fn from_config(mode: BuildMode, output: &OutputConfig) -> Result<Self, PlannerError> {
        let overrides = match mode {
            BuildMode::Development => &output.development,
            BuildMode::Production => &output.production,
        };

        let mut planner = Self::new(mode);
        for (key, template) in overrides {
            let role = key.parse::<ArtifactRole>().map_err(PlannerError::InvalidOverride)?;
            if template.is_empty() {
                planner.rules.remove(&role);
            } else {
                planner.rules.insert(role, NamingRule::new(template.clone()));
            }
        }
        Ok(planner)
    }

    /// Replace the rule for a role.
    pub fn with_rule(mut self, role: ArtifactRole, template: impl Into<String>) -> Self {
        self.rules.insert(role, NamingRule::new(template));
        self
    }

    /// The planner's mode.
    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// The rule for a role.
    pub fn rule(&self, role: ArtifactRole) -> Result<&NamingRule, PlannerError> {
        self.rules.get(&role).ok_or(PlannerError::UnknownRole(role))
    }

    /// Check that rules exist for every role in `roles`.
    pub fn ensure_roles(
        &self,
        roles: impl IntoIterator<Item = ArtifactRole>,
    ) -> Result<(), PlannerError> {
        for role in roles {
            self.rule(role)?;
        }
        Ok(())
    }

    /// Plan the path for an artifact.
    ///
    /// For media and pages, `logical_name` is a file name and its extension
    /// fills `[ext]`.
    pub fn plan(&self, role: ArtifactRole, logical_name: &str) -> Result<PlannedPath, PlannerError> {
        let rule = self.rule(role)?;
        let (stem, ext) = match logical_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, ext),
            _ => (logical_name, ""),
        };
        let name = if rule.template.contains("[ext]") { stem } else { logical_name };
        let partial = rule.template.replace("[name]", name).replace("[ext]", ext);
        Ok(PlannedPath { role, partial })
    }
}

fn default_rules(mode: BuildMode) -> Vec<(ArtifactRole, &'static str)> {
    match mode {
        BuildMode::Development => vec![
            (ArtifactRole::Script, "js/[name].bundle.js"),
            (ArtifactRole::Style, "css/[name].css"),
            (ArtifactRole::Doc, "docs"),
            (ArtifactRole::Media, "media/[name].[ext]"),
            (ArtifactRole::GeneratedMetadata, "meta/[name].css"),
            (ArtifactRole::Page, "[name].[ext]"),
        ],
        BuildMode::Production => vec![
            (ArtifactRole::Script, "js/[name].bundle.[hash].min.js"),
            (ArtifactRole::Style, "css/[name].[hash].min.css"),
            (ArtifactRole::Doc, "docs"),
            (ArtifactRole::Media, "media/[name].[hash].[ext]"),
            (ArtifactRole::GeneratedMetadata, "meta/[name].[hash].css"),
            (ArtifactRole::Page, "[name].[ext]"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_names_are_stable() {
        let planner = OutputPlanner::new(BuildMode::Development);
        let planned = planner.plan(ArtifactRole::Style, "main").unwrap();
        assert!(!planned.needs_content());
        assert_eq!(planned.stable(), Some(PathBuf::from("css/main.css")));
        assert_eq!(planned.finalize(b"a{}"), PathBuf::from("css/main.css"));
        assert_eq!(planned.finalize(b"b{}"), PathBuf::from("css/main.css"));
    }

    #[test]
    fn test_production_names_embed_hash() {
        let planner = OutputPlanner::new(BuildMode::Production);
        let planned = planner.plan(ArtifactRole::Style, "main").unwrap();
        assert!(planned.needs_content());
        assert_eq!(planned.stable(), None);

        let a = planned.finalize(b"a{color:red}");
        let b = planned.finalize(b"a{color:blue}");
        assert_ne!(a, b);
        assert_eq!(a, planned.finalize(b"a{color:red}"));

        let name = a.to_string_lossy().into_owned();
        assert!(name.starts_with("css/main."));
        assert!(name.ends_with(".min.css"));
        assert_eq!(name.len(), "css/main..min.css".len() + HASH_LEN);
    }

    #[test]
    fn test_media_uses_extension() {
        let dev = OutputPlanner::new(BuildMode::Development);
        let planned = dev.plan(ArtifactRole::Media, "logo.svg").unwrap();
        assert_eq!(planned.stable(), Some(PathBuf::from("media/logo.svg")));

        let prod = OutputPlanner::new(BuildMode::Production);
        let path = prod.plan(ArtifactRole::Media, "font.woff2").unwrap().finalize(b"\0\x01");
        let name = path.to_string_lossy().into_owned();
        assert!(name.starts_with("media/font."));
        assert!(name.ends_with(".woff2"));
    }

    #[test]
    fn test_unknown_role() {
        let planner = OutputPlanner::empty(BuildMode::Development);
        assert_eq!(
            planner.plan(ArtifactRole::Style, "main"),
            Err(PlannerError::UnknownRole(ArtifactRole::Style))
        );
        assert_eq!(
            planner.ensure_roles([ArtifactRole::Doc]),
            Err(PlannerError::UnknownRole(ArtifactRole::Doc))
        );
    }

    #[test]
    fn test_config_overrides() {
        let mut output = OutputConfig::default();
        output.production.insert("style".to_string(), "styles/[name]-[hash].css".to_string());
        output.production.insert("generated-metadata".to_string(), String::new());

        let planner = OutputPlanner::from_config(BuildMode::Production, &output).unwrap();
        let path = planner.plan(ArtifactRole::Style, "main").unwrap().finalize(b"x");
        assert!(path.to_string_lossy().starts_with("styles/main-"));
        assert!(matches!(
            planner.plan(ArtifactRole::GeneratedMetadata, "json"),
            Err(PlannerError::UnknownRole(_))
        ));

        // Development rules are untouched
        let dev = OutputPlanner::from_config(BuildMode::Development, &output).unwrap();
        assert!(dev.rule(ArtifactRole::GeneratedMetadata).is_ok());
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_eq!(content_hash(b"abc").len(), HASH_LEN);
        assert_eq!(content_hash(b"abc"), "ba7816bf8f01cfea4141");
    }

    #[test]
    fn test_build_mode_parse() {
        assert_eq!("production".parse(), Ok(BuildMode::Production));
        assert_eq!("Development".parse(), Ok(BuildMode::Development));
        assert!("staging".parse::<BuildMode>().is_err());
        assert_eq!(BuildMode::default(), BuildMode::Development);
    }
}
