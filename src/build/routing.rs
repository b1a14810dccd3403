//! Loader routing: which loader chain handles a file and what it becomes.

use regex::Regex;
use std::path::Path;

use crate::build::ArtifactRole;

/// One routing rule.
#[derive(Debug, Clone)]
pub struct LoaderRoute {
    /// Matched against the file name
    pattern: Regex,
    /// Loader chain, applied last to first
    loaders: Vec<&'static str>,
    /// Role of the resulting artifact
    role: ArtifactRole,
}

impl LoaderRoute {
    fn new(pattern: &str, loaders: &[&'static str], role: ArtifactRole) -> Result<Self, regex::Error> {
        Ok(Self { pattern: Regex::new(pattern)?, loaders: loaders.to_vec(), role })
    }

    /// Loader chain.
    pub fn loaders(&self) -> &[&'static str] {
        &self.loaders
    }

    /// Artifact role.
    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    /// Regex source.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Ordered routing table; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: Vec<LoaderRoute>,
}

impl RoutingTable {
    /// The built-in table.
    pub fn new() -> Self {
        // Built-in patterns are all valid; see test_every_builtin_route_compiles
        let routes = [
            (r"\.js$", &["babel"][..], ArtifactRole::Script),
            (r"\.vue$", &["vue"][..], ArtifactRole::Script),
            (r"\.(woff2?|ttf|eot)$", &["file"][..], ArtifactRole::Media),
            (r"\.(jpe?g|gif|png|svg)$", &["file", "img"][..], ArtifactRole::Media),
            (r"^main\.scss$", &["css", "sass"][..], ArtifactRole::Style),
            (r"\.scss$", &["css", "sass"][..], ArtifactRole::Style),
        ]
        .into_iter()
        .filter_map(|(pattern, loaders, role)| LoaderRoute::new(pattern, loaders, role).ok())
        .collect();
        Self { routes }
    }

    /// All rules in match order.
    pub fn routes(&self) -> &[LoaderRoute] {
        &self.routes
    }

    /// The rule handling `path`, matched on its file name.
    pub fn route(&self, path: &Path) -> Option<&LoaderRoute> {
        let name = path.file_name()?.to_string_lossy();
        self.routes.iter().find(|r| r.pattern.is_match(&name))
    }

    /// Whether `path` is handled by a rule producing `role`.
    pub fn routes_to(&self, path: &Path, role: ArtifactRole) -> bool {
        self.route(path).is_some_and(|r| r.role == role)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}
