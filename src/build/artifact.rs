//! Artifacts produced by pipeline stages.
//!
//! An artifact is declared when its owning stage starts and finalized once the
//! stage's tool has written it to disk. Descriptors belong to exactly one build
//! pass; nothing here is shared between passes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sequence number of a build pass.
pub type PassId = u64;

/// Kind of file a stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactRole {
    /// Bundled script
    Script,
    /// Compiled stylesheet
    Style,
    /// Generated documentation site
    Doc,
    /// Font or image copied into the output
    Media,
    /// Stylesheet compiled for consumption by the doc generator (e.g. a JSON export)
    GeneratedMetadata,
    /// Rendered page or file placed next to it (index page, favicon)
    Page,
}

impl ArtifactRole {
    /// All roles, in a fixed order.
    pub const ALL: [ArtifactRole; 6] = [
        ArtifactRole::Script,
        ArtifactRole::Style,
        ArtifactRole::Doc,
        ArtifactRole::Media,
        ArtifactRole::GeneratedMetadata,
        ArtifactRole::Page,
    ];
}

impl std::fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactRole::Script => write!(f, "script"),
            ArtifactRole::Style => write!(f, "style"),
            ArtifactRole::Doc => write!(f, "doc"),
            ArtifactRole::Media => write!(f, "media"),
            ArtifactRole::GeneratedMetadata => write!(f, "generated-metadata"),
            ArtifactRole::Page => write!(f, "page"),
        }
    }
}

impl std::str::FromStr for ArtifactRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" => Ok(ArtifactRole::Script),
            "style" => Ok(ArtifactRole::Style),
            "doc" => Ok(ArtifactRole::Doc),
            "media" => Ok(ArtifactRole::Media),
            "generated-metadata" | "generated_metadata" => Ok(ArtifactRole::GeneratedMetadata),
            "page" => Ok(ArtifactRole::Page),
            other => Err(format!("unknown artifact role '{}'", other)),
        }
    }
}

/// Errors from misusing artifact descriptors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    /// A descriptor's final path can only be set once
    #[error("artifact {role}:{name} is already finalized")]
    AlreadyFinalized {
        /// Artifact role
        role: ArtifactRole,
        /// Logical name
        name: String,
    },
    /// Finalizing something that was never declared in this pass
    #[error("artifact {role}:{name} was not declared in pass {pass}")]
    Undeclared {
        /// Artifact role
        role: ArtifactRole,
        /// Logical name
        name: String,
        /// Pass being recorded
        pass: PassId,
    },
    /// A descriptor from another pass was handed to this pass's set
    #[error("artifact {role}:{name} belongs to pass {found}, not {expected}")]
    ForeignPass {
        /// Artifact role
        role: ArtifactRole,
        /// Logical name
        name: String,
        /// Pass of the set
        expected: PassId,
        /// Pass of the descriptor
        found: PassId,
    },
}

/// A single artifact of one build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    role: ArtifactRole,
    logical_name: String,
    pass: PassId,
    final_path: Option<PathBuf>,
}

impl ArtifactDescriptor {
    /// Declare an artifact whose location is not known yet.
    pub fn pending(pass: PassId, role: ArtifactRole, logical_name: impl Into<String>) -> Self {
        Self { role, logical_name: logical_name.into(), pass, final_path: None }
    }

    /// Artifact role.
    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    /// Logical name (entry name, media file name, ...).
    pub fn logical_name(&self) -> &str {
        &self.logical_name
    }

    /// Pass that owns this descriptor.
    pub fn pass(&self) -> PassId {
        self.pass
    }

    /// Final path relative to the output directory, once finalized.
    pub fn final_path(&self) -> Option<&Path> {
        self.final_path.as_deref()
    }

    /// Whether the owning stage has completed.
    pub fn is_finalized(&self) -> bool {
        self.final_path.is_some()
    }

    /// Record the final path. May only happen once.
    pub fn finalize(&mut self, path: PathBuf) -> Result<(), ArtifactError> {
        if self.final_path.is_some() {
            return Err(ArtifactError::AlreadyFinalized {
                role: self.role,
                name: self.logical_name.clone(),
            });
        }
        self.final_path = Some(path);
        Ok(())
    }
}

/// An artifact reported by a stage on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedArtifact {
    /// Artifact role
    pub role: ArtifactRole,
    /// Logical name
    pub logical_name: String,
    /// Path relative to the output directory
    pub path: PathBuf,
}

impl EmittedArtifact {
    /// Create an emitted artifact record.
    pub fn new(role: ArtifactRole, logical_name: impl Into<String>, path: PathBuf) -> Self {
        Self { role, logical_name: logical_name.into(), path }
    }
}

/// All artifacts of one build pass, keyed by role and logical name.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pass: PassId,
    artifacts: BTreeMap<(ArtifactRole, String), ArtifactDescriptor>,
}

impl ArtifactSet {
    /// Create an empty set for a pass.
    pub fn new(pass: PassId) -> Self {
        Self { pass, artifacts: BTreeMap::new() }
    }

    /// Pass this set belongs to.
    pub fn pass(&self) -> PassId {
        self.pass
    }

    /// Declare a pending artifact. Re-declaring an artifact replaces it with a
    /// fresh, unfinalized descriptor.
    pub fn declare(&mut self, descriptor: ArtifactDescriptor) -> Result<(), ArtifactError> {
        if descriptor.pass != self.pass {
            return Err(ArtifactError::ForeignPass {
                role: descriptor.role,
                name: descriptor.logical_name,
                expected: self.pass,
                found: descriptor.pass,
            });
        }
        self.artifacts.insert((descriptor.role, descriptor.logical_name.clone()), descriptor);
        Ok(())
    }

    /// Finalize an emitted artifact, declaring it first if the stage could not
    /// know its name up front (media files).
    pub fn finalize(&mut self, emitted: &EmittedArtifact) -> Result<(), ArtifactError> {
        let pass = self.pass;
        let key = (emitted.role, emitted.logical_name.clone());
        let descriptor = self
            .artifacts
            .entry(key)
            .or_insert_with(|| ArtifactDescriptor::pending(pass, emitted.role, &emitted.logical_name));
        descriptor.finalize(emitted.path.clone())
    }

    /// Finalize an artifact that must already have been declared.
    pub fn finalize_declared(&mut self, emitted: &EmittedArtifact) -> Result<(), ArtifactError> {
        match self.artifacts.get_mut(&(emitted.role, emitted.logical_name.clone())) {
            Some(descriptor) => descriptor.finalize(emitted.path.clone()),
            None => Err(ArtifactError::Undeclared {
                role: emitted.role,
                name: emitted.logical_name.clone(),
                pass: self.pass,
            }),
        }
    }

    /// Look up a descriptor.
    pub fn get(&self, role: ArtifactRole, logical_name: &str) -> Option<&ArtifactDescriptor> {
        self.artifacts.get(&(role, logical_name.to_string()))
    }

    /// Finalized descriptors of a role, ordered by logical name.
    pub fn finalized_of(&self, role: ArtifactRole) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.artifacts
            .range((role, String::new())..)
            .take_while(move |((r, _), _)| *r == role)
            .map(|(_, d)| d)
            .filter(|d| d.is_finalized())
    }

    /// All descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.artifacts.values()
    }

    /// Number of descriptors (pending and finalized).
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_and_parse() {
        for role in ArtifactRole::ALL {
            assert_eq!(role.to_string().parse::<ArtifactRole>(), Ok(role));
        }
        assert_eq!("generated_metadata".parse(), Ok(ArtifactRole::GeneratedMetadata));
        assert!("stylesheet".parse::<ArtifactRole>().is_err());
    }

    #[test]
    fn test_descriptor_finalizes_once() {
        let mut d = ArtifactDescriptor::pending(1, ArtifactRole::Style, "main");
        assert!(!d.is_finalized());
        d.finalize(PathBuf::from("css/main.css")).unwrap();
        assert_eq!(d.final_path(), Some(Path::new("css/main.css")));

        let err = d.finalize(PathBuf::from("css/other.css")).unwrap_err();
        assert!(matches!(err, ArtifactError::AlreadyFinalized { .. }));
        assert_eq!(d.final_path(), Some(Path::new("css/main.css")));
    }

    #[test]
    fn test_set_rejects_foreign_pass() {
        let mut set = ArtifactSet::new(2);
        let err = set.declare(ArtifactDescriptor::pending(1, ArtifactRole::Style, "main"));
        assert!(matches!(err, Err(ArtifactError::ForeignPass { expected: 2, found: 1, .. })));
        assert!(set.is_empty());
    }

    #[test]
    fn test_finalize_declared_requires_declaration() {
        let mut set = ArtifactSet::new(1);
        let emitted = EmittedArtifact::new(ArtifactRole::Style, "main", "css/main.css".into());
        assert!(matches!(set.finalize_declared(&emitted), Err(ArtifactError::Undeclared { .. })));

        set.declare(ArtifactDescriptor::pending(1, ArtifactRole::Style, "main")).unwrap();
        set.finalize_declared(&emitted).unwrap();
        assert!(set.get(ArtifactRole::Style, "main").unwrap().is_finalized());
    }

    #[test]
    fn test_finalized_of_filters_role_and_pending() {
        let mut set = ArtifactSet::new(1);
        set.declare(ArtifactDescriptor::pending(1, ArtifactRole::Style, "docs")).unwrap();
        set.finalize(&EmittedArtifact::new(ArtifactRole::Style, "main", "css/main.css".into()))
            .unwrap();
        set.finalize(&EmittedArtifact::new(
            ArtifactRole::GeneratedMetadata,
            "sass_json",
            "meta/sass_json.css".into(),
        ))
        .unwrap();

        let styles: Vec<_> = set.finalized_of(ArtifactRole::Style).collect();
        assert_eq!(styles.len(), 1);
        assert_eq!(styles[0].logical_name(), "main");
        assert_eq!(set.len(), 3);
    }
}
