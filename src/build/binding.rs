//! Asset bindings: late-bound fields of a stage's configuration.
//!
//! A binding says "once an artifact of this role is finalized, write its final
//! path into the stage configuration at this dotted path". Bindings are declared
//! once in a [`BindingTable`]. Each build pass gets its own
//! [`AssetBindingResolver`], which is the only thing that writes resolved paths
//! into a stage configuration, and only hands a configuration out after every
//! binding of that stage has been resolved.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use thiserror::Error;

use crate::build::{ArtifactDescriptor, ArtifactRole, ArtifactSet, PassId};
use crate::config::BindingConfig;

/// Binding declaration errors, all detected at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    /// The dotted path is empty or has an empty segment
    #[error("invalid config path '{0}'")]
    InvalidPath(String),
    /// An intermediate segment already holds something other than an object
    #[error("config path '{path}' crosses non-object value at '{at}'")]
    PathConflict {
        /// Full dotted path
        path: String,
        /// Prefix holding the non-object value
        at: String,
    },
    /// Bindings for a stage were declared twice
    #[error("bindings for stage '{0}' declared twice")]
    DuplicateStage(String),
}

/// A dotted path into a JSON configuration object, e.g. `herman.sass.jsonfile`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// Parse a dotted path.
    pub fn parse(path: &str) -> Result<Self, BindingError> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if path.is_empty() || segments.iter().any(String::is_empty) {
            return Err(BindingError::InvalidPath(path.to_string()));
        }
        Ok(Self { segments })
    }

    /// Path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Read the value at this path, if present.
    pub fn get<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(value, |current, segment| current.get(segment))
    }

    /// Check that writing at this path will not have to replace a non-object value.
    pub fn check(&self, template: &Value) -> Result<(), BindingError> {
        let mut current = template;
        for (i, segment) in self.segments[..self.segments.len() - 1].iter().enumerate() {
            match current.get(segment) {
                None => return Ok(()),
                Some(next) if next.is_object() => current = next,
                Some(_) => {
                    return Err(BindingError::PathConflict {
                        path: self.to_string(),
                        at: self.segments[..=i].join("."),
                    })
                }
            }
        }
        Ok(())
    }

    /// Write `new` at this path, creating intermediate objects as needed.
    ///
    /// Paths are checked with [`ConfigPath::check`] when bindings are declared,
    /// so intermediate values are objects or absent here.
    pub fn set(&self, target: &mut Value, new: Value) {
        let Some((last, parents)) = self.segments.split_last() else { return };
        let mut current = target;
        for segment in parents {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let Value::Object(map) = current else { return };
            current = map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()));
        }
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        if let Value::Object(map) = current {
            map.insert(last.clone(), new);
        }
    }
}

impl std::fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// A declared dependency from a configuration field to an artifact's final path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Role of the source artifact
    pub source_role: ArtifactRole,
    /// Logical name of the source artifact, when the role has several
    pub entry: Option<String>,
    /// Where the final path is written
    pub config_path: ConfigPath,
}

impl Binding {
    /// Create a binding on any artifact of `role`.
    pub fn new(role: ArtifactRole, path: &str) -> Result<Self, BindingError> {
        Ok(Self { source_role: role, entry: None, config_path: ConfigPath::parse(path)? })
    }

    /// Restrict the binding to the artifact with this logical name.
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Build a binding from its config declaration.
    pub fn from_config(config: &BindingConfig) -> Result<Self, BindingError> {
        let binding = Self::new(config.role, &config.path)?;
        Ok(match &config.entry {
            Some(entry) => binding.with_entry(entry.clone()),
            None => binding,
        })
    }

    /// Find the artifact this binding refers to, finalized or not.
    ///
    /// Without an entry name, the artifact of the role with the smallest
    /// logical name is used so the choice does not depend on completion order.
    fn source<'s>(&self, artifacts: &'s ArtifactSet) -> Option<&'s ArtifactDescriptor> {
        match &self.entry {
            Some(name) => artifacts.get(self.source_role, name),
            None => artifacts.iter().find(|d| d.role() == self.source_role),
        }
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.entry {
            Some(entry) => write!(f, "{}:{} -> {}", self.source_role, entry, self.config_path),
            None => write!(f, "{} -> {}", self.source_role, self.config_path),
        }
    }
}

/// A binding that could not be resolved by the end of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedBinding {
    /// Stage whose configuration needed the value
    pub stage: String,
    /// The unresolved binding
    pub binding: Binding,
}

impl std::fmt::Display for BlockedBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlockedBinding: '{}' needs {} but no such artifact was finalized",
            self.stage, self.binding
        )
    }
}

#[derive(Debug, Clone)]
struct StageBindings {
    template: Value,
    bindings: Vec<Binding>,
}

/// Process-lifetime binding declarations, keyed by stage name.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    stages: BTreeMap<String, StageBindings>,
}

impl BindingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the configuration template and bindings of a stage.
    pub fn declare(
        &mut self,
        stage: impl Into<String>,
        template: Value,
        bindings: Vec<Binding>,
    ) -> Result<(), BindingError> {
        let stage = stage.into();
        if self.stages.contains_key(&stage) {
            return Err(BindingError::DuplicateStage(stage));
        }
        for binding in &bindings {
            binding.config_path.check(&template)?;
        }
        self.stages.insert(stage, StageBindings { template, bindings });
        Ok(())
    }

    /// Bindings declared for a stage.
    pub fn bindings(&self, stage: &str) -> &[Binding] {
        self.stages.get(stage).map(|s| s.bindings.as_slice()).unwrap_or(&[])
    }

    /// Roles a stage's bindings depend on.
    pub fn source_roles(&self, stage: &str) -> BTreeSet<ArtifactRole> {
        self.bindings(stage).iter().map(|b| b.source_role).collect()
    }

    /// Every role referenced by any binding.
    pub fn all_source_roles(&self) -> BTreeSet<ArtifactRole> {
        self.stages.values().flat_map(|s| s.bindings.iter().map(|b| b.source_role)).collect()
    }

    /// Whether a stage has a declared configuration.
    pub fn has_stage(&self, stage: &str) -> bool {
        self.stages.contains_key(stage)
    }

    /// Start resolution for a new pass.
    pub fn begin_pass(&self, pass: PassId) -> AssetBindingResolver<'_> {
        let mut resolver = AssetBindingResolver {
            table: self,
            pass,
            resolved: BTreeMap::new(),
            configs: BTreeMap::new(),
        };
        for (stage, declared) in &self.stages {
            resolver.resolved.insert(stage.clone(), vec![None; declared.bindings.len()]);
            if declared.bindings.is_empty() {
                resolver.configs.insert(stage.clone(), declared.template.clone());
            }
        }
        resolver
    }
}

/// Per-pass binding resolution state.
#[derive(Debug)]
pub struct AssetBindingResolver<'t> {
    table: &'t BindingTable,
    pass: PassId,
    /// Resolved final path per binding, per stage
    resolved: BTreeMap<String, Vec<Option<PathBuf>>>,
    /// Fully resolved configurations of eligible stages
    configs: BTreeMap<String, Value>,
}

impl<'t> AssetBindingResolver<'t> {
    /// Pass being resolved.
    pub fn pass(&self) -> PassId {
        self.pass
    }

    /// Whether a stage may run as far as its bindings are concerned.
    ///
    /// Stages without a declared configuration are always eligible.
    pub fn is_eligible(&self, stage: &str) -> bool {
        !self.table.has_stage(stage) || self.configs.contains_key(stage)
    }

    /// The resolved configuration of an eligible stage.
    pub fn config(&self, stage: &str) -> Option<&Value> {
        self.configs.get(stage)
    }

    /// Re-check unresolved bindings against the artifacts finalized so far.
    ///
    /// Idempotent. Returns the stages that became eligible during this call.
    pub fn observe(&mut self, artifacts: &ArtifactSet) -> Vec<String> {
        debug_assert_eq!(artifacts.pass(), self.pass, "artifact set from another pass");
        let table = self.table;
        let mut newly_eligible = Vec::new();

        for (stage, declared) in &table.stages {
            if self.configs.contains_key(stage) {
                continue;
            }
            let Some(slots) = self.resolved.get_mut(stage) else { continue };

            for (binding, slot) in declared.bindings.iter().zip(slots.iter_mut()) {
                if slot.is_some() {
                    continue;
                }
                if let Some(path) = binding.source(artifacts).and_then(|d| d.final_path()) {
                    tracing::debug!(stage = %stage, binding = %binding, path = %path.display(), "binding resolved");
                    *slot = Some(path.to_path_buf());
                }
            }

            if slots.iter().all(Option::is_some) {
                let mut config = declared.template.clone();
                for (binding, slot) in declared.bindings.iter().zip(slots.iter()) {
                    if let Some(path) = slot {
                        binding.config_path.set(&mut config, Value::String(path_to_config(path)));
                    }
                }
                self.configs.insert(stage.clone(), config);
                newly_eligible.push(stage.clone());
            }
        }

        newly_eligible
    }

    /// Unresolved bindings of the given stages.
    pub fn blocked<'s>(&self, stages: impl IntoIterator<Item = &'s str>) -> Vec<BlockedBinding> {
        let mut blocked = Vec::new();
        for stage in stages {
            let (Some(declared), Some(slots)) =
                (self.table.stages.get(stage), self.resolved.get(stage))
            else {
                continue;
            };
            for (binding, slot) in declared.bindings.iter().zip(slots) {
                if slot.is_none() {
                    blocked.push(BlockedBinding {
                        stage: stage.to_string(),
                        binding: binding.clone(),
                    });
                }
            }
        }
        blocked
    }
}

/// Config values use forward slashes regardless of platform.
fn path_to_config(path: &std::path::Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
