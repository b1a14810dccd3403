//! Pipeline task graph.
//!
//! Tasks are declared once through [`PipelineGraphBuilder`] and validated when
//! the graph is built: unknown dependencies and cycles are rejected before any
//! task can run. The built [`PipelineGraph`] is immutable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::build::{BindingTable, Stage};

/// Graph construction and lookup errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency relation has a cycle
    #[error("CyclicDependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
    /// Two tasks share a name
    #[error("task '{0}' declared twice")]
    DuplicateTask(String),
    /// A task depends on a name that was never declared
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// Declaring task
        task: String,
        /// Missing dependency
        dependency: String,
    },
    /// A run target does not exist
    #[error("unknown task '{0}'")]
    UnknownTask(String),
}

/// A named unit of work with its dependencies.
#[derive(Clone)]
pub struct TaskNode {
    /// Unique task name
    pub name: String,
    /// Names of tasks that must succeed first
    pub depends_on: BTreeSet<String>,
    /// The work itself
    pub stage: Arc<dyn Stage>,
}

impl TaskNode {
    /// Create a task without dependencies.
    pub fn new(name: impl Into<String>, stage: Arc<dyn Stage>) -> Self {
        Self { name: name.into(), depends_on: BTreeSet::new(), stage }
    }

    /// Add a dependency.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.insert(dependency.into());
        self
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// Collects task declarations before validation.
#[derive(Debug, Default)]
pub struct PipelineGraphBuilder {
    nodes: Vec<TaskNode>,
}

impl PipelineGraphBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task.
    pub fn add_task(mut self, node: TaskNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add the edges implied by bindings: a task whose configuration binds a
    /// role depends on every other task producing that role.
    pub fn with_binding_edges(mut self, bindings: &BindingTable) -> Self {
        let producers: Vec<(String, Vec<crate::build::ArtifactRole>)> =
            self.nodes.iter().map(|n| (n.name.clone(), n.stage.produces())).collect();

        for node in &mut self.nodes {
            for role in bindings.source_roles(&node.name) {
                for (producer, roles) in &producers {
                    if producer != &node.name && roles.contains(&role) {
                        node.depends_on.insert(producer.clone());
                    }
                }
            }
        }
        self
    }

    /// Validate the declarations and build the graph.
    pub fn build(self) -> Result<PipelineGraph, GraphError> {
        let mut index = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask(node.name.clone()));
            }
        }

        for node in &self.nodes {
            for dep in &node.depends_on {
                if !index.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        task: node.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let order = topological_order(&self.nodes, &index)?;
        Ok(PipelineGraph { nodes: self.nodes, index, order })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Depth-first topological sort with three-colour marking.
fn topological_order(
    nodes: &[TaskNode],
    index: &HashMap<String, usize>,
) -> Result<Vec<usize>, GraphError> {
    let mut marks = vec![Mark::Unvisited; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack = Vec::new();

    for start in 0..nodes.len() {
        visit(start, nodes, index, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

fn visit(
    i: usize,
    nodes: &[TaskNode],
    index: &HashMap<String, usize>,
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), GraphError> {
    match marks[i] {
        Mark::Done => return Ok(()),
        Mark::Visiting => {
            let from = stack.iter().position(|&s| s == i).unwrap_or(0);
            let mut cycle: Vec<String> = stack[from..].iter().map(|&s| nodes[s].name.clone()).collect();
            cycle.push(nodes[i].name.clone());
            return Err(GraphError::CyclicDependency(cycle));
        }
        Mark::Unvisited => {}
    }

    marks[i] = Mark::Visiting;
    stack.push(i);
    for dep in &nodes[i].depends_on {
        if let Some(&d) = index.get(dep) {
            visit(d, nodes, index, marks, stack, order)?;
        }
    }
    stack.pop();
    marks[i] = Mark::Done;
    order.push(i);
    Ok(())
}

/// A validated, immutable task graph.
pub struct PipelineGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
    /// Node indices, dependencies before dependents
    order: Vec<usize>,
}

impl PipelineGraph {
    /// Start declaring a graph.
    pub fn builder() -> PipelineGraphBuilder {
        PipelineGraphBuilder::new()
    }

    /// Look up a task.
    pub fn node(&self, name: &str) -> Option<&TaskNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Whether a task exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tasks in dependency order.
    pub fn ordered(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().map(|&i| &self.nodes[i])
    }

    /// All task names in dependency order.
    pub fn names(&self) -> Vec<String> {
        self.ordered().map(|n| n.name.clone()).collect()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no tasks.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The targets plus everything they transitively depend on.
    pub fn with_dependencies<S: AsRef<str>>(
        &self,
        targets: &[S],
    ) -> Result<BTreeSet<String>, GraphError> {
        let mut selected = BTreeSet::new();
        let mut queue: Vec<String> = Vec::new();
        for target in targets {
            let target = target.as_ref();
            if !self.contains(target) {
                return Err(GraphError::UnknownTask(target.to_string()));
            }
            queue.push(target.to_string());
        }

        while let Some(name) = queue.pop() {
            if !selected.insert(name.clone()) {
                continue;
            }
            if let Some(node) = self.node(&name) {
                queue.extend(node.depends_on.iter().cloned());
            }
        }
        Ok(selected)
    }

    /// The given tasks plus everything that transitively depends on them.
    pub fn with_dependents<S: AsRef<str>>(&self, tasks: &[S]) -> BTreeSet<String> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for node in &self.nodes {
            for dep in &node.depends_on {
                dependents.entry(dep.as_str()).or_default().push(node.name.as_str());
            }
        }

        let mut selected = BTreeSet::new();
        let mut queue: Vec<&str> =
            tasks.iter().map(|t| t.as_ref()).filter(|t| self.contains(t)).collect();
        while let Some(name) = queue.pop() {
            if !selected.insert(name.to_string()) {
                continue;
            }
            if let Some(next) = dependents.get(name) {
                queue.extend(next.iter().copied());
            }
        }
        selected
    }

    /// Tasks whose declared inputs cover `path`.
    pub fn tasks_for_path(&self, path: &Path) -> BTreeSet<String> {
        self.ordered()
            .filter(|node| node.stage.inputs().iter().any(|input| input.matches(path)))
            .map(|node| node.name.clone())
            .collect()
    }
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph").field("order", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{ArtifactRole, InputPattern, StageInput, StageOutput, TaskError};
    use async_trait::async_trait;

    struct Noop {
        produces: Vec<ArtifactRole>,
        inputs: Vec<InputPattern>,
    }

    #[async_trait]
    impl Stage for Noop {
        fn produces(&self) -> Vec<ArtifactRole> {
            self.produces.clone()
        }

        fn inputs(&self) -> Vec<InputPattern> {
            self.inputs.clone()
        }

        async fn run(&self, _input: StageInput) -> Result<StageOutput, TaskError> {
            Ok(StageOutput::default())
        }
    }

    fn task(name: &str) -> TaskNode {
        TaskNode::new(name, Arc::new(Noop { produces: vec![], inputs: vec![] }))
    }

    #[test]
    fn test_order_respects_dependencies() {
        let graph = PipelineGraph::builder()
            .add_task(task("docs").depends_on("styles"))
            .add_task(task("styles"))
            .add_task(task("media"))
            .build()
            .unwrap();

        let names = graph.names();
        let pos = |n: &str| names.iter().position(|x| x == n).unwrap();
        assert!(pos("styles") < pos("docs"));
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_cycle_rejected() {
        let result = PipelineGraph::builder()
            .add_task(task("a").depends_on("c"))
            .add_task(task("b").depends_on("a"))
            .add_task(task("c").depends_on("b"))
            .build();

        match result {
            Err(GraphError::CyclicDependency(cycle)) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected cycle, got {:?}", other.map(|g| g.names())),
        }
    }

    #[test]
    fn test_self_cycle_rejected() {
        let result = PipelineGraph::builder().add_task(task("a").depends_on("a")).build();
        assert!(matches!(result, Err(GraphError::CyclicDependency(_))));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = PipelineGraph::builder().add_task(task("docs").depends_on("styles")).build();
        assert_eq!(
            result.unwrap_err(),
            GraphError::UnknownDependency { task: "docs".into(), dependency: "styles".into() }
        );
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let result = PipelineGraph::builder().add_task(task("a")).add_task(task("a")).build();
        assert_eq!(result.unwrap_err(), GraphError::DuplicateTask("a".into()));
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let graph = PipelineGraph::builder()
            .add_task(task("styles"))
            .add_task(task("docs").depends_on("styles"))
            .add_task(task("index").depends_on("docs"))
            .add_task(task("media"))
            .build()
            .unwrap();

        let deps = graph.with_dependencies(&["index"]).unwrap();
        assert_eq!(deps, BTreeSet::from(["docs".into(), "index".into(), "styles".into()]));

        let dependents = graph.with_dependents(&["styles"]);
        assert_eq!(dependents, BTreeSet::from(["docs".into(), "index".into(), "styles".into()]));

        assert_eq!(graph.with_dependents(&["media"]), BTreeSet::from(["media".into()]));
        assert!(matches!(graph.with_dependencies(&["nope"]), Err(GraphError::UnknownTask(_))));
    }

    #[test]
    fn test_binding_edges_are_derived() {
        let mut bindings = BindingTable::new();
        bindings
            .declare(
                "docs",
                serde_json::json!({}),
                vec![crate::build::Binding::new(ArtifactRole::Style, "customCSS").unwrap()],
            )
            .unwrap();

        let styles = TaskNode::new(
            "styles",
            Arc::new(Noop { produces: vec![ArtifactRole::Style], inputs: vec![] }),
        );
        let graph = PipelineGraph::builder()
            .add_task(task("docs"))
            .add_task(styles)
            .with_binding_edges(&bindings)
            .build()
            .unwrap();

        assert!(graph.node("docs").unwrap().depends_on.contains("styles"));
        assert_eq!(graph.names(), vec!["styles".to_string(), "docs".to_string()]);
    }

    #[test]
    fn test_tasks_for_path() {
        let styles = TaskNode::new(
            "styles",
            Arc::new(Noop {
                produces: vec![],
                inputs: vec![InputPattern::new("/p/sass", "**/*.scss").unwrap()],
            }),
        );
        let media = TaskNode::new(
            "media",
            Arc::new(Noop { produces: vec![], inputs: vec![InputPattern::dir("/p/fonts")] }),
        );
        let graph = PipelineGraph::builder().add_task(styles).add_task(media).build().unwrap();

        assert_eq!(
            graph.tasks_for_path(Path::new("/p/sass/tools/_colors.scss")),
            BTreeSet::from(["styles".into()])
        );
        assert_eq!(
            graph.tasks_for_path(Path::new("/p/fonts/a.woff")),
            BTreeSet::from(["media".into()])
        );
        assert!(graph.tasks_for_path(Path::new("/p/README.md")).is_empty());
    }
}
