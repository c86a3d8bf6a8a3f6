//! The named task graph.
//!
//! A [`TaskNode`] is a unit of work with a declared dependency list. The full
//! set forms a Directed Acyclic Graph; dependencies are explicit edges, and
//! execution order is derived from the graph rather than declaration order.
//! Composite tasks (`build`, `styles`, ...) carry no body and exist purely to
//! name a dependency set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use camino::Utf8Path;
use glob::Pattern;
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, Reversed};

use crate::config::BuildContext;
use crate::error::GraphError;

/// Body of a leaf task. Errors returned here mark the task as failed without
/// aborting sibling tasks.
pub type TaskFn = Arc<dyn Fn(&BuildContext) -> anyhow::Result<()> + Send + Sync>;

pub struct TaskNode {
    pub name: &'static str,
    pub(crate) body: Option<TaskFn>,
    /// Root-relative glob patterns; a matching file change marks this task
    /// dirty in watch mode.
    pub(crate) watch: Vec<Pattern>,
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("composite", &self.body.is_none())
            .field("watch", &self.watch)
            .finish()
    }
}

#[derive(Default)]
pub struct TaskGraph {
    pub(crate) graph: Graph<TaskNode, ()>,
    index: HashMap<&'static str, NodeIndex>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a leaf task with a body. All dependencies must already be
    /// registered; forward references are a configuration error.
    pub fn add_task<F>(
        &mut self,
        name: &'static str,
        deps: &[&str],
        body: F,
    ) -> Result<NodeIndex, GraphError>
    where
        F: Fn(&BuildContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_node(name, deps, Some(Arc::new(body)))
    }

    /// Register a composite task: an empty body naming a dependency set.
    pub fn add_composite(
        &mut self,
        name: &'static str,
        deps: &[&str],
    ) -> Result<NodeIndex, GraphError> {
        self.add_node(name, deps, None)
    }

    fn add_node(
        &mut self,
        name: &'static str,
        deps: &[&str],
        body: Option<TaskFn>,
    ) -> Result<NodeIndex, GraphError> {
        if self.index.contains_key(name) {
            return Err(GraphError::Duplicate(name.to_string()));
        }

        let mut edges = Vec::with_capacity(deps.len());
        for dep in deps {
            let dep_index =
                self.index
                    .get(dep)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownDependency {
                        task: name.to_string(),
                        dependency: dep.to_string(),
                    })?;
            edges.push(dep_index);
        }

        let index = self.graph.add_node(TaskNode {
            name,
            body,
            watch: Vec::new(),
        });

        for dep_index in edges {
            self.graph.add_edge(dep_index, index, ());
        }

        self.index.insert(name, index);
        Ok(index)
    }

    /// Bind watch patterns to a registered task.
    pub fn watch(&mut self, name: &str, patterns: &[String]) -> Result<(), GraphError> {
        let index = self.resolve(name)?;

        for pattern in patterns {
            let pattern = Pattern::new(pattern)?;
            self.graph[index].watch.push(pattern);
        }

        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownTask(name.to_string()))
    }

    pub fn task_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.graph.node_weights().map(|node| node.name)
    }

    /// Cycle check. Run before execution; a cycle is reported as a
    /// configuration error instead of looping forever.
    pub fn validate(&self) -> Result<(), GraphError> {
        petgraph::algo::toposort(&self.graph, None)
            .map(|_| ())
            .map_err(|cycle| GraphError::Cycle(self.graph[cycle.node_id()].name.to_string()))
    }

    /// The goal task plus its transitive dependencies.
    pub fn closure(&self, goal: NodeIndex) -> HashSet<NodeIndex> {
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, goal);
        let mut set = HashSet::new();

        while let Some(index) = dfs.next(reversed) {
            set.insert(index);
        }

        set
    }

    /// The given tasks plus everything depending on them, directly or
    /// transitively. Used by watch mode to re-run the dirty subgraph.
    pub fn descendants(&self, dirty: &HashSet<NodeIndex>) -> HashSet<NodeIndex> {
        let mut set = HashSet::new();

        for &start in dirty {
            let mut dfs = Dfs::new(&self.graph, start);
            while let Some(index) = dfs.next(&self.graph) {
                set.insert(index);
            }
        }

        set
    }

    /// Tasks whose watch patterns match the given root-relative path.
    pub fn dirtied_by(&self, path: &Utf8Path) -> HashSet<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph[index]
                    .watch
                    .iter()
                    .any(|pattern| pattern.matches(path.as_str()))
            })
            .collect()
    }

    pub(crate) fn dependencies(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .neighbors_directed(index, petgraph::Direction::Incoming)
    }

    pub(crate) fn dependents(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .neighbors_directed(index, petgraph::Direction::Outgoing)
    }
}

impl std::fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            writeln!(f, "    {:?}[\"{}\"]", index.index(), self.graph[index].name)?;
        }

        for edge in self.graph.edge_indices() {
            let (source, target) = self.graph.edge_endpoints(edge).unwrap();
            writeln!(f, "    {:?} --> {:?}", source.index(), target.index())?;
        }

        Ok(())
    }
}
