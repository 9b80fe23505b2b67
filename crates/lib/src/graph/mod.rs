//! Build graph construction.
//!
//! Turns a (validated) [`Sakefile`] into a directed acyclic graph of targets.
//! An edge `M -> N` means N depends on something M outputs, so M must build
//! first. The graph also computes the execution orders used by the scheduler:
//! a plain topological order and the parallel levels.

pub mod paths;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sakefile::{ALL, DEPENDENCIES, FORMULA, HELP, OUTPUT, Sakefile, is_meta_target, scalar_to_string};

/// Stable handle to a target inside one [`BuildGraph`].
pub type TargetId = NodeIndex;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("dependency cycle detected involving target '{target}'")]
  Cycle { target: String },

  #[error("unknown target: {0}")]
  UnknownTarget(String),

  #[error("target '{0}' is defined more than once")]
  DuplicateTarget(String),

  #[error("entry '{0}' is not a target definition")]
  NotATarget(String),
}

/// A unit of build work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
  pub name: String,
  pub help: String,
  /// Shell command(s), passed verbatim to one shell invocation.
  pub formula: String,
  /// Root-relative paths (possibly glob patterns) this target reads.
  pub dependencies: Vec<String>,
  /// Root-relative paths (possibly glob patterns) this target writes.
  pub outputs: Vec<String>,
  /// Meta-target this target is grouped under.
  pub parent: Option<String>,
}

impl Target {
  fn from_fields(name: &str, fields: &Mapping, parent: Option<&str>) -> Self {
    let string_field = |key: &str| fields.get(key).and_then(scalar_to_string).unwrap_or_default();

    Self {
      name: name.to_string(),
      help: string_field(HELP),
      formula: string_field(FORMULA),
      dependencies: path_list(fields.get(DEPENDENCIES)),
      outputs: path_list(fields.get(OUTPUT)),
      parent: parent.map(str::to_string),
    }
  }
}

/// The dependency graph of one Sakefile.
#[derive(Debug, Clone)]
pub struct BuildGraph {
  /// Directory every target path is relative to.
  root: PathBuf,

  graph: DiGraph<Target, ()>,

  /// Map from target name to node index.
  nodes: HashMap<String, NodeIndex>,

  /// Meta-target name to the names of its children.
  meta_targets: BTreeMap<String, Vec<String>>,
}

impl BuildGraph {
  /// Construct the graph for `sakefile`, with paths relative to `root`.
  ///
  /// Runs three passes: node creation, path normalization and edge inference.
  /// Fails on a dependency cycle.
  pub fn construct(sakefile: &Sakefile, root: &Path) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut meta_targets = BTreeMap::new();

    let mut add = |target: Target, graph: &mut DiGraph<Target, ()>| -> Result<(), GraphError> {
      if nodes.contains_key(&target.name) {
        return Err(GraphError::DuplicateTarget(target.name));
      }
      let name = target.name.clone();
      let idx = graph.add_node(target);
      nodes.insert(name, idx);
      Ok(())
    };

    // Node creation
    for (name, value) in sakefile.entries().filter(|(name, _)| *name != ALL) {
      let Value::Mapping(fields) = value else {
        return Err(GraphError::NotATarget(name.to_string()));
      };

      if is_meta_target(fields) {
        let mut children = Vec::new();
        for (key, child) in fields {
          let Some(child_name) = scalar_to_string(key) else {
            continue;
          };
          if child_name == HELP {
            continue;
          }
          let Value::Mapping(child_fields) = child else {
            return Err(GraphError::NotATarget(child_name));
          };
          add(Target::from_fields(&child_name, child_fields, Some(name)), &mut graph)?;
          children.push(child_name);
        }
        meta_targets.insert(name.to_string(), children);
      } else {
        add(Target::from_fields(name, fields, None), &mut graph)?;
      }
    }

    // Path normalization
    for target in graph.node_weights_mut() {
      for output in &mut target.outputs {
        *output = paths::normalize(output, root);
      }
      for dependency in &mut target.dependencies {
        *dependency = paths::normalize(dependency, root);
        if !paths::has_glob_chars(dependency) && root.join(&*dependency).is_dir() {
          warn!(
            name = %target.name,
            dependency = %dependency,
            "directory dependencies are never hashed, so this target always runs"
          );
        }
      }
    }

    // Edge inference
    let expanded_outputs: HashMap<NodeIndex, Vec<String>> = graph
      .node_indices()
      .map(|idx| {
        let outputs = graph[idx].outputs.iter().flat_map(|o| paths::expand(o, root)).collect();
        (idx, outputs)
      })
      .collect();

    let indices: Vec<NodeIndex> = graph.node_indices().collect();
    for &dependent in &indices {
      let dependencies = graph[dependent].dependencies.clone();
      for dependency in &dependencies {
        let matcher = paths::DependencyMatcher::new(dependency);
        for &producer in &indices {
          if producer == dependent {
            continue;
          }
          if expanded_outputs[&producer].iter().any(|o| matcher.matches(o)) {
            debug!(
              from = %graph[producer].name,
              to = %graph[dependent].name,
              dependency = %dependency,
              "adding edge"
            );
            graph.update_edge(producer, dependent, ());
          }
        }
      }
    }

    let build_graph = Self {
      root: root.to_path_buf(),
      graph,
      nodes,
      meta_targets,
    };

    build_graph.verify_acyclic()?;

    info!(
      targets = build_graph.len(),
      edges = build_graph.graph.edge_count(),
      "constructed build graph"
    );

    Ok(build_graph)
  }

  fn verify_acyclic(&self) -> Result<(), GraphError> {
    self.topological_order().map(|_| ())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn target(&self, id: TargetId) -> &Target {
    &self.graph[id]
  }

  pub fn find(&self, name: &str) -> Option<TargetId> {
    self.nodes.get(name).copied()
  }

  /// All targets in insertion order.
  pub fn targets(&self) -> impl Iterator<Item = (TargetId, &Target)> {
    self.graph.node_indices().map(|idx| (idx, &self.graph[idx]))
  }

  /// Direct dependencies (producers) of a target.
  pub fn predecessors(&self, id: TargetId) -> Vec<TargetId> {
    self.graph.neighbors_directed(id, Direction::Incoming).collect()
  }

  /// Whether `to` directly depends on an output of `from`.
  pub fn has_edge(&self, from: &str, to: &str) -> bool {
    match (self.find(from), self.find(to)) {
      (Some(a), Some(b)) => self.graph.contains_edge(a, b),
      _ => false,
    }
  }

  /// Targets in an order where every target follows all of its dependencies.
  pub fn topological_order(&self) -> Result<Vec<TargetId>, GraphError> {
    toposort(&self.graph, None).map_err(|cycle| GraphError::Cycle {
      target: self.graph[cycle.node_id()].name.clone(),
    })
  }

  /// Partition the targets into levels safe to run concurrently.
  ///
  /// Starts from the sinks (targets nothing depends on) and walks backwards
  /// through direct predecessors, one level at a time. The levels are then
  /// reversed and each target is kept only at its first occurrence, which is
  /// the deepest level it was reached at. Every predecessor of a target lands
  /// in an earlier level and no two targets in a level depend on each other.
  pub fn parallel_levels(&self) -> Result<Vec<Vec<TargetId>>, GraphError> {
    let mut levels: Vec<Vec<NodeIndex>> = Vec::new();

    let mut current: Vec<NodeIndex> = self
      .graph
      .node_indices()
      .filter(|&idx| self.graph.neighbors_directed(idx, Direction::Outgoing).next().is_none())
      .collect();

    while !current.is_empty() {
      if levels.len() > self.len() {
        let target = self.graph[current[0]].name.clone();
        return Err(GraphError::Cycle { target });
      }

      let mut previous = Vec::new();
      for &idx in &current {
        for pred in self.predecessors(idx) {
          if !previous.contains(&pred) {
            previous.push(pred);
          }
        }
      }

      levels.push(current);
      current = previous;
    }

    levels.reverse();

    let mut seen = HashSet::new();
    let levels = levels
      .into_iter()
      .map(|level| {
        let mut level: Vec<NodeIndex> = level.into_iter().filter(|idx| seen.insert(*idx)).collect();
        level.sort();
        level
      })
      .filter(|level| !level.is_empty())
      .collect();

    Ok(levels)
  }

  /// Restrict the graph to the named targets and everything they depend on.
  ///
  /// A meta-target name selects all of its children.
  pub fn subgraph(&self, names: &[String]) -> Result<BuildGraph, GraphError> {
    let mut stack = Vec::new();
    for name in names {
      if let Some(idx) = self.find(name) {
        stack.push(idx);
      } else if let Some(children) = self.meta_targets.get(name) {
        stack.extend(children.iter().filter_map(|child| self.find(child)));
      } else {
        return Err(GraphError::UnknownTarget(name.clone()));
      }
    }

    let mut keep = HashSet::new();
    while let Some(idx) = stack.pop() {
      if keep.insert(idx) {
        stack.extend(self.graph.neighbors_directed(idx, Direction::Incoming));
      }
    }

    let graph = self
      .graph
      .filter_map(|idx, target| keep.contains(&idx).then(|| target.clone()), |_, edge| Some(*edge));

    let nodes = graph
      .node_indices()
      .map(|idx| (graph[idx].name.clone(), idx))
      .collect::<HashMap<_, _>>();

    let meta_targets = self
      .meta_targets
      .iter()
      .filter_map(|(meta, children)| {
        let kept: Vec<String> = children.iter().filter(|c| nodes.contains_key(*c)).cloned().collect();
        (!kept.is_empty()).then(|| (meta.clone(), kept))
      })
      .collect();

    debug!(selected = ?names, targets = graph.node_count(), "extracted subgraph");

    Ok(BuildGraph {
      root: self.root.clone(),
      graph,
      nodes,
      meta_targets,
    })
  }
}

fn path_list(value: Option<&Value>) -> Vec<String> {
  match value {
    Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
    Some(other) => scalar_to_string(other).into_iter().collect(),
    None => Vec::new(),
  }
}
