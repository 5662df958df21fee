//! The signal dependency graph: a DAG built from explicit edges and/or
//! declarative attribute dependencies, topologically sorted with Kahn's
//! algorithm.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::signal::Signal;

/// A declarative dependency, attached to a signal at `add_signal` time and
/// resolved against the builder's other signals by
/// `apply_attribute_dependencies`. A name match wins if both are given.
#[derive(Debug, Clone, Default)]
pub struct DependencyAttr {
    pub target_name: Option<String>,
    pub target_kind: Option<&'static str>,
}

impl DependencyAttr {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { target_name: Some(name.into()), target_kind: None }
    }

    pub fn by_kind(kind: &'static str) -> Self {
        Self { target_name: None, target_kind: Some(kind) }
    }
}

#[derive(Debug)]
struct PendingNode {
    signal: Signal,
    attributes: Vec<DependencyAttr>,
}

/// Builds a [`Graph`] from signals, explicit edges, and declarative
/// attribute dependencies.
#[derive(Default, Debug)]
pub struct GraphBuilder {
    nodes: HashMap<String, PendingNode>,
    order: Vec<String>,
    /// child -> parents
    dependencies: HashMap<String, HashSet<String>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signal with no declarative dependencies.
    pub fn add_signal(&mut self, signal: Signal) -> CoordinatorResult<&mut Self> {
        self.add_signal_with_attributes(signal, Vec::new())
    }

    /// Adds a signal along with declarative dependency attributes to be
    /// resolved by `apply_attribute_dependencies`.
    pub fn add_signal_with_attributes(
        &mut self,
        signal: Signal,
        attributes: Vec<DependencyAttr>,
    ) -> CoordinatorResult<&mut Self> {
        let name = signal.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(CoordinatorError::DuplicateSignal(name));
        }
        self.order.push(name.clone());
        self.dependencies.entry(name.clone()).or_default();
        self.nodes.insert(name, PendingNode { signal, attributes });
        Ok(self)
    }

    /// Adds explicit `child depends on parents...` edges. Both ends must
    /// already have been added via `add_signal`.
    pub fn depends_on(&mut self, child: &str, parents: &[&str]) -> CoordinatorResult<&mut Self> {
        if !self.nodes.contains_key(child) {
            return Err(CoordinatorError::MissingDependency {
                signal: child.to_string(),
                target: child.to_string(),
            });
        }
        for parent in parents {
            if !self.nodes.contains_key(*parent) {
                return Err(CoordinatorError::MissingDependency {
                    signal: child.to_string(),
                    target: parent.to_string(),
                });
            }
            self.dependencies.get_mut(child).unwrap().insert(parent.to_string());
        }
        Ok(self)
    }

    /// Resolves every signal's declarative `DependencyAttr`s against the
    /// signals already added. A name match wins when both name and kind
    /// are given; a missing named target is an error. A kind match adds
    /// one edge per signal sharing that kind.
    pub fn apply_attribute_dependencies(&mut self) -> CoordinatorResult<&mut Self> {
        let kind_index: HashMap<&'static str, Vec<String>> = {
            let mut index: HashMap<&'static str, Vec<String>> = HashMap::new();
            for (name, node) in &self.nodes {
                if let Some(kind) = node.signal.kind() {
                    index.entry(kind).or_default().push(name.clone());
                }
            }
            index
        };

        let attrs_by_child: Vec<(String, Vec<DependencyAttr>)> = self
            .nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.attributes.clone()))
            .collect();

        for (child, attrs) in attrs_by_child {
            for attr in attrs {
                match (&attr.target_name, attr.target_kind) {
                    (Some(name), _) => {
                        if !self.nodes.contains_key(name) {
                            return Err(CoordinatorError::MissingDependency {
                                signal: child.clone(),
                                target: name.clone(),
                            });
                        }
                        self.dependencies.get_mut(&child).unwrap().insert(name.clone());
                    }
                    (None, Some(kind)) => {
                        let Some(targets) = kind_index.get(kind) else {
                            return Err(CoordinatorError::MissingDependency {
                                signal: child.clone(),
                                target: kind.to_string(),
                            });
                        };
                        let deps = self.dependencies.get_mut(&child).unwrap();
                        for target in targets {
                            if target != &child {
                                deps.insert(target.clone());
                            }
                        }
                    }
                    (None, None) => {}
                }
            }
        }

        Ok(self)
    }

    /// Performs a Kahn topological sort and builds the immutable [`Graph`].
    ///
    /// A self-loop or any other cycle causes this to fail with
    /// `CoordinatorError::CycleDetected`, naming at least one node on the
    /// cycle. No partial graph is returned on failure.
    pub fn build(self) -> CoordinatorResult<Graph> {
        let GraphBuilder { nodes, order, dependencies } = self;

        let mut dependents: HashMap<String, HashSet<String>> =
            order.iter().map(|n| (n.clone(), HashSet::new())).collect();
        for (child, parents) in &dependencies {
            for parent in parents {
                dependents.entry(parent.clone()).or_default().insert(child.clone());
            }
        }

        let mut in_degree: HashMap<String, usize> =
            order.iter().map(|n| (n.clone(), dependencies[n].len())).collect();

        let mut ready: VecDeque<String> = order
            .iter()
            .filter(|n| in_degree[*n] == 0)
            .cloned()
            .collect();

        let mut topo_order = Vec::with_capacity(order.len());
        while let Some(name) = ready.pop_front() {
            topo_order.push(name.clone());
            if let Some(children) = dependents.get(&name) {
                let mut children: Vec<&String> = children.iter().collect();
                children.sort();
                for child in children {
                    let degree = in_degree.get_mut(child).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(child.clone());
                    }
                }
            }
        }

        if topo_order.len() != order.len() {
            let remaining: Vec<String> = order.into_iter().filter(|n| !topo_order.contains(n)).collect();
            return Err(CoordinatorError::CycleDetected(remaining));
        }

        let mut nodes = nodes;
        let signals: Vec<Signal> = topo_order
            .iter()
            .map(|name| nodes.remove(name).unwrap().signal)
            .collect();

        Ok(Graph { signals, dependencies, dependents })
    }
}

/// An acyclic dependency graph over a fixed set of signals, in
/// topological order.
#[derive(Debug)]
pub struct Graph {
    signals: Vec<Signal>,
    /// child -> parents
    dependencies: HashMap<String, HashSet<String>>,
    /// parent -> children
    dependents: HashMap<String, HashSet<String>>,
}

impl Graph {
    /// Signals in topological order (dependencies before dependents).
    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn get_root_signals(&self) -> Vec<&Signal> {
        self.signals
            .iter()
            .filter(|s| self.dependencies.get(s.name()).map_or(true, HashSet::is_empty))
            .collect()
    }

    pub fn get_leaf_signals(&self) -> Vec<&Signal> {
        self.signals
            .iter()
            .filter(|s| self.dependents.get(s.name()).map_or(true, HashSet::is_empty))
            .collect()
    }

    pub fn get_dependencies(&self, name: &str) -> Vec<&str> {
        self.dependencies.get(name).map(|s| s.iter().map(String::as_str).collect()).unwrap_or_default()
    }

    pub fn get_dependents(&self, name: &str) -> Vec<&str> {
        self.dependents.get(name).map(|s| s.iter().map(String::as_str).collect()).unwrap_or_default()
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name() == name)
    }

    /// All transitive dependents of `name`, in no particular order.
    pub fn transitive_dependents(&self, name: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = self.get_dependents(name).into_iter().map(str::to_string).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.get_dependents(&next).into_iter().map(str::to_string));
            }
        }
        seen
    }
}
