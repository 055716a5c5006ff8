//! Build graph
//!
//! An explicit DAG of file targets, keyed by path relative to the build
//! directory. Each node lists the files it is built from; a node is rebuilt
//! only when its target is missing or older than one of those files.
//! Evaluation starts from a synthetic root and only visits nodes connected to
//! it, building prerequisites before their dependents.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::errors::BuildError;

/// A compile step for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTask {
    /// ID of the test this task builds
    pub id: String,
    /// Absolute path of the resolved compiler
    pub compiler: PathBuf,
    pub source: String,
    pub target: String,
    /// Command template (`%{compiler}`, `%{source}`, `%{target}`)
    pub template: String,
    pub env: BTreeMap<String, String>,
    /// Discard the compiler's stdout
    pub quiet: bool,
    /// Move `<target><suffix>` to `<target>` after compiling
    pub rename_suffix: Option<String>,
}

/// What to do when a node is stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAction {
    /// Mirror a file from the source directory
    Copy { from: PathBuf },
    Compile(BuildTask),
}

#[derive(Debug)]
struct Node {
    prerequisites: Vec<PathBuf>,
    action: BuildAction,
}

/// Dependency graph of build targets
#[derive(Debug)]
pub struct BuildGraph {
    dir: PathBuf,
    nodes: HashMap<String, Node>,
    /// Prerequisites of the synthetic root, in registration order
    roots: Vec<String>,
}

impl BuildGraph {
    /// Create an empty graph whose relative paths resolve against `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            nodes: HashMap::new(),
            roots: Vec::new(),
        }
    }

    /// Register a node. Relative prerequisites are build-directory files
    /// (possibly the targets of other nodes); absolute ones are external
    /// files such as compilers.
    ///
    /// Returns `false` (and keeps the existing node) if `target` is already
    /// registered.
    pub fn add_node(
        &mut self,
        target: impl Into<String>,
        prerequisites: Vec<PathBuf>,
        action: BuildAction,
    ) -> bool {
        let target = target.into();
        if self.nodes.contains_key(&target) {
            return false;
        }
        self.nodes.insert(
            target,
            Node {
                prerequisites,
                action,
            },
        );
        true
    }

    /// Make `target` a prerequisite of the synthetic root
    pub fn connect(&mut self, target: &str) {
        if !self.roots.iter().any(|t| t == target) {
            self.roots.push(target.to_string());
        }
    }

    pub fn contains(&self, target: &str) -> bool {
        self.nodes.contains_key(target)
    }

    /// Targets reachable from the root, prerequisites first
    pub fn build_order(&self) -> Result<Vec<String>, BuildError> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut temp_visited = HashSet::new();

        for root in &self.roots {
            self.visit(root, &mut visited, &mut temp_visited, &mut result)?;
        }

        Ok(result)
    }

    fn visit(
        &self,
        target: &str,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) -> Result<(), BuildError> {
        if temp_visited.contains(target) {
            return Err(BuildError::CycleDetected(target.to_string()));
        }

        if visited.contains(target) {
            return Ok(());
        }

        let Some(node) = self.nodes.get(target) else {
            return Ok(());
        };

        temp_visited.insert(target.to_string());

        for prerequisite in &node.prerequisites {
            if let Some(name) = prerequisite.to_str()
                && self.nodes.contains_key(name)
            {
                self.visit(name, visited, temp_visited, result)?;
            }
        }

        temp_visited.remove(target);
        visited.insert(target.to_string());
        result.push(target.to_string());

        Ok(())
    }

    /// Whether `target` must be (re)built
    pub fn is_stale(&self, target: &str) -> Result<bool, BuildError> {
        let Some(node) = self.nodes.get(target) else {
            return Ok(false);
        };

        let Some(built) = mtime(&self.dir.join(target)) else {
            return Ok(true);
        };

        for prerequisite in &node.prerequisites {
            match mtime(&self.dir.join(prerequisite)) {
                Some(modified) if modified > built => return Ok(true),
                Some(_) => {}
                // a prerequisite node which produced no file
                None if self.is_node(prerequisite) => return Ok(true),
                None => {
                    return Err(BuildError::MissingPrerequisite(
                        prerequisite.display().to_string(),
                    ));
                }
            }
        }

        Ok(false)
    }

    /// Evaluate the graph, invoking `build` for each stale node in
    /// dependency order. Returns the number of nodes rebuilt.
    pub fn evaluate<F>(&self, mut build: F) -> Result<usize>
    where
        F: FnMut(&str, &BuildAction) -> Result<()>,
    {
        let mut rebuilt = 0;

        for target in self.build_order()? {
            if !self.is_stale(&target)? {
                debug!(target = %target, "Up to date");
                continue;
            }

            debug!(target = %target, "Stale, rebuilding");
            build(&target, &self.nodes[&target].action)?;
            rebuilt += 1;
        }

        Ok(rebuilt)
    }

    fn is_node(&self, path: &Path) -> bool {
        path.to_str().is_some_and(|name| self.nodes.contains_key(name))
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
