// src/artifact/class_registry.rs

//! Runtime class hierarchy of payloads.
//!
//! Checkers declare the most general class they accept; an object is
//! compatible if its payload class is that class or inherits from it.
//! The hierarchy is a DAG (multiple parents allowed) with edges pointing
//! from a class to its parents.

use std::collections::HashMap;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::{QcError, Result};

/// Root of the hierarchy; a checker accepting it accepts any payload.
pub const ROOT_CLASS: &str = "TObject";

#[derive(Debug, Clone)]
pub struct ClassRegistry {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ClassRegistry {
    /// Registry containing only [`ROOT_CLASS`].
    pub fn empty() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(ROOT_CLASS.to_string());
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_CLASS.to_string(), root);
        Self { graph, nodes }
    }

    /// Registry seeded with the classes of the built-in payload kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        let defaults = [
            ("TNamed", ROOT_CLASS),
            ("TObjString", ROOT_CLASS),
            ("TH1", "TNamed"),
            ("TH1F", "TH1"),
            ("TH1D", "TH1"),
            ("TH2", "TH1"),
            ("TH2F", "TH2"),
            ("TH2D", "TH2"),
            ("TGraph", "TNamed"),
        ];
        for (class, parent) in defaults {
            // Seed data is acyclic and parents precede children.
            let _ = registry.register(class, parent);
        }
        registry
    }

    pub fn contains(&self, class: &str) -> bool {
        self.nodes.contains_key(class)
    }

    /// Declare `class` as a direct subclass of `parent`.
    ///
    /// The parent must already be known. An edge that would close a cycle is
    /// rejected.
    pub fn register(&mut self, class: &str, parent: &str) -> Result<()> {
        let parent_idx = *self.nodes.get(parent).ok_or_else(|| {
            QcError::ConfigError(format!(
                "cannot register class `{class}`: unknown parent class `{parent}`"
            ))
        })?;

        let existing = self.nodes.get(class).copied();
        if let Some(class_idx) = existing {
            if class_idx == parent_idx || has_path_connecting(&self.graph, parent_idx, class_idx, None) {
                return Err(QcError::ConfigError(format!(
                    "cannot register class `{class}` under `{parent}`: inheritance cycle"
                )));
            }
        }

        // a fresh node has no edges yet, so it cannot close a cycle
        let class_idx = match existing {
            Some(idx) => idx,
            None => {
                let idx = self.graph.add_node(class.to_string());
                self.nodes.insert(class.to_string(), idx);
                idx
            }
        };

        if !self.graph.contains_edge(class_idx, parent_idx) {
            self.graph.add_edge(class_idx, parent_idx, ());
        }
        Ok(())
    }

    /// `true` if `class` is `ancestor` or one of its subclasses.
    ///
    /// Unknown classes only match themselves and [`ROOT_CLASS`].
    pub fn inherits_from(&self, class: &str, ancestor: &str) -> bool {
        if ancestor == ROOT_CLASS || class == ancestor {
            return true;
        }
        match (self.nodes.get(class), self.nodes.get(ancestor)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }

    /// All known class names, sorted.
    pub fn classes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
