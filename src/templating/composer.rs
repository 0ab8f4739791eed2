//! Layout composition.
//!
//! A child template that `@extends` a layout contributes named sections; the
//! layout contributes the page skeleton with `@yield` slots and `@block`
//! defaults. Composition produces one tree:
//!
//! 1. Every section is pulled out of the child (at any depth).
//! 2. The layout is walked: a slot or block with a matching section takes
//!    the section's body (`@parent` inside it expands to the block default),
//!    a block without one keeps its default.
//! 3. Child content outside any section is appended.
//! 4. Sections the layout never consumed stay available as standalone
//!    definitions, so `{% include "name" %}` still finds them.
//!
//! Filled slots stay wrapped in [`Node::Block`], which keeps them
//! overridable when the composed tree is itself extended by another child.
//! The emitter drops the wrapper.

use super::ast::Node;
use crate::core::{BladeError, Result};
use std::collections::{HashMap, HashSet};

/// Sections collected from a child, in definition order.
#[derive(Debug, Default)]
pub struct Definitions {
    order: Vec<String>,
    bodies: HashMap<String, Vec<Node>>,
}

impl Definitions {
    pub fn get(&self, name: &str) -> Option<&Vec<Node>> {
        self.bodies.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bodies.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Record a definition; the first one for a name wins.
    fn insert(&mut self, name: String, body: Vec<Node>) -> bool {
        if self.bodies.contains_key(&name) {
            return false;
        }
        self.order.push(name.clone());
        self.bodies.insert(name, body);
        true
    }
}

/// Remove every [`Node::Section`] from `nodes` (recursively) into `defs`.
///
/// Sections nested in another section are flattened to the top level. When
/// two spliced templates define the same name, the earlier one wins.
pub fn extract_sections(nodes: Vec<Node>, defs: &mut Definitions) -> Vec<Node> {
    let mut rest = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Section { name, body } => {
                let body = extract_sections(body, defs);
                if !defs.insert(name.clone(), body) {
                    tracing::debug!("Section '{}' already defined, keeping the first", name);
                }
            }
            mut other => {
                for body in other.children_mut() {
                    *body = extract_sections(std::mem::take(body), defs);
                }
                rest.push(other);
            }
        }
    }
    rest
}

/// Compose a child's nodes into its layout's nodes.
pub fn compose(template: &str, child: Vec<Node>, layout: Vec<Node>) -> Result<Vec<Node>> {
    let mut defs = Definitions::default();
    let leftover = extract_sections(child, &mut defs);

    let mut expander = Expander {
        template,
        defs: &defs,
        used: HashSet::new(),
        stack: Vec::new(),
    };
    let composed = expander.expand(layout, None)?;
    let leftover: Vec<Node> = expander
        .expand(leftover, None)?
        .into_iter()
        .filter(|node| !node.is_blank())
        .collect();

    let mut present = HashSet::new();
    collect_slot_names(&composed, &mut present);
    collect_slot_names(&leftover, &mut present);

    let mut out = Vec::new();
    for name in defs.names() {
        if expander.used.contains(name) || present.contains(name) {
            continue;
        }
        tracing::debug!("Section '{}' not consumed by layout of '{}'", name, template);
        let body = defs.get(name).cloned().unwrap_or_default();
        let body = expander.expand_definition(name, body, None)?;
        out.push(Node::Section {
            name: name.to_string(),
            body,
        });
    }
    out.extend(composed);
    out.extend(leftover);
    Ok(out)
}

struct Expander<'a> {
    template: &'a str,
    defs: &'a Definitions,
    used: HashSet<String>,
    /// Definitions currently being expanded
    stack: Vec<String>,
}

impl Expander<'_> {
    /// Expand slots in `nodes`. `parent` is the default body `@parent` stands for.
    fn expand(&mut self, nodes: Vec<Node>, parent: Option<&[Node]>) -> Result<Vec<Node>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Yield { name, default } => match self.defs.get(&name) {
                    Some(def) => {
                        let body = self.expand_definition(&name, def.clone(), None)?;
                        self.used.insert(name.clone());
                        out.push(Node::Block { name, body });
                    }
                    None => out.push(Node::Yield { name, default }),
                },
                Node::Block { name, body } => {
                    let default = self.expand(body, parent)?;
                    match self.defs.get(&name) {
                        Some(def) => {
                            let body = self.expand_definition(&name, def.clone(), Some(&default))?;
                            self.used.insert(name.clone());
                            out.push(Node::Block { name, body });
                        }
                        None => out.push(Node::Block {
                            name,
                            body: default,
                        }),
                    }
                }
                Node::Section { name, body } => {
                    // A section left over from a lower level; the child's version wins
                    let body = match self.defs.get(&name) {
                        Some(def) => {
                            let own = self.expand(body, parent)?;
                            self.used.insert(name.clone());
                            self.expand_definition(&name, def.clone(), Some(&own))?
                        }
                        None => self.expand(body, parent)?,
                    };
                    out.push(Node::Section { name, body });
                }
                Node::Parent => {
                    if let Some(parent) = parent {
                        out.extend(parent.iter().cloned());
                    }
                }
                mut other => {
                    for body in other.children_mut() {
                        *body = self.expand(std::mem::take(body), parent)?;
                    }
                    out.push(other);
                }
            }
        }
        Ok(out)
    }

    fn expand_definition(
        &mut self,
        name: &str,
        body: Vec<Node>,
        parent: Option<&[Node]>,
    ) -> Result<Vec<Node>> {
        if self.stack.iter().any(|open| open == name) {
            let mut chain = vec![self.template.to_string()];
            chain.extend(self.stack.iter().map(|open| format!("@section('{open}')")));
            chain.push(format!("@section('{name}')"));
            return Err(BladeError::CircularReference { chain });
        }
        self.stack.push(name.to_string());
        let expanded = self.expand(body, parent);
        self.stack.pop();
        expanded
    }
}

/// Names of every section and block in `nodes`.
pub fn collect_slot_names(nodes: &[Node], names: &mut HashSet<String>) {
    for node in nodes {
        match node {
            Node::Section { name, body } | Node::Block { name, body } => {
                names.insert(name.clone());
                collect_slot_names(body, names);
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    collect_slot_names(&branch.body, names);
                }
                if let Some(otherwise) = otherwise {
                    collect_slot_names(otherwise, names);
                }
            }
            Node::Unless {
                body, otherwise, ..
            } => {
                collect_slot_names(body, names);
                if let Some(otherwise) = otherwise {
                    collect_slot_names(otherwise, names);
                }
            }
            Node::Foreach { body, .. } => collect_slot_names(body, names),
            _ => {}
        }
    }
}
