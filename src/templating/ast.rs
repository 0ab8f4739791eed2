//! Directive syntax tree.
//!
//! The parser turns a directive template into a [`Document`]: an optional
//! layout name plus a tree of [`Node`]s. Comments, `@php` spans and
//! `@extends` never appear in the tree.

/// A parsed directive template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    /// Target of the template's `@extends`, if any.
    pub layout: Option<String>,
    pub nodes: Vec<Node>,
}

/// One `@if` / `@elseif` arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Normalized Tera condition
    pub condition: String,
    pub body: Vec<Node>,
}

/// Whitespace-control markers of an echo (`{{- x -}}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trim {
    pub left: bool,
    pub right: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Literal text, emitted as-is.
    Text(String),
    /// `{{ expr }}` (escaped) or `{!! expr !!}` (raw); `expr` is already normalized.
    Echo {
        expr: String,
        escaped: bool,
        trim: Trim,
    },
    /// `@{{ ... }}`: text Tera must not interpret.
    Verbatim(String),
    /// Named slot definition supplied to a layout.
    Section { name: String, body: Vec<Node> },
    /// Layout placeholder with a default body.
    Block { name: String, body: Vec<Node> },
    /// Slot invocation with an optional literal fallback.
    Yield { name: String, default: Option<String> },
    /// Unresolved `@include`; the compiler splices the target in its place.
    Include { name: String, line: usize },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Unless {
        condition: String,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
    Foreach {
        collection: String,
        key: Option<String>,
        item: String,
        body: Vec<Node>,
    },
    /// `@parent`: the overridden block's default body.
    Parent,
}

impl Node {
    /// Whether the node would emit nothing visible.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }

    /// Mutable access to every child body, in source order.
    pub fn children_mut(&mut self) -> Vec<&mut Vec<Node>> {
        match self {
            Self::Section { body, .. } | Self::Block { body, .. } => vec![body],
            Self::If {
                branches,
                otherwise,
            } => {
                let mut bodies: Vec<&mut Vec<Node>> =
                    branches.iter_mut().map(|branch| &mut branch.body).collect();
                if let Some(otherwise) = otherwise {
                    bodies.push(otherwise);
                }
                bodies
            }
            Self::Unless {
                body, otherwise, ..
            } => {
                let mut bodies = vec![body];
                if let Some(otherwise) = otherwise {
                    bodies.push(otherwise);
                }
                bodies
            }
            Self::Foreach { body, .. } => vec![body],
            Self::Text(_)
            | Self::Echo { .. }
            | Self::Verbatim(_)
            | Self::Yield { .. }
            | Self::Include { .. }
            | Self::Parent => Vec::new(),
        }
    }
}

/// Trim leading whitespace of the first text node and trailing whitespace of
/// the last, dropping nodes that become empty.
pub fn trim_body(mut body: Vec<Node>) -> Vec<Node> {
    while let Some(Node::Text(text)) = body.first_mut() {
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            body.remove(0);
        } else {
            *text = trimmed.to_string();
            break;
        }
    }
    while let Some(Node::Text(text)) = body.last_mut() {
        let trimmed = text.trim_end();
        if trimmed.is_empty() {
            body.pop();
        } else {
            *text = trimmed.to_string();
            break;
        }
    }
    body
}

/// Merge adjacent text nodes.
pub fn coalesce(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let (Node::Text(text), Some(Node::Text(previous))) = (&node, out.last_mut()) {
            previous.push_str(text);
            continue;
        }
        out.push(node);
    }
    out
}
