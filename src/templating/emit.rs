//! Tera text generation from a (composed) node tree.
//!
//! Named sections are hoisted to the head of the output as definition
//! envelopes:
//!
//! ```text
//! {# define "sidebar" #}<nav>...</nav>{# enddefine "sidebar" #}
//! ```
//!
//! The envelopes are Tera comments, so the text stays valid Tera on its own;
//! the runtime splits them into separately named templates before parsing.
//! A slot naming one of those definitions becomes `{% include "name" %}`.

use super::ast::Node;
use super::composer::{Definitions, extract_sections};
use super::expr::{negate, wrap_echo};
use crate::core::{BladeError, Result};
use std::collections::HashSet;

pub const DEFINE_OPEN: &str = "{# define \"";
pub const DEFINE_CLOSE: &str = "{# enddefine \"";

/// Emit Tera text for `nodes`, hoisting any sections into envelopes.
pub fn emit(template: &str, nodes: Vec<Node>) -> Result<String> {
    let mut defs = Definitions::default();
    let main = extract_sections(nodes, &mut defs);
    check_definition_cycles(template, &defs)?;

    let mut out = String::new();
    for name in defs.names() {
        let body = defs.get(name).map(Vec::as_slice).unwrap_or_default();
        out.push_str(DEFINE_OPEN);
        out.push_str(name);
        out.push_str("\" #}");
        emit_nodes(template, body, &defs, &mut out)?;
        out.push_str(DEFINE_CLOSE);
        out.push_str(name);
        out.push_str("\" #}\n");
    }
    emit_nodes(template, &main, &defs, &mut out)?;
    Ok(out)
}

fn emit_nodes(template: &str, nodes: &[Node], defs: &Definitions, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Echo {
                expr,
                escaped,
                trim,
            } => out.push_str(&wrap_echo(expr, *escaped, *trim)),
            Node::Verbatim(text) => push_literal(out, text),
            Node::Block { name, body } => {
                if defs.contains(name) {
                    push_include(out, name);
                } else {
                    emit_nodes(template, body, defs, out)?;
                }
            }
            Node::Yield { name, default } => {
                if defs.contains(name) {
                    push_include(out, name);
                } else if let Some(default) = default {
                    push_literal(out, default);
                }
            }
            Node::If {
                branches,
                otherwise,
            } => {
                for (i, branch) in branches.iter().enumerate() {
                    let tag = if i == 0 { "if" } else { "elif" };
                    out.push_str(&format!("{{% {tag} {} %}}", branch.condition));
                    emit_nodes(template, &branch.body, defs, out)?;
                }
                if let Some(otherwise) = otherwise {
                    out.push_str("{% else %}");
                    emit_nodes(template, otherwise, defs, out)?;
                }
                out.push_str("{% endif %}");
            }
            Node::Unless {
                condition,
                body,
                otherwise,
            } => {
                out.push_str(&format!("{{% if {} %}}", negate(condition)));
                emit_nodes(template, body, defs, out)?;
                if let Some(otherwise) = otherwise {
                    out.push_str("{% else %}");
                    emit_nodes(template, otherwise, defs, out)?;
                }
                out.push_str("{% endif %}");
            }
            Node::Foreach {
                collection,
                key,
                item,
                body,
            } => {
                match key {
                    Some(key) => out.push_str(&format!("{{% for {key}, {item} in {collection} %}}")),
                    None => out.push_str(&format!("{{% for {item} in {collection} %}}")),
                }
                emit_nodes(template, body, defs, out)?;
                out.push_str("{% endfor %}");
            }
            Node::Include { name, line } => {
                return Err(BladeError::directive(
                    template,
                    *line,
                    format!("@include('{name}') was not resolved"),
                ));
            }
            // Hoisted by `emit`; `@parent` outside an override renders nothing
            Node::Section { .. } | Node::Parent => {}
        }
    }
    Ok(())
}

fn push_include(out: &mut String, name: &str) {
    out.push_str(&format!("{{% include \"{name}\" %}}"));
}

/// Literal text that must not be read as Tera syntax.
///
/// Braces go inside `{% raw %}`. Every `{%` is printed as a string
/// expression instead, so no raw span can contain its own terminator.
fn push_literal(out: &mut String, text: &str) {
    if !text.contains('{') {
        out.push_str(text);
        return;
    }
    for (i, part) in text.split("{%").enumerate() {
        if i > 0 {
            out.push_str("{{ \"{%\" }}");
        }
        if part.contains('{') {
            out.push_str("{% raw %}");
            out.push_str(part);
            out.push_str("{% endraw %}");
        } else {
            out.push_str(part);
        }
    }
}

/// Reject definitions that include themselves through slots.
fn check_definition_cycles(template: &str, defs: &Definitions) -> Result<()> {
    fn visit(
        template: &str,
        name: &str,
        defs: &Definitions,
        stack: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Result<()> {
        if done.contains(name) {
            return Ok(());
        }
        if stack.iter().any(|open| open == name) {
            let mut chain = vec![template.to_string()];
            chain.extend(stack.iter().map(|open| format!("@section('{open}')")));
            chain.push(format!("@section('{name}')"));
            return Err(BladeError::CircularReference { chain });
        }
        stack.push(name.to_string());
        let mut referenced = Vec::new();
        if let Some(body) = defs.get(name) {
            slot_references(body, &mut referenced);
        }
        for next in referenced.iter().filter(|next| defs.contains(next)) {
            visit(template, next, defs, stack, done)?;
        }
        stack.pop();
        done.insert(name.to_string());
        Ok(())
    }

    let mut done = HashSet::new();
    for name in defs.names() {
        visit(template, name, defs, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}

fn slot_references(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Yield { name, .. } => out.push(name.clone()),
            Node::Block { name, body } => {
                out.push(name.clone());
                slot_references(body, out);
            }
            Node::Section { body, .. } | Node::Foreach { body, .. } => slot_references(body, out),
            Node::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    slot_references(&branch.body, out);
                }
                if let Some(otherwise) = otherwise {
                    slot_references(otherwise, out);
                }
            }
            Node::Unless {
                body, otherwise, ..
            } => {
                slot_references(body, out);
                if let Some(otherwise) = otherwise {
                    slot_references(otherwise, out);
                }
            }
            _ => {}
        }
    }
}

/// Split definition envelopes off the head of `text`.
///
/// Returns `(definitions, main)`. Text without envelopes comes back whole.
pub fn split_definitions(text: &str) -> (Vec<(String, String)>, &str) {
    let mut definitions = Vec::new();
    let mut rest = text;
    while let Some(after_open) = rest.strip_prefix(DEFINE_OPEN) {
        let Some(name_end) = after_open.find("\" #}") else {
            break;
        };
        let name = &after_open[..name_end];
        let body_start = &after_open[name_end + 4..];
        let close = format!("{DEFINE_CLOSE}{name}\" #}}");
        let Some(body_end) = body_start.find(&close) else {
            break;
        };
        definitions.push((name.to_string(), body_start[..body_end].to_string()));
        let after_close = &body_start[body_end + close.len()..];
        rest = after_close.strip_prefix('\n').unwrap_or(after_close);
    }
    (definitions, rest)
}
