//! Tera runtime wrapper.
//!
//! [`HostRuntime`] turns compiled text into a ready-to-render [`Tera`]
//! instance: definition envelopes become separately named templates, the
//! helper registry is installed and HTML autoescaping is switched off (the
//! compiler already decided what gets escaped). Tera errors are flattened
//! into single readable messages.

use regex::Regex;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use strsim::levenshtein;
use tera::{Context as TeraContext, Tera};

use super::emit::split_definitions;
use super::filters::FunctionRegistry;
use crate::core::{BladeError, Result};

/// Maximum Levenshtein distance, as a percentage of the name's length, for
/// variable suggestions.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Parses and executes compiled template text.
#[derive(Debug, Clone, Default)]
pub struct HostRuntime {
    registry: Arc<FunctionRegistry>,
}

impl HostRuntime {
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Validate `text` and build the Tera instance that renders it as `name`.
    ///
    /// # Errors
    ///
    /// [`BladeError::HostSyntax`] when Tera rejects the text (or one of its
    /// definitions).
    pub fn parse(&self, name: &str, text: &str) -> Result<Tera> {
        let (definitions, main) = split_definitions(text);

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        self.registry.install(&mut tera);

        let mut templates: Vec<(String, String)> = definitions
            .into_iter()
            .filter(|(definition, _)| definition != name)
            .collect();
        templates.push((name.to_string(), main.to_string()));

        tera.add_raw_templates(templates).map_err(|e| {
            let line = extract_line_from_tera_error(&e);
            let mut message = format_tera_error(&e);
            if let Some(line) = line {
                message = format!("{message} (compiled line {line})");
            }
            BladeError::HostSyntax {
                template: name.to_string(),
                message,
            }
        })?;

        tracing::trace!("Parsed compiled template '{}'", name);
        Ok(tera)
    }

    /// Render `name` from `tera` with `data` as the context root.
    pub fn render(tera: &Tera, name: &str, data: &Value) -> Result<String> {
        let context = build_context(name, data)?;
        tera.render(name, &context).map_err(|e| render_error(name, &e, data))
    }

    /// Render `name` straight into `writer`.
    pub fn render_to(tera: &Tera, name: &str, data: &Value, writer: impl Write) -> Result<()> {
        let context = build_context(name, data)?;
        tera.render_to(name, &context, writer).map_err(|e| render_error(name, &e, data))
    }
}

fn build_context(name: &str, data: &Value) -> Result<TeraContext> {
    match data {
        Value::Null => Ok(TeraContext::new()),
        Value::Object(_) => TeraContext::from_serialize(data).map_err(|e| BladeError::Render {
            template: name.to_string(),
            message: format_tera_error(&e),
        }),
        other => Err(BladeError::Render {
            template: name.to_string(),
            message: format!("render data must be a JSON object, got {}", json_kind(other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn render_error(name: &str, error: &tera::Error, data: &Value) -> BladeError {
    let mut message = format_tera_error(error);

    if let Some(variable) = extract_variable_name(&message) {
        let available: Vec<String> = data
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        let root = variable.split('.').next().unwrap_or(&variable);
        let suggestions = find_similar_variables(root, &available);
        if !suggestions.is_empty() {
            message = format!("{message} (did you mean: {}?)", suggestions.join(", "));
        }
    }

    BladeError::Render {
        template: name.to_string(),
        message,
    }
}

/// Flatten a Tera error chain into one message.
pub fn format_tera_error(error: &tera::Error) -> String {
    use std::error::Error;

    let mut messages = vec![error.to_string()];
    let mut current: Option<&dyn Error> = error.source();
    while let Some(err) = current {
        messages.push(err.to_string());
        current = err.source();
    }

    let messages: Vec<String> = messages
        .into_iter()
        .map(|msg| msg.trim().to_string())
        .filter(|msg| !msg.is_empty())
        .collect();

    if messages.is_empty() {
        "unknown Tera error".to_string()
    } else {
        messages.join(": ")
    }
}

/// Variable name from Tera's "Variable `foo` not found" message.
fn extract_variable_name(error_msg: &str) -> Option<String> {
    let re = Regex::new(r"Variable `([^`]+)` not found").ok()?;
    re.captures(error_msg)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn find_similar_variables(target: &str, available: &[String]) -> Vec<String> {
    let mut scored: Vec<_> =
        available.iter().map(|var| (var.clone(), levenshtein(target, var))).collect();
    scored.sort_by_key(|(_, dist)| *dist);
    scored
        .into_iter()
        .filter(|(_, dist)| *dist > 0 && *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
        .take(3)
        .map(|(var, _)| var)
        .collect()
}

/// Line number from a Tera parse error (`--> 3:7`).
fn extract_line_from_tera_error(error: &tera::Error) -> Option<usize> {
    let error_msg = format!("{error:?}");
    let re = Regex::new(r"(\d+):(\d+)").ok()?;
    re.captures(&error_msg)
        .and_then(|caps| caps.get(1))
        .and_then(|line| line.as_str().parse::<usize>().ok())
}
