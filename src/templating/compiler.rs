//! Source-to-artifact compilation.
//!
//! [`Compiler::compile`] resolves a logical name, decides its syntax mode and
//! produces a [`CompiledTemplate`]:
//!
//! - native templates are only validated by Tera
//! - directive templates are parsed, their includes spliced in, their layout
//!   chain composed, and the result emitted as Tera text and validated
//!
//! Every layout and include touched along the way is recorded as a
//! dependency so the cache can invalidate dependents when one changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::CompiledTemplate;
use super::ast::Node;
use super::composer::compose;
use super::emit::emit;
use super::parser::parse;
use super::renderer::HostRuntime;
use crate::config::EngineConfig;
use crate::constants::MAX_INCLUDE_DEPTH;
use crate::core::{BladeError, Result};
use crate::source::{SourceFile, SyntaxMode, TemplateSource, logical_name, suggest_similar};

/// Output of a single transpile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transpiled {
    /// Emitted Tera text (includes spliced, layout not applied)
    pub body: String,
    /// Layout named by `@extends`
    pub layout: Option<String>,
}

/// Turns template sources into compiled artifacts.
#[derive(Debug, Clone)]
pub struct Compiler {
    source: Arc<dyn TemplateSource>,
    runtime: HostRuntime,
    template_extension: String,
    native_extensions: Vec<String>,
}

impl Compiler {
    pub fn new(source: Arc<dyn TemplateSource>, runtime: HostRuntime, config: &EngineConfig) -> Self {
        Self {
            source,
            runtime,
            template_extension: config.template_extension.clone(),
            native_extensions: config.native_extensions.clone(),
        }
    }

    pub fn source(&self) -> &Arc<dyn TemplateSource> {
        &self.source
    }

    pub fn runtime(&self) -> &HostRuntime {
        &self.runtime
    }

    pub fn template_extension(&self) -> &str {
        &self.template_extension
    }

    pub fn mode_of(&self, name: &str) -> SyntaxMode {
        SyntaxMode::detect(name, &self.native_extensions)
    }

    /// Read `name`, also trying it with the template extension appended.
    ///
    /// # Errors
    ///
    /// [`BladeError::SourceNotFound`] with up to three similar names.
    pub fn resolve(&self, name: &str, referenced_by: Option<&str>) -> Result<SourceFile> {
        let not_found = |logical: String, suggestions: Vec<String>| BladeError::SourceNotFound {
            name: logical,
            referenced_by: referenced_by.map(str::to_string),
            suggestions,
        };

        let Some(logical) = logical_name(name) else {
            return Err(not_found(name.to_string(), Vec::new()));
        };

        let mut candidates = vec![logical.clone()];
        if !logical.ends_with(&self.template_extension) {
            candidates.push(format!("{logical}{}", self.template_extension));
        }
        for candidate in &candidates {
            if let Some(file) = self.source.read(candidate)? {
                return Ok(file);
            }
        }

        let listed = self.source.list().unwrap_or_default();
        Err(not_found(logical.clone(), suggest_similar(&logical, &listed)))
    }

    /// Compile `name` from its source.
    pub fn compile(&self, name: &str) -> Result<CompiledTemplate> {
        let file = self.resolve(name, None)?;
        let mode = self.mode_of(&file.name);
        let mut dependencies = BTreeSet::new();

        let text = match mode {
            SyntaxMode::Native => file.text.clone(),
            SyntaxMode::Directive => {
                let mut stack = Vec::new();
                let nodes = self.load_nodes(&file, &mut stack, &mut dependencies)?;
                emit(&file.name, nodes)?
            }
        };

        tracing::debug!(
            "Compiled '{}' ({} mode, {} bytes, {} dependencies)",
            file.name,
            mode,
            text.len(),
            dependencies.len()
        );
        self.finish(file.name, mode, text, dependencies)
    }

    /// Build an artifact from already-compiled text (warm start).
    pub fn finish(
        &self,
        name: String,
        mode: SyntaxMode,
        text: String,
        dependencies: BTreeSet<String>,
    ) -> Result<CompiledTemplate> {
        let tera = self.runtime.parse(&name, &text)?;
        Ok(CompiledTemplate::new(name, mode, text, dependencies, tera))
    }

    /// One directive pass over `text`: includes are spliced, the layout is
    /// reported but not applied.
    pub fn transpile(&self, name: &str, text: &str) -> Result<Transpiled> {
        let doc = parse(name, text)?;
        let mut stack = vec![name.to_string()];
        let mut dependencies = BTreeSet::new();
        let nodes = self.splice_includes(name, doc.nodes, &mut stack, &mut dependencies)?;
        Ok(Transpiled {
            body: emit(name, nodes)?,
            layout: doc.layout,
        })
    }

    /// Parse `file`, splice its includes and compose it into its layout chain.
    fn load_nodes(
        &self,
        file: &SourceFile,
        stack: &mut Vec<String>,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<Vec<Node>> {
        if stack.contains(&file.name) || stack.len() >= MAX_INCLUDE_DEPTH {
            let mut chain = stack.clone();
            chain.push(file.name.clone());
            return Err(BladeError::CircularReference { chain });
        }

        stack.push(file.name.clone());
        let result = self.load_nodes_inner(file, stack, dependencies);
        stack.pop();
        result
    }

    fn load_nodes_inner(
        &self,
        file: &SourceFile,
        stack: &mut Vec<String>,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<Vec<Node>> {
        let doc = parse(&file.name, &file.text)?;
        let nodes = self.splice_includes(&file.name, doc.nodes, stack, dependencies)?;

        match doc.layout {
            None => Ok(nodes),
            Some(layout) => {
                tracing::trace!("'{}' extends '{}'", file.name, layout);
                let layout_nodes = self.load_dependency(&layout, &file.name, stack, dependencies)?;
                compose(&file.name, nodes, layout_nodes)
            }
        }
    }

    /// Load a layout or include target as nodes.
    ///
    /// Native targets are spliced as text; their Tera syntax is validated
    /// with the final artifact.
    fn load_dependency(
        &self,
        name: &str,
        referenced_by: &str,
        stack: &mut Vec<String>,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<Vec<Node>> {
        let file = self.resolve(name, Some(referenced_by))?;
        dependencies.insert(file.name.clone());
        match self.mode_of(&file.name) {
            SyntaxMode::Native => Ok(vec![Node::Text(file.text)]),
            SyntaxMode::Directive => self.load_nodes(&file, stack, dependencies),
        }
    }

    fn splice_includes(
        &self,
        template: &str,
        nodes: Vec<Node>,
        stack: &mut Vec<String>,
        dependencies: &mut BTreeSet<String>,
    ) -> Result<Vec<Node>> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Include { name, .. } => {
                    out.extend(self.load_dependency(&name, template, stack, dependencies)?);
                }
                mut other => {
                    for body in other.children_mut() {
                        *body = self.splice_includes(
                            template,
                            std::mem::take(body),
                            stack,
                            dependencies,
                        )?;
                    }
                    out.push(other);
                }
            }
        }
        Ok(out)
    }
}
