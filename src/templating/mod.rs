//! Directive template compilation on top of Tera.
//!
//! Authors write Blade-style templates:
//!
//! ```text
//! @extends('layouts/app')
//!
//! @section('title', 'Home')
//!
//! @section('content')
//!     @foreach($posts as $post)
//!         <h2>{{ $post->title }}</h2>
//!         {!! $post->body !!}
//!     @endforeach
//! @endsection
//! ```
//!
//! and the [`Compiler`] turns them into plain Tera text:
//!
//! ```text
//! <title>Home</title>
//! <main>{% for post in posts %}
//!         <h2>{{ post.title | e }}</h2>
//!         {{ post.body | safe }}
//!     {% endfor %}</main>
//! ```
//!
//! # Pipeline
//!
//! 1. [`lexer`] splits the source into text, echoes and directives
//! 2. [`parser`] builds a balanced [`ast::Node`] tree, normalizing
//!    expressions through [`expr`]
//! 3. the compiler splices `@include` targets and loads the `@extends` chain
//! 4. [`composer`] merges child sections into each layout
//! 5. [`emit`] writes Tera text, hoisting unconsumed sections as named
//!    definitions
//! 6. [`renderer::HostRuntime`] validates the text with Tera and keeps the
//!    parsed instance for rendering
//!
//! Templates whose name ends in a native extension (`.html`, `.tera`) skip
//! steps 1 to 5.

pub mod ast;
pub mod compiler;
pub mod composer;
pub mod emit;
pub mod expr;
pub mod filters;
pub mod lexer;
pub mod parser;
pub mod renderer;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use tera::Tera;

use crate::core::Result;
use crate::source::SyntaxMode;

pub use compiler::{Compiler, Transpiled};
pub use filters::{FunctionRegistry, FunctionRegistryBuilder};
pub use renderer::HostRuntime;

/// A compiled, validated template ready to render.
pub struct CompiledTemplate {
    /// Resolved logical name (with extension)
    pub name: String,
    pub mode: SyntaxMode,
    /// Final Tera text
    pub text: String,
    /// Layouts and includes this template was built from, transitively
    pub dependencies: BTreeSet<String>,
    pub compiled_at: DateTime<Utc>,
    tera: Tera,
}

impl CompiledTemplate {
    pub(crate) fn new(
        name: String,
        mode: SyntaxMode,
        text: String,
        dependencies: BTreeSet<String>,
        tera: Tera,
    ) -> Self {
        Self {
            name,
            mode,
            text,
            dependencies,
            compiled_at: Utc::now(),
            tera,
        }
    }

    /// Size charged against the cache budget.
    pub fn size(&self) -> usize {
        self.text.len()
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.contains(name)
    }

    /// Render with `data` as the context root (a JSON object or null).
    pub fn render(&self, data: &Value) -> Result<String> {
        HostRuntime::render(&self.tera, &self.name, data)
    }

    pub fn render_to(&self, data: &Value, writer: impl Write) -> Result<()> {
        HostRuntime::render_to(&self.tera, &self.name, data, writer)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("size", &self.size())
            .field("dependencies", &self.dependencies)
            .field("compiled_at", &self.compiled_at)
            .finish_non_exhaustive()
    }
}
