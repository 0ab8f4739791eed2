//! blade-engine - Blade-style templates on top of Tera
//!
//! Templates are written with `@directives` (`@extends`, `@section`,
//! `@yield`, `@include`, `@if`, `@foreach`, `{{ }}` / `{!! !!}` echoes and
//! so on) and compiled into Tera templates. Compiled artifacts are cached in
//! memory under a size budget and a TTL, mirrored to disk for warm restarts,
//! and invalidated when a template or anything it depends on changes.
//!
//! # Architecture Overview
//!
//! A render goes through four stages:
//!
//! 1. **Resolve** the logical name through a [`source::TemplateSource`]
//! 2. **Compile**: lex and parse directives, compose the layout chain,
//!    splice includes and emit Tera text ([`templating`])
//! 3. **Cache** the validated artifact ([`cache`])
//! 4. **Render** it with JSON-serializable data
//!
//! Files whose extension is listed in `native_extensions` (`.html`, `.tera`
//! by default) are already Tera syntax: they are validated and cached but
//! never transpiled.
//!
//! # Core Modules
//!
//! - [`engine`] - [`BladeEngine`], the render API tying everything together
//! - [`templating`] - lexer, parser, layout composer, Tera emitter and runtime
//! - [`cache`] - bounded compiled-artifact cache, disk mirror and sweeper
//! - [`source`] - filesystem, embedded and hybrid template sources
//! - [`watcher`] - file watching that invalidates stale cache entries
//! - [`config`] - `blade.toml` configuration
//! - [`core`] - error types and user-facing error formatting
//! - [`cli`] - the `blade` command-line interface
//!
//! # Example
//!
//! ```rust,no_run
//! use blade_engine::config::EngineConfig;
//! use blade_engine::engine::BladeEngine;
//! use blade_engine::source::EmbeddedSource;
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let source = EmbeddedSource::new()
//!     .with_file("layouts/app.blade.tpl", "<title>@yield('title', 'Site')</title>\n@yield('content')")
//!     .with_file(
//!         "pages/home.blade.tpl",
//!         "@extends('layouts/app.blade.tpl')\n@section('content')<p>Hi {{ $user }}</p>@endsection",
//!     );
//!
//! let engine = BladeEngine::builder(EngineConfig::new("templates")).source(source).build()?;
//! let html = engine.render_to_string("pages/home", &json!({ "user": "Ada" }))?;
//! assert!(html.contains("<p>Hi Ada</p>"));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod source;
pub mod templating;
pub mod watcher;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use engine::BladeEngine;
