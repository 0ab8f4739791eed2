//! Integration test suite for blade-engine
//!
//! End-to-end tests over real template directories: compiling and
//! rendering, layout composition, the compiled-artifact cache and its disk
//! mirror, the file watcher and the `blade` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=blade_engine=debug cargo test --test integration -- --nocapture
//! ```
//!
//! # Test Organization
//!
//! - **rendering**: escaping, control flow, native vs directive parity
//! - **layouts**: sections, blocks, yields and multi-level inheritance
//! - **cache_behavior**: size accounting, clearing, invalidation, warm start
//! - **watcher**: file changes invalidating cached templates
//! - **cli**: the `blade` binary

mod cache_behavior;
mod cli;
mod layouts;
mod rendering;
mod watcher;
