//! Core types shared by every layer of the engine.
//!
//! The only occupant today is the error system:
//! - **Strongly-typed errors** ([`BladeError`]) returned by the compiler, cache and engine
//! - **User-friendly contexts** ([`ErrorContext`]) with suggestions for CLI users
//! - **Conversion** of arbitrary [`anyhow::Error`] values via [`user_friendly_error`]

pub mod error;

pub use error::{BladeError, ErrorContext, Result, user_friendly_error};
