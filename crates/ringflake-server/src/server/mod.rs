//! Server-side components of the `ringflake-server` UID service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/env configuration and generator construction.
//! - [`registry`] - File-backed worker node registry handing out worker ids.
//! - [`service`] - HTTP routes over the cached generator.
//! - [`telemetry`] - Structured logging initialization.

pub mod config;
pub mod registry;
pub mod service;
pub mod telemetry;
