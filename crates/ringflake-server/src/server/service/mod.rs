//! HTTP service over the cached UID generator.
//!
//! ## Structure
//!
//! - [`config`] - Clock and generator types used by the service.
//! - [`handler`] - Routes and error mapping (`AppState`, `router`).

pub mod config;
pub mod handler;
