//! Inkgate gateway — the generation entry point.
//!
//! - **orchestrator**: resolves a user's provider configuration, builds the
//!   adapter, and dispatches a complete or streaming call
//! - **stream**: the cancellable [`GenerationStream`] handed to callers
//! - **aliases**: stored platform labels → registry ids
//! - **error**: [`GatewayError`] and its end-user rendering

pub mod aliases;
pub mod error;
pub mod orchestrator;
pub mod stream;

pub use aliases::PlatformAliases;
pub use error::GatewayError;
pub use orchestrator::{fallback_config, GenerationResult, Orchestrator};
pub use stream::GenerationStream;
