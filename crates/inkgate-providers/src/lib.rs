//! Provider layer for Inkgate.
//!
//! Direct HTTP clients for every supported AI service, behind one trait.
//!
//! # Architecture
//!
//! - [`traits::ProviderAdapter`] — trait that every provider adapter implements
//! - [`registry`] — static specs for the 8 supported providers + id lookup
//! - [`http`] — shared transport: client construction, status/error mapping
//! - [`sse`] — the server-sent-events decoder shared by all streaming adapters
//! - [`stream`] — turns provider events into canonical text deltas
//! - one module per provider family: [`openai_compat`], [`anthropic`],
//!   [`gemini`], [`ernie`], [`spark`], [`llama`]

pub mod anthropic;
pub mod ernie;
pub mod gemini;
pub mod http;
pub mod llama;
pub mod openai_compat;
pub mod registry;
pub mod spark;
pub mod sse;
pub mod stream;
pub mod traits;

pub use http::build_client;
pub use registry::{resolve, supported_providers, ProviderFamily, ProviderSpec, PROVIDERS};
pub use traits::{AdapterParams, ProviderAdapter, RequestSettings, TextStream};
