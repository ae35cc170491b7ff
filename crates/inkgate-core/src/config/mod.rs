//! Configuration system — schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use inkgate_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Idle timeout: {:?}", cfg.timeouts.idle());
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    default_aliases, Config, DefaultProviderConfig, EncryptionConfig, GatewayConfig,
    TimeoutsConfig,
};
