//! Shared configuration utilities
//!
//! - Generic YAML config loading/saving (used by the player for its own file)
//! - Engine tuning that is fixed for the lifetime of a trial
//!
//! # Usage
//!
//! ```ignore
//! use listen_core::config::{load_config, save_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&config_path);
//! save_config(&config, &config_path)?;
//! ```

mod engine;
mod io;

pub use engine::EngineConfig;
pub use io::{load_config, save_config};
