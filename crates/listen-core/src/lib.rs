//! Listen Core - stimulus store and real-time playback engine for listening tests

pub mod config;
pub mod engine;
pub mod error;
pub mod stimulus;
pub mod types;

pub use error::{validate_output_channels, DeviceError, EngineError, LoadError, LoadResult};
pub use types::*;
