//! Audio device I/O for the playback engine
//!
//! Provides a unified audio system with platform-specific backends:
//! - **Linux**: Native JACK with one port per stimulus channel (with jack-backend feature)
//! - **Everywhere else**: CPAL
//!
//! # Architecture
//!
//! - **Control Thread**: Writes requests through `EngineControl` (atomics, no locks)
//! - **Audio Thread**: Owns the `PlaybackEngine` exclusively and renders each block
//! - **Event Ring**: Render-thread notifications come back through `EngineEvents`
//!
//! # Example Usage
//!
//! ```ignore
//! let result = start_audio_system(&audio_config, stimuli, &engine_config, None)?;
//!
//! println!("{}Hz, ~{:.1}ms", result.handle.sample_rate(), result.handle.latency_ms());
//! result.control.select_stimulus(0)?;
//! result.control.resume();
//!
//! // Stopping is synchronous: afterwards the stimuli can be released
//! result.handle.stop();
//! ```

mod backend;
mod config;
mod device;
mod error;

// Platform-specific backends
#[cfg(not(all(target_os = "linux", feature = "jack-backend")))]
mod cpal_backend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use backend::{start_audio_system, AudioSystemResult};
pub use config::AudioConfig;
pub use device::{get_output_devices, TrialNeeds};
