//! Playback engine - render path, control surface and video sync
//!
//! - [`PlaybackEngine`]: owned by the audio callback, renders one block at a time
//! - [`EngineControl`]: cloneable lock-free handle for the UI thread
//! - [`EngineEvents`]: notifications flowing back from the render thread
//! - [`VideoSync`]: optional video kept in step with the audio cursor

mod atomics;
mod control;
mod engine;
mod events;
mod video;

pub use atomics::EngineAtomics;
pub use control::EngineControl;
pub use engine::PlaybackEngine;
pub use events::{EngineEvent, EngineEvents, RenderAnomaly};
pub use video::{NoVideo, VideoSync};
