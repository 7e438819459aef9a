//! Render-thread notifications
//!
//! The render path must never log, lock or allocate, so anything worth telling
//! the outside world goes through a wait-free SPSC ring (`rtrb`) in the other
//! direction from the control requests:
//!
//! - Producer: owned by [`super::PlaybackEngine`] on the audio thread
//! - Consumer: wrapped in [`EngineEvents`], drained by the control thread
//!
//! When the ring is full new events are dropped. Anomalies are also counted
//! in an atomic, so the total survives a dropped event.

/// Something the render path could not do, so it rendered silence instead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderAnomaly {
    /// Device asked for more frames than the pre-allocated capacity
    BlockTooLarge { frames: usize, capacity: usize },
    /// Output buffer has fewer channels than the stimuli
    MissingOutputChannels { required: usize, available: usize },
    /// Active or requested index does not name a loaded stimulus
    InvalidStimulus { index: i32 },
}

/// Notification from the render thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A stimulus switch took effect (-1 = went silent)
    StimulusActivated { index: i32 },
    /// Non-looping playback hit the loop end and paused
    LoopEndReached { cursor: u64 },
    /// Video was re-positioned to the audio cursor
    VideoResynced { drift_frames: u64 },
    /// A block was rendered as silence
    Anomaly(RenderAnomaly),
}

/// Create the event ring (producer for the engine, consumer for the control side)
pub(crate) fn event_channel(capacity: usize) -> (rtrb::Producer<EngineEvent>, EngineEvents) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (producer, EngineEvents { consumer })
}

/// Receiving end of the render-thread event ring
pub struct EngineEvents {
    consumer: rtrb::Consumer<EngineEvent>,
}

impl EngineEvents {
    /// Pop one pending event (non-blocking)
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.consumer.pop().ok()
    }

    /// Pop every pending event
    pub fn drain(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        std::iter::from_fn(move || self.try_recv())
    }

    /// Number of events waiting
    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }

    /// Drain pending events into the log, returning how many there were
    pub fn log_pending(&mut self) -> usize {
        let mut count = 0;
        for event in self.drain() {
            count += 1;
            match event {
                EngineEvent::StimulusActivated { index } if index < 0 => {
                    log::debug!("Playback silenced");
                }
                EngineEvent::StimulusActivated { index } => {
                    log::debug!("Stimulus {} active", index);
                }
                EngineEvent::LoopEndReached { cursor } => {
                    log::info!("Reached loop end, paused at frame {}", cursor);
                }
                EngineEvent::VideoResynced { drift_frames } => {
                    log::debug!("Video resynced (drift {} frames)", drift_frames);
                }
                EngineEvent::Anomaly(anomaly) => {
                    log::warn!("Render anomaly, block silenced: {:?}", anomaly);
                }
            }
        }
        count
    }
}
