use std::time::Duration;

/// Tuning for one playback engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Audio written to the device per loop iteration, in milliseconds.
    ///
    /// Smaller chunks react to commands sooner; larger chunks cost less CPU.
    pub chunk_ms: u64,
    /// Minimum distance between two delivered position events, in milliseconds.
    pub position_threshold_ms: u64,
    /// Capacity of the worker → controller event queue.
    pub event_capacity: usize,
    /// How long a state event may wait for queue space before the worker gives up.
    pub state_send_timeout: Duration,
    /// Upper bound for `EngineHandle::quit` to wait on the worker.
    pub quit_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_ms: 100,
            position_threshold_ms: 250,
            event_capacity: 64,
            state_send_timeout: Duration::from_secs(1),
            quit_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Frames per chunk at `rate_hz`, at least one.
    pub fn chunk_frames(&self, rate_hz: u32) -> usize {
        let ms = self.chunk_ms.max(1);
        ((rate_hz as u64 * ms) / 1000).max(1) as usize
    }
}
