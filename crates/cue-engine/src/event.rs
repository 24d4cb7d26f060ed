//! Events flowing from the worker back to the controller.

use serde::{Deserialize, Serialize};

/// Lifecycle of one engine instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    NotStarted,
    Playing,
    Paused,
    Stopped,
    /// Terminal: the worker has exited.
    Ended,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        self == PlaybackState::Ended
    }
}

/// Worker → controller notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum EngineEvent {
    State(PlaybackState),
    /// Elapsed position in milliseconds from the start of the clip.
    ElapsedTime(u64),
}

/// Caller-side sink for engine notifications.
///
/// Sinks run on the controller's thread, inside `EngineHandle::dispatch_events`.
pub trait PlaybackListener {
    fn state_changed(&mut self, _state: PlaybackState) {}
    fn position_changed(&mut self, _elapsed_ms: u64) {}
}

impl EngineEvent {
    /// Forward this event to the matching listener callback.
    pub fn deliver(&self, listener: &mut dyn PlaybackListener) {
        match *self {
            EngineEvent::State(state) => listener.state_changed(state),
            EngineEvent::ElapsedTime(ms) => listener.position_changed(ms),
        }
    }
}

/// Rate limiter for position events.
///
/// A position is let through when nothing has been emitted since the last reset, or when it
/// differs from the last emitted one by at least `threshold_ms`.
#[derive(Debug)]
pub struct PositionThrottle {
    threshold_ms: u64,
    last: Option<u64>,
}

impl PositionThrottle {
    pub fn new(threshold_ms: u64) -> Self {
        Self {
            threshold_ms,
            last: None,
        }
    }

    pub fn should_emit(&mut self, position_ms: u64) -> bool {
        let emit = match self.last {
            None => true,
            Some(last) => position_ms.abs_diff(last) >= self.threshold_ms,
        };
        if emit {
            self.last = Some(position_ms);
        }
        emit
    }

    /// Forget the last emitted position (after a cursor reset).
    pub fn reset(&mut self) {
        self.last = None;
    }
}
