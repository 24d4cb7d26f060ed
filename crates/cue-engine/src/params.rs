//! Playback parameter value types.
//!
//! These are immutable snapshots exchanged by value between the controller and the worker.
//! Clamping happens here, once, so the engine never sees out-of-range input.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Master / per-channel gain in dB.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    master: f32,
    left: f32,
    right: f32,
    #[serde(default)]
    separate: bool,
}

impl Volume {
    /// Mute floor: a gain at this value is treated as silence.
    pub const MIN: f32 = -30.0;
    pub const MAX: f32 = 20.0;

    pub fn new(master: f32, left: f32, right: f32, separate: bool) -> Self {
        Self {
            master: clamp_db(master),
            left: clamp_db(left),
            right: clamp_db(right),
            separate,
        }
    }

    /// Single master gain applied to every channel.
    pub fn master_only(master: f32) -> Self {
        Self::new(master, 0.0, 0.0, false)
    }

    /// Independent left/right gains.
    pub fn stereo(left: f32, right: f32) -> Self {
        Self::new(0.0, left, right, true)
    }

    pub fn master(&self) -> f32 {
        self.master
    }

    pub fn left(&self) -> f32 {
        self.left
    }

    pub fn right(&self) -> f32 {
        self.right
    }

    pub fn separate(&self) -> bool {
        self.separate
    }

    pub fn set_master(&mut self, value: f32) {
        self.master = clamp_db(value);
    }

    pub fn set_left(&mut self, value: f32) {
        self.left = clamp_db(value);
    }

    pub fn set_right(&mut self, value: f32) {
        self.right = clamp_db(value);
    }

    pub fn set_separate(&mut self, separate: bool) {
        self.separate = separate;
    }

    /// Re-apply clamping (used after deserializing an untrusted payload).
    pub(crate) fn clamped(self) -> Self {
        Self::new(self.master, self.left, self.right, self.separate)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, false)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} / {}]", self.master, self.left, self.right)
    }
}

fn clamp_db(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(Volume::MIN, Volume::MAX)
}

/// Fade-in / fade-out durations in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fade {
    fade_in: f64,
    fade_out: f64,
}

impl Fade {
    pub fn new(fade_in: f64, fade_out: f64) -> Self {
        Self {
            fade_in: non_negative(fade_in),
            fade_out: non_negative(fade_out),
        }
    }

    pub fn fade_in(&self) -> f64 {
        self.fade_in
    }

    pub fn fade_out(&self) -> f64 {
        self.fade_out
    }

    pub fn is_flat(&self) -> bool {
        self.fade_in == 0.0 && self.fade_out == 0.0
    }

    pub(crate) fn clamped(self) -> Self {
        Self::new(self.fade_in, self.fade_out)
    }
}

impl fmt::Display for Fade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\u{279A} {:.02}, \u{2798} {:.02}", self.fade_in, self.fade_out)
    }
}

/// Repeat count after the first playthrough; `-1` repeats forever.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Loop(i32);

impl Loop {
    pub const INFINITE: Loop = Loop(-1);

    /// `-1` stays infinite; any other negative count becomes 0.
    pub fn new(count: i64) -> Self {
        match count {
            -1 => Loop::INFINITE,
            c if c < 0 => Loop(0),
            c => Loop(c.min(i32::MAX as i64) as i32),
        }
    }

    pub fn count(&self) -> i32 {
        self.0
    }

    pub fn is_infinite(&self) -> bool {
        self.0 == -1
    }
}

impl From<i64> for Loop {
    fn from(count: i64) -> Self {
        Loop::new(count)
    }
}

impl From<Loop> for i64 {
    fn from(value: Loop) -> Self {
        value.0 as i64
    }
}

/// Trim window in seconds.
///
/// `end == 0.0` means "until the end of the clip".
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    start: f64,
    end: f64,
}

impl Range {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: non_negative(start),
            end: non_negative(end),
        }
    }

    /// The whole clip.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn with_start(self, start: f64) -> Self {
        Self::new(start, self.end)
    }

    pub fn with_end(self, end: f64) -> Self {
        Self::new(self.start, end)
    }

    /// Resolve against a clip duration: `(start, end)` with `start <= end <= duration`.
    pub fn resolve(&self, duration: f64) -> (f64, f64) {
        let end = if self.end == 0.0 {
            duration
        } else {
            self.end.min(duration)
        };
        let start = self.start.min(end);
        (start, end)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Full parameter snapshot handed to a new engine.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackParameters {
    pub volume: Volume,
    pub fade: Fade,
    pub repeat: Loop,
    pub range: Range,
}
