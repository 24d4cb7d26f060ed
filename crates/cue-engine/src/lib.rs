//! Cue playback engine.
//!
//! A cue holds an in-memory clip plus its playback parameters (start/end trim, loop count,
//! fade in/out, master/left/right volume). Playing it spawns one worker thread that owns the
//! output device:
//!
//! 1. **Control**: the controller sends encoded command envelopes on an unbounded queue.
//! 2. **Render**: volume and fade are baked into a mix buffer, rebuilt whenever they change.
//! 3. **Stream**: the worker writes the mix in fixed-size chunks; the blocking device write
//!    paces playback and commands are handled between chunks.
//! 4. **Report**: state changes and throttled positions travel back on a bounded event queue
//!    and are relayed to listeners on the controller's thread.

pub mod clip;
pub mod command;
pub mod config;
pub mod cue;
pub mod decode;
pub mod device;
pub mod dsp;
mod engine;
pub mod error;
pub mod event;
pub mod handle;
pub mod output;
mod playback;
mod queue;
pub mod params;

pub use clip::{AudioClip, SampleFormat};
pub use command::Command;
pub use config::EngineConfig;
pub use cue::Cue;
pub use error::EngineError;
pub use event::{EngineEvent, PlaybackListener, PlaybackState};
pub use handle::EngineHandle;
pub use output::{AudioOutput, CpalOutput, CpalOutputConfig, OutputFactory};
pub use params::{Fade, Loop, PlaybackParameters, Range, Volume};
