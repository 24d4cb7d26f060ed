//! Error taxonomy for the playback engine.
//!
//! Protocol errors (`InvalidCommand`, `InvalidMessage`) are recovered locally by the worker.
//! `Device` and `ChannelFailure` are fatal for a single worker but never for the caller.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Command name outside the closed vocabulary.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// Envelope that cannot be decoded into a command.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// Output device open/write/close failure.
    #[error("output device error: {0}")]
    Device(String),
    /// A state event could not be delivered to the controller.
    #[error("event channel failure: {0}")]
    ChannelFailure(String),
}

impl EngineError {
    /// Whether this error terminates the worker that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Device(_) | EngineError::ChannelFailure(_))
    }
}
