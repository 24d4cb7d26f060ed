//! Controller-side handle to a playback worker thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use serde_json::Value;

use crate::clip::AudioClip;
use crate::command::Command;
use crate::config::EngineConfig;
use crate::engine::PlaybackEngine;
use crate::event::{EngineEvent, PlaybackListener, PlaybackState};
use crate::output::OutputFactory;
use crate::params::{Fade, Loop, PlaybackParameters, Volume};

/// Owns one engine worker.
///
/// Every control call is a non-blocking send of an encoded command envelope. Events come back
/// on a bounded queue and reach subscribers only when the controller drains it with
/// [`EngineHandle::dispatch_events`] or [`EngineHandle::wait_event`].
pub struct EngineHandle {
    cmd_tx: Sender<Value>,
    event_rx: Receiver<EngineEvent>,
    /// Disconnects when the worker thread returns.
    done_rx: Receiver<()>,
    join: Option<JoinHandle<()>>,
    listeners: Vec<Box<dyn PlaybackListener + Send>>,
    state: PlaybackState,
    quit_timeout: Duration,
}

impl EngineHandle {
    /// Start a worker for `clip` with `params` as the initial snapshot.
    ///
    /// `output` is invoked on the worker thread to build the device sink.
    pub fn spawn(
        clip: Arc<AudioClip>,
        params: PlaybackParameters,
        config: EngineConfig,
        output: OutputFactory,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = unbounded();
        let (event_tx, event_rx) = bounded(config.event_capacity.max(1));
        let (done_tx, done_rx) = bounded::<()>(0);
        let quit_timeout = config.quit_timeout;

        let engine = PlaybackEngine::new(clip, params, config, cmd_rx, event_tx);
        let join = thread::Builder::new()
            .name("cue-engine".to_string())
            .spawn(move || {
                let _done = done_tx;
                engine.run(output);
            })
            .context("spawn engine worker")?;

        Ok(Self {
            cmd_tx,
            event_rx,
            done_rx,
            join: Some(join),
            listeners: Vec::new(),
            state: PlaybackState::NotStarted,
            quit_timeout,
        })
    }

    pub fn play(&self) {
        self.command(Command::Play);
    }

    pub fn pause(&self) {
        self.command(Command::Pause);
    }

    pub fn stop(&self) {
        self.command(Command::Stop);
    }

    pub fn set_volume(&self, volume: Volume) {
        self.command(Command::Volume(volume));
    }

    pub fn set_fade(&self, fade: Fade) {
        self.command(Command::Fade(fade));
    }

    pub fn set_loop(&self, repeat: Loop) {
        self.command(Command::Loop(repeat));
    }

    pub fn set_start(&self, seconds: f64) {
        self.command(Command::SetStart(seconds));
    }

    pub fn set_end(&self, seconds: f64) {
        self.command(Command::SetEnd(seconds));
    }

    pub fn command(&self, cmd: Command) {
        self.send_message(cmd.to_message());
    }

    /// Send a raw command envelope. Malformed envelopes are rejected by the worker.
    pub fn send_message(&self, message: Value) {
        if self.cmd_tx.send(message).is_err() {
            tracing::warn!("engine worker is gone; command dropped");
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn PlaybackListener + Send>) {
        self.listeners.push(listener);
    }

    /// Relay every queued event to the subscribers without blocking.
    pub fn dispatch_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.relay(event);
            count += 1;
        }
        count
    }

    /// Block up to `timeout` for the next event, relay it and return it.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<EngineEvent> {
        let event = self.event_rx.recv_timeout(timeout).ok()?;
        self.relay(event);
        Some(event)
    }

    /// Last state relayed to the controller.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Stop the worker and wait for it, bounded by `EngineConfig::quit_timeout`.
    ///
    /// Remaining events, including the final `Ended`, are relayed before returning.
    pub fn quit(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        let _ = self.cmd_tx.send(Command::Quit.to_message());

        match self.done_rx.recv_timeout(self.quit_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = self.quit_timeout.as_millis() as u64,
                    "engine worker did not stop"
                );
                self.dispatch_events();
                return Err(anyhow!(
                    "engine worker did not stop within {:?}",
                    self.quit_timeout
                ));
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        }
        if join.join().is_err() {
            tracing::error!("engine worker panicked");
        }

        self.dispatch_events();
        if !self.state.is_terminal() {
            self.relay(EngineEvent::State(PlaybackState::Ended));
        }
        Ok(())
    }

    fn relay(&mut self, event: EngineEvent) {
        if let EngineEvent::State(state) = event {
            self.state = state;
        }
        for listener in &mut self.listeners {
            event.deliver(listener.as_mut());
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("engine shutdown on drop: {e:#}");
        }
    }
}
