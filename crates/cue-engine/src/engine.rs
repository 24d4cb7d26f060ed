//! Playback worker: state machine and streaming loop.
//!
//! The engine owns the clip, the current mix buffer and the output device for its whole life.
//! It is driven only by encoded command envelopes and reports back only through events.
//!
//! While `Playing` it drains pending commands without blocking, then writes one chunk; the
//! blocking device write paces the loop. In every other state it blocks on the command queue.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use serde_json::Value;

use crate::clip::{AudioClip, MixBuffer};
use crate::command::Command;
use crate::config::EngineConfig;
use crate::dsp;
use crate::error::EngineError;
use crate::event::{EngineEvent, PlaybackState, PositionThrottle};
use crate::output::{AudioOutput, OutputFactory};
use crate::params::PlaybackParameters;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Closes the output on every exit path, including unwinding.
struct OutputGuard {
    output: Box<dyn AudioOutput>,
    open: bool,
}

impl OutputGuard {
    fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            open: false,
        }
    }

    fn open(&mut self, clip: &AudioClip) -> Result<(), EngineError> {
        self.output
            .open(clip.format(), clip.channels(), clip.sample_rate())?;
        self.open = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.output.write(data)
    }

    fn flush(&mut self) {
        self.output.flush();
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.output.close() {
            tracing::warn!("output close failed: {e}");
        }
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) struct PlaybackEngine {
    clip: Arc<AudioClip>,
    mix: Arc<MixBuffer>,
    params: PlaybackParameters,
    state: PlaybackState,
    last_emitted: Option<PlaybackState>,
    /// Frame index into the mix buffer.
    cursor: usize,
    /// Resolved `[start, end)` window in frames.
    window: (usize, usize),
    loops_remaining: i32,
    chunk_frames: usize,
    throttle: PositionThrottle,
    config: EngineConfig,
    commands: Receiver<Value>,
    events: Sender<EngineEvent>,
}

impl PlaybackEngine {
    pub(crate) fn new(
        clip: Arc<AudioClip>,
        params: PlaybackParameters,
        config: EngineConfig,
        commands: Receiver<Value>,
        events: Sender<EngineEvent>,
    ) -> Self {
        let mix = Arc::new(dsp::render_mix(&clip, &params.volume, &params.fade, &params.range));
        let window = resolve_window(&clip, &params);
        Self {
            chunk_frames: config.chunk_frames(clip.sample_rate()),
            throttle: PositionThrottle::new(config.position_threshold_ms),
            cursor: window.0,
            loops_remaining: params.repeat.count(),
            window,
            clip,
            mix,
            params,
            state: PlaybackState::NotStarted,
            last_emitted: None,
            config,
            commands,
            events,
        }
    }

    /// Run until `quit`, a disconnected command queue, or a fatal error.
    ///
    /// The output is closed before `Ended` is reported.
    pub(crate) fn run(mut self, make_output: OutputFactory) {
        tracing::info!(
            rate_hz = self.clip.sample_rate(),
            channels = self.clip.channels(),
            sample_width = self.clip.sample_width(),
            duration_ms = self.clip.duration().as_millis() as u64,
            chunk_frames = self.chunk_frames,
            "engine worker started"
        );
        let mut output = OutputGuard::new(make_output());
        if let Err(e) = self.run_loop(&mut output) {
            if e.is_fatal() {
                tracing::error!("engine worker stopped: {e}");
            } else {
                tracing::warn!("engine worker stopped: {e}");
            }
        }
        output.close();

        self.state = PlaybackState::Ended;
        if self.last_emitted != Some(PlaybackState::Ended) {
            if let Err(e) = self.events.try_send(EngineEvent::State(PlaybackState::Ended)) {
                tracing::debug!("ended event not delivered: {e}");
            }
        }
        tracing::info!("engine worker exited");
    }

    fn run_loop(&mut self, output: &mut OutputGuard) -> Result<(), EngineError> {
        output.open(&self.clip)?;
        self.emit_state()?;

        loop {
            if self.state == PlaybackState::Playing {
                loop {
                    match self.commands.try_recv() {
                        Ok(msg) => {
                            if self.handle_message(msg, output)? == Flow::Quit {
                                return Ok(());
                            }
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            tracing::debug!("command queue closed");
                            return Ok(());
                        }
                    }
                }
                if self.state == PlaybackState::Playing {
                    self.stream_chunk(output)?;
                }
            } else {
                let Ok(msg) = self.commands.recv() else {
                    tracing::debug!("command queue closed");
                    return Ok(());
                };
                if self.handle_message(msg, output)? == Flow::Quit {
                    return Ok(());
                }
            }
        }
    }

    fn handle_message(
        &mut self,
        msg: Value,
        output: &mut OutputGuard,
    ) -> Result<Flow, EngineError> {
        match Command::from_message(&msg) {
            Ok(cmd) => self.apply(cmd, output),
            Err(e) => {
                tracing::error!(envelope = %msg, "dropping command: {e}");
                Ok(Flow::Continue)
            }
        }
    }

    fn apply(&mut self, cmd: Command, output: &mut OutputGuard) -> Result<Flow, EngineError> {
        tracing::debug!(command = cmd.name(), state = ?self.state, "command");
        if cmd.resets_playback() {
            self.halt(output)?;
        }
        match cmd {
            Command::Quit => return Ok(Flow::Quit),
            Command::Play => match self.state {
                PlaybackState::NotStarted | PlaybackState::Stopped => {
                    self.rewind();
                    self.set_state(PlaybackState::Playing)?;
                }
                PlaybackState::Paused => self.set_state(PlaybackState::Playing)?,
                PlaybackState::Playing | PlaybackState::Ended => {}
            },
            Command::Pause => {
                if self.state == PlaybackState::Playing {
                    self.set_state(PlaybackState::Paused)?;
                }
            }
            Command::Stop => {
                if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
                    self.halt(output)?;
                }
            }
            Command::Volume(volume) => {
                self.params.volume = volume;
                self.rerender();
            }
            Command::Fade(fade) => {
                self.params.fade = fade;
                self.rerender();
            }
            Command::Loop(repeat) => {
                self.params.repeat = repeat;
                self.loops_remaining = repeat.count();
            }
            Command::SetStart(seconds) => {
                self.params.range = self.params.range.with_start(seconds);
                self.rerender();
            }
            Command::SetEnd(seconds) => {
                self.params.range = self.params.range.with_end(seconds);
                self.rerender();
            }
        }
        Ok(Flow::Continue)
    }

    /// Stop output, reset cursor and loop counter, report `Stopped`.
    ///
    /// Every parameter change passes through here first, whatever the current state, so a
    /// new mix is never swapped under a running stream.
    fn halt(&mut self, output: &mut OutputGuard) -> Result<(), EngineError> {
        output.flush();
        self.rewind();
        self.set_state(PlaybackState::Stopped)?;
        self.emit_position();
        Ok(())
    }

    fn rewind(&mut self) {
        self.cursor = self.window.0;
        self.loops_remaining = self.params.repeat.count();
        self.throttle.reset();
    }

    /// Rebuild the mix from the pristine clip and swap it in whole.
    fn rerender(&mut self) {
        let p = &self.params;
        self.mix = Arc::new(dsp::render_mix(&self.clip, &p.volume, &p.fade, &p.range));
        self.window = resolve_window(&self.clip, &self.params);
        self.cursor = self.window.0;
    }

    fn stream_chunk(&mut self, output: &mut OutputGuard) -> Result<(), EngineError> {
        let (_, end) = self.window;
        if self.cursor >= end {
            return self.end_of_range();
        }
        let chunk_end = (self.cursor + self.chunk_frames).min(end);
        let mix = Arc::clone(&self.mix);
        output.write(mix.frames_bytes(self.cursor, chunk_end))?;
        self.cursor = chunk_end;
        self.emit_position();
        Ok(())
    }

    fn end_of_range(&mut self) -> Result<(), EngineError> {
        let (start, end) = self.window;
        let repeat = self.params.repeat.is_infinite() || self.loops_remaining > 0;
        // An empty window would otherwise loop without ever writing.
        if repeat && start < end {
            if !self.params.repeat.is_infinite() {
                self.loops_remaining -= 1;
            }
            self.cursor = start;
            self.throttle.reset();
            tracing::debug!(loops_remaining = self.loops_remaining, "loop restart");
            return Ok(());
        }
        self.rewind();
        self.set_state(PlaybackState::Stopped)?;
        self.emit_position();
        Ok(())
    }

    fn set_state(&mut self, state: PlaybackState) -> Result<(), EngineError> {
        if self.state == state {
            return Ok(());
        }
        self.state = state;
        self.emit_state()
    }

    /// Report the current state unless it was the last one reported.
    ///
    /// State events must not be lost: failing to enqueue one is fatal for the worker.
    fn emit_state(&mut self) -> Result<(), EngineError> {
        if self.last_emitted == Some(self.state) {
            return Ok(());
        }
        tracing::debug!(state = ?self.state, "state changed");
        self.events
            .send_timeout(EngineEvent::State(self.state), self.config.state_send_timeout)
            .map_err(|e| EngineError::ChannelFailure(format!("state {:?}: {e}", self.state)))?;
        self.last_emitted = Some(self.state);
        Ok(())
    }

    /// Report the cursor position if the throttle allows; dropped when the queue is full.
    fn emit_position(&mut self) {
        let ms = self.clip.frames_to_ms(self.cursor);
        if !self.throttle.should_emit(ms) {
            return;
        }
        match self.events.try_send(EngineEvent::ElapsedTime(ms)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!(elapsed_ms = ms, "position event dropped")
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

fn resolve_window(clip: &AudioClip, params: &PlaybackParameters) -> (usize, usize) {
    let (start, end) = params.range.resolve(clip.duration().as_secs_f64());
    (clip.frame_at(start), clip.frame_at(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::JoinHandle;
    use std::time::{Duration, Instant};

    use crate::clip::SampleFormat;
    use crate::output::testing::{Recorded, RecordingOutput};
    use crate::params::{Fade, Loop, Range, Volume};

    const RATE: u32 = 1_000;

    fn clip(seconds: f64) -> Arc<AudioClip> {
        let frames = (RATE as f64 * seconds) as usize;
        let mut data = vec![0u8; frames * 4];
        for s in data.chunks_exact_mut(2) {
            SampleFormat::I16.write(0.5, s);
        }
        Arc::new(AudioClip::new(RATE, 2, 2, data).unwrap())
    }

    struct Harness {
        cmd_tx: Sender<Value>,
        event_rx: Receiver<EngineEvent>,
        log: Arc<Mutex<Recorded>>,
        join: JoinHandle<()>,
        states: Vec<PlaybackState>,
    }

    impl Harness {
        fn start(
            clip: Arc<AudioClip>,
            params: PlaybackParameters,
            write_delay: Option<Duration>,
        ) -> Self {
            let (out, log) = RecordingOutput::new();
            let out = RecordingOutput { write_delay, ..out };
            Self::start_with(clip, params, out, log)
        }

        fn start_with(
            clip: Arc<AudioClip>,
            params: PlaybackParameters,
            out: RecordingOutput,
            log: Arc<Mutex<Recorded>>,
        ) -> Self {
            let config = EngineConfig {
                event_capacity: 16,
                ..EngineConfig::default()
            };
            Self::start_configured(clip, params, config, out, log)
        }

        fn start_configured(
            clip: Arc<AudioClip>,
            params: PlaybackParameters,
            config: EngineConfig,
            out: RecordingOutput,
            log: Arc<Mutex<Recorded>>,
        ) -> Self {
            let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
            let (event_tx, event_rx) = crossbeam_channel::bounded(config.event_capacity);
            let engine = PlaybackEngine::new(clip, params, config, cmd_rx, event_tx);
            let factory = out.into_factory();
            let join = std::thread::spawn(move || engine.run(factory));
            Self {
                cmd_tx,
                event_rx,
                log,
                join,
                states: Vec::new(),
            }
        }

        fn send(&self, cmd: Command) {
            self.cmd_tx.send(cmd.to_message()).unwrap();
        }

        /// Collect events until `state` is seen.
        fn wait_for(&mut self, state: PlaybackState) {
            let deadline = Instant::now() + Duration::from_secs(10);
            while Instant::now() < deadline {
                let event = self.event_rx.recv_timeout(Duration::from_millis(50));
                if let Ok(EngineEvent::State(s)) = event {
                    self.states.push(s);
                    if s == state {
                        return;
                    }
                }
            }
            panic!("timed out waiting for {state:?}; saw {:?}", self.states);
        }

        fn quit(mut self) -> Vec<PlaybackState> {
            self.send(Command::Quit);
            self.join.join().unwrap();
            while let Ok(ev) = self.event_rx.try_recv() {
                if let EngineEvent::State(s) = ev {
                    self.states.push(s);
                }
            }
            self.states
        }
    }

    fn params(range: Range, repeat: Loop) -> PlaybackParameters {
        PlaybackParameters {
            range,
            repeat,
            ..PlaybackParameters::default()
        }
    }

    #[test]
    fn trimmed_range_plays_once_then_stops() {
        let mut h = Harness::start(clip(10.0), params(Range::new(2.0, 5.0), Loop::new(0)), None);
        h.send(Command::Play);
        h.wait_for(PlaybackState::Stopped);
        let log = h.log.clone();
        let states = h.quit();
        assert_eq!(
            states,
            vec![
                PlaybackState::NotStarted,
                PlaybackState::Playing,
                PlaybackState::Stopped,
                PlaybackState::Ended
            ]
        );
        let log = log.lock().unwrap();
        assert_eq!(log.bytes_written(), 3 * RATE as usize * 4);
        assert_eq!(log.writes.len(), 30);
        assert!(log.closed);
    }

    #[test]
    fn loop_count_two_plays_three_times() {
        let c = clip(3.0);
        let one_pass = c.data().len();
        let mut h = Harness::start(c, params(Range::full(), Loop::new(2)), None);
        h.send(Command::Play);
        h.wait_for(PlaybackState::Stopped);
        let log = h.log.clone();
        h.quit();
        let log = log.lock().unwrap();
        assert_eq!(log.bytes_written(), 3 * one_pass);
        assert_eq!(log.writes.first(), log.writes.get(30));
    }

    #[test]
    fn infinite_loop_only_stops_on_command() {
        let c = clip(0.5);
        let one_pass = c.data().len();
        let mut h = Harness::start(
            c,
            params(Range::full(), Loop::INFINITE),
            Some(Duration::from_millis(1)),
        );
        h.send(Command::Play);
        h.wait_for(PlaybackState::Playing);

        let deadline = Instant::now() + Duration::from_secs(10);
        while h.log.lock().unwrap().bytes_written() < 5 * one_pass {
            assert!(Instant::now() < deadline, "streaming stalled");
            if let Ok(EngineEvent::State(s)) = h.event_rx.recv_timeout(Duration::from_millis(10)) {
                panic!("unexpected state {s:?} while looping");
            }
        }

        h.send(Command::Stop);
        h.wait_for(PlaybackState::Stopped);
        assert!(h.log.lock().unwrap().flushes >= 1);
        h.quit();
    }

    #[test]
    fn pause_and_resume_continue_from_cursor() {
        let mut h = Harness::start(
            clip(3.0),
            params(Range::full(), Loop::new(0)),
            Some(Duration::from_millis(5)),
        );
        h.send(Command::Play);
        h.wait_for(PlaybackState::Playing);
        h.send(Command::Pause);
        h.wait_for(PlaybackState::Paused);
        let written = h.log.lock().unwrap().bytes_written();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(h.log.lock().unwrap().bytes_written(), written);

        h.send(Command::Play);
        h.wait_for(PlaybackState::Stopped);
        let log = h.log.clone();
        let states = h.quit();
        assert_eq!(
            states,
            vec![
                PlaybackState::NotStarted,
                PlaybackState::Playing,
                PlaybackState::Paused,
                PlaybackState::Playing,
                PlaybackState::Stopped,
                PlaybackState::Ended
            ]
        );
        assert_eq!(log.lock().unwrap().bytes_written(), 3 * RATE as usize * 4);
    }

    #[test]
    fn parameter_change_while_playing_forces_stop() {
        let changes = [
            Command::SetStart(1.0),
            Command::SetEnd(2.0),
            Command::Volume(Volume::master_only(-6.0)),
            Command::Fade(Fade::new(0.5, 0.5)),
            Command::Loop(Loop::new(1)),
        ];
        for change in changes {
            let mut h = Harness::start(
                clip(1.0),
                params(Range::full(), Loop::INFINITE),
                Some(Duration::from_millis(1)),
            );
            h.send(Command::Play);
            h.wait_for(PlaybackState::Playing);
            h.send(change.clone());
            h.wait_for(PlaybackState::Stopped);
            h.send(Command::Play);
            h.wait_for(PlaybackState::Playing);
            let states = h.quit();
            assert_eq!(
                &states[..4],
                &[
                    PlaybackState::NotStarted,
                    PlaybackState::Playing,
                    PlaybackState::Stopped,
                    PlaybackState::Playing
                ],
                "{change:?}"
            );
        }
    }

    #[test]
    fn parameter_change_before_start_reports_stopped() {
        let mut h = Harness::start(clip(2.0), params(Range::full(), Loop::new(0)), None);
        h.send(Command::SetStart(0.5));
        h.wait_for(PlaybackState::Stopped);
        let log = h.log.clone();
        let states = h.quit();
        assert_eq!(
            states,
            vec![
                PlaybackState::NotStarted,
                PlaybackState::Stopped,
                PlaybackState::Ended
            ]
        );
        let log = log.lock().unwrap();
        assert_eq!(log.bytes_written(), 0);
        assert_eq!(log.flushes, 1);
    }

    #[test]
    fn play_after_change_before_start_uses_new_range() {
        let mut h = Harness::start(clip(2.0), params(Range::full(), Loop::new(0)), None);
        h.send(Command::SetStart(1.0));
        h.send(Command::Play);
        h.wait_for(PlaybackState::Playing);
        h.wait_for(PlaybackState::Stopped);
        let log = h.log.clone();
        let states = h.quit();
        assert_eq!(
            states[..4],
            [
                PlaybackState::NotStarted,
                PlaybackState::Stopped,
                PlaybackState::Playing,
                PlaybackState::Stopped
            ]
        );
        assert_eq!(log.lock().unwrap().bytes_written(), RATE as usize * 4);
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let mut h = Harness::start(clip(1.0), params(Range::full(), Loop::new(0)), None);
        h.cmd_tx.send(serde_json::json!({"nope": 1})).unwrap();
        h.cmd_tx.send(serde_json::json!({"command": "rewind"})).unwrap();
        h.cmd_tx.send(serde_json::json!({"command": "volume"})).unwrap();
        h.cmd_tx
            .send(serde_json::json!({"command": "loop", "value": "forever"}))
            .unwrap();
        h.send(Command::Play);
        h.wait_for(PlaybackState::Stopped);
        let states = h.quit();
        assert_eq!(
            states,
            vec![
                PlaybackState::NotStarted,
                PlaybackState::Playing,
                PlaybackState::Stopped,
                PlaybackState::Ended
            ]
        );
    }

    #[test]
    fn redundant_commands_emit_no_duplicate_states() {
        let mut h = Harness::start(clip(1.0), params(Range::full(), Loop::new(0)), None);
        h.send(Command::Pause);
        h.send(Command::Stop);
        h.send(Command::Play);
        h.wait_for(PlaybackState::Stopped);
        h.send(Command::Stop);
        h.send(Command::Pause);
        let states = h.quit();
        assert_eq!(
            states,
            vec![
                PlaybackState::NotStarted,
                PlaybackState::Playing,
                PlaybackState::Stopped,
                PlaybackState::Ended
            ]
        );
    }

    #[test]
    fn empty_range_with_infinite_loop_stops() {
        let mut h = Harness::start(clip(2.0), params(Range::new(1.5, 1.0), Loop::INFINITE), None);
        h.send(Command::Play);
        h.wait_for(PlaybackState::Stopped);
        let log = h.log.clone();
        h.quit();
        assert_eq!(log.lock().unwrap().bytes_written(), 0);
    }

    #[test]
    fn device_open_failure_ends_worker() {
        let (out, log) = RecordingOutput::new();
        let out = RecordingOutput { fail_open: true, ..out };
        let mut h = Harness::start_with(clip(1.0), params(Range::full(), Loop::new(0)), out, log);
        h.wait_for(PlaybackState::Ended);
        h.join.join().unwrap();
    }

    #[test]
    fn device_write_failure_ends_worker_and_closes_output() {
        let (out, log) = RecordingOutput::new();
        let out = RecordingOutput {
            fail_after: Some(3),
            ..out
        };
        let p = params(Range::full(), Loop::new(0));
        let mut h = Harness::start_with(clip(2.0), p, out, log.clone());
        h.send(Command::Play);
        h.wait_for(PlaybackState::Ended);
        h.join.join().unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.writes.len(), 3);
        assert!(log.closed);
    }

    #[test]
    fn dropped_controller_stops_worker() {
        let h = Harness::start(
            clip(1.0),
            params(Range::full(), Loop::INFINITE),
            Some(Duration::from_millis(1)),
        );
        h.send(Command::Play);
        let Harness { cmd_tx, join, log, .. } = h;
        drop(cmd_tx);
        join.join().unwrap();
        assert!(log.lock().unwrap().closed);
    }

    #[test]
    fn every_playthrough_reports_a_position() {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(1024);
        let config = EngineConfig {
            position_threshold_ms: 10_000,
            ..EngineConfig::default()
        };
        let p = params(Range::full(), Loop::new(2));
        let engine = PlaybackEngine::new(clip(1.0), p, config, cmd_rx, event_tx);
        let (out, _log) = RecordingOutput::new();
        let factory = out.into_factory();
        let join = std::thread::spawn(move || engine.run(factory));
        cmd_tx.send(Command::Play.to_message()).unwrap();

        let mut positions = Vec::new();
        loop {
            match event_rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                EngineEvent::ElapsedTime(ms) => positions.push(ms),
                EngineEvent::State(PlaybackState::Stopped) => break,
                EngineEvent::State(_) => {}
            }
        }
        cmd_tx.send(Command::Quit.to_message()).unwrap();
        join.join().unwrap();
        positions.extend(event_rx.try_iter().filter_map(|ev| match ev {
            EngineEvent::ElapsedTime(ms) => Some(ms),
            EngineEvent::State(_) => None,
        }));
        // One per playthrough plus the rewind report on stop.
        assert_eq!(positions, vec![100, 100, 100, 0]);
    }

    #[test]
    fn full_event_queue_on_state_change_ends_worker() {
        let (out, log) = RecordingOutput::new();
        let config = EngineConfig {
            event_capacity: 1,
            state_send_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let p = params(Range::full(), Loop::new(0));
        let h = Harness::start_configured(clip(1.0), p, config, out, log.clone());
        // `NotStarted` fills the queue and nobody drains it, so `Playing` cannot be reported.
        h.send(Command::Play);
        let Harness { event_rx, join, cmd_tx, .. } = h;
        join.join().unwrap();

        let log = log.lock().unwrap();
        assert!(log.closed);
        assert_eq!(log.bytes_written(), 0);
        let events: Vec<EngineEvent> = event_rx.try_iter().collect();
        assert_eq!(events, vec![EngineEvent::State(PlaybackState::NotStarted)]);
        assert!(cmd_tx.send(Command::Stop.to_message()).is_err());
    }

    #[test]
    fn full_event_queue_drops_positions_but_keeps_streaming() {
        let (out, log) = RecordingOutput::new();
        let config = EngineConfig {
            event_capacity: 3,
            position_threshold_ms: 0,
            state_send_timeout: Duration::from_secs(5),
            ..EngineConfig::default()
        };
        let p = params(Range::full(), Loop::new(0));
        let h = Harness::start_configured(clip(1.0), p, config, out, log.clone());
        h.send(Command::Play);

        let deadline = Instant::now() + Duration::from_secs(10);
        while log.lock().unwrap().bytes_written() < RATE as usize * 4 {
            assert!(Instant::now() < deadline, "streaming stalled behind a full event queue");
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(20));

        let mut events = Vec::new();
        loop {
            let event = h.event_rx.recv_timeout(Duration::from_secs(10)).unwrap();
            events.push(event);
            if event == EngineEvent::State(PlaybackState::Stopped) {
                break;
            }
        }
        assert_eq!(
            events[..3],
            [
                EngineEvent::State(PlaybackState::NotStarted),
                EngineEvent::State(PlaybackState::Playing),
                EngineEvent::ElapsedTime(100)
            ]
        );
        // Ten chunks were written; at most the last position slipped in once room was made.
        assert!(events.len() <= 5, "{events:?}");
        assert_eq!(log.lock().unwrap().bytes_written(), RATE as usize * 4);
        h.quit();
    }
}
