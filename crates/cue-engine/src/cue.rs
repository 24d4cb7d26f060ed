//! A playable cue: one clip, its playback parameters and at most one live engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::clip::AudioClip;
use crate::config::EngineConfig;
use crate::decode;
use crate::handle::EngineHandle;
use crate::output::OutputFactory;
use crate::params::{Fade, Loop, PlaybackParameters, Range, Volume};

/// Parameter setters update the cue's own snapshot and, when an engine is running, forward the
/// change to it (which stops playback there).
pub struct Cue {
    name: String,
    clip: Arc<AudioClip>,
    params: PlaybackParameters,
    engine: Option<EngineHandle>,
}

impl Cue {
    pub fn new(name: impl Into<String>, clip: Arc<AudioClip>) -> Self {
        Self {
            name: name.into(),
            clip,
            params: PlaybackParameters::default(),
            engine: None,
        }
    }

    /// Load `path` into memory; the cue is named after the file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let clip = decode::load_clip(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("no file name in {:?}", path))?;
        Ok(Self::new(name, Arc::new(clip)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> String {
        self.name.clone()
    }

    pub fn clip(&self) -> &Arc<AudioClip> {
        &self.clip
    }

    pub fn params(&self) -> &PlaybackParameters {
        &self.params
    }

    pub fn starts_at(&self) -> f64 {
        self.params.range.start()
    }

    pub fn set_starts_at(&mut self, seconds: f64) {
        self.params.range = self.params.range.with_start(seconds);
        if let Some(engine) = &self.engine {
            engine.set_start(self.params.range.start());
        }
    }

    /// `0.0` plays to the end of the clip.
    pub fn ends_at(&self) -> f64 {
        self.params.range.end()
    }

    pub fn set_ends_at(&mut self, seconds: f64) {
        self.params.range = self.params.range.with_end(seconds);
        if let Some(engine) = &self.engine {
            engine.set_end(self.params.range.end());
        }
    }

    pub fn set_range(&mut self, range: Range) {
        self.set_starts_at(range.start());
        self.set_ends_at(range.end());
    }

    pub fn fade_in(&self) -> f64 {
        self.params.fade.fade_in()
    }

    pub fn set_fade_in(&mut self, seconds: f64) {
        self.set_fade(Fade::new(seconds, self.params.fade.fade_out()));
    }

    pub fn fade_out(&self) -> f64 {
        self.params.fade.fade_out()
    }

    pub fn set_fade_out(&mut self, seconds: f64) {
        self.set_fade(Fade::new(self.params.fade.fade_in(), seconds));
    }

    pub fn set_fade(&mut self, fade: Fade) {
        self.params.fade = fade;
        if let Some(engine) = &self.engine {
            engine.set_fade(fade);
        }
    }

    pub fn volume(&self) -> Volume {
        self.params.volume
    }

    pub fn set_volume(&mut self, volume: Volume) {
        self.params.volume = volume;
        if let Some(engine) = &self.engine {
            engine.set_volume(volume);
        }
    }

    pub fn repeat(&self) -> Loop {
        self.params.repeat
    }

    pub fn set_loop(&mut self, repeat: Loop) {
        self.params.repeat = repeat;
        if let Some(engine) = &self.engine {
            engine.set_loop(repeat);
        }
    }

    /// Spawn an engine seeded with the current parameters.
    ///
    /// A running engine is shut down first so the cue never drives two workers.
    pub fn start_engine(
        &mut self,
        config: EngineConfig,
        output: OutputFactory,
    ) -> Result<&mut EngineHandle> {
        self.stop_engine()?;
        let handle = EngineHandle::spawn(self.clip.clone(), self.params, config, output)
            .with_context(|| format!("start engine for cue {:?}", self.name))?;
        tracing::debug!(cue = %self.name, "engine started");
        Ok(self.engine.insert(handle))
    }

    /// Quit the running engine, if any, and wait for it.
    pub fn stop_engine(&mut self) -> Result<()> {
        match self.engine.take() {
            Some(engine) => engine.quit(),
            None => Ok(()),
        }
    }

    /// Swap in a new clip. The running engine is shut down; start a new one to play it.
    pub fn replace_clip(&mut self, clip: Arc<AudioClip>) -> Result<()> {
        self.stop_engine()?;
        self.clip = clip;
        Ok(())
    }

    pub fn engine(&self) -> Option<&EngineHandle> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut EngineHandle> {
        self.engine.as_mut()
    }
}
