//! Output device abstraction used by the streaming loop.
//!
//! The engine only needs `open`, a blocking `write` of raw PCM, and `close`. [`CpalOutput`]
//! is the real implementation; tests drive the engine with an in-memory recorder.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::clip::SampleFormat;
use crate::error::EngineError;
use crate::{device, playback, queue};

/// Sink for raw interleaved PCM.
///
/// `write` is expected to block until the device has room, which paces the engine.
pub trait AudioOutput {
    fn open(&mut self, format: SampleFormat, channels: u16, rate: u32) -> Result<(), EngineError>;
    fn write(&mut self, data: &[u8]) -> Result<(), EngineError>;
    /// Discard audio that was written but not yet played.
    fn flush(&mut self) {}
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Builds the output inside the worker thread (cpal streams are not `Send`).
pub type OutputFactory = Box<dyn FnOnce() -> Box<dyn AudioOutput> + Send>;

/// Settings for [`CpalOutput`].
#[derive(Clone, Debug)]
pub struct CpalOutputConfig {
    /// Output device by case-insensitive substring; `None` uses the host default.
    pub device: Option<String>,
    /// Depth of the device-side sample queue in milliseconds.
    ///
    /// Smaller values make pause/stop take effect sooner; larger values absorb scheduling jitter.
    pub buffer_ms: u64,
}

impl Default for CpalOutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_ms: 200,
        }
    }
}

/// Audio output on a cpal device.
pub struct CpalOutput {
    config: CpalOutputConfig,
    session: Option<OpenStream>,
}

struct OpenStream {
    stream: cpal::Stream,
    queue: Arc<queue::SharedAudio>,
    failed: Arc<AtomicBool>,
    format: SampleFormat,
    samples: Vec<f32>,
}

impl CpalOutput {
    pub fn new(config: CpalOutputConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Factory suitable for `EngineHandle::spawn`.
    pub fn factory(config: CpalOutputConfig) -> OutputFactory {
        Box::new(move || Box::new(CpalOutput::new(config)) as Box<dyn AudioOutput>)
    }

    fn open_stream(
        &self,
        format: SampleFormat,
        channels: u16,
        rate: u32,
    ) -> anyhow::Result<OpenStream> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.config.device.as_deref())?;
        let supported = device::pick_output_config(&device, rate, channels)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }

        let queue = Arc::new(queue::SharedAudio::new(
            channels as usize,
            queue::calc_max_buffered_samples(rate, channels as usize, self.config.buffer_ms),
        ));
        let failed = Arc::new(AtomicBool::new(false));
        let stream = playback::build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            &queue,
            &failed,
        )?;
        stream.play()?;

        tracing::info!(
            device = %device.description().map(|d| d.to_string()).unwrap_or_default(),
            rate_hz = rate,
            channels,
            device_channels = stream_config.channels,
            sample_format = ?supported.sample_format(),
            "output opened"
        );
        Ok(OpenStream {
            stream,
            queue,
            failed,
            format,
            samples: Vec::new(),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, format: SampleFormat, channels: u16, rate: u32) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Err(EngineError::Device("output already open".to_string()));
        }
        let session = self
            .open_stream(format, channels, rate)
            .map_err(|e| EngineError::Device(format!("{e:#}")))?;
        self.session = Some(session);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), EngineError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| EngineError::Device("output not open".to_string()))?;
        let format = session.format;
        session.samples.clear();
        session
            .samples
            .extend(data.chunks_exact(format.width()).map(|s| format.read(s)));
        let pushed = session.queue.push_interleaved_blocking(&session.samples);
        if !pushed || session.queue.is_closed() || session.failed.load(Ordering::Relaxed) {
            return Err(EngineError::Device("output stream failed".to_string()));
        }
        Ok(())
    }

    fn flush(&mut self) {
        if let Some(session) = self.session.as_ref() {
            session.queue.clear();
        }
    }

    fn close(&mut self) -> Result<(), EngineError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        tracing::debug!(dropped_frames = session.queue.len_frames(), "output closing");
        session.queue.close();
        let paused = session.stream.pause();
        drop(session.stream);
        paused.map_err(|e| EngineError::Device(format!("close: {e}")))
    }
}
