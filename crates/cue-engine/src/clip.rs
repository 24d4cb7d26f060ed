//! Decoded PCM clips and the mix buffers derived from them.
//!
//! An [`AudioClip`] is the immutable output of the decoder collaborator: interleaved
//! little-endian integer PCM plus its layout. A [`MixBuffer`] has the same layout and is
//! what the streaming loop actually reads; it is rebuilt from the clip, never patched.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};

/// Integer PCM layout, selected by sample width in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    /// 8-bit unsigned (width 1).
    U8,
    /// 16-bit signed (width 2).
    I16,
    /// 24-bit signed, packed (width 3).
    I24,
    /// 32-bit signed (width 4).
    I32,
}

impl SampleFormat {
    pub fn from_width(width: usize) -> Option<Self> {
        match width {
            1 => Some(SampleFormat::U8),
            2 => Some(SampleFormat::I16),
            3 => Some(SampleFormat::I24),
            4 => Some(SampleFormat::I32),
            _ => None,
        }
    }

    pub fn width(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::I32 => 4,
        }
    }

    /// Read one sample (exactly `width()` bytes) as a float in `[-1.0, 1.0]`.
    pub fn read(self, bytes: &[u8]) -> f32 {
        match self {
            SampleFormat::U8 => (bytes[0] as f32 - 128.0) / 128.0,
            SampleFormat::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32_768.0,
            SampleFormat::I24 => {
                // Sign-extend by placing the 24 bits in the top of an i32.
                let v = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
                v as f32 / 8_388_608.0
            }
            SampleFormat::I32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
        }
    }

    /// Write `value` (clamped to full scale) into `out` (exactly `width()` bytes).
    pub fn write(self, value: f32, out: &mut [u8]) {
        let v = value.clamp(-1.0, 1.0) as f64;
        match self {
            SampleFormat::U8 => {
                out[0] = (v * 128.0 + 128.0).round().clamp(0.0, 255.0) as u8;
            }
            SampleFormat::I16 => {
                let s = (v * 32_768.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
                out.copy_from_slice(&s.to_le_bytes());
            }
            SampleFormat::I24 => {
                let s = (v * 8_388_608.0).round().clamp(-8_388_608.0, 8_388_607.0) as i32;
                out.copy_from_slice(&s.to_le_bytes()[..3]);
            }
            SampleFormat::I32 => {
                let s = (v * 2_147_483_648.0)
                    .round()
                    .clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                out.copy_from_slice(&s.to_le_bytes());
            }
        }
    }
}

/// Immutable decoded source.
#[derive(Debug)]
pub struct AudioClip {
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
    data: Arc<[u8]>,
}

impl AudioClip {
    /// Build a clip from raw interleaved samples.
    ///
    /// Fails when the layout is degenerate or `data` does not hold whole frames.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        sample_width: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(anyhow!("sample rate must be non-zero"));
        }
        if channels == 0 {
            return Err(anyhow!("channel count must be non-zero"));
        }
        let format = SampleFormat::from_width(sample_width)
            .ok_or_else(|| anyhow!("unsupported sample width: {sample_width}"))?;
        let frame_bytes = format.width() * channels as usize;
        if data.len() % frame_bytes != 0 {
            return Err(anyhow!(
                "{} bytes is not a whole number of {frame_bytes}-byte frames",
                data.len()
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
            format,
            data: data.into(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn sample_width(&self) -> usize {
        self.format.width()
    }

    pub fn frame_bytes(&self) -> usize {
        self.format.width() * self.channels as usize
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.frame_bytes()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Frame index for a time offset in seconds, clamped to the clip.
    pub fn frame_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        let frame = (seconds * self.sample_rate as f64).round() as usize;
        frame.min(self.frames())
    }

    /// Milliseconds covered by `frames` frames.
    pub fn frames_to_ms(&self, frames: usize) -> u64 {
        (frames as u64).saturating_mul(1000) / self.sample_rate as u64
    }

    /// An unmodified mix buffer sharing the clip's bytes.
    pub fn pristine_mix(&self) -> MixBuffer {
        MixBuffer {
            frame_bytes: self.frame_bytes(),
            data: self.data.clone(),
        }
    }
}

/// Working copy of a clip's samples, read by the streaming loop.
#[derive(Debug, Clone)]
pub struct MixBuffer {
    frame_bytes: usize,
    data: Arc<[u8]>,
}

impl MixBuffer {
    pub(crate) fn from_bytes(frame_bytes: usize, data: Vec<u8>) -> Self {
        Self {
            frame_bytes,
            data: data.into(),
        }
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.frame_bytes
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes for frames `[from, to)`, clamped to the buffer.
    pub fn frames_bytes(&self, from: usize, to: usize) -> &[u8] {
        let end = to.min(self.frames());
        let start = from.min(end);
        &self.data[start * self.frame_bytes..end * self.frame_bytes]
    }
}
