//! Volume and fade rendering.
//!
//! A mix is always rendered from the pristine clip, so repeated parameter changes never
//! compound gain or fades.

use crate::clip::{AudioClip, MixBuffer};
use crate::params::{Fade, Range, Volume};

/// Gain at the origin of a fade ramp, in dB. The ramp origin itself is exact silence.
pub const FADE_FLOOR_DB: f32 = -60.0;

/// Convert a gain in dB to a linear factor; the volume floor mutes.
pub fn db_to_gain(db: f32) -> f32 {
    if db <= Volume::MIN {
        0.0
    } else {
        10f32.powf(db / 20.0)
    }
}

/// Fade-in multiplier for `progress` in `[0, 1]` through the ramp.
///
/// Linear in dB from [`FADE_FLOOR_DB`] to 0 dB, so the amplitude curve is exponential.
/// Monotonic; `0.0` at the origin and `1.0` at the end.
pub fn fade_gain(progress: f64) -> f32 {
    if progress <= 0.0 {
        return 0.0;
    }
    if progress >= 1.0 {
        return 1.0;
    }
    let db = FADE_FLOOR_DB * (1.0 - progress as f32);
    10f32.powf(db / 20.0)
}

/// Per-channel linear gains for a clip with `channels` channels.
fn channel_gains(volume: &Volume, channels: usize) -> Vec<f32> {
    let master = db_to_gain(volume.master());
    if channels < 2 || !volume.separate() {
        return vec![master; channels];
    }
    let mut gains = vec![master; channels];
    gains[0] = db_to_gain(volume.left());
    gains[1] = db_to_gain(volume.right());
    gains
}

/// Fade envelope for the resolved range, in frames.
struct Envelope {
    start: usize,
    end: usize,
    fade_in: usize,
    fade_out: usize,
}

impl Envelope {
    fn new(clip: &AudioClip, fade: &Fade, range: &Range) -> Self {
        let duration = clip.duration().as_secs_f64();
        let (start_s, end_s) = range.resolve(duration);
        let start = clip.frame_at(start_s);
        let end = clip.frame_at(end_s);
        let len = end.saturating_sub(start);
        let rate = clip.sample_rate() as f64;
        Self {
            start,
            end,
            fade_in: ((fade.fade_in() * rate).round() as usize).min(len),
            fade_out: ((fade.fade_out() * rate).round() as usize).min(len),
        }
    }

    fn gain(&self, frame: usize) -> f32 {
        if frame < self.start || frame >= self.end {
            return 1.0;
        }
        let mut gain = 1.0;
        if self.fade_in > 0 {
            let into = frame - self.start;
            if into < self.fade_in {
                gain *= fade_gain(into as f64 / self.fade_in as f64);
            }
        }
        if self.fade_out > 0 {
            // Distance to the end of the range; the last frame sits one step above silence.
            let left = self.end - frame - 1;
            if left < self.fade_out {
                gain *= fade_gain(left as f64 / self.fade_out as f64);
            }
        }
        gain
    }
}

/// Render a fresh mix buffer for the given parameters.
pub fn render_mix(clip: &AudioClip, volume: &Volume, fade: &Fade, range: &Range) -> MixBuffer {
    let channels = clip.channels() as usize;
    let gains = channel_gains(volume, channels);
    if fade.is_flat() && gains.iter().all(|&g| g == 1.0) {
        return clip.pristine_mix();
    }

    let format = clip.format();
    let width = format.width();
    let frame_bytes = clip.frame_bytes();
    let envelope = Envelope::new(clip, fade, range);
    let mut out = clip.data().to_vec();

    for (frame, bytes) in out.chunks_exact_mut(frame_bytes).enumerate() {
        let env = envelope.gain(frame);
        for (ch, sample) in bytes.chunks_exact_mut(width).enumerate() {
            let g = gains[ch] * env;
            if g == 1.0 {
                continue;
            }
            let value = format.read(sample) * g;
            format.write(value, sample);
        }
    }

    tracing::debug!(
        frames = clip.frames(),
        volume = %volume,
        fade = %fade,
        "mix rendered"
    );
    MixBuffer::from_bytes(frame_bytes, out)
}
