//! cpal output stream fed from a [`SharedAudio`] queue.
//!
//! The callback:
//! - refills a small local buffer from the queue without blocking
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format
//! - outputs silence on underrun (a paused or stopped engine simply stops writing)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::SharedAudio;

/// Max frames pulled from the queue per callback refill.
const REFILL_MAX_FRAMES: usize = 4096;

/// Build a cpal output stream that plays audio from `queue`.
///
/// `failed` is raised and `queue` closed when cpal reports a stream error, so a producer
/// blocked in `push_interleaved_blocking` returns promptly.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    failed: &Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, failed),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, failed),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, failed),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, failed),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedAudio>,
    failed: &Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let state = Mutex::new(CallbackState {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
        generation: queue.generation(),
    });

    let queue_cb = queue.clone();
    let queue_err = queue.clone();
    let failed_err = failed.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("output stream error: {err}");
        failed_err.store(true, Ordering::Relaxed);
        queue_err.close();
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let Ok(mut st) = state.lock() else {
                data.fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                return;
            };
            let frames = data.len() / channels_out;
            discard_stale(&mut *st, queue_cb.generation());

            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    let (generation, popped) = queue_cb.pop_with_generation(REFILL_MAX_FRAMES);
                    st.generation = generation;
                    match popped {
                        Some(v) => st.src = v,
                        None => {
                            for sample in &mut data[frame * channels_out..] {
                                *sample = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            }
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let value = next_sample_mapped(&mut *st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(value);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local buffer so the callback does not lock the queue per sample.
struct CallbackState {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
    /// Queue generation `src` was popped under.
    generation: u64,
}

/// Drop the local buffer if the queue was cleared since it was filled.
fn discard_stale(st: &mut CallbackState, generation: u64) -> bool {
    if st.generation == generation {
        return false;
    }
    st.generation = generation;
    st.src.clear();
    st.pos = 0;
    true
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: clamp to the available source channels
///
/// `st.pos` advances once per destination frame (after the last channel).
fn next_sample_mapped(st: &mut CallbackState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize, st: &CallbackState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, 1) => get_src(0, st),
        (2, 2) => get_src(dst_ch.min(1), st),
        (2, 1) => 0.5 * (get_src(0, st) + get_src(1, st)),
        (1, 2) => get_src(0, st),
        _ => get_src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}
