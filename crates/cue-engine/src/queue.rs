//! Bounded sample queue between the engine's blocking `write` and the cpal callback.
//!
//! The producer side blocks when the queue is full, which is what paces the streaming loop to
//! real time. The callback side never blocks.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Thread-safe bounded queue of interleaved `f32` samples.
///
/// A single [`Condvar`] signals "state changed"; the `closed` flag lives under the same mutex
/// as the samples so close and push cannot race.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct SharedInner {
    queue: VecDeque<f32>,
    closed: bool,
    /// Bumped by every `clear`; tags popped samples so a consumer can spot stale copies.
    generation: u64,
}

/// Queue capacity in samples for `buffer_ms` of audio, never less than one frame.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_ms: u64) -> usize {
    let ms = if buffer_ms == 0 { 200 } else { buffer_ms };
    let frames = (rate_hz as u64 * ms).div_ceil(1000).max(1) as usize;
    frames.saturating_mul(channels.max(1))
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                closed: false,
                generation: 0,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels.max(1)),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len_frames(&self) -> usize {
        let g = self.inner.lock().unwrap();
        g.queue.len() / self.channels
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }

    /// Mark the queue closed and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Drop everything buffered (used on stop so stale audio is not heard).
    ///
    /// Samples a consumer already popped are invalidated through [`SharedAudio::generation`].
    pub fn clear(&self) {
        let mut g = self.inner.lock().unwrap();
        g.queue.clear();
        g.generation = g.generation.wrapping_add(1);
        drop(g);
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before everything was pushed.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();

            while g.queue.len() >= self.max_buffered_samples && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return false;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Take up to `max_frames` whole frames without blocking, tagged with the generation they
    /// belong to; `None` when nothing is buffered.
    pub fn pop_with_generation(&self, max_frames: usize) -> (u64, Option<Vec<f32>>) {
        let mut g = self.inner.lock().unwrap();
        let generation = g.generation;

        let available_frames = g.queue.len() / self.channels;
        let take_samples = available_frames.min(max_frames) * self.channels;
        if take_samples == 0 {
            return (generation, None);
        }

        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        (generation, Some(out))
    }
}
