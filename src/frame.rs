//! Captured frames and the capture ring buffer.
//!
//! - `Frame`: immutable RGB image plus capture instant and sequence number.
//!   Frames are shared between the capture and processing threads as
//!   `Arc<Frame>` and never mutated after capture.
//! - `FrameBuffer`: bounded ring holding the most recent frames. The oldest
//!   frame is evicted when a new one arrives at capacity.
//! - `SharedFrameBuffer`: the mutex-guarded handle both threads hold.

use image::RgbImage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Default ring capacity.
pub const DEFAULT_BUFFER_FRAMES: usize = 5;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct Frame {
    image: RgbImage,
    timestamp: Instant,
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self::with_timestamp(image, Instant::now())
    }

    /// Build a frame with an explicit capture instant (replays, tests).
    pub fn with_timestamp(image: RgbImage, timestamp: Instant) -> Self {
        Self {
            image,
            timestamp,
            sequence: 0,
        }
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Capture sequence number; 0 for frames built outside a capture worker.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer
// ----------------------------------------------------------------------------

/// Bounded ring of recent frames.
pub struct FrameBuffer {
    frames: VecDeque<Arc<Frame>>,
    capacity: usize,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a frame, evicting the oldest when full.
    pub fn push(&mut self, frame: Arc<Frame>) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Most recent frame without removing it.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.back().cloned()
    }

    /// Remove and return the most recent frame.
    pub fn pop(&mut self) -> Option<Arc<Frame>> {
        self.frames.pop_back()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_FRAMES)
    }
}

// ----------------------------------------------------------------------------
// SharedFrameBuffer
// ----------------------------------------------------------------------------

/// Cloneable handle to a mutex-guarded `FrameBuffer`.
///
/// A poisoned lock is recovered: the ring only holds complete `Arc<Frame>`
/// values, so a panic elsewhere cannot leave it half-written.
#[derive(Clone)]
pub struct SharedFrameBuffer {
    inner: Arc<Mutex<FrameBuffer>>,
}

impl SharedFrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameBuffer::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameBuffer> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, frame: Arc<Frame>) {
        self.lock().push(frame);
    }

    pub fn get_latest(&self) -> Option<Arc<Frame>> {
        self.lock().latest()
    }

    pub fn pop(&self) -> Option<Arc<Frame>> {
        self.lock().pop()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
