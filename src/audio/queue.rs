//! Bounded frame queue between a session's pipeline and its sinks
//!
//! The producer never blocks: when the queue is full the oldest frame is
//! evicted, so a slow sink loses stale audio instead of stalling the network
//! path. There is a single consumer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Notify;

use super::frame::AudioFrame;

/// Frames delivered to a sink, in order
pub type FrameStream = BoxStream<'static, AudioFrame>;

struct Inner {
    frames: VecDeque<AudioFrame>,
    closed: bool,
}

/// Occupancy of a [`FrameQueue`] at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Frames waiting
    pub len: usize,
    /// Maximum frames held
    pub capacity: usize,
    /// Frames evicted so far
    pub evicted: u64,
}

/// Bounded single-consumer queue of audio frames
pub struct FrameQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    evicted: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame, returning the frame evicted to make room
    ///
    /// Frames pushed after [`close`](Self::close) are dropped and returned.
    pub fn push(&self, frame: AudioFrame) -> Option<AudioFrame> {
        let evicted = {
            let mut inner = self.lock();
            if inner.closed {
                return Some(frame);
            }
            let evicted = if inner.frames.len() >= self.capacity {
                inner.frames.pop_front()
            } else {
                None
            };
            inner.frames.push_back(frame);
            evicted
        };

        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Stop accepting frames; the consumer sees the end after the backlog
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    /// Remove everything queued without closing
    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    /// Take the next frame without waiting
    pub fn try_next(&self) -> Option<AudioFrame> {
        self.lock().frames.pop_front()
    }

    /// Wait for the next frame; `None` once closed and empty
    pub async fn next(&self) -> Option<AudioFrame> {
        loop {
            {
                let mut inner = self.lock();
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Consume the queue as a stream
    pub fn stream(self: &Arc<Self>) -> FrameStream {
        stream::unfold(Arc::clone(self), |queue| async move {
            let frame = queue.next().await?;
            Some((frame, queue))
        })
        .boxed()
    }

    /// Frames waiting
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether nothing is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Whether the queue has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Maximum frames held
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted because the consumer fell behind
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len(),
            capacity: self.capacity,
            evicted: self.evicted(),
        }
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("evicted", &self.evicted())
            .finish_non_exhaustive()
    }
}
