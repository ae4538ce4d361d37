//! Real-time playback engine
//!
//! A sample queue drained by the host's fixed-rate render callback. The
//! producer side (network message handlers) appends; the consumer side
//! (the real-time render tick) pops. Both take one brief lock around the
//! queue; the render path never performs I/O, never waits on anything
//! else and degrades to silence on any shortfall.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;

/// Externally observable playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing enqueued since creation or the last clear
    Idle,
    /// Samples pending or currently draining
    Playing,
    /// Render gate is closed; queue is held as-is
    Paused,
    /// Queue drained to empty
    Finished,
}

/// Signals raised by the render path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The queue drained to empty; fired exactly once per drain
    Finished,
    /// Playback reached a named checkpoint
    Mark {
        /// Name given to [`PlaybackEngine::add_mark`]
        name: String,
    },
}

#[derive(Debug)]
struct QueueInner {
    samples: VecDeque<f32>,
    marks: VecDeque<String>,
    /// Lifecycle independent of the pause gate: Idle, Playing or Finished.
    lifecycle: PlaybackState,
    paused: bool,
    finished_signaled: bool,
    volume: f32,
}

/// Sample queue feeding a real-time audio render callback
#[derive(Debug)]
pub struct PlaybackEngine {
    inner: Mutex<QueueInner>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackEngine {
    /// Create an engine and the receiver for its playback events
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                marks: VecDeque::new(),
                lifecycle: PlaybackState::Idle,
                paused: false,
                finished_signaled: false,
                volume: 1.0,
            }),
            events,
        };
        (engine, events_rx)
    }

    /// Append samples to the queue tail
    ///
    /// Transitions playback to `Playing` and rearms the finished signal.
    /// Enqueueing an empty frame is a no-op. Safe to call from any
    /// non-real-time context.
    pub fn enqueue(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.samples.extend(samples.iter().copied());
        inner.lifecycle = PlaybackState::Playing;
        inner.finished_signaled = false;
    }

    /// Fill one render frame from the queue
    ///
    /// Called at fixed cadence by the host's real-time clock. While
    /// paused the frame is silence and the queue is untouched. A
    /// shortfall is zero-padded, never an error. After the pop, a
    /// drain-to-empty signals `Finished` once, then at most one pending
    /// mark fires per empty tick.
    pub fn render(&self, frame: &mut [f32]) {
        let mut inner = self.inner.lock();
        if inner.paused {
            frame.fill(0.0);
            return;
        }

        let volume = inner.volume;
        let available = inner.samples.len().min(frame.len());
        for slot in frame.iter_mut().take(available) {
            // Shortfall is impossible here: available <= queue length.
            let sample = inner.samples.pop_front().unwrap_or(0.0);
            *slot = (sample * volume).clamp(-1.0, 1.0);
        }
        frame[available..].fill(0.0);

        if inner.samples.is_empty() {
            if inner.lifecycle == PlaybackState::Playing && !inner.finished_signaled {
                inner.finished_signaled = true;
                inner.lifecycle = PlaybackState::Finished;
                let _ = self.events.send(PlaybackEvent::Finished);
            }
            if let Some(name) = inner.marks.pop_front() {
                let _ = self.events.send(PlaybackEvent::Mark { name });
            }
        }
    }

    /// Close the render gate; subsequent renders yield silence
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    /// Reopen the render gate; playback continues where the queue left off
    pub fn resume(&self) {
        self.inner.lock().paused = false;
    }

    /// Drop all pending samples and marks, and close the render gate
    ///
    /// The queue and mark list empty atomically with respect to render;
    /// a concurrent tick observes either the old queue or the cleared
    /// one, never a partial clear. Playback stays paused until an
    /// explicit [`resume`](Self::resume). Dropped marks never fire.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.marks.len();
        inner.samples.clear();
        inner.marks.clear();
        inner.lifecycle = PlaybackState::Idle;
        inner.finished_signaled = false;
        inner.paused = true;
        if dropped > 0 {
            debug!("cleared playback queue, dropped {dropped} pending marks");
        }
    }

    /// Drop all pending samples and marks without touching the pause gate
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.samples.clear();
        inner.marks.clear();
        inner.lifecycle = PlaybackState::Idle;
        inner.finished_signaled = false;
    }

    /// Append a named checkpoint behind all currently queued audio
    pub fn add_mark(&self, name: impl Into<String>) {
        self.inner.lock().marks.push_back(name.into());
    }

    /// Set playback volume, clamped to 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        self.inner.lock().volume = volume.clamp(0.0, 1.0);
    }

    /// Current playback volume
    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    /// Current externally observable state
    pub fn state(&self) -> PlaybackState {
        let inner = self.inner.lock();
        if inner.paused {
            PlaybackState::Paused
        } else {
            inner.lifecycle
        }
    }

    /// Number of samples currently queued
    pub fn queued_samples(&self) -> usize {
        self.inner.lock().samples.len()
    }

    /// Number of marks waiting to fire
    pub fn pending_marks(&self) -> usize {
        self.inner.lock().marks.len()
    }
}
