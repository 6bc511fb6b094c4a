//! Backpressure: playback-queue accounting and the degradation state machine
//!
//! Synthesis falling behind real time is not an error. The controller watches
//! how much synthesized audio the client has not yet played and, past a
//! limit, hints the pipeline to produce fewer, longer segments: the commit
//! tracker raises its minimum word count and the TTS stage coalesces
//! adjacent segments into one synthesis call. Committed text is never
//! dropped.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureState {
    Normal,
    Degraded,
}

/// Two-state controller with hysteresis: degrade when the queued audio
/// exceeds `limit_ms`, recover when it falls below half of it.
pub struct BackpressureController {
    state: BackpressureState,
    limit_ms: f64,
    normal_min_words: usize,
    degraded_min_words: usize,
}

impl BackpressureController {
    pub fn new(limit_ms: f64, normal_min_words: usize, degraded_min_words: usize) -> Self {
        Self {
            state: BackpressureState::Normal,
            limit_ms,
            normal_min_words,
            degraded_min_words: degraded_min_words.max(normal_min_words),
        }
    }

    /// Report the current queue depth; returns the new state when a
    /// transition fired (exactly one per crossing).
    pub fn observe(&mut self, queue_ms: f64) -> Option<BackpressureState> {
        match self.state {
            BackpressureState::Normal if queue_ms > self.limit_ms => {
                self.state = BackpressureState::Degraded;
                warn!(
                    queue_ms = queue_ms as u64,
                    limit_ms = self.limit_ms as u64,
                    "TTS queue over limit, degrading pipeline"
                );
                Some(BackpressureState::Degraded)
            }
            BackpressureState::Degraded if queue_ms < self.limit_ms * 0.5 => {
                self.state = BackpressureState::Normal;
                info!(queue_ms = queue_ms as u64, "TTS queue recovered");
                Some(BackpressureState::Normal)
            }
            _ => None,
        }
    }

    pub fn state(&self) -> BackpressureState {
        self.state
    }

    /// Commit-tracker hint for the current state.
    pub fn min_words(&self) -> usize {
        match self.state {
            BackpressureState::Normal => self.normal_min_words,
            BackpressureState::Degraded => self.degraded_min_words,
        }
    }

    /// Whether the TTS stage should merge adjacent segments.
    pub fn should_coalesce(&self) -> bool {
        self.state == BackpressureState::Degraded
    }
}

/// Tracks how much synthesized audio the client has not yet heard.
///
/// A play head advances by each pushed chunk's duration and is never behind
/// the wall clock; the gap between the two is the undelivered audio.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    play_head: Option<Instant>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a chunk of synthesized audio entering the outbound queue.
    pub fn push(&mut self, duration: Duration, now: Instant) {
        let head = match self.play_head {
            Some(h) if h > now => h,
            _ => now,
        };
        self.play_head = Some(head + duration);
    }

    /// Milliseconds of queued, not-yet-played audio.
    pub fn queued_ms(&self, now: Instant) -> f64 {
        match self.play_head {
            Some(h) if h > now => (h - now).as_secs_f64() * 1000.0,
            _ => 0.0,
        }
    }
}
