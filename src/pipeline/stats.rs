//! Per-segment and end-to-end latency accounting

use metrics::{counter, gauge, histogram};

use crate::streaming::protocol::ServerEvent;

/// Rolling per-session latency figures; the most recent measurement per
/// stage plus running totals.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub asr_ms: f64,
    pub mt_ms: f64,
    pub tts_ms: f64,
    pub e2e_ms: f64,
    pub commits_total: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_asr(&mut self, ms: f64) {
        self.asr_ms = ms;
        histogram!("simulvox_asr_latency_ms", ms);
    }

    pub fn record_commit(&mut self) {
        self.commits_total += 1;
        counter!("simulvox_commits_total", 1);
    }

    /// Record one segment's trip through MT and TTS. `tts_ms` is the time
    /// to the first synthesized chunk; `e2e_ms` runs from commit to that
    /// chunk reaching the outbound sink.
    pub fn record_segment(&mut self, mt_ms: f64, tts_ms: f64, e2e_ms: f64) {
        self.mt_ms = mt_ms;
        self.tts_ms = tts_ms;
        self.e2e_ms = e2e_ms;
        histogram!("simulvox_mt_latency_ms", mt_ms);
        histogram!("simulvox_tts_first_chunk_ms", tts_ms);
        histogram!("simulvox_e2e_latency_ms", e2e_ms);
    }

    /// Snapshot as a `stats` event, tagged with the current TTS queue depth.
    pub fn to_event(&self, tts_queue_ms: f64) -> ServerEvent {
        gauge!("simulvox_tts_queue_ms", tts_queue_ms);
        ServerEvent::Stats {
            asr_ms: round1(self.asr_ms),
            mt_ms: round1(self.mt_ms),
            tts_ms: round1(self.tts_ms),
            e2e_ms: round1(self.e2e_ms),
            commits_total: self.commits_total,
            tts_queue: round1(tts_queue_ms),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
