//! Speech synthesis boundary

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Voice selection for a synthesis call.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Target language ISO code; implementations map it to a voice.
    pub language: String,
    /// Output sample rate in Hz (24 kHz by convention).
    pub sample_rate: u32,
}

/// A finite sequence of PCM16 little-endian chunks at the configured sample
/// rate. The stream ends when the sender side is dropped.
pub type TtsStream = mpsc::Receiver<Result<Vec<u8>>>;

/// Channel bound for in-flight synthesis chunks; saturation here is part of
/// the backpressure path.
pub const TTS_STREAM_BOUND: usize = 32;

/// Contract for a streaming speech synthesis backend.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// Begin synthesis and return the chunk stream. Chunks arrive in
    /// synthesizer order and concatenate to the full waveform.
    async fn synthesize_streaming(&self, text: &str, voice: &VoiceConfig) -> Result<TtsStream>;
}
