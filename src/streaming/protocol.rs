//! Wire protocol for the `/ws/stream` endpoint
//!
//! All frames are JSON text except TTS audio, which may instead travel as a
//! binary frame: an 8-byte header (magic, frame type, two reserved bytes,
//! u32 LE segment id) followed by raw PCM16.

use serde::{Deserialize, Serialize};

/// Frames accepted from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Must be the first frame; starts the pipeline.
    Config {
        source_lang: String,
        target_lang: String,
        /// Optional per-session tuning overrides.
        #[serde(default)]
        window_seconds: Option<f32>,
        #[serde(default)]
        asr_interval_ms: Option<u64>,
        #[serde(default)]
        commit_stability_k: Option<usize>,
    },
    /// One PCM16 chunk. `seq` is informational; arrival order is trusted.
    Audio {
        #[serde(default)]
        seq: Option<u64>,
        sample_rate: u32,
        pcm16_base64: String,
    },
    /// Flush and close.
    Stop,
}

/// Events emitted to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Status {
        message: String,
    },
    Ready,
    PartialTranscript {
        text: String,
    },
    CommittedTranscript {
        text: String,
        segment_id: u64,
    },
    TranslationCommitted {
        text: String,
        source: String,
        segment_id: u64,
    },
    TtsAudioChunk {
        audio_b64: String,
        segment_id: u64,
        sample_rate: u32,
    },
    TtsEnd {
        segment_id: u64,
    },
    Stats {
        asr_ms: f64,
        mt_ms: f64,
        tts_ms: f64,
        e2e_ms: f64,
        commits_total: u64,
        tts_queue: f64,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        segment_id: Option<u64>,
    },
}

/// What the pipeline hands to the outbound sender task. Audio is kept as
/// raw PCM16 so the binary path never round-trips through base64.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Event(ServerEvent),
    BinaryAudio { segment_id: u64, pcm16: Vec<u8> },
}

pub const BINARY_HEADER_LEN: usize = 8;
pub const BINARY_MAGIC: u8 = 0xA7;
pub const BINARY_FRAME_TTS_AUDIO: u8 = 0x01;

/// Frame a PCM16 payload for the binary transport.
pub fn encode_tts_binary(segment_id: u64, pcm16: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(BINARY_HEADER_LEN + pcm16.len());
    frame.push(BINARY_MAGIC);
    frame.push(BINARY_FRAME_TTS_AUDIO);
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(&(segment_id as u32).to_le_bytes());
    frame.extend_from_slice(pcm16);
    frame
}

/// Parse a binary TTS frame back into (segment_id, payload).
pub fn decode_tts_binary(frame: &[u8]) -> Option<(u64, &[u8])> {
    if frame.len() < BINARY_HEADER_LEN
        || frame[0] != BINARY_MAGIC
        || frame[1] != BINARY_FRAME_TTS_AUDIO
    {
        return None;
    }
    let segment_id = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as u64;
    Some((segment_id, &frame[BINARY_HEADER_LEN..]))
}
