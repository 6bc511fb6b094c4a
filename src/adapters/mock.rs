//! Mock engines for tests and the model-free demo mode

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::asr::AsrEngine;
use crate::translation::MtEngine;
use crate::tts::{TtsEngine, TtsStream, VoiceConfig, TTS_STREAM_BOUND};

/// Replays a fixed sequence of hypotheses, one per call; empty strings once
/// the script runs out.
pub struct ScriptedAsrEngine {
    script: Mutex<VecDeque<String>>,
}

impl ScriptedAsrEngine {
    pub fn new<I, S>(hypotheses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(hypotheses.into_iter().map(Into::into).collect()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Queue more hypotheses while running.
    pub fn push(&self, hypothesis: impl Into<String>) {
        self.script.lock().push_back(hypothesis.into());
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl AsrEngine for ScriptedAsrEngine {
    async fn transcribe(
        &self,
        _samples: &[f32],
        _sample_rate: u32,
        _language: &str,
    ) -> Result<String> {
        Ok(self.script.lock().pop_front().unwrap_or_default())
    }
}

/// Returns the source text unchanged.
pub struct PassthroughMtEngine;

#[async_trait]
impl MtEngine for PassthroughMtEngine {
    async fn translate(
        &self,
        text: &str,
        _source_lang: &str,
        _target_lang: &str,
    ) -> Result<String> {
        Ok(text.to_string())
    }
}

/// Synthesizes a 440 Hz tone sized to the word count, streamed in 200 ms
/// chunks. Stands in for a real synthesizer so the full audio path can be
/// exercised without models.
pub struct ToneTtsEngine {
    sample_rate: u32,
    chunk_ms: u64,
    ms_per_word: u64,
    /// Simulated synthesis delay before the first chunk.
    latency: Duration,
}

impl ToneTtsEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chunk_ms: 200,
            ms_per_word: 350,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_ms_per_word(mut self, ms_per_word: u64) -> Self {
        self.ms_per_word = ms_per_word;
        self
    }

    fn render(&self, text: &str) -> Vec<u8> {
        let words = text.split_whitespace().count().max(1) as u64;
        let total_ms = 200 + words * self.ms_per_word;
        let samples = (total_ms * self.sample_rate as u64 / 1000) as usize;
        let mut pcm = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            let t = i as f32 / self.sample_rate as f32;
            let v = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3;
            pcm.extend_from_slice(&((v * 32767.0) as i16).to_le_bytes());
        }
        pcm
    }
}

#[async_trait]
impl TtsEngine for ToneTtsEngine {
    async fn synthesize_streaming(&self, text: &str, _voice: &VoiceConfig) -> Result<TtsStream> {
        let pcm = self.render(text);
        let chunk_bytes = (self.chunk_ms * self.sample_rate as u64 / 1000) as usize * 2;
        let latency = self.latency;
        let (tx, rx) = mpsc::channel(TTS_STREAM_BOUND);

        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            for chunk in pcm.chunks(chunk_bytes.max(2)) {
                if tx.send(Ok(chunk.to_vec())).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_asr_replays_in_order() {
        let asr = ScriptedAsrEngine::new(["hola", "hola como"]);
        assert_eq!(asr.transcribe(&[], 16000, "es").await.unwrap(), "hola");
        assert_eq!(asr.transcribe(&[], 16000, "es").await.unwrap(), "hola como");
        assert_eq!(asr.transcribe(&[], 16000, "es").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_tone_tts_streams_full_waveform() {
        let tts = ToneTtsEngine::new(24_000).with_ms_per_word(100);
        let voice = VoiceConfig {
            language: "en".to_string(),
            sample_rate: 24_000,
        };
        let mut stream = tts.synthesize_streaming("one two three", &voice).await.unwrap();

        let mut total = 0usize;
        while let Some(chunk) = stream.recv().await {
            let chunk = chunk.unwrap();
            assert_eq!(chunk.len() % 2, 0);
            total += chunk.len();
        }
        // 200 ms base + 3 words * 100 ms at 24 kHz, 2 bytes per sample
        assert_eq!(total, (500 * 24_000 / 1000) * 2);
    }
}
