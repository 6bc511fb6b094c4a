//! HTTP adapters for external model services
//!
//! Each service exposes a small JSON API; audio travels as base64 PCM16.
//! The HTTP client is thread-safe, so no serialization mutex is needed
//! here; per-call deadlines are enforced by the pipeline.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::asr::AsrEngine;
use crate::audio;
use crate::translation::MtEngine;
use crate::tts::{TtsEngine, TtsStream, VoiceConfig, TTS_STREAM_BOUND};

/// Outer bound on any single service call; the pipeline applies tighter
/// per-stage deadlines.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .expect("HTTP client construction cannot fail with static options")
}

#[derive(Deserialize)]
struct TextResponse {
    text: String,
}

/// ASR over HTTP: `POST {base}/transcribe`.
pub struct HttpAsrEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    samples_b64: String,
    sample_rate: u32,
    language: &'a str,
    model: &'a str,
}

impl HttpAsrEngine {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: build_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl AsrEngine for HttpAsrEngine {
    async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
        language: &str,
    ) -> Result<String> {
        let request = TranscribeRequest {
            samples_b64: BASE64.encode(audio::f32_to_pcm16(samples)),
            sample_rate,
            language,
            model: &self.model,
        };
        let url = format!("{}/transcribe", self.base_url);
        debug!(url, samples = samples.len(), "ASR request");

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("ASR service returned {}", response.status()));
        }
        Ok(response.json::<TextResponse>().await?.text)
    }
}

/// MT over HTTP: `POST {base}/translate`.
pub struct HttpMtEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
    model: &'a str,
}

impl HttpMtEngine {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: build_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl MtEngine for HttpMtEngine {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let request = TranslateRequest {
            text,
            source_lang,
            target_lang,
            model: &self.model,
        };
        let url = format!("{}/translate", self.base_url);

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("MT service returned {}", response.status()));
        }
        Ok(response.json::<TextResponse>().await?.text)
    }
}

/// TTS over HTTP: `POST {base}/synthesize` answering with a raw PCM16 body,
/// forwarded chunk by chunk as it arrives.
pub struct HttpTtsEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    sample_rate: u32,
    model: &'a str,
}

impl HttpTtsEngine {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: build_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TtsEngine for HttpTtsEngine {
    async fn synthesize_streaming(&self, text: &str, voice: &VoiceConfig) -> Result<TtsStream> {
        let request = SynthesizeRequest {
            text,
            voice: &voice.language,
            sample_rate: voice.sample_rate,
            model: &self.model,
        };
        let url = format!("{}/synthesize", self.base_url);

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("TTS service returned {}", response.status()));
        }

        let (tx, rx) = mpsc::channel(TTS_STREAM_BOUND);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            // PCM16 frames are two bytes; a network chunk may split one.
            let mut leftover: Option<u8> = None;
            while let Some(piece) = body.next().await {
                match piece {
                    Ok(bytes) => {
                        let mut chunk = Vec::with_capacity(bytes.len() + 1);
                        if let Some(b) = leftover.take() {
                            chunk.push(b);
                        }
                        chunk.extend_from_slice(&bytes);
                        if chunk.len() % 2 != 0 {
                            leftover = chunk.pop();
                        }
                        if chunk.is_empty() {
                            continue;
                        }
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(anyhow!("TTS stream error: {e}"))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
