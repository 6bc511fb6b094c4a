//! Model adapter implementations
//!
//! The pipeline only sees the `AsrEngine`/`MtEngine`/`TtsEngine` traits.
//! Two families live here: HTTP adapters that call external model services,
//! and mock adapters used by the test suite and the model-free demo mode.

pub mod http;
pub mod mock;

use std::sync::Arc;

use tracing::info;

use crate::asr::AsrEngine;
use crate::config::AppConfig;
use crate::translation::MtEngine;
use crate::tts::TtsEngine;

/// The three model backends a session runs against. Shared across sessions;
/// serialization of non-thread-safe models is each adapter's concern.
#[derive(Clone)]
pub struct EngineSet {
    pub asr: Arc<dyn AsrEngine>,
    pub mt: Arc<dyn MtEngine>,
    pub tts: Arc<dyn TtsEngine>,
}

impl EngineSet {
    /// Wire up engines from the configuration: HTTP adapters where service
    /// URLs are set, mocks otherwise.
    pub fn from_config(config: &AppConfig) -> Self {
        let asr: Arc<dyn AsrEngine> = match &config.asr_url {
            Some(url) => Arc::new(http::HttpAsrEngine::new(url, &config.asr_model)),
            None => {
                info!("No ASR service configured, using silent mock");
                Arc::new(mock::ScriptedAsrEngine::empty())
            }
        };
        let mt: Arc<dyn MtEngine> = match &config.mt_url {
            Some(url) => Arc::new(http::HttpMtEngine::new(url, &config.mt_model)),
            None => {
                info!("No MT service configured, translations pass through");
                Arc::new(mock::PassthroughMtEngine)
            }
        };
        let tts: Arc<dyn TtsEngine> = match &config.tts_url {
            Some(url) => Arc::new(http::HttpTtsEngine::new(url, &config.tts_model)),
            None => {
                info!("No TTS service configured, synthesizing placeholder tones");
                Arc::new(mock::ToneTtsEngine::new(config.tts_sample_rate))
            }
        };

        Self { asr, mt, tts }
    }
}
