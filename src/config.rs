//! Environment-driven application configuration
//!
//! Every tunable has a default; overrides come from `SIMULVOX_*` environment
//! variables. Unrecognized keys under the prefix are ignored with a warning.

use std::str::FromStr;

use anyhow::Result;
use tracing::warn;

use crate::logging::LogConfig;

const ENV_PREFIX: &str = "SIMULVOX_";

/// Keys the server understands, without the prefix.
const RECOGNIZED_KEYS: &[&str] = &[
    "DEVICE",
    "ASR_URL",
    "MT_URL",
    "TTS_URL",
    "ASR_MODEL",
    "MT_MODEL",
    "TTS_MODEL",
    "WINDOW_SECONDS",
    "ASR_INTERVAL_MS",
    "COMMIT_STABILITY_K",
    "COMMIT_TIMEOUT_SECONDS",
    "COMMIT_MIN_WORDS",
    "BUFFER_LIMIT_MS",
    "CAPTURE_SAMPLE_RATE",
    "TTS_SAMPLE_RATE",
    "BINARY_AUDIO",
    "LOG_LEVEL",
    "LOG_JSON",
    "HOST",
    "PORT",
];

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Device selector handed to the model adapters ("cpu", "cuda", ...)
    pub device: String,

    /// Base URLs of the ASR/MT/TTS services. When unset, the server runs
    /// with the built-in mock engines (demo mode).
    pub asr_url: Option<String>,
    pub mt_url: Option<String>,
    pub tts_url: Option<String>,

    /// Model identifiers forwarded to the adapters.
    pub asr_model: String,
    pub mt_model: String,
    pub tts_model: String,

    /// Sliding ASR window length in seconds.
    pub window_seconds: f32,
    /// Period of the ASR re-decode loop.
    pub asr_interval_ms: u64,
    /// Consecutive agreeing hypotheses required for a stability commit.
    pub commit_stability_k: usize,
    /// Force-commit deadline when stability is never reached.
    pub commit_timeout_seconds: f64,
    /// Minimum new tokens per commit.
    pub commit_min_words: usize,
    /// Queued-TTS-audio threshold for entering degraded mode.
    pub buffer_limit_ms: f64,

    /// Inbound PCM sample rate negotiated with the client.
    pub capture_sample_rate: u32,
    /// Outbound synthesized PCM sample rate.
    pub tts_sample_rate: u32,
    /// Emit TTS chunks as binary frames instead of base64 JSON.
    pub binary_audio: bool,

    pub log_level: String,
    pub log_json: bool,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            asr_url: None,
            mt_url: None,
            tts_url: None,
            asr_model: "qwen3-asr-0.6b".to_string(),
            mt_model: "opus-mt".to_string(),
            tts_model: "edge-tts".to_string(),
            window_seconds: 8.0,
            asr_interval_ms: 500,
            commit_stability_k: 3,
            commit_timeout_seconds: 2.0,
            commit_min_words: 1,
            buffer_limit_ms: 3000.0,
            capture_sample_rate: 16_000,
            tts_sample_rate: 24_000,
            binary_audio: false,
            log_level: "info".to_string(),
            log_json: false,
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl AppConfig {
    /// Build the configuration from `SIMULVOX_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in std::env::vars() {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if !RECOGNIZED_KEYS.contains(&name) {
                warn!("Ignoring unrecognized configuration key {key}");
                continue;
            }
            config.apply(name, &value);
        }

        Ok(config)
    }

    fn apply(&mut self, name: &str, value: &str) {
        match name {
            "DEVICE" => self.device = value.to_string(),
            "ASR_URL" => self.asr_url = non_empty(value),
            "MT_URL" => self.mt_url = non_empty(value),
            "TTS_URL" => self.tts_url = non_empty(value),
            "ASR_MODEL" => self.asr_model = value.to_string(),
            "MT_MODEL" => self.mt_model = value.to_string(),
            "TTS_MODEL" => self.tts_model = value.to_string(),
            "WINDOW_SECONDS" => parse_into(name, value, &mut self.window_seconds),
            "ASR_INTERVAL_MS" => parse_into(name, value, &mut self.asr_interval_ms),
            "COMMIT_STABILITY_K" => parse_into(name, value, &mut self.commit_stability_k),
            "COMMIT_TIMEOUT_SECONDS" => parse_into(name, value, &mut self.commit_timeout_seconds),
            "COMMIT_MIN_WORDS" => parse_into(name, value, &mut self.commit_min_words),
            "BUFFER_LIMIT_MS" => parse_into(name, value, &mut self.buffer_limit_ms),
            "CAPTURE_SAMPLE_RATE" => parse_into(name, value, &mut self.capture_sample_rate),
            "TTS_SAMPLE_RATE" => parse_into(name, value, &mut self.tts_sample_rate),
            "BINARY_AUDIO" => parse_into(name, value, &mut self.binary_audio),
            "LOG_LEVEL" => self.log_level = value.to_string(),
            "LOG_JSON" => parse_into(name, value, &mut self.log_json),
            "HOST" => self.host = value.to_string(),
            "PORT" => parse_into(name, value, &mut self.port),
            _ => unreachable!("key filtered by RECOGNIZED_KEYS"),
        }
    }

    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json_format: self.log_json,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_into<T>(name: &str, value: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.parse() {
        Ok(parsed) => *slot = parsed,
        Err(e) => warn!("Invalid value {value:?} for {ENV_PREFIX}{name}: {e}; keeping default"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.capture_sample_rate, 16_000);
        assert_eq!(config.tts_sample_rate, 24_000);
        assert_eq!(config.commit_stability_k, 3);
        assert_eq!(config.commit_min_words, 1);
        assert!((config.commit_timeout_seconds - 2.0).abs() < f64::EPSILON);
        assert!(config.asr_url.is_none());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = AppConfig::default();
        config.apply("WINDOW_SECONDS", "5.5");
        config.apply("COMMIT_STABILITY_K", "4");
        config.apply("BINARY_AUDIO", "true");
        config.apply("ASR_URL", "http://127.0.0.1:6006");
        assert!((config.window_seconds - 5.5).abs() < f32::EPSILON);
        assert_eq!(config.commit_stability_k, 4);
        assert!(config.binary_audio);
        assert_eq!(config.asr_url.as_deref(), Some("http://127.0.0.1:6006"));
    }

    #[test]
    fn test_invalid_value_keeps_default() {
        let mut config = AppConfig::default();
        config.apply("PORT", "not-a-port");
        assert_eq!(config.port, 8000);
    }
}
