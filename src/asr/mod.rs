//! Speech recognition boundary: the engine contract and output filters
//!
//! The pipeline treats ASR as a black box called once per tick on the
//! sliding window. Raw model output passes through hallucination filters
//! before it becomes a hypothesis.

pub mod filters;

pub use filters::HypothesisFilter;

use anyhow::Result;
use async_trait::async_trait;

/// Contract for a speech recognition backend.
///
/// Implementations that are not thread-safe must serialize calls behind an
/// internal mutex; the pipeline issues at most one call per session at a
/// time but sessions share the engine.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    /// Transcribe normalized f32 mono samples and return the full-window
    /// hypothesis text. An empty string means no speech was recognized.
    async fn transcribe(&self, samples: &[f32], sample_rate: u32, language: &str)
        -> Result<String>;
}
