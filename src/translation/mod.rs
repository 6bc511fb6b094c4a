//! Machine translation boundary

use anyhow::Result;
use async_trait::async_trait;

/// Contract for a text translation backend.
///
/// Each committed segment is translated exactly once; there is no
/// re-translation of prior context.
#[async_trait]
pub trait MtEngine: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}
