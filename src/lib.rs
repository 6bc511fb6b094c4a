//! Simulvox
//!
//! Real-time incremental speech-to-speech translation. A client streams
//! microphone audio over a WebSocket; translated audio comes back while the
//! speaker is still talking. Segmentation does not wait for silence:
//! repeated re-decoding of a sliding window commits whatever prefix K
//! successive hypotheses agree on.
//!
//! # Architecture
//!
//! ```text
//! Audio frames → Ring buffer → Periodic ASR → Commit tracker → MT → TTS → Client
//!                                  ↑               |                 ↑
//!                              energy gate      segments      backpressure hints
//! ```
//!
//! Model backends (ASR/MT/TTS) are consumed through narrow adapter traits;
//! everything in this crate is orchestration.

pub mod adapters;
pub mod asr;
pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod streaming;
pub mod translation;
pub mod tts;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::{Error, Result};
pub use pipeline::{Orchestrator, PipelineConfig};
