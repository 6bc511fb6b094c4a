//! Per-session pipeline orchestration
//!
//! Two tasks per session: the ASR tick loop (window snapshot → transcribe →
//! commit tracking) and the segment worker (MT → streaming TTS, one segment
//! at a time). Commits cross between them on a bounded channel; everything
//! outbound funnels into the session's event channel.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{BackpressureController, BackpressureState, CommitTracker, PlaybackClock, Segment, SessionStats};
use crate::adapters::EngineSet;
use crate::asr::HypothesisFilter;
use crate::audio::{self, AudioBuffer};
use crate::config::AppConfig;
use crate::error::{Error, Stage};
use crate::streaming::protocol::{OutboundMessage, ServerEvent};
use crate::tts::VoiceConfig;

/// Bound of the commit → MT/TTS channel; filling up stalls the ASR loop's
/// commit hand-off, which is intended.
const SEGMENT_CHANNEL_BOUND: usize = 8;

/// Resolved per-session tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_lang: String,
    pub target_lang: String,
    pub window_seconds: f32,
    pub asr_interval: Duration,
    pub stability_k: usize,
    pub commit_timeout: Duration,
    pub min_words: usize,
    pub degraded_min_words: usize,
    pub buffer_limit_ms: f64,
    pub capture_sample_rate: u32,
    pub tts_sample_rate: u32,
    pub binary_audio: bool,
    pub asr_timeout: Duration,
    pub mt_timeout: Duration,
    pub tts_timeout: Duration,
    /// Windows shorter than this are not worth decoding.
    pub min_window_seconds: f32,
    /// RMS energy gate; quieter windows skip ASR entirely.
    pub silence_rms: f32,
    /// How long a degraded TTS stage waits for a follow-up segment to merge.
    pub coalesce_hold: Duration,
}

impl PipelineConfig {
    pub fn from_app(app: &AppConfig, source_lang: &str, target_lang: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            window_seconds: app.window_seconds,
            asr_interval: Duration::from_millis(app.asr_interval_ms),
            stability_k: app.commit_stability_k,
            commit_timeout: Duration::from_secs_f64(app.commit_timeout_seconds),
            min_words: app.commit_min_words,
            degraded_min_words: 3,
            buffer_limit_ms: app.buffer_limit_ms,
            capture_sample_rate: app.capture_sample_rate,
            tts_sample_rate: app.tts_sample_rate,
            binary_audio: app.binary_audio,
            asr_timeout: Duration::from_secs(10),
            mt_timeout: Duration::from_secs(10),
            tts_timeout: Duration::from_secs(30),
            min_window_seconds: 0.5,
            silence_rms: 0.005,
            coalesce_hold: Duration::from_millis(300),
        }
    }

    /// Ring capacity: twice the ASR window, at least ten seconds.
    fn buffer_seconds(&self) -> f32 {
        (self.window_seconds * 2.0).max(10.0)
    }
}

/// State shared between the session endpoint and the pipeline tasks.
struct Shared {
    cfg: PipelineConfig,
    engines: EngineSet,
    buffer: Mutex<AudioBuffer>,
    tracker: AsyncMutex<CommitTracker>,
    bp: Mutex<BackpressureController>,
    clock: Mutex<PlaybackClock>,
    stats: Mutex<SessionStats>,
    filter: HypothesisFilter,
}

/// Handle to one session's running pipeline.
pub struct Orchestrator {
    shared: Arc<Shared>,
    segments_tx: mpsc::Sender<Segment>,
    events_tx: mpsc::Sender<OutboundMessage>,
    shutdown_tx: watch::Sender<bool>,
    asr_task: JoinHandle<()>,
    worker_task: JoinHandle<()>,
}

impl Orchestrator {
    /// Spawn the ASR loop and the segment worker for one session.
    pub fn start(
        engines: EngineSet,
        cfg: PipelineConfig,
        events_tx: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let now = Instant::now();
        let shared = Arc::new(Shared {
            buffer: Mutex::new(AudioBuffer::new(
                cfg.buffer_seconds(),
                cfg.capture_sample_rate,
            )),
            tracker: AsyncMutex::new(CommitTracker::new(
                cfg.stability_k,
                cfg.commit_timeout,
                cfg.min_words,
                now,
            )),
            bp: Mutex::new(BackpressureController::new(
                cfg.buffer_limit_ms,
                cfg.min_words,
                cfg.degraded_min_words,
            )),
            clock: Mutex::new(PlaybackClock::new()),
            stats: Mutex::new(SessionStats::new()),
            filter: HypothesisFilter::default(),
            engines,
            cfg,
        });

        let (segments_tx, segments_rx) = mpsc::channel(SEGMENT_CHANNEL_BOUND);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let asr_task = tokio::spawn(asr_loop(
            shared.clone(),
            events_tx.clone(),
            segments_tx.clone(),
            shutdown_rx,
        ));
        let worker_task = tokio::spawn(segment_worker(
            shared.clone(),
            events_tx.clone(),
            segments_rx,
        ));

        info!(
            source = %shared.cfg.source_lang,
            target = %shared.cfg.target_lang,
            interval_ms = shared.cfg.asr_interval.as_millis() as u64,
            window_s = shared.cfg.window_seconds,
            "Pipeline started"
        );

        Self {
            shared,
            segments_tx,
            events_tx,
            shutdown_tx,
            asr_task,
            worker_task,
        }
    }

    /// Append decoded samples to the sliding window.
    pub fn feed_audio(&self, samples: &[f32]) {
        self.shared.buffer.lock().append(samples);
    }

    /// Milliseconds of synthesized audio not yet played by the client.
    pub fn queued_ms(&self) -> f64 {
        self.shared.clock.lock().queued_ms(Instant::now())
    }

    pub fn backpressure_state(&self) -> BackpressureState {
        self.shared.bp.lock().state()
    }

    /// Stop the pipeline. With `flush`, any uncommitted tail is force
    /// committed and MT/TTS drain before this returns; without it, pending
    /// segments still drain but nothing new is committed.
    pub async fn stop(self, flush: bool) {
        let _ = self.shutdown_tx.send(true);
        // The tick loop exits at its next suspension point; an in-flight
        // ASR call finishes first (bounded by its own timeout).
        let _ = self.asr_task.await;

        if flush {
            let commit = {
                let mut tracker = self.shared.tracker.lock().await;
                tracker.force_commit(Instant::now())
            };
            if let Some(commit) = commit {
                info!(segment_id = commit.segment_id, text = %commit.text, "Final commit");
                self.shared.stats.lock().record_commit();
                let _ = self
                    .events_tx
                    .send(OutboundMessage::Event(ServerEvent::CommittedTranscript {
                        text: commit.text.clone(),
                        segment_id: commit.segment_id,
                    }))
                    .await;
                let _ = self
                    .segments_tx
                    .send(Segment {
                        id: commit.segment_id,
                        text: commit.text,
                        committed_at: Instant::now(),
                    })
                    .await;
            }
        }

        // Closing the channel lets the worker drain outstanding segments.
        drop(self.segments_tx);
        let _ = self.worker_task.await;
        info!("Pipeline stopped");
    }
}

/// Periodic re-decode of the sliding window.
async fn asr_loop(
    shared: Arc<Shared>,
    events: mpsc::Sender<OutboundMessage>,
    segments: mpsc::Sender<Segment>,
    mut shutdown: watch::Receiver<bool>,
) {
    let cfg = &shared.cfg;
    let mut ticker = interval(cfg.asr_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let min_samples = (cfg.min_window_seconds * cfg.capture_sample_rate as f32) as usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        let window = shared.buffer.lock().tail(cfg.window_seconds);
        if window.len() < min_samples {
            continue;
        }
        if audio::rms(&window) < cfg.silence_rms {
            debug!("Window below energy gate, skipping decode");
            continue;
        }

        let started = Instant::now();
        let result = timeout(
            cfg.asr_timeout,
            shared
                .engines
                .asr
                .transcribe(&window, cfg.capture_sample_rate, &cfg.source_lang),
        )
        .await;
        let raw = match result {
            Err(_) => {
                warn!("ASR call exceeded {:?}", cfg.asr_timeout);
                counter!("simulvox_stage_errors_total", 1, "stage" => "asr");
                continue;
            }
            Ok(Err(e)) => {
                warn!("ASR error: {e:#}");
                counter!("simulvox_stage_errors_total", 1, "stage" => "asr");
                continue;
            }
            Ok(Ok(text)) => text,
        };
        shared
            .stats
            .lock()
            .record_asr(started.elapsed().as_secs_f64() * 1000.0);

        let Some(hypothesis) = shared.filter.clean(&raw) else {
            continue;
        };

        let (commit, tail) = {
            let mut tracker = shared.tracker.lock().await;
            tracker.set_min_words(shared.bp.lock().min_words());
            let commit = tracker.observe(&hypothesis, Instant::now());
            (commit, tracker.uncommitted_tail())
        };

        if let Some(text) = tail {
            if events
                .send(OutboundMessage::Event(ServerEvent::PartialTranscript { text }))
                .await
                .is_err()
            {
                break;
            }
        }

        if let Some(commit) = commit {
            info!(segment_id = commit.segment_id, text = %commit.text, "Committed");
            shared.stats.lock().record_commit();
            if events
                .send(OutboundMessage::Event(ServerEvent::CommittedTranscript {
                    text: commit.text.clone(),
                    segment_id: commit.segment_id,
                }))
                .await
                .is_err()
            {
                break;
            }
            if segments
                .send(Segment {
                    id: commit.segment_id,
                    text: commit.text,
                    committed_at: Instant::now(),
                })
                .await
                .is_err()
            {
                break;
            }
        }
    }
}

/// Carries each committed segment through MT and streaming TTS, strictly in
/// order. The only consumer of the segment channel.
async fn segment_worker(
    shared: Arc<Shared>,
    events: mpsc::Sender<OutboundMessage>,
    mut segments: mpsc::Receiver<Segment>,
) {
    let cfg = &shared.cfg;

    while let Some(segment) = segments.recv().await {
        // Recovery check at the decision point, even with no chunks moving.
        {
            let queued = shared.clock.lock().queued_ms(Instant::now());
            shared.bp.lock().observe(queued);
        }

        let mut ids = vec![segment.id];
        let mut source = segment.text;
        let committed_at = segment.committed_at;

        // Behind real time: hold briefly and merge with the next segment to
        // save synthesis overhead.
        if shared.bp.lock().should_coalesce() {
            if let Ok(Some(next)) = timeout(cfg.coalesce_hold, segments.recv()).await {
                debug!(first = ids[0], second = next.id, "Coalescing segments");
                ids.push(next.id);
                source.push(' ');
                source.push_str(&next.text);
            }
        }
        let segment_id = *ids.last().expect("ids is never empty");

        // Translation
        let mt_started = Instant::now();
        let translated = match timeout(
            cfg.mt_timeout,
            shared
                .engines
                .mt
                .translate(&source, &cfg.source_lang, &cfg.target_lang),
        )
        .await
        {
            Err(_) => {
                stage_failed(&events, Stage::Mt, segment_id, "translation timed out").await;
                continue;
            }
            Ok(Err(e)) => {
                stage_failed(&events, Stage::Mt, segment_id, &format!("{e:#}")).await;
                continue;
            }
            Ok(Ok(text)) => text,
        };
        let mt_ms = mt_started.elapsed().as_secs_f64() * 1000.0;

        if events
            .send(OutboundMessage::Event(ServerEvent::TranslationCommitted {
                text: translated.clone(),
                source: source.clone(),
                segment_id,
            }))
            .await
            .is_err()
        {
            return;
        }

        // Streaming synthesis
        let voice = VoiceConfig {
            language: cfg.target_lang.clone(),
            sample_rate: cfg.tts_sample_rate,
        };
        let tts_started = Instant::now();
        let deadline = tts_started + cfg.tts_timeout;
        let mut stream = match timeout(
            cfg.tts_timeout,
            shared.engines.tts.synthesize_streaming(&translated, &voice),
        )
        .await
        {
            Err(_) => {
                stage_failed(&events, Stage::Tts, segment_id, "synthesis timed out").await;
                continue;
            }
            Ok(Err(e)) => {
                stage_failed(&events, Stage::Tts, segment_id, &format!("{e:#}")).await;
                continue;
            }
            Ok(Ok(stream)) => stream,
        };

        let mut first_chunk: Option<Instant> = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let pcm = match timeout(remaining, stream.recv()).await {
                Err(_) => {
                    stage_failed(&events, Stage::Tts, segment_id, "synthesis stream timed out").await;
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    stage_failed(&events, Stage::Tts, segment_id, &format!("{e:#}")).await;
                    break;
                }
                Ok(Some(Ok(pcm))) => pcm,
            };
            if pcm.is_empty() {
                continue;
            }

            let now = Instant::now();
            first_chunk.get_or_insert(now);
            let chunk_ms = audio::pcm16_duration_ms(pcm.len(), cfg.tts_sample_rate);
            let queued = {
                let mut clock = shared.clock.lock();
                clock.push(Duration::from_secs_f64(chunk_ms / 1000.0), now);
                clock.queued_ms(now)
            };
            shared.bp.lock().observe(queued);

            let message = if cfg.binary_audio {
                OutboundMessage::BinaryAudio {
                    segment_id,
                    pcm16: pcm,
                }
            } else {
                OutboundMessage::Event(ServerEvent::TtsAudioChunk {
                    audio_b64: BASE64.encode(&pcm),
                    segment_id,
                    sample_rate: cfg.tts_sample_rate,
                })
            };
            if events.send(message).await.is_err() {
                return;
            }
        }

        for id in &ids {
            if events
                .send(OutboundMessage::Event(ServerEvent::TtsEnd { segment_id: *id }))
                .await
                .is_err()
            {
                return;
            }
        }

        if let Some(first) = first_chunk {
            let queued = shared.clock.lock().queued_ms(Instant::now());
            let stats_event = {
                let mut stats = shared.stats.lock();
                stats.record_segment(
                    mt_ms,
                    first.duration_since(tts_started).as_secs_f64() * 1000.0,
                    first.duration_since(committed_at).as_secs_f64() * 1000.0,
                );
                stats.to_event(queued)
            };
            if events
                .send(OutboundMessage::Event(stats_event))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

/// Transient stage failure: log, count, tell the client, move on.
async fn stage_failed(
    events: &mpsc::Sender<OutboundMessage>,
    stage: Stage,
    segment_id: u64,
    message: &str,
) {
    let error = Error::stage(stage, message, Some(segment_id));
    warn!(segment_id, "{error}");
    counter!("simulvox_stage_errors_total", 1, "stage" => stage.to_string());
    let _ = events
        .send(OutboundMessage::Event(ServerEvent::Error {
            message: error.to_string(),
            segment_id: Some(segment_id),
        }))
        .await;
}
