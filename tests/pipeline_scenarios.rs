//! End-to-end pipeline scenarios driven with scripted engines
//!
//! The orchestrator runs against a scripted ASR, a passthrough MT, and the
//! tone synthesizer, under paused virtual time so tick schedules are exact.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use simulvox::adapters::mock::{PassthroughMtEngine, ScriptedAsrEngine, ToneTtsEngine};
use simulvox::adapters::EngineSet;
use simulvox::pipeline::{BackpressureState, Orchestrator, PipelineConfig};
use simulvox::streaming::protocol::{decode_tts_binary, OutboundMessage, ServerEvent};

fn test_config(stability_k: usize, min_words: usize, interval_ms: u64, timeout_s: f64) -> PipelineConfig {
    PipelineConfig {
        source_lang: "es".to_string(),
        target_lang: "en".to_string(),
        window_seconds: 8.0,
        asr_interval: Duration::from_millis(interval_ms),
        stability_k,
        commit_timeout: Duration::from_secs_f64(timeout_s),
        min_words,
        degraded_min_words: 3,
        buffer_limit_ms: 3000.0,
        capture_sample_rate: 16_000,
        tts_sample_rate: 24_000,
        binary_audio: false,
        asr_timeout: Duration::from_secs(10),
        mt_timeout: Duration::from_secs(10),
        tts_timeout: Duration::from_secs(30),
        min_window_seconds: 0.5,
        silence_rms: 0.005,
        coalesce_hold: Duration::from_millis(300),
    }
}

fn engines(asr: Arc<ScriptedAsrEngine>, tts: ToneTtsEngine) -> EngineSet {
    EngineSet {
        asr,
        mt: Arc::new(PassthroughMtEngine),
        tts: Arc::new(tts),
    }
}

/// One second of audio loud enough to pass the energy gate.
fn loud_audio() -> Vec<f32> {
    vec![0.1; 16_000]
}

/// Drain events until the predicate is satisfied or virtual time runs out.
async fn collect_until<F>(
    rx: &mut mpsc::Receiver<OutboundMessage>,
    mut done: F,
) -> Vec<OutboundMessage>
where
    F: FnMut(&[OutboundMessage]) -> bool,
{
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Some(event)) => {
                events.push(event);
                if done(&events) {
                    return events;
                }
            }
            _ => return events,
        }
    }
}

fn committed_texts(events: &[OutboundMessage]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            OutboundMessage::Event(ServerEvent::CommittedTranscript { text, .. }) => {
                Some(text.clone())
            }
            _ => None,
        })
        .collect()
}

fn partial_texts(events: &[OutboundMessage]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            OutboundMessage::Event(ServerEvent::PartialTranscript { text }) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn chunk_segment_ids(events: &[OutboundMessage]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            OutboundMessage::Event(ServerEvent::TtsAudioChunk { segment_id, .. }) => {
                Some(*segment_id)
            }
            OutboundMessage::BinaryAudio { segment_id, .. } => Some(*segment_id),
            _ => None,
        })
        .collect()
}

fn has_tts_end(events: &[OutboundMessage], id: u64) -> bool {
    events.iter().any(|e| {
        matches!(
            e,
            OutboundMessage::Event(ServerEvent::TtsEnd { segment_id }) if *segment_id == id
        )
    })
}

#[tokio::test(start_paused = true)]
async fn stable_convergence_commits_in_two_rounds() {
    let asr = Arc::new(ScriptedAsrEngine::new([
        "hola",
        "hola como",
        "hola como estas",
        "hola como estas",
        "hola como estas bien",
        "hola como estas bien",
    ]));
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::start(
        engines(asr, ToneTtsEngine::new(24_000)),
        test_config(3, 1, 50, 100.0),
        tx,
    );
    orchestrator.feed_audio(&loud_audio());

    let events = collect_until(&mut rx, |evs| committed_texts(evs).len() >= 2).await;
    assert_eq!(committed_texts(&events), vec!["hola", "como estas"]);

    // Chunks for segment 1 all precede chunks for segment 2.
    let events = collect_until(&mut rx, |evs| has_tts_end(evs, 2)).await;
    let mut all_ids = chunk_segment_ids(&events);
    let mut sorted = all_ids.clone();
    sorted.sort_unstable();
    assert_eq!(all_ids, sorted);
    all_ids.dedup();
    assert!(!all_ids.is_empty());

    orchestrator.stop(false).await;
}

#[tokio::test(start_paused = true)]
async fn self_repair_never_rewrites_committed_text() {
    let asr = Arc::new(ScriptedAsrEngine::new([
        "hola como estas",
        "hola como estas",
        "hola como estas",
        "hola como estan",
        "hola como estan",
        "hola como estan",
    ]));
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::start(
        engines(asr, ToneTtsEngine::new(24_000)),
        test_config(3, 1, 50, 100.0),
        tx,
    );
    orchestrator.feed_audio(&loud_audio());

    // Run the whole script, then look at what committed.
    let events = collect_until(&mut rx, |_| false).await;
    assert_eq!(committed_texts(&events), vec!["hola como estas"]);
    // The disagreeing tail still shows up as a partial.
    let partials = partial_texts(&events);
    assert_eq!(partials.last().map(String::as_str), Some("estan"));

    orchestrator.stop(false).await;
}

#[tokio::test(start_paused = true)]
async fn timeout_fallback_commits_newest_hypothesis() {
    // Oscillating decodes never stabilize two words; the 2 s deadline
    // commits the newest hypothesis verbatim.
    let asr = Arc::new(ScriptedAsrEngine::new([
        "uno",
        "uno dos",
        "uno tres",
        "uno cuatro",
        "uno dos",
    ]));
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::start(
        engines(asr, ToneTtsEngine::new(24_000)),
        test_config(3, 2, 500, 2.0),
        tx,
    );
    orchestrator.feed_audio(&loud_audio());

    let events = collect_until(&mut rx, |evs| !committed_texts(evs).is_empty()).await;
    assert_eq!(committed_texts(&events), vec!["uno dos"]);

    orchestrator.stop(false).await;
}

#[tokio::test(start_paused = true)]
async fn backpressure_degrades_and_coalesces() {
    // Each word synthesizes to two seconds of audio, far beyond real time.
    let asr = Arc::new(ScriptedAsrEngine::new([
        "uno",
        "uno dos",
        "uno dos tres cuatro cinco",
        "uno dos tres cuatro cinco seis siete ocho",
    ]));
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::start(
        engines(
            asr.clone(),
            ToneTtsEngine::new(24_000).with_ms_per_word(2000),
        ),
        test_config(1, 1, 50, 1000.0),
        tx,
    );
    orchestrator.feed_audio(&loud_audio());

    // After the second segment's audio is queued (~4.4 s against a 3 s
    // limit) the controller degrades.
    let events = collect_until(&mut rx, |evs| has_tts_end(evs, 2)).await;
    assert!(has_tts_end(&events, 1));
    assert_eq!(orchestrator.backpressure_state(), BackpressureState::Degraded);

    // Degraded: segments 3 and 4 merge into one synthesis call whose chunks
    // carry the newest id; both get their tts_end.
    let events = collect_until(&mut rx, |evs| has_tts_end(evs, 3) && has_tts_end(evs, 4)).await;
    let merged_source = events.iter().find_map(|e| match e {
        OutboundMessage::Event(ServerEvent::TranslationCommitted { source, segment_id, .. })
            if *segment_id == 4 =>
        {
            Some(source.clone())
        }
        _ => None,
    });
    assert_eq!(
        merged_source.as_deref(),
        Some("tres cuatro cinco seis siete ocho")
    );
    let ids = chunk_segment_ids(&events);
    assert!(ids.iter().all(|id| *id == 3 || *id == 4 || *id < 3));
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);

    // The playback clock drains in (virtual) real time; state transitions
    // only happen at decision points, so it stays degraded while idle.
    sleep(Duration::from_secs(40)).await;
    assert!(orchestrator.queued_ms() < 1.0);
    assert_eq!(orchestrator.backpressure_state(), BackpressureState::Degraded);

    // The next segment finds an empty queue and recovers at the decision
    // point. Degraded min-words is still in force when it commits, so it
    // must add three tokens.
    asr.push("uno dos tres cuatro cinco seis siete ocho nueve diez once");
    let events = collect_until(&mut rx, |evs| has_tts_end(evs, 5)).await;
    assert!(committed_texts(&events).contains(&"nueve diez once".to_string()));

    orchestrator.stop(false).await;
}

#[tokio::test(start_paused = true)]
async fn transient_mt_failure_skips_segment_and_continues() {
    struct FailingMt;

    #[async_trait::async_trait]
    impl simulvox::translation::MtEngine for FailingMt {
        async fn translate(&self, _: &str, _: &str, _: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("model exploded"))
        }
    }

    let asr = Arc::new(ScriptedAsrEngine::new(["uno", "uno dos"]));
    let set = EngineSet {
        asr,
        mt: Arc::new(FailingMt),
        tts: Arc::new(ToneTtsEngine::new(24_000)),
    };
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::start(set, test_config(1, 1, 50, 100.0), tx);
    orchestrator.feed_audio(&loud_audio());

    let events = collect_until(&mut rx, |evs| {
        evs.iter()
            .filter(|e| matches!(e, OutboundMessage::Event(ServerEvent::Error { .. })))
            .count()
            >= 2
    })
    .await;

    // Both segments committed, both failed MT, neither reached TTS, and the
    // pipeline survived the first failure to process the second.
    assert_eq!(committed_texts(&events), vec!["uno", "dos"]);
    assert!(chunk_segment_ids(&events).is_empty());
    let error_ids: Vec<Option<u64>> = events
        .iter()
        .filter_map(|e| match e {
            OutboundMessage::Event(ServerEvent::Error { segment_id, .. }) => Some(*segment_id),
            _ => None,
        })
        .collect();
    assert_eq!(error_ids, vec![Some(1), Some(2)]);

    orchestrator.stop(false).await;
}

#[tokio::test(start_paused = true)]
async fn binary_audio_mode_frames_decode() {
    let asr = Arc::new(ScriptedAsrEngine::new(["hola"]));
    let mut cfg = test_config(1, 1, 50, 100.0);
    cfg.binary_audio = true;
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::start(engines(asr, ToneTtsEngine::new(24_000)), cfg, tx);
    orchestrator.feed_audio(&loud_audio());

    let events = collect_until(&mut rx, |evs| has_tts_end(evs, 1)).await;
    let binary: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            OutboundMessage::BinaryAudio { segment_id, pcm16 } => Some((*segment_id, pcm16)),
            _ => None,
        })
        .collect();
    assert!(!binary.is_empty());
    for (id, pcm) in binary {
        assert_eq!(id, 1);
        assert_eq!(pcm.len() % 2, 0);
        // The wire framing round-trips.
        let frame = simulvox::streaming::protocol::encode_tts_binary(id, pcm);
        let (decoded_id, payload) = decode_tts_binary(&frame).unwrap();
        assert_eq!(decoded_id, id);
        assert_eq!(payload, &pcm[..]);
    }
    // No JSON audio chunks in binary mode.
    assert!(events
        .iter()
        .all(|e| !matches!(e, OutboundMessage::Event(ServerEvent::TtsAudioChunk { .. }))));

    orchestrator.stop(false).await;
}

#[tokio::test(start_paused = true)]
async fn silence_never_reaches_the_decoder() {
    let asr = Arc::new(ScriptedAsrEngine::new(["should never be consumed"]));
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator = Orchestrator::start(
        engines(asr.clone(), ToneTtsEngine::new(24_000)),
        test_config(1, 1, 50, 100.0),
        tx,
    );
    // A full window of near-silence.
    orchestrator.feed_audio(&vec![0.0005; 16_000]);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(asr.remaining(), 1, "energy gate should skip the ASR call");
    assert!(committed_texts(&collect_until(&mut rx, |_| false).await).is_empty());

    orchestrator.stop(false).await;
}
