//! Hallucination defences for raw ASR output
//!
//! Sliding-window re-decoding feeds the model a lot of near-silence, which
//! Whisper-family models answer with subtitle artifacts ("thanks for
//! watching", "[music]") or degenerate token loops. Both are dropped here
//! before the text reaches the commit tracker.

use regex::Regex;
use std::collections::HashMap;

/// Default denylist covering common subtitle/watermark artifacts in English
/// and Spanish, plus URLs.
const DEFAULT_DENYLIST: &str = r"(?i)(subtitle|subscribe|suscr[ií]bete|suscr[ií]banse|gracias por ver|thank you for watching|music|applause|m[uú]sica|aplausos|Amara\.org|www\.\w+\.\w+)";

/// Filter applied to every raw ASR result.
pub struct HypothesisFilter {
    denylist: Regex,
    /// Reject when the most frequent token exceeds this share of all tokens.
    max_repeat_ratio: f64,
}

impl Default for HypothesisFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST, 0.5).expect("default denylist pattern is valid")
    }
}

impl HypothesisFilter {
    pub fn new(denylist_pattern: &str, max_repeat_ratio: f64) -> Result<Self, regex::Error> {
        Ok(Self {
            denylist: Regex::new(denylist_pattern)?,
            max_repeat_ratio,
        })
    }

    /// Normalize and vet a raw hypothesis. Returns `None` when the output
    /// should be discarded.
    pub fn clean(&self, raw: &str) -> Option<String> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        if self.denylist.is_match(text) {
            tracing::debug!("Dropping denylisted hypothesis: {:?}", truncate(text, 50));
            return None;
        }
        if self.is_repetitive(text) {
            tracing::debug!("Dropping repetitive hypothesis: {:?}", truncate(text, 80));
            return None;
        }
        Some(text.to_string())
    }

    /// Degenerate repetition check: mostly-identical tokens are a decoder
    /// loop, not speech.
    fn is_repetitive(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        if words.len() < 4 {
            return false;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for w in &words {
            *counts.entry(w).or_insert(0) += 1;
        }
        if counts.len() <= 2 && words.len() >= 6 {
            return true;
        }
        let most_common = counts.values().copied().max().unwrap_or(0);
        most_common as f64 / words.len() as f64 > self.max_repeat_ratio
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_normal_speech() {
        let f = HypothesisFilter::default();
        assert_eq!(
            f.clean("  hola como estas  ").as_deref(),
            Some("hola como estas")
        );
    }

    #[test]
    fn test_empty_rejected() {
        let f = HypothesisFilter::default();
        assert!(f.clean("").is_none());
        assert!(f.clean("   ").is_none());
    }

    #[test]
    fn test_denylist_both_languages() {
        let f = HypothesisFilter::default();
        assert!(f.clean("Thank you for watching!").is_none());
        assert!(f.clean("no olvides suscribirte al canal").is_none());
        assert!(f.clean("[música]").is_none());
        assert!(f.clean("visit www.example.com today").is_none());
    }

    #[test]
    fn test_repetition_rejected() {
        let f = HypothesisFilter::default();
        assert!(f.clean("la la la la la la").is_none());
        assert!(f.clean("yes yes yes yes no").is_none());
        // Short outputs are never repetition-filtered
        assert!(f.clean("si si").is_some());
    }

    #[test]
    fn test_varied_text_not_repetitive() {
        let f = HypothesisFilter::default();
        assert!(f
            .clean("el tiempo hoy es muy bueno para salir a caminar")
            .is_some());
    }
}
