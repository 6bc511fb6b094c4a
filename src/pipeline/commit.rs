//! Commit-by-stability tracking
//!
//! Instead of VAD segmentation, consecutive full-window hypotheses are
//! compared: once the last K of them agree on a prefix longer than what is
//! already committed, that prefix becomes irrevocable and flows on to
//! translation. A timeout fallback commits the newest hypothesis when the
//! decoder keeps oscillating and stability never arrives.
//!
//! Comparison happens on a normalized rendering (lowercase, punctuation
//! stripped, whitespace collapsed) at codepoint granularity; committed text
//! is sliced from the newest raw hypothesis so casing and punctuation follow
//! the latest decoder output.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// A newly committed delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Monotonically increasing, starting at 1.
    pub segment_id: u64,
    /// The delta text, sliced verbatim from the newest hypothesis.
    pub text: String,
}

/// Hypothesis text with its comparison rendering.
///
/// `chars` is the lowercased text with punctuation removed and whitespace
/// runs collapsed to single spaces; `raw_byte[i]` is the byte offset in
/// `raw` of the character that produced `chars[i]`, which lets a boundary
/// found in normalized space be mapped back to a raw slice. Dropping
/// punctuation from the comparison keeps the prefix match alive when the
/// decoder flips between "hola," and "hola"; the raw slice still carries it.
struct NormText {
    raw: String,
    chars: Vec<char>,
    raw_byte: Vec<usize>,
}

fn is_comparison_punct(c: char) -> bool {
    matches!(
        c,
        '.' | ','
            | ';'
            | ':'
            | '!'
            | '?'
            | '-'
            | '–'
            | '—'
            | '¿'
            | '¡'
            | '"'
            | '\''
            | '…'
            | '('
            | ')'
            | '['
            | ']'
            | '{'
            | '}'
            | '。'
            | '、'
            | '！'
            | '？'
    )
}

impl NormText {
    fn new(raw: &str) -> Self {
        let mut chars = Vec::new();
        let mut raw_byte = Vec::new();
        let mut pending_ws: Option<usize> = None;

        for (idx, c) in raw.char_indices() {
            if c.is_whitespace() {
                if !chars.is_empty() && pending_ws.is_none() {
                    pending_ws = Some(idx);
                }
                continue;
            }
            if is_comparison_punct(c) {
                continue;
            }
            if let Some(ws_idx) = pending_ws.take() {
                chars.push(' ');
                raw_byte.push(ws_idx);
            }
            for lc in c.to_lowercase() {
                chars.push(lc);
                raw_byte.push(idx);
            }
        }

        Self {
            raw: raw.to_string(),
            chars,
            raw_byte,
        }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    /// Raw text behind the normalized range `[start, end)`, trimmed.
    fn raw_slice(&self, start: usize, end: usize) -> &str {
        if start >= end || start >= self.len() {
            return "";
        }
        let start_byte = self.raw_byte[start];
        let end_byte = if end < self.len() {
            self.raw_byte[end]
        } else {
            self.raw.len()
        };
        self.raw[start_byte..end_byte].trim()
    }
}

fn common_prefix_len(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn token_count(chars: &[char]) -> usize {
    chars
        .iter()
        .collect::<String>()
        .split_whitespace()
        .count()
}

/// State of the stability-K commit algorithm for one session.
pub struct CommitTracker {
    stability_k: usize,
    timeout: Duration,
    min_words: usize,
    /// Normalized committed text `C` (no leading/trailing whitespace).
    committed: Vec<char>,
    /// Raw committed deltas joined with single spaces; diagnostic rendering.
    committed_text: String,
    /// Last K hypotheses; cleared after every stability commit so each
    /// commit needs K fresh agreeing decodes.
    history: VecDeque<NormText>,
    /// Newest hypothesis, retained across history clears for the partial
    /// transcript.
    newest: Option<NormText>,
    t_last: Instant,
    next_segment_id: u64,
}

impl CommitTracker {
    pub fn new(stability_k: usize, timeout: Duration, min_words: usize, now: Instant) -> Self {
        Self {
            stability_k: stability_k.max(1),
            timeout,
            min_words: min_words.max(1),
            committed: Vec::new(),
            committed_text: String::new(),
            history: VecDeque::new(),
            newest: None,
            t_last: now,
            next_segment_id: 0,
        }
    }

    /// Backpressure hint: applied at the next commit decision.
    pub fn set_min_words(&mut self, min_words: usize) {
        self.min_words = min_words.max(1);
    }

    /// All committed deltas joined in emission order.
    pub fn committed_text(&self) -> &str {
        &self.committed_text
    }

    /// Feed one hypothesis; at most one commit results.
    pub fn observe(&mut self, hypothesis: &str, now: Instant) -> Option<Commit> {
        let norm = NormText::new(hypothesis);
        if norm.len() == 0 {
            return None;
        }

        self.history.push_back(NormText::new(hypothesis));
        while self.history.len() > self.stability_k {
            self.history.pop_front();
        }
        self.newest = Some(norm);

        if let Some(commit) = self.try_stability_commit(now) {
            return Some(commit);
        }
        if now.duration_since(self.t_last) >= self.timeout {
            return self.commit_newest_tail(now);
        }
        None
    }

    /// Flush on session stop: commit the newest hypothesis's remainder,
    /// ignoring K but respecting the minimum word count.
    pub fn force_commit(&mut self, now: Instant) -> Option<Commit> {
        self.commit_newest_tail(now)
    }

    /// The uncommitted remainder of the newest hypothesis, for live display.
    /// The sliding window re-covers committed audio, so the raw hypothesis
    /// would re-show text the client already has.
    pub fn uncommitted_tail(&self) -> Option<String> {
        let newest = self.newest.as_ref()?;
        let lcp = common_prefix_len(&newest.chars, &self.committed);
        if lcp == newest.len() {
            // The decoder only re-covered committed audio.
            return None;
        }
        let start = if lcp >= self.committed.len() {
            lcp
        } else {
            // Diverged inside the committed region: back up to the start of
            // the disagreeing word.
            let mut s = lcp;
            while s > 0 && !newest.chars[s - 1].is_whitespace() {
                s -= 1;
            }
            s
        };
        let tail = newest.raw_slice(start, newest.len());
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }

    fn try_stability_commit(&mut self, now: Instant) -> Option<Commit> {
        if self.history.len() < self.stability_k {
            return None;
        }

        let mut iter = self.history.iter();
        let first = iter.next()?;
        let mut lcp = first.len();
        for h in iter {
            lcp = lcp.min(common_prefix_len(&first.chars[..lcp], &h.chars));
        }

        let newest = self.history.back()?;
        let boundary = Self::token_boundary(newest, lcp)?;
        let commit = self.commit_range(boundary, now)?;
        // Each stability commit starts a fresh agreement round.
        self.history.clear();
        Some(commit)
    }

    fn commit_newest_tail(&mut self, now: Instant) -> Option<Commit> {
        let newest = self.newest.as_ref()?;
        let boundary = newest.len();
        self.commit_range(boundary, now)
    }

    /// Commit `newest[..boundary]` if it strictly extends `C` by at least
    /// `min_words` tokens. The boundary must already sit on a token edge.
    fn commit_range(&mut self, boundary: usize, now: Instant) -> Option<Commit> {
        let (text, delta_chars) = {
            let newest = self.newest.as_ref()?;
            let c_len = self.committed.len();
            if boundary <= c_len {
                return None;
            }
            // The committed text must survive as a prefix; a contradicting
            // decode is accepted as final and never rewritten.
            if newest.chars[..c_len] != self.committed[..] {
                return None;
            }
            if c_len > 0 && !newest.chars[c_len].is_whitespace() {
                return None;
            }
            if token_count(&newest.chars[c_len..boundary]) < self.min_words {
                return None;
            }

            let delta_start = (c_len..boundary)
                .find(|&i| !newest.chars[i].is_whitespace())
                .unwrap_or(boundary);
            let text = newest.raw_slice(delta_start, boundary).to_string();
            if text.is_empty() {
                return None;
            }
            (text, newest.chars[delta_start..boundary].to_vec())
        };

        if !self.committed.is_empty() {
            self.committed.push(' ');
        }
        self.committed.extend(delta_chars);
        if !self.committed_text.is_empty() {
            self.committed_text.push(' ');
        }
        self.committed_text.push_str(&text);

        self.t_last = now;
        self.next_segment_id += 1;
        Some(Commit {
            segment_id: self.next_segment_id,
            text,
        })
    }

    /// Largest position `b <= limit` in `newest` that does not split a
    /// word: end of text or just before whitespace. Sentence punctuation is
    /// absent from the comparison rendering, so a boundary after it lands
    /// on the whitespace that follows.
    fn token_boundary(newest: &NormText, limit: usize) -> Option<usize> {
        let mut b = limit.min(newest.len());
        while b > 0 {
            if b == newest.len() || newest.chars[b].is_whitespace() {
                return Some(b);
            }
            b -= 1;
        }
        None
    }
}
