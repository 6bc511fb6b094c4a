//! Circular audio buffer for the sliding ASR window
//!
//! Holds the most recent `capacity` samples as normalized f32. The inbound
//! decoder writes, the ASR tick reads; both take a short lock around the
//! slice copy.

/// Fixed-capacity ring of f32 samples.
pub struct AudioBuffer {
    buffer: Vec<f32>,
    capacity: usize,
    sample_rate: u32,
    /// Total samples ever written; monotone.
    total_written: u64,
}

impl AudioBuffer {
    /// Create a buffer holding `max_seconds` of audio at `sample_rate`.
    pub fn new(max_seconds: f32, sample_rate: u32) -> Self {
        let capacity = (max_seconds * sample_rate as f32) as usize;
        Self {
            buffer: vec![0.0; capacity.max(1)],
            capacity: capacity.max(1),
            sample_rate,
            total_written: 0,
        }
    }

    /// Append samples, evicting the oldest when full. Never fails.
    pub fn append(&mut self, samples: &[f32]) {
        let n = samples.len();
        if n == 0 {
            return;
        }

        // A chunk larger than the ring keeps only its last `capacity`
        // samples; the skipped ones still advance the write position so the
        // ring stays aligned with the monotone counter.
        let src = if n >= self.capacity {
            &samples[n - self.capacity..]
        } else {
            samples
        };

        let len = src.len();
        let skipped = (n - len) as u64;
        let start = ((self.total_written + skipped) % self.capacity as u64) as usize;
        let space_at_end = self.capacity - start;
        if len <= space_at_end {
            self.buffer[start..start + len].copy_from_slice(src);
        } else {
            self.buffer[start..].copy_from_slice(&src[..space_at_end]);
            self.buffer[..len - space_at_end].copy_from_slice(&src[space_at_end..]);
        }

        self.total_written += n as u64;
    }

    /// Copy of the most recent `seconds` of audio, clipped to what is
    /// available. Empty when nothing has been written.
    pub fn tail(&self, seconds: f32) -> Vec<f32> {
        let available = (self.total_written).min(self.capacity as u64) as usize;
        if available == 0 {
            return Vec::new();
        }
        let want = ((seconds * self.sample_rate as f32) as usize).min(available);

        let end = (self.total_written % self.capacity as u64) as usize;
        let mut out = Vec::with_capacity(want);
        if want <= end {
            out.extend_from_slice(&self.buffer[end - want..end]);
        } else {
            let from_tail = want - end;
            out.extend_from_slice(&self.buffer[self.capacity - from_tail..]);
            out.extend_from_slice(&self.buffer[..end]);
        }
        out
    }

    /// Total samples ever appended.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Samples currently resident in the ring.
    pub fn len(&self) -> usize {
        self.total_written.min(self.capacity as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total_written == 0
    }

    /// Seconds of audio currently available.
    pub fn available_seconds(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    /// Zero the buffer. Used only on session end.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.total_written = 0;
    }
}
