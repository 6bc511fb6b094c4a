//! Audio sample handling: PCM conversion, energy measurement, ring buffer

pub mod buffer;

pub use buffer::AudioBuffer;

/// Convert PCM16 little-endian bytes to normalized f32 samples in [-1, 1].
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Convert f32 samples in [-1, 1] to PCM16 little-endian bytes.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Root mean square of a signal; 0.0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Duration in milliseconds of a PCM16 byte payload at the given rate.
pub fn pcm16_duration_ms(byte_len: usize, sample_rate: u32) -> f64 {
    (byte_len as f64 / 2.0) / sample_rate as f64 * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_roundtrip() {
        // round(float_from_int16(x) * 32768) == x for |x| < 32768
        for x in [-32768i16, -12345, -1, 0, 1, 999, 32767] {
            let f = x as f32 / 32768.0;
            let back = (f * 32768.0).round() as i32;
            assert_eq!(back, x as i32);
        }
    }

    #[test]
    fn test_pcm16_bytes_roundtrip() {
        let samples: Vec<i16> = vec![0, 1, -1, 1000, -1000, 32767, -32768];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let floats = pcm16_to_f32(&bytes);
        assert_eq!(floats.len(), samples.len());
        for (f, s) in floats.iter().zip(&samples) {
            let back = (f * 32768.0).round() as i32;
            assert_eq!(back, *s as i32);
        }
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0; 100]), 0.0);
        let r = rms(&[0.5, -0.5, 0.5, -0.5]);
        assert!((r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_duration() {
        // 1 second of 16 kHz PCM16 is 32000 bytes
        assert!((pcm16_duration_ms(32_000, 16_000) - 1000.0).abs() < 1e-9);
        // 200 ms at 24 kHz
        assert!((pcm16_duration_ms(9_600, 24_000) - 200.0).abs() < 1e-9);
    }
}
