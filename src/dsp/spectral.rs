use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Magnitude spectrum computation over fixed-size frames.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self { fft: planner.plan_fft_forward(size), size }
    }

    /// Magnitude spectrum (size/2 + 1 bins). Frames shorter than the FFT
    /// size are zero-padded.
    pub fn magnitude(&self, frame: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .take(self.size)
            .map(|&v| Complex::new(v, 0.0))
            .collect();
        buffer.resize(self.size, Complex::new(0.0, 0.0));
        self.fft.process(&mut buffer);

        let scale = 1.0 / self.size as f32;
        buffer[..self.size / 2 + 1]
            .iter()
            .map(|c| c.norm() * scale)
            .collect()
    }
}

/// Energy-weighted mean frequency of a magnitude spectrum. Weighting by
/// bin energy rather than raw magnitude keeps spectral leakage from
/// dragging the centroid toward the band middle.
pub fn centroid(spectrum: &[f32], sample_rate: f32) -> f32 {
    let nyquist = sample_rate / 2.0;
    let total: f32 = spectrum.iter().map(|m| m * m).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = spectrum
        .iter()
        .enumerate()
        .map(|(i, &m)| m * m * (i as f32 / (spectrum.len() - 1) as f32) * nyquist)
        .sum();
    weighted / total
}

/// Frequency below which `fraction` of the spectral energy lives.
pub fn rolloff(spectrum: &[f32], sample_rate: f32, fraction: f32) -> f32 {
    let nyquist = sample_rate / 2.0;
    let total: f32 = spectrum.iter().map(|m| m * m).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let target = total * fraction;
    let mut cumulative = 0.0;
    for (i, &m) in spectrum.iter().enumerate() {
        cumulative += m * m;
        if cumulative >= target {
            return i as f32 / (spectrum.len() - 1) as f32 * nyquist;
        }
    }
    nyquist
}

/// Half-wave rectified spectral difference against the previous frame.
pub fn flux(previous: &[f32], current: &[f32]) -> f32 {
    current
        .iter()
        .zip(previous)
        .map(|(c, p)| (c - p).max(0.0))
        .sum()
}

/// Zero crossing rate of a time-domain frame.
pub fn zero_crossing_rate(frame: &[f32]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (frame.len() - 1) as f32
}

/// Cepstral coefficients of a magnitude spectrum: log energies over a
/// warped filterbank followed by a DCT-II. The coefficient count and band
/// layout are fixed; these frames feed segmentation and timbre stats.
pub const NUM_CEPSTRAL_COEFFS: usize = 13;
const NUM_BANDS: usize = 26;

pub fn cepstral_coeffs(spectrum: &[f32], sample_rate: f32) -> Vec<f32> {
    let nyquist = sample_rate / 2.0;
    let mel_max = hz_to_mel(nyquist);

    // triangular bands spaced evenly on the mel axis
    let mut energies = [0.0f32; NUM_BANDS];
    let band_width = mel_max / (NUM_BANDS + 1) as f32;
    for (i, &m) in spectrum.iter().enumerate() {
        let hz = i as f32 / (spectrum.len() - 1) as f32 * nyquist;
        let mel = hz_to_mel(hz);
        for (b, energy) in energies.iter_mut().enumerate() {
            let center = band_width * (b + 1) as f32;
            let distance = (mel - center).abs();
            if distance < band_width {
                *energy += m * m * (1.0 - distance / band_width);
            }
        }
    }

    let logs: Vec<f32> = energies.iter().map(|e| (e + 1e-10).ln()).collect();
    (0..NUM_CEPSTRAL_COEFFS)
        .map(|k| {
            logs.iter()
                .enumerate()
                .map(|(n, &l)| {
                    l * (std::f32::consts::PI * k as f32 * (n as f32 + 0.5) / NUM_BANDS as f32)
                        .cos()
                })
                .sum()
        })
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn centroid_tracks_the_dominant_tone() {
        let analyzer = SpectrumAnalyzer::new(2048);
        let low = centroid(&analyzer.magnitude(&sine(200.0, 44100.0, 2048)), 44100.0);
        let high = centroid(&analyzer.magnitude(&sine(4000.0, 44100.0, 2048)), 44100.0);
        assert!(low < high);
        assert!((low - 200.0).abs() < 150.0);
    }

    #[test]
    fn flux_is_zero_for_identical_frames() {
        let spectrum = vec![0.1, 0.5, 0.2];
        assert_eq!(flux(&spectrum, &spectrum), 0.0);
        assert!(flux(&[0.0, 0.0, 0.0], &spectrum) > 0.0);
    }

    #[test]
    fn cepstral_frame_has_fixed_width() {
        let analyzer = SpectrumAnalyzer::new(2048);
        let coeffs = cepstral_coeffs(&analyzer.magnitude(&sine(440.0, 44100.0, 2048)), 44100.0);
        assert_eq!(coeffs.len(), NUM_CEPSTRAL_COEFFS);
    }
}
