/// Tuning and key estimation units.
///
/// All of these operate on magnitude spectra produced by the low-level
/// framing; none of them read audio themselves.

const REFERENCE_A4: f32 = 440.0;
const PEAK_MIN_HZ: f32 = 100.0;
const PEAK_MAX_HZ: f32 = 2000.0;

/// Per-frame tuning reference estimate: the implied A4 frequency of the
/// strongest spectral peak, assuming it sits on the equal-tempered grid.
/// Frames without a usable peak contribute nothing.
pub fn tuning_frequency(spectra: &[Vec<f32>], sample_rate: f32) -> Vec<f32> {
    let nyquist = sample_rate / 2.0;
    let mut estimates = Vec::new();
    for spectrum in spectra {
        let Some((bin, magnitude)) = spectrum
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let hz = *i as f32 / (spectrum.len() - 1) as f32 * nyquist;
                (PEAK_MIN_HZ..=PEAK_MAX_HZ).contains(&hz)
            })
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            continue;
        };
        if *magnitude < 1e-6 {
            continue;
        }
        let hz = bin as f32 / (spectrum.len() - 1) as f32 * nyquist;
        let semitones = 12.0 * (hz / REFERENCE_A4).log2();
        let implied = hz / 2f32.powf(semitones.round() / 12.0);
        estimates.push(implied);
    }
    estimates
}

/// Folds a magnitude spectrum into a 12-bin pitch-class profile relative
/// to the given tuning reference.
pub fn chroma_profile(spectrum: &[f32], sample_rate: f32, tuning: f32) -> [f32; 12] {
    let nyquist = sample_rate / 2.0;
    let mut profile = [0.0f32; 12];
    for (i, &m) in spectrum.iter().enumerate() {
        let hz = i as f32 / (spectrum.len() - 1) as f32 * nyquist;
        if !(PEAK_MIN_HZ..=5000.0).contains(&hz) {
            continue;
        }
        let semitones = 12.0 * (hz / tuning).log2();
        let class = (semitones.round() as i32).rem_euclid(12) as usize;
        profile[class] += m * m;
    }
    profile
}

const KEY_NAMES: [&str; 12] =
    ["A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#"];

// Krumhansl-Kessler probe-tone profiles.
const MAJOR_PROFILE: [f32; 12] =
    [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];
const MINOR_PROFILE: [f32; 12] =
    [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Key, scale and correlation strength from an averaged chroma profile.
pub fn estimate_key(profile: &[f32; 12]) -> (String, String, f32) {
    let mut best = ("A".to_string(), "major".to_string(), f32::NEG_INFINITY);
    for rotation in 0..12 {
        let rotated: Vec<f32> = (0..12).map(|i| profile[(i + rotation) % 12]).collect();
        for (template, scale) in [(MAJOR_PROFILE, "major"), (MINOR_PROFILE, "minor")] {
            let score = correlation(&rotated, &template);
            if score > best.2 {
                best = (KEY_NAMES[rotation].to_string(), scale.to_string(), score);
            }
        }
    }
    best
}

fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len() as f32;
    let ma = a.iter().sum::<f32>() / n;
    let mb = b.iter().sum::<f32>() / n;
    let mut num = 0.0f32;
    let mut da = 0.0f32;
    let mut db = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        num += (x - ma) * (y - mb);
        da += (x - ma).powi(2);
        db += (y - mb).powi(2);
    }
    if da <= 0.0 || db <= 0.0 {
        0.0
    } else {
        num / (da.sqrt() * db.sqrt())
    }
}

/// Tuning-system summary derived from the per-frame tuning estimates:
/// the consensus tuning frequency and the mean absolute deviation from
/// the equal-tempered 440 Hz grid, in cents.
pub fn tuning_system_features(estimates: &[f32]) -> (f32, f32) {
    if estimates.is_empty() {
        return (REFERENCE_A4, 0.0);
    }
    let mut sorted = estimates.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let consensus = sorted[sorted.len() / 2];
    let deviation = estimates
        .iter()
        .map(|&e| (1200.0 * (e / REFERENCE_A4).log2()).abs())
        .sum::<f32>()
        / estimates.len() as f32;
    (consensus, deviation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::spectral::SpectrumAnalyzer;
    use crate::dsp::test_signals::sine;

    #[test]
    fn tuned_tone_implies_the_reference() {
        let analyzer = SpectrumAnalyzer::new(8192);
        let tone = sine(440.0, 1.0, 44100.0);
        let spectrum = analyzer.magnitude(&tone[..8192]);
        let estimates = tuning_frequency(&[spectrum], 44100.0);
        assert_eq!(estimates.len(), 1);
        assert!((estimates[0] - 440.0).abs() < 5.0);
    }

    #[test]
    fn chroma_peaks_at_the_tone_class() {
        let analyzer = SpectrumAnalyzer::new(8192);
        let tone = sine(440.0, 1.0, 44100.0);
        let profile = chroma_profile(&analyzer.magnitude(&tone[..8192]), 44100.0, 440.0);
        let max_class = profile
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_eq!(max_class, 0); // A
    }

    #[test]
    fn key_estimation_prefers_a_major_triad() {
        // energy on A, C#, E
        let mut profile = [0.1f32; 12];
        profile[0] = 1.0;
        profile[4] = 0.8;
        profile[7] = 0.9;
        let (key, _scale, strength) = estimate_key(&profile);
        assert_eq!(key, "A");
        assert!(strength > 0.0);
    }

    #[test]
    fn tuning_features_from_empty_series_are_neutral() {
        let (consensus, deviation) = tuning_system_features(&[]);
        assert_eq!(consensus, 440.0);
        assert_eq!(deviation, 0.0);
    }
}
