/// Loudness and gain estimation helpers.

/// Perceptual loudness of one frame: RMS energy raised to the Stevens
/// power-law exponent.
pub fn frame_loudness(frame: &[f32]) -> f32 {
    rms(frame).powf(0.67)
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|v| v * v).sum::<f32>() / samples.len() as f32).sqrt()
}

pub fn amplitude_to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(1e-10).log10()
}

/// The mixed signal carried no measurable energy: either a truly silent
/// file or a phase-cancelling downmix. The caller owns the retry policy.
#[derive(Debug)]
pub struct DegenerateSignal;

const BLOCK_SECONDS: f32 = 0.050;
const TARGET_DB: f32 = -14.0;
const SILENCE_RMS: f32 = 1e-9;

/// Gain (dB) that would bring the track's steady loudness to the
/// normalization target. Loudness is taken as the 95th percentile of
/// 50 ms block RMS, which ignores lead-in/lead-out silence without being
/// thrown by a single peak.
pub fn replay_gain(samples: &[f32], sample_rate: f32) -> Result<f32, DegenerateSignal> {
    let block = (BLOCK_SECONDS * sample_rate) as usize;
    if block == 0 || samples.len() < block {
        return Err(DegenerateSignal);
    }

    let mut levels: Vec<f32> = samples.chunks_exact(block).map(rms).collect();
    if levels.is_empty() {
        return Err(DegenerateSignal);
    }
    levels.sort_by(|a, b| a.total_cmp(b));
    let percentile = levels[(levels.len() - 1) * 95 / 100];
    if percentile < SILENCE_RMS {
        return Err(DegenerateSignal);
    }

    Ok(TARGET_DB - amplitude_to_db(percentile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_degenerate() {
        assert!(replay_gain(&vec![0.0; 44100], 44100.0).is_err());
    }

    #[test]
    fn gain_moves_loudness_to_target() {
        // full-scale square wave: RMS 1.0 = 0 dB, so the gain is the target
        let samples: Vec<f32> = (0..44100).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let gain = replay_gain(&samples, 44100.0).unwrap();
        assert!((gain - (-14.0)).abs() < 0.5);
    }

    #[test]
    fn quiet_but_nonsilent_yields_a_large_gain() {
        let samples: Vec<f32> = (0..44100)
            .map(|i| 0.0005 * (i as f32 * 0.1).sin())
            .collect();
        let gain = replay_gain(&samples, 44100.0).unwrap();
        assert!(gain > 40.0);
    }

    #[test]
    fn estimation_is_deterministic() {
        let samples: Vec<f32> = (0..88200).map(|i| (i as f32 * 0.01).sin() * 0.3).collect();
        let first = replay_gain(&samples, 44100.0).unwrap();
        let second = replay_gain(&samples, 44100.0).unwrap();
        assert_eq!(first, second);
    }
}
