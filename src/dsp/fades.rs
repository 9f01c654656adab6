/// Fade-in/fade-out detection over a frame-level RMS envelope.
///
/// Thresholds are fractions of the envelope's mean: a fade-in is a run
/// that crosses up through the low threshold and keeps rising until it
/// clears the high one; a fade-out is the mirror image. Runs shorter than
/// the minimum length are ignored, as are candidates that fall back
/// before completing the transition.
#[derive(Debug, Clone, Copy)]
pub struct FadeParams {
    /// Envelope frames per second; converts frame indices to seconds.
    pub frame_rate: f32,
    /// Minimum fade duration in seconds.
    pub min_length: f32,
    /// Fraction of mean RMS marking "loud".
    pub cutoff_high: f32,
    /// Fraction of mean RMS marking "quiet".
    pub cutoff_low: f32,
}

pub fn detect_fades(envelope: &[f32], params: &FadeParams) -> (Vec<[f32; 2]>, Vec<[f32; 2]>) {
    if envelope.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let high = params.cutoff_high * mean;
    let low = params.cutoff_low * mean;
    let to_seconds = |i: usize| i as f32 / params.frame_rate;
    let min_frames = (params.min_length * params.frame_rate) as usize;

    let mut fade_ins = Vec::new();
    let mut begin: Option<usize> = None;
    for (i, &value) in envelope.iter().enumerate() {
        if value <= low {
            // (re)arm at the latest quiet frame before the rise
            begin = Some(i);
        } else if value >= high {
            if let Some(b) = begin.take() {
                if i - b >= min_frames {
                    fade_ins.push([to_seconds(b), to_seconds(i)]);
                }
            }
        }
    }

    let mut fade_outs = Vec::new();
    let mut begin: Option<usize> = None;
    for (i, &value) in envelope.iter().enumerate() {
        if value >= high {
            begin = Some(i);
        } else if value <= low {
            if let Some(b) = begin.take() {
                if i - b >= min_frames {
                    fade_outs.push([to_seconds(b), to_seconds(i)]);
                }
            }
        }
    }

    (fade_ins, fade_outs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: FadeParams =
        FadeParams { frame_rate: 10.0, min_length: 1.0, cutoff_high: 0.85, cutoff_low: 0.20 };

    fn ramp_envelope() -> Vec<f32> {
        // 3 s rise from silence, 4 s plateau at 1.0, 3 s fall
        let mut env = Vec::new();
        for i in 0..30 {
            env.push(i as f32 / 30.0);
        }
        env.extend(std::iter::repeat(1.0).take(40));
        for i in 0..30 {
            env.push(1.0 - i as f32 / 30.0);
        }
        env
    }

    #[test]
    fn ramps_are_reported_as_fades() {
        let (fade_ins, fade_outs) = detect_fades(&ramp_envelope(), &PARAMS);
        assert_eq!(fade_ins.len(), 1);
        assert_eq!(fade_outs.len(), 1);
        let [in_start, in_stop] = fade_ins[0];
        assert!(in_start < in_stop);
        assert!(in_stop <= 3.5);
        let [out_start, out_stop] = fade_outs[0];
        assert!(out_start >= 6.5);
        assert!(out_start < out_stop);
    }

    #[test]
    fn short_transitions_are_ignored() {
        // instant attack: quiet for one frame, loud right after
        let mut env = vec![0.01f32];
        env.extend(std::iter::repeat(1.0).take(50));
        let (fade_ins, _) = detect_fades(&env, &PARAMS);
        assert!(fade_ins.is_empty());
    }

    #[test]
    fn flat_loud_envelope_has_no_fades() {
        let env = vec![1.0f32; 100];
        let (fade_ins, fade_outs) = detect_fades(&env, &PARAMS);
        assert!(fade_ins.is_empty());
        assert!(fade_outs.is_empty());
    }
}
