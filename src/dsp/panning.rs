/// Stereo panorama coefficients from per-frame left/right spectra.
///
/// Each frame yields an energy-weighted panorama histogram (0 = hard
/// left, 1 = hard right), optionally warped toward the center where most
/// program material sits, then compressed to a short coefficient vector
/// by a DCT. With more than one band the spectrum is split into equal
/// bin ranges, each with its own histogram, and the per-band coefficient
/// vectors are concatenated. Consecutive frames are averaged in groups
/// so the output is a slow-moving panorama trajectory rather than
/// per-hop jitter.
#[derive(Debug, Clone, Copy)]
pub struct PanningParams {
    pub average_frames: usize,
    pub panning_bins: usize,
    pub num_coeffs: usize,
    pub num_bands: usize,
    pub warped: bool,
}

pub fn panning_coefficients(
    left_spectra: &[Vec<f32>],
    right_spectra: &[Vec<f32>],
    params: &PanningParams,
) -> Vec<Vec<f32>> {
    let frames = left_spectra.len().min(right_spectra.len());
    let bands = params.num_bands.max(1);
    let mut per_frame: Vec<Vec<f32>> = Vec::with_capacity(frames);

    for i in 0..frames {
        let left = &left_spectra[i];
        let right = &right_spectra[i];
        let bins = left.len().min(right.len());
        let mut coeffs = Vec::with_capacity(bands * params.num_coeffs);
        for b in 0..bands {
            let lo = b * bins / bands;
            let hi = (b + 1) * bins / bands;
            let histogram = panorama_histogram(&left[lo..hi], &right[lo..hi], params);
            coeffs.extend(dct_coeffs(&histogram, params.num_coeffs));
        }
        per_frame.push(coeffs);
    }

    // average in groups so short transient pans do not dominate
    let group = params.average_frames.max(1);
    let mut averaged = Vec::new();
    for chunk in per_frame.chunks(group) {
        let mut acc = vec![0.0f32; bands * params.num_coeffs];
        for coeffs in chunk {
            for (a, c) in acc.iter_mut().zip(coeffs) {
                *a += c;
            }
        }
        for a in &mut acc {
            *a /= chunk.len() as f32;
        }
        averaged.push(acc);
    }
    averaged
}

fn panorama_histogram(left: &[f32], right: &[f32], params: &PanningParams) -> Vec<f32> {
    let mut histogram = vec![0.0f32; params.panning_bins.max(2)];
    for (l, r) in left.iter().zip(right) {
        let le = l * l;
        let re = r * r;
        let energy = le + re;
        if energy <= 1e-12 {
            continue;
        }
        let mut position = re / energy;
        if params.warped {
            // more resolution around the center of the panorama
            position = 0.5 + 0.5 * (std::f32::consts::PI * (position - 0.5)).sin();
        }
        let bin = ((position * (histogram.len() - 1) as f32) as usize).min(histogram.len() - 1);
        histogram[bin] += energy;
    }
    let total: f32 = histogram.iter().sum();
    if total > 0.0 {
        for h in &mut histogram {
            *h /= total;
        }
    }
    histogram
}

fn dct_coeffs(values: &[f32], num_coeffs: usize) -> Vec<f32> {
    let n = values.len() as f32;
    (0..num_coeffs)
        .map(|k| {
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    v * (std::f32::consts::PI * k as f32 * (i as f32 + 0.5) / n).cos()
                })
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: PanningParams = PanningParams {
        average_frames: 2,
        panning_bins: 64,
        num_coeffs: 8,
        num_bands: 1,
        warped: true,
    };

    #[test]
    fn output_shape_follows_parameters() {
        let left = vec![vec![1.0; 32]; 4];
        let right = vec![vec![0.5; 32]; 4];
        let coeffs = panning_coefficients(&left, &right, &PARAMS);
        assert_eq!(coeffs.len(), 2); // 4 frames averaged in pairs
        assert_eq!(coeffs[0].len(), 8);
    }

    #[test]
    fn multiple_bands_concatenate_their_coefficients() {
        let params = PanningParams { num_bands: 2, ..PARAMS };
        // energy panned left in the low bins, right in the high bins
        let mut left = vec![0.0f32; 32];
        let mut right = vec![0.0f32; 32];
        for i in 0..16 {
            left[i] = 1.0;
            right[i + 16] = 1.0;
        }
        let coeffs = panning_coefficients(&[left], &[right], &params);
        assert_eq!(coeffs[0].len(), 16); // 2 bands of 8 coefficients
        assert_ne!(coeffs[0][..8], coeffs[0][8..]);
    }

    #[test]
    fn hard_left_and_hard_right_differ() {
        let loud = vec![vec![1.0; 32]; 2];
        let quiet = vec![vec![0.0; 32]; 2];
        let left_panned = panning_coefficients(&loud, &quiet, &PARAMS);
        let right_panned = panning_coefficients(&quiet, &loud, &PARAMS);
        assert_ne!(left_panned, right_panned);
    }

    #[test]
    fn silent_frames_produce_flat_coefficients() {
        let silent = vec![vec![0.0; 32]; 2];
        let coeffs = panning_coefficients(&silent, &silent, &PARAMS);
        assert!(coeffs[0][1..].iter().all(|c| c.abs() < 1e-6));
    }
}
