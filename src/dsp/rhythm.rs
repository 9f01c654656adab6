use super::level::rms;
use super::spectral::{flux, SpectrumAnalyzer};

const ENVELOPE_FRAME: usize = 1024;
const ENVELOPE_HOP: usize = 512;

/// Offline beat tracking over an onset-energy envelope.
///
/// The envelope is the half-wave rectified frame-energy difference;
/// beats are local maxima above an adaptive threshold, separated by at
/// least the period of the fastest allowed tempo. Tempo estimates are
/// folded into the configured range by octave doubling/halving.
#[derive(Debug, Clone, Copy)]
pub struct BeatTrackerParams {
    pub sample_rate: f32,
    pub min_tempo: f32,
    pub max_tempo: f32,
}

#[derive(Debug, Clone, Default)]
pub struct BeatAnalysis {
    /// Beat instants in seconds, strictly increasing.
    pub ticks: Vec<f32>,
    /// Overall tempo estimate; 0.0 when fewer than two beats were found.
    pub bpm: f32,
    /// Per-interval tempo estimates, folded into the allowed range.
    pub estimates: Vec<f32>,
    /// Raw inter-beat intervals in seconds.
    pub intervals: Vec<f32>,
}

pub fn track_beats(samples: &[f32], params: &BeatTrackerParams) -> BeatAnalysis {
    let novelty = energy_novelty(samples);
    if novelty.len() < 4 {
        return BeatAnalysis::default();
    }

    let mean = novelty.iter().sum::<f32>() / novelty.len() as f32;
    let var = novelty.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / novelty.len() as f32;
    let threshold = mean + 1.5 * var.sqrt();

    let hop_seconds = ENVELOPE_HOP as f32 / params.sample_rate;
    let min_gap = 60.0 / params.max_tempo;

    let mut ticks = Vec::new();
    let mut last_tick = f32::NEG_INFINITY;
    for i in 1..novelty.len() - 1 {
        let is_peak = novelty[i] > threshold
            && novelty[i] >= novelty[i - 1]
            && novelty[i] >= novelty[i + 1];
        if !is_peak {
            continue;
        }
        let time = i as f32 * hop_seconds;
        if time - last_tick >= min_gap {
            ticks.push(time);
            last_tick = time;
        }
    }

    let intervals: Vec<f32> = ticks.windows(2).map(|w| w[1] - w[0]).collect();
    let estimates: Vec<f32> = intervals
        .iter()
        .map(|&i| fold_tempo(60.0 / i, params.min_tempo, params.max_tempo))
        .collect();
    let bpm = median(&estimates);

    BeatAnalysis { ticks, bpm, estimates, intervals }
}

fn energy_novelty(samples: &[f32]) -> Vec<f32> {
    let mut novelty = Vec::new();
    let mut previous = 0.0f32;
    let mut start = 0usize;
    while start + ENVELOPE_FRAME <= samples.len() {
        let energy: f32 = samples[start..start + ENVELOPE_FRAME]
            .iter()
            .map(|v| v * v)
            .sum();
        novelty.push((energy - previous).max(0.0));
        previous = energy;
        start += ENVELOPE_HOP;
    }
    novelty
}

fn fold_tempo(mut bpm: f32, min_tempo: f32, max_tempo: f32) -> f32 {
    if bpm <= 0.0 {
        return 0.0;
    }
    while bpm < min_tempo {
        bpm *= 2.0;
    }
    while bpm > max_tempo {
        bpm /= 2.0;
    }
    bpm
}

fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[sorted.len() / 2]
}

/// Peaks of the tempo histogram built from interval estimates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TempoHistogramPeaks {
    pub first_peak_bpm: f32,
    pub first_peak_weight: f32,
    pub first_peak_spread: f32,
    pub second_peak_bpm: f32,
    pub second_peak_weight: f32,
    pub second_peak_spread: f32,
}

pub fn tempo_histogram_peaks(estimates: &[f32]) -> TempoHistogramPeaks {
    if estimates.is_empty() {
        return TempoHistogramPeaks::default();
    }

    let peak = |exclude: Option<f32>| -> (f32, f32, f32) {
        let mut best_bpm = 0.0f32;
        let mut best_count = 0usize;
        for &candidate in estimates {
            let rounded = candidate.round();
            if let Some(center) = exclude {
                if (rounded - center).abs() <= 8.0 {
                    continue;
                }
            }
            let count = estimates.iter().filter(|e| (e.round() - rounded).abs() < 0.5).count();
            if count > best_count {
                best_count = count;
                best_bpm = rounded;
            }
        }
        if best_count == 0 {
            return (0.0, 0.0, 0.0);
        }
        let near: Vec<f32> = estimates
            .iter()
            .copied()
            .filter(|e| (e - best_bpm).abs() <= 4.0)
            .collect();
        let weight = near.len() as f32 / estimates.len() as f32;
        let spread = if near.is_empty() {
            0.0
        } else {
            near.iter().map(|e| (e - best_bpm).abs()).sum::<f32>() / near.len() as f32 / best_bpm
        };
        (best_bpm, weight, spread)
    };

    let (first_peak_bpm, first_peak_weight, first_peak_spread) = peak(None);
    let (second_peak_bpm, second_peak_weight, second_peak_spread) = peak(Some(first_peak_bpm));

    TempoHistogramPeaks {
        first_peak_bpm,
        first_peak_weight,
        first_peak_spread,
        second_peak_bpm,
        second_peak_weight,
        second_peak_spread,
    }
}

/// Onset instants from half-rectified spectral flux with an adaptive
/// threshold and a short refractory window.
pub fn onset_times(samples: &[f32], sample_rate: f32) -> Vec<f32> {
    let analyzer = SpectrumAnalyzer::new(ENVELOPE_FRAME);
    let mut flux_curve = Vec::new();
    let mut previous: Option<Vec<f32>> = None;
    let mut start = 0usize;
    while start + ENVELOPE_FRAME <= samples.len() {
        let spectrum = analyzer.magnitude(&samples[start..start + ENVELOPE_FRAME]);
        if let Some(prev) = &previous {
            flux_curve.push(flux(prev, &spectrum));
        } else {
            flux_curve.push(0.0);
        }
        previous = Some(spectrum);
        start += ENVELOPE_HOP;
    }
    if flux_curve.len() < 3 {
        return Vec::new();
    }

    let mean = flux_curve.iter().sum::<f32>() / flux_curve.len() as f32;
    let var = flux_curve.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / flux_curve.len() as f32;
    let threshold = mean + 1.2 * var.sqrt();
    let hop_seconds = ENVELOPE_HOP as f32 / sample_rate;
    let refractory = 0.03f32;

    let mut onsets = Vec::new();
    let mut last = f32::NEG_INFINITY;
    for i in 1..flux_curve.len() - 1 {
        if flux_curve[i] > threshold
            && flux_curve[i] >= flux_curve[i - 1]
            && flux_curve[i] >= flux_curve[i + 1]
        {
            let time = i as f32 * hop_seconds;
            if time - last >= refractory {
                onsets.push(time);
                last = time;
            }
        }
    }
    onsets
}

/// Danceability via detrended fluctuation analysis of the block-RMS
/// series: regular, strongly periodic signals have a low scaling exponent
/// and score high. Result is clamped to [0, 3].
pub fn danceability(
    samples: &[f32],
    sample_rate: f32,
    min_tau_ms: f32,
    max_tau_ms: f32,
    tau_multiplier: f32,
) -> f32 {
    const BLOCK_MS: f32 = 10.0;
    let block = ((BLOCK_MS / 1000.0) * sample_rate) as usize;
    if block == 0 || samples.len() < block * 4 {
        return 0.0;
    }
    let blocks: Vec<f32> = samples.chunks_exact(block).map(rms).collect();
    let mean = blocks.iter().sum::<f32>() / blocks.len() as f32;

    // integrated, mean-removed profile
    let mut integrated = Vec::with_capacity(blocks.len());
    let mut acc = 0.0f32;
    for b in &blocks {
        acc += b - mean;
        integrated.push(acc);
    }

    let mut log_tau = Vec::new();
    let mut log_fluctuation = Vec::new();
    let mut tau_ms = min_tau_ms;
    while tau_ms <= max_tau_ms {
        let window = (tau_ms / BLOCK_MS) as usize;
        if window >= 4 && window < integrated.len() {
            let fluctuation = detrended_fluctuation(&integrated, window);
            if fluctuation > 0.0 {
                log_tau.push((tau_ms).ln());
                log_fluctuation.push(fluctuation.ln());
            }
        }
        tau_ms *= tau_multiplier.max(1.01);
    }
    if log_tau.len() < 2 {
        return 0.0;
    }

    let alpha = linear_slope(&log_tau, &log_fluctuation);
    if alpha <= 0.0 {
        0.0
    } else {
        (1.0 / alpha).clamp(0.0, 3.0)
    }
}

fn detrended_fluctuation(integrated: &[f32], window: usize) -> f32 {
    let mut sum_sq = 0.0f32;
    let mut count = 0usize;
    for chunk in integrated.chunks_exact(window) {
        let xs: Vec<f32> = (0..window).map(|i| i as f32).collect();
        let slope = linear_slope(&xs, chunk);
        let x_mean = xs.iter().sum::<f32>() / window as f32;
        let y_mean = chunk.iter().sum::<f32>() / window as f32;
        for (x, y) in xs.iter().zip(chunk) {
            let trend = y_mean + slope * (x - x_mean);
            sum_sq += (y - trend).powi(2);
        }
        count += window;
    }
    if count == 0 {
        0.0
    } else {
        (sum_sq / count as f32).sqrt()
    }
}

fn linear_slope(xs: &[f32], ys: &[f32]) -> f32 {
    let n = xs.len() as f32;
    let x_mean = xs.iter().sum::<f32>() / n;
    let y_mean = ys.iter().sum::<f32>() / n;
    let mut num = 0.0f32;
    let mut den = 0.0f32;
    for (x, y) in xs.iter().zip(ys) {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean).powi(2);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

const LOUDNESS_BANDS: usize = 6;
const BEAT_WINDOW_SECONDS: f32 = 0.05;

/// Loudness at each beat position plus the spectral band ratios of the
/// beat window. Needs the tick list a previous pass produced.
pub fn beats_loudness(
    samples: &[f32],
    sample_rate: f32,
    ticks: &[f32],
) -> (Vec<f32>, Vec<Vec<f32>>) {
    let window = (BEAT_WINDOW_SECONDS * sample_rate) as usize;
    let analyzer = SpectrumAnalyzer::new(window.next_power_of_two());

    let mut loudness = Vec::with_capacity(ticks.len());
    let mut ratios = Vec::with_capacity(ticks.len());
    for &tick in ticks {
        let start = (tick * sample_rate) as usize;
        if start + window > samples.len() {
            break;
        }
        let slice = &samples[start..start + window];
        loudness.push(super::level::frame_loudness(slice));

        let spectrum = analyzer.magnitude(slice);
        let total: f32 = spectrum.iter().map(|m| m * m).sum();
        let band_size = spectrum.len() / LOUDNESS_BANDS;
        let mut bands = vec![0.0f32; LOUDNESS_BANDS];
        for (i, &m) in spectrum.iter().enumerate() {
            let band = (i / band_size.max(1)).min(LOUDNESS_BANDS - 1);
            bands[band] += m * m;
        }
        if total > 0.0 {
            for b in &mut bands {
                *b /= total;
            }
        }
        ratios.push(bands);
    }
    (loudness, ratios)
}
