use log::debug;

use crate::dsp::frames::{apply_window, window, FrameCutter, SilentFrames};
use crate::dsp::level::frame_loudness;
use crate::dsp::rhythm::{
    danceability, onset_times, tempo_histogram_peaks, track_beats, BeatTrackerParams,
};
use crate::dsp::spectral::{
    centroid, cepstral_coeffs, flux, rolloff, zero_crossing_rate, SpectrumAnalyzer,
};
use crate::dsp::tonal::tuning_frequency;
use crate::error::{AnalysisError, Result};
use crate::pool::Pool;
use crate::source::{equal_loudness, load_mono, AudioCallbacks};
use crate::stages::{gain_and_downmix, AnalysisStage, StageContext, Variants};

/// Per-frame raw series for one variant: spectral shape, MFCCs, loudness,
/// pitch, tuning candidates, and the rhythm family. Everything later
/// passes consume starts here.
pub struct LowLevelStage;

impl AnalysisStage for LowLevelStage {
    fn name(&self) -> &'static str {
        "lowlevel"
    }

    fn should_run(&self, plan: &crate::config::StagePlan, segment_pass: bool) -> bool {
        if segment_pass {
            plan.seg_lowlevel
        } else {
            plan.lowlevel
        }
    }

    fn run(
        &self,
        cb: &mut dyn AudioCallbacks,
        variants: &mut Variants,
        ctx: &StageContext,
    ) -> Result<()> {
        let sample_rate = ctx.sample_rate()?;
        let (gain, downmix) = gain_and_downmix(variants)?;
        let mono = load_mono(cb, sample_rate, ctx.start_time, ctx.end_time, downmix, gain)?;
        let filtered = equal_loudness(&mono, sample_rate);
        debug!(
            "lowlevel window [{:.2}, {:.2}]s: {} samples",
            ctx.start_time,
            ctx.end_time,
            mono.len()
        );

        let mut targets: Vec<(&mut Pool, &[f32])> = Vec::new();
        if let Some(pool) = variants.neqloud.as_mut() {
            targets.push((pool, &mono));
        }
        if let Some(pool) = variants.eqloud.as_mut() {
            targets.push((pool, &filtered));
        }

        for (pool, signal) in targets {
            compute_spectral(pool, signal, &filtered, sample_rate, ctx)?;
            if ctx.config.gate("average_loudness", ctx.segment_pass())?
                || !ctx.config.flag("shortSound")?
            {
                compute_loudness(pool, &filtered, ctx)?;
            }
            compute_rhythm(pool, signal, sample_rate, ctx)?;
        }

        // A run that never filled a single whole loudness frame has no
        // usable full-track statistics, unless short input was declared.
        if !ctx.segment_pass() && !ctx.config.flag("shortSound")? {
            let path = ctx.prefix("lowlevel") + ".loudness";
            let complete = variants
                .primary()?
                .reals(&path)
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if !complete {
                return Err(AnalysisError::TooShort { min_seconds: 2.0 });
            }
        }
        Ok(())
    }
}

/// Frame-wise spectral descriptors. The unfiltered (or variant) signal
/// feeds the shape descriptors; the equal-loudness signal additionally
/// contributes the energy-weighted ones into the same pool.
fn compute_spectral(
    pool: &mut Pool,
    signal: &[f32],
    filtered: &[f32],
    sample_rate: f32,
    ctx: &StageContext,
) -> Result<()> {
    let llspace = ctx.prefix("lowlevel");
    let tonalspace = ctx.prefix("tonal");

    let frame_size = ctx.config.real("lowlevel.frameSize")? as usize;
    let hop_size = ctx.config.real("lowlevel.hopSize")? as usize;
    let silent = SilentFrames::parse(ctx.config.string("lowlevel.silentFrames")?);
    let win = window(ctx.config.string("lowlevel.windowType")?, frame_size);
    let padding = ctx.config.real("lowlevel.zeroPadding")? as usize;
    let cutter = FrameCutter::new(frame_size, hop_size, silent);
    let analyzer = SpectrumAnalyzer::new(frame_size + padding);

    let mut previous: Vec<f32> = Vec::new();
    for frame in cutter.frames(signal) {
        let spectrum = analyzer.magnitude(&apply_window(&frame, &win));
        pool.add_real(&format!("{llspace}.spectral_centroid"), centroid(&spectrum, sample_rate))?;
        pool.add_real(
            &format!("{llspace}.spectral_rolloff"),
            rolloff(&spectrum, sample_rate, 0.85),
        )?;
        pool.add_real(&format!("{llspace}.spectral_flux"), flux(&previous, &spectrum))?;
        pool.add_real(&format!("{llspace}.zerocrossingrate"), zero_crossing_rate(&frame))?;
        pool.add_vector(&format!("{llspace}.mfcc"), cepstral_coeffs(&spectrum, sample_rate))?;
        pool.add_real(&format!("{llspace}.pitch"), dominant_frequency(&spectrum, sample_rate))?;
        previous = spectrum;
    }

    // Energy descriptors always come from the loudness-weighted signal,
    // whichever variant this pool holds.
    let mut energy_previous: Vec<f32> = Vec::new();
    for frame in cutter.frames(filtered) {
        let spectrum = analyzer.magnitude(&apply_window(&frame, &win));
        let energy: f32 = spectrum.iter().map(|m| m * m).sum();
        pool.add_real(&format!("{llspace}.spectral_energy"), energy)?;
        pool.add_real(
            &format!("{llspace}.spectral_energy_flux"),
            flux(&energy_previous, &spectrum),
        )?;
        energy_previous = spectrum;
    }

    if ctx.config.gate("tonal", ctx.segment_pass())? {
        let t_size = ctx.config.real("tonal.frameSize")? as usize;
        let t_hop = ctx.config.real("tonal.hopSize")? as usize;
        let t_silent = SilentFrames::parse(ctx.config.string("tonal.silentFrames")?);
        let t_win = window(ctx.config.string("tonal.windowType")?, t_size);
        let t_padding = ctx.config.real("tonal.zeroPadding")? as usize;
        let t_analyzer = SpectrumAnalyzer::new(t_size + t_padding);
        let spectra: Vec<Vec<f32>> = FrameCutter::new(t_size, t_hop, t_silent)
            .frames(signal)
            .iter()
            .map(|f| t_analyzer.magnitude(&apply_window(f, &t_win)))
            .collect();
        for estimate in tuning_frequency(&spectra, sample_rate) {
            pool.add_real(&format!("{tonalspace}.tuning_frequency_frames"), estimate)?;
        }
    }
    Ok(())
}

/// Loudness per two-second frame on the equal-loudness signal. Only
/// complete frames count, which is what makes very short input visible.
fn compute_loudness(pool: &mut Pool, filtered: &[f32], ctx: &StageContext) -> Result<()> {
    let llspace = ctx.prefix("lowlevel");
    let frame_size = ctx.config.real("average_loudness.frameSize")? as usize;
    let hop_size = ctx.config.real("average_loudness.hopSize")? as usize;
    let silent = SilentFrames::parse(ctx.config.string("average_loudness.silentFrames")?);
    for frame in FrameCutter::new(frame_size, hop_size, silent).frames(filtered) {
        pool.add_real(&format!("{llspace}.loudness"), frame_loudness(&frame))?;
    }
    Ok(())
}

fn compute_rhythm(
    pool: &mut Pool,
    signal: &[f32],
    sample_rate: f32,
    ctx: &StageContext,
) -> Result<()> {
    let rhythmspace = ctx.prefix("rhythm");
    let segment = ctx.segment_pass();

    if ctx.config.gate("rhythm.beats", segment)? {
        let analysis = track_beats(
            signal,
            &BeatTrackerParams {
                sample_rate,
                min_tempo: ctx.config.real("rhythm.beats.minTempo")?,
                max_tempo: ctx.config.real("rhythm.beats.maxTempo")?,
            },
        );
        for tick in &analysis.ticks {
            pool.add_real(&format!("{rhythmspace}.beats.position"), *tick)?;
        }
        pool.set_real(&format!("{rhythmspace}.bpm"), analysis.bpm)?;
        for estimate in &analysis.estimates {
            pool.add_real(&format!("{rhythmspace}.bpm_estimates"), *estimate)?;
        }
        for interval in &analysis.intervals {
            pool.add_real(&format!("{rhythmspace}.bpm_intervals"), *interval)?;
        }

        if ctx.config.gate("rhythm.bpmhistogram", segment)? {
            let peaks = tempo_histogram_peaks(&analysis.estimates);
            pool.set_real(&format!("{rhythmspace}.first_peak_bpm"), peaks.first_peak_bpm)?;
            pool.set_real(&format!("{rhythmspace}.first_peak_weight"), peaks.first_peak_weight)?;
            pool.set_real(&format!("{rhythmspace}.first_peak_spread"), peaks.first_peak_spread)?;
            pool.set_real(&format!("{rhythmspace}.second_peak_bpm"), peaks.second_peak_bpm)?;
            pool.set_real(&format!("{rhythmspace}.second_peak_weight"), peaks.second_peak_weight)?;
            pool.set_real(&format!("{rhythmspace}.second_peak_spread"), peaks.second_peak_spread)?;
        }
    }

    if ctx.config.gate("rhythm.onset", segment)? {
        let onsets = onset_times(signal, sample_rate);
        let duration = signal.len() as f32 / sample_rate;
        let rate = if duration > 0.0 {
            onsets.len() as f32 / duration
        } else {
            0.0
        };
        for onset in &onsets {
            pool.add_real(&format!("{rhythmspace}.onset_times"), *onset)?;
        }
        pool.set_real(&format!("{rhythmspace}.onset_rate"), rate)?;
    }

    if ctx.config.gate("rhythm.danceability", segment)? {
        let value = danceability(
            signal,
            sample_rate,
            ctx.config.real("rhythm.danceability.minTau")?,
            ctx.config.real("rhythm.danceability.maxTau")?,
            ctx.config.real("rhythm.danceability.tauMultiplier")?,
        );
        pool.add_real(&format!("{rhythmspace}.danceability"), value)?;
    }
    Ok(())
}

fn dominant_frequency(spectrum: &[f32], sample_rate: f32) -> f32 {
    let mut best = 0usize;
    for (i, m) in spectrum.iter().enumerate() {
        if *m > spectrum[best] {
            best = i;
        }
    }
    if spectrum.len() < 2 {
        return 0.0;
    }
    best as f32 * sample_rate / (2.0 * (spectrum.len() - 1) as f32)
}
