use crate::dsp::frames::{apply_window, window, FrameCutter, SilentFrames};
use crate::dsp::rhythm::beats_loudness;
use crate::dsp::spectral::SpectrumAnalyzer;
use crate::dsp::tonal::{chroma_profile, estimate_key};
use crate::error::{AnalysisError, Result};
use crate::pool::Pool;
use crate::source::{equal_loudness, load_mono, AudioCallbacks};
use crate::stages::{gain_and_downmix, AnalysisStage, StageContext, Variants};

/// Descriptors that need results of the first pass: the key estimate
/// builds on the tuning candidates, beat loudness on the tick list.
pub struct MidLevelStage;

impl AnalysisStage for MidLevelStage {
    fn name(&self) -> &'static str {
        "midlevel"
    }

    fn should_run(&self, plan: &crate::config::StagePlan, segment_pass: bool) -> bool {
        if segment_pass {
            plan.seg_midlevel
        } else {
            plan.midlevel
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

        let mut targets: Vec<(&mut Pool, &[f32])> = Vec::new();
        if let Some(pool) = variants.neqloud.as_mut() {
            targets.push((pool, &mono));
        }
        if let Some(pool) = variants.eqloud.as_mut() {
            targets.push((pool, &filtered));
        }

        for (pool, signal) in targets {
            if ctx.config.gate("tonal", ctx.segment_pass())? {
                compute_tonal(pool, signal, sample_rate, ctx)?;
            }
            if ctx.config.gate("rhythm.beats.loudness", ctx.segment_pass())? {
                compute_beats_loudness(pool, signal, sample_rate, ctx)?;
            }
        }
        Ok(())
    }
}

fn compute_tonal(
    pool: &mut Pool,
    signal: &[f32],
    sample_rate: f32,
    ctx: &StageContext,
) -> Result<()> {
    let tonalspace = ctx.prefix("tonal");
    let candidates_path = format!("{tonalspace}.tuning_frequency_frames");
    let tuning = match pool.reals(&candidates_path) {
        Some(estimates) if !estimates.is_empty() => median(estimates),
        _ => {
            return Err(AnalysisError::MissingDescriptor {
                stage: "midlevel",
                path: candidates_path,
            });
        }
    };

    let frame_size = ctx.config.real("tonal.frameSize")? as usize;
    let hop_size = ctx.config.real("tonal.hopSize")? as usize;
    let silent = SilentFrames::parse(ctx.config.string("tonal.silentFrames")?);
    let win = window(ctx.config.string("tonal.windowType")?, frame_size);
    let padding = ctx.config.real("tonal.zeroPadding")? as usize;
    let analyzer = SpectrumAnalyzer::new(frame_size + padding);

    let mut mean_profile = [0.0f32; 12];
    let mut count = 0usize;
    for frame in FrameCutter::new(frame_size, hop_size, silent).frames(signal) {
        let spectrum = analyzer.magnitude(&apply_window(&frame, &win));
        let profile = chroma_profile(&spectrum, sample_rate, tuning);
        pool.add_vector(&format!("{tonalspace}.hpcp"), profile.to_vec())?;
        for (acc, v) in mean_profile.iter_mut().zip(profile.iter()) {
            *acc += v;
        }
        count += 1;
    }
    if count == 0 {
        return Ok(());
    }
    for v in mean_profile.iter_mut() {
        *v /= count as f32;
    }

    let (key, scale, strength) = estimate_key(&mean_profile);
    pool.set_str(&format!("{tonalspace}.key_key"), &key)?;
    pool.set_str(&format!("{tonalspace}.key_scale"), &scale)?;
    pool.set_real(&format!("{tonalspace}.key_strength"), strength)?;
    Ok(())
}

fn compute_beats_loudness(
    pool: &mut Pool,
    signal: &[f32],
    sample_rate: f32,
    ctx: &StageContext,
) -> Result<()> {
    let rhythmspace = ctx.prefix("rhythm");
    let ticks_path = format!("{rhythmspace}.beats.position");
    let ticks = match pool.reals(&ticks_path) {
        Some(ticks) => ticks.to_vec(),
        None => {
            return Err(AnalysisError::MissingDescriptor {
                stage: "midlevel",
                path: ticks_path,
            });
        }
    };

    let (loudness, ratios) = beats_loudness(signal, sample_rate, &ticks);
    for value in loudness {
        pool.add_real(&format!("{rhythmspace}.beats.loudness"), value)?;
    }
    for ratio in ratios {
        pool.add_vector(&format!("{rhythmspace}.beats.loudness_band_ratio"), ratio)?;
    }
    Ok(())
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[sorted.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dsp::test_signals::{click_track, sine};
    use crate::source::test_support::MemorySource;
    use crate::source::Downmix;
    use crate::stages::lowlevel::LowLevelStage;

    fn run_both(config: &mut Config, samples: &[f32]) -> Result<Variants> {
        let plan = config.validate()?;
        let mut variants = Variants::new(&plan)?;
        for pool in variants.pools_mut() {
            pool.set_real("metadata.audio_properties.replay_gain", 0.0)?;
            pool.set_str("metadata.audio_properties.downmix", Downmix::Mix.as_str())?;
        }
        let ctx = StageContext {
            config,
            start_time: 0.0,
            end_time: samples.len() as f32 / 44100.0,
            nspace: None,
        };
        let mut source = MemorySource::mono(samples);
        LowLevelStage.run(&mut source, &mut variants, &ctx)?;
        let mut source = MemorySource::mono(samples);
        MidLevelStage.run(&mut source, &mut variants, &ctx)?;
        Ok(variants)
    }

    #[test]
    fn key_estimate_lands_in_pool() {
        let mut config = Config::default();
        config.set_bool("tonal.compute", true).unwrap();
        let samples = sine(440.0, 3.0, 44100.0);
        let variants = run_both(&mut config, &samples).unwrap();
        let pool = variants.eqloud.as_ref().unwrap();
        assert!(pool.string("tonal.key_key").is_some());
        assert!(pool.string("tonal.key_scale").is_some());
        assert!(pool.contains("tonal.key_strength"));
        assert!(pool.vectors("tonal.hpcp").is_some());
    }

    #[test]
    fn beats_loudness_follows_the_tick_list() {
        let mut config = Config::default();
        config.set_bool("rhythm.beats.loudness.compute", true).unwrap();
        let samples = click_track(120.0, 5.0, 44100.0);
        let variants = run_both(&mut config, &samples).unwrap();
        let pool = variants.eqloud.as_ref().unwrap();
        let ticks = pool.reals("rhythm.beats.position").unwrap().len();
        let loudness = pool.reals("rhythm.beats.loudness").unwrap().len();
        assert!(loudness > 0);
        assert!(loudness <= ticks);
    }

    #[test]
    fn missing_tuning_candidates_is_reported() {
        let mut config = Config::default();
        config.set_bool("tonal.compute", true).unwrap();
        let plan = config.validate().unwrap();
        let mut variants = Variants::new(&plan).unwrap();
        for pool in variants.pools_mut() {
            pool.set_real("metadata.audio_properties.replay_gain", 0.0).unwrap();
            pool.set_str("metadata.audio_properties.downmix", "mix").unwrap();
        }
        let samples = sine(330.0, 2.0, 44100.0);
        let ctx = StageContext {
            config: &config,
            start_time: 0.0,
            end_time: 2.0,
            nspace: None,
        };
        let mut source = MemorySource::mono(&samples);
        let err = MidLevelStage.run(&mut source, &mut variants, &ctx).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingDescriptor { .. }));
    }
}
