use crate::dsp::tonal::tuning_system_features;
use crate::error::{AnalysisError, Result};
use crate::pool::Pool;
use crate::source::AudioCallbacks;
use crate::stages::{AnalysisStage, StageContext, Variants};

/// Derived descriptors computed from the pools alone: no audio is read
/// here. Also the place where temporary per-frame series are folded into
/// their final single values and removed.
pub struct HighLevelStage;

impl AnalysisStage for HighLevelStage {
    fn name(&self) -> &'static str {
        "highlevel"
    }

    fn should_run(&self, _plan: &crate::config::StagePlan, _segment_pass: bool) -> bool {
        true
    }

    fn run(
        &self,
        _cb: &mut dyn AudioCallbacks,
        variants: &mut Variants,
        ctx: &StageContext,
    ) -> Result<()> {
        let segment = ctx.segment_pass();
        for pool in variants.pools_mut() {
            if ctx.config.gate("average_loudness", segment)? {
                compute_average_loudness(pool, ctx)?;
            }
            if ctx.config.gate("sfx", segment)? {
                compute_sfx(pool, ctx)?;
            }
            if ctx.config.gate("tonal", segment)? {
                fold_tuning(pool, ctx)?;
            }
            post_process(pool, ctx)?;
        }
        Ok(())
    }
}

fn compute_average_loudness(pool: &mut Pool, ctx: &StageContext) -> Result<()> {
    let llspace = ctx.prefix("lowlevel");
    let path = format!("{llspace}.loudness");
    let series = match pool.reals(&path) {
        Some(series) if !series.is_empty() => series,
        _ => {
            return Err(AnalysisError::MissingDescriptor { stage: "highlevel", path });
        }
    };
    let mean = series.iter().sum::<f32>() / series.len() as f32;
    pool.set_real(&format!("{llspace}.average_loudness"), mean.clamp(0.0, 1.0))?;
    Ok(())
}

/// Pitch-curve shape descriptors for short sound-effect material.
fn compute_sfx(pool: &mut Pool, ctx: &StageContext) -> Result<()> {
    let llspace = ctx.prefix("lowlevel");
    let sfxspace = ctx.prefix("sfx");
    let path = format!("{llspace}.pitch");
    let pitch = match pool.reals(&path) {
        Some(series) if !series.is_empty() => series.to_vec(),
        _ => {
            return Err(AnalysisError::MissingDescriptor { stage: "highlevel", path });
        }
    };

    let n = pitch.len() as f32;
    let mut max_at = 0usize;
    let mut min_at = 0usize;
    for (i, v) in pitch.iter().enumerate() {
        if *v > pitch[max_at] {
            max_at = i;
        }
        if *v < pitch[min_at] {
            min_at = i;
        }
    }
    pool.set_real(&format!("{sfxspace}.pitch_max_to_total"), max_at as f32 / n)?;
    pool.set_real(&format!("{sfxspace}.pitch_min_to_total"), min_at as f32 / n)?;

    let total: f32 = pitch.iter().sum();
    let centroid = if total > 0.0 {
        pitch.iter().enumerate().map(|(i, v)| i as f32 * v).sum::<f32>() / (total * n)
    } else {
        0.0
    };
    pool.set_real(&format!("{sfxspace}.pitch_centroid"), centroid)?;

    let before: f32 = pitch[..max_at].iter().map(|v| v * v).sum();
    let after: f32 = pitch[max_at..].iter().map(|v| v * v).sum();
    let ratio = if before > 0.0 { after / before } else { 0.0 };
    pool.set_real(
        &format!("{sfxspace}.pitch_after_max_to_before_max_energy_ratio"),
        ratio,
    )?;
    Ok(())
}

/// Collapses the per-frame tuning candidates into the final estimate and
/// drops the temporary series from the pool.
fn fold_tuning(pool: &mut Pool, ctx: &StageContext) -> Result<()> {
    let tonalspace = ctx.prefix("tonal");
    let path = format!("{tonalspace}.tuning_frequency_frames");
    let (frequency, deviation) = match pool.reals(&path) {
        Some(series) if !series.is_empty() => tuning_system_features(series),
        _ => {
            return Err(AnalysisError::MissingDescriptor { stage: "highlevel", path });
        }
    };
    pool.remove(&path);
    pool.set_real(&format!("{tonalspace}.tuning_frequency"), frequency)?;
    pool.set_real(
        &format!("{tonalspace}.tuning_equal_tempered_deviation"),
        deviation,
    )?;
    Ok(())
}

/// Descriptors downstream consumers expect to always be present when
/// their family ran, even though nothing computes them yet.
fn post_process(pool: &mut Pool, ctx: &StageContext) -> Result<()> {
    let rhythmspace = ctx.prefix("rhythm");
    let segment = ctx.segment_pass();
    if ctx.config.gate("rhythm.beats", segment)? {
        pool.set_real(&format!("{rhythmspace}.bpm_confidence"), 0.0)?;
        pool.set_str(&format!("{rhythmspace}.perceptual_tempo"), "unknown")?;
    }
    if ctx.config.gate("rhythm.beats.loudness", segment)? {
        let loudness = format!("{rhythmspace}.beats.loudness");
        if !pool.contains(&loudness) {
            pool.add_real(&loudness, 0.0)?;
            pool.add_vector(
                &format!("{rhythmspace}.beats.loudness_band_ratio"),
                Vec::new(),
            )?;
        }
    }
    Ok(())
}
