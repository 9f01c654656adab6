use log::{error, info, warn};
use serde::Serialize;

use crate::aggregate::aggregate;
use crate::config::Config;
use crate::dsp::level::replay_gain;
use crate::error::{AnalysisError, Result};
use crate::output::{merge_config_into, write_results};
use crate::pool::{Pool, Value};
use crate::source::{load_mono, AudioCallbacks, Downmix};
use crate::stages::fades::FadesStage;
use crate::stages::highlevel::HighLevelStage;
use crate::stages::lowlevel::LowLevelStage;
use crate::stages::midlevel::MidLevelStage;
use crate::stages::panning::PanningStage;
use crate::stages::segmentation::compute_segments;
use crate::stages::{AnalysisStage, StageContext, Variants};

/// A replay gain this far above unity means the estimator locked onto
/// noise, not program material.
const IMPLAUSIBLE_GAIN_DB: f32 = 40.0;

/// Families of timestamps and single figures pulled out of the raw
/// descriptor pool for callers that want results without walking the
/// full document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupKind {
    Beats,
    Bpm,
    Segments,
    FadeIns,
    FadeOuts,
    Onsets,
    AverageLoudness,
    Danceability,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultGroup {
    pub kind: GroupKind,
    pub values: Vec<f32>,
}

/// Everything one run produces: the flat result groups plus the
/// aggregated descriptor pool per requested loudness variant.
#[derive(Debug)]
pub struct Analysis {
    pub groups: Vec<ResultGroup>,
    pub neqloud_stats: Option<Pool>,
    pub eqloud_stats: Option<Pool>,
}

/// Runs the whole pipeline against one audio source: replay gain,
/// the conditional analysis passes, optional segmentation with
/// per-segment re-analysis, aggregation and file output.
pub fn analyze(cb: &mut dyn AudioCallbacks, overrides: &Config) -> Result<Analysis> {
    let mut config = Config::default();
    config.merge_overrides(overrides);
    let plan = config.validate()?;

    let mut variants = Variants::new(&plan)?;
    info!("process step: replay gain");
    let window = establish_replay_gain(cb, &mut variants, &config)?;
    cb.progress(0.1);

    let stages: [&dyn AnalysisStage; 5] = [
        &LowLevelStage,
        &MidLevelStage,
        &PanningStage,
        &FadesStage,
        &HighLevelStage,
    ];

    let ctx = StageContext {
        config: &config,
        start_time: window.start,
        end_time: window.end,
        nspace: None,
    };
    for (i, stage) in stages.iter().enumerate() {
        if stage.should_run(&plan, false) {
            info!("process step: {}", stage.name());
            stage.run(cb, &mut variants, &ctx)?;
        }
        cb.progress(0.1 + 0.6 * (i + 1) as f32 / stages.len() as f32);
    }

    let mut n_segments = 0usize;
    if plan.segmentation {
        info!("process step: segmentation");
        let timestamps = compute_segments(&mut variants, &config)?;
        if timestamps.len() >= 2 {
            n_segments = timestamps.len() - 1;
            run_segment_passes(cb, &mut variants, &config, &plan, &stages, &window, &timestamps)?;
        }
    }
    cb.progress(0.9);

    let groups = collect_groups(variants.primary()?);
    let neqloud_stats = match &variants.neqloud {
        Some(pool) => Some(finalize(pool, &config, n_segments, config.string("nequalOutputPath")?)?),
        None => None,
    };
    let eqloud_stats = match &variants.eqloud {
        Some(pool) => Some(finalize(pool, &config, n_segments, config.string("equalOutputPath")?)?),
        None => None,
    };
    cb.progress(1.0);
    info!("analysis finished: {} result groups", groups.len());

    Ok(Analysis { groups, neqloud_stats, eqloud_stats })
}

/// The analysis window in absolute stream seconds, already clamped to
/// the measured duration.
struct AnalysisWindow {
    start: f32,
    end: f32,
}

/// First pass over the audio: estimate the replay gain on the stereo
/// mix, falling back to the left channel once when the mix turns out
/// degenerate or the gain is implausibly high. A second failure means
/// the file carries no usable signal at all.
fn establish_replay_gain(
    cb: &mut dyn AudioCallbacks,
    variants: &mut Variants,
    config: &Config,
) -> Result<AnalysisWindow> {
    let sample_rate = config.real("analysisSampleRate")?;
    let start = config.real("startTime")?;
    let end = config.real("endTime")?;
    let mut downmix = Downmix::Mix;

    loop {
        for pool in variants.pools_mut() {
            pool.set_real("metadata.audio_properties.analysis_sample_rate", sample_rate)?;
            pool.set_str("metadata.audio_properties.downmix", downmix.as_str())?;
        }

        let samples = load_mono(cb, sample_rate, start, end, downmix, 0.0)?;
        match replay_gain(&samples, sample_rate) {
            Ok(gain) if gain <= IMPLAUSIBLE_GAIN_DB => {
                let length = samples.len() as f32 / sample_rate;
                for pool in variants.pools_mut() {
                    pool.set_real("metadata.audio_properties.replay_gain", gain)?;
                    pool.set_real("metadata.audio_properties.length", length)?;
                }
                info!(
                    "replay gain {:.2} dB over '{}' downmix, {:.2}s of audio",
                    gain,
                    downmix.as_str(),
                    length
                );
                return Ok(AnalysisWindow { start, end: start + length });
            }
            outcome => {
                if downmix == Downmix::Mix {
                    if let Ok(gain) = outcome {
                        warn!("implausible replay gain {gain:.2} dB on the stereo mix; retrying with the left channel");
                    } else {
                        warn!("replay gain estimation failed on the stereo mix; retrying with the left channel");
                    }
                    downmix = Downmix::Left;
                } else {
                    error!("replay gain estimation failed on both downmixes; treating the file as silent");
                    return Err(AnalysisError::SilentFile);
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_segment_passes(
    cb: &mut dyn AudioCallbacks,
    variants: &mut Variants,
    config: &Config,
    plan: &crate::config::StagePlan,
    stages: &[&dyn AnalysisStage],
    window: &AnalysisWindow,
    timestamps: &[f32],
) -> Result<()> {
    for i in 0..timestamps.len() - 1 {
        let scope_ns = format!("segments.segment_{i}");
        for pool in variants.pools_mut() {
            pool.set_str(&format!("{scope_ns}.name"), &format!("segment_{i}"))?;
            pool.set(
                &format!("{scope_ns}.scope"),
                Value::RealVec(vec![timestamps[i], timestamps[i + 1]]),
            )?;
        }

        let prefix = format!("{scope_ns}.desc");
        let ctx = StageContext {
            config,
            start_time: window.start + timestamps[i],
            end_time: window.start + timestamps[i + 1],
            nspace: Some(&prefix),
        };
        for stage in stages {
            if stage.should_run(plan, true) {
                info!("process step: {} on segment {i}", stage.name());
                stage.run(cb, variants, &ctx)?;
            }
        }
    }
    Ok(())
}

/// Aggregates one variant pool, mirrors the run options into it and
/// writes it to its configured destination.
fn finalize(pool: &Pool, config: &Config, n_segments: usize, path: &str) -> Result<Pool> {
    let mut stats = aggregate(pool, config, n_segments)?;
    if !config.flag("lowlevel.compute")? {
        stats.remove_namespace("lowlevel");
    }
    merge_config_into(&mut stats, config)?;
    write_results(&stats, config, path)?;
    Ok(stats)
}

fn collect_groups(pool: &Pool) -> Vec<ResultGroup> {
    let mut groups = Vec::new();
    let mut push = |kind: GroupKind, values: Vec<f32>| {
        if !values.is_empty() {
            groups.push(ResultGroup { kind, values });
        }
    };

    let flatten = |path: &str| -> Vec<f32> {
        pool.vectors(path)
            .map(|rows| rows.iter().flatten().copied().collect())
            .unwrap_or_default()
    };

    push(
        GroupKind::Beats,
        pool.reals("rhythm.beats.position").map(<[f32]>::to_vec).unwrap_or_default(),
    );
    push(GroupKind::Bpm, pool.real("rhythm.bpm").map(|v| vec![v]).unwrap_or_default());
    push(
        GroupKind::Segments,
        pool.reals("segmentation.timestamps").map(<[f32]>::to_vec).unwrap_or_default(),
    );
    push(GroupKind::FadeIns, flatten("fades.fadeIns"));
    push(GroupKind::FadeOuts, flatten("fades.fadeOuts"));
    push(
        GroupKind::Onsets,
        pool.reals("rhythm.onset_times").map(<[f32]>::to_vec).unwrap_or_default(),
    );
    push(
        GroupKind::AverageLoudness,
        pool.real("lowlevel.average_loudness").map(|v| vec![v]).unwrap_or_default(),
    );
    push(
        GroupKind::Danceability,
        pool.reals("rhythm.danceability").map(<[f32]>::to_vec).unwrap_or_default(),
    );
    groups
}
