pub mod fades;
pub mod highlevel;
pub mod lowlevel;
pub mod midlevel;
pub mod panning;
pub mod segmentation;

use crate::config::{Config, StagePlan};
use crate::error::{AnalysisError, Result};
use crate::pool::Pool;
use crate::source::{AudioCallbacks, Downmix};

/// The two result stores a run may maintain, one per loudness variant.
/// Either may be absent, never both (validation rejects that).
#[derive(Debug, Default)]
pub struct Variants {
    pub neqloud: Option<Pool>,
    pub eqloud: Option<Pool>,
}

impl Variants {
    pub fn new(plan: &StagePlan) -> Result<Self> {
        let mut variants = Variants::default();
        if plan.neqloud {
            let mut pool = Pool::new();
            pool.set_bool("metadata.audio_properties.equal_loudness", false)?;
            variants.neqloud = Some(pool);
        }
        if plan.eqloud {
            let mut pool = Pool::new();
            pool.set_bool("metadata.audio_properties.equal_loudness", true)?;
            variants.eqloud = Some(pool);
        }
        Ok(variants)
    }

    pub fn pools_mut(&mut self) -> impl Iterator<Item = &mut Pool> {
        self.neqloud.iter_mut().chain(self.eqloud.iter_mut())
    }

    /// The pool segmentation and shared reads prefer: equal-loudness when
    /// both variants are active.
    pub fn primary(&self) -> Result<&Pool> {
        self.eqloud
            .as_ref()
            .or(self.neqloud.as_ref())
            .ok_or_else(|| AnalysisError::Configuration("no active result variant".into()))
    }
}

/// Everything one stage invocation needs to know: the configuration, the
/// time window to analyze and the namespace prefix to write under. The
/// prefix is empty for whole-track passes and `segments.segment_<i>.desc`
/// for segment passes.
pub struct StageContext<'a> {
    pub config: &'a Config,
    pub start_time: f32,
    pub end_time: f32,
    pub nspace: Option<&'a str>,
}

impl StageContext<'_> {
    pub fn segment_pass(&self) -> bool {
        self.nspace.is_some()
    }

    /// Full namespace for a descriptor family, e.g. `rhythm` becomes
    /// `segments.segment_0.desc.rhythm` inside a segment pass.
    pub fn prefix(&self, family: &str) -> String {
        match self.nspace {
            Some(ns) => format!("{ns}.{family}"),
            None => family.to_string(),
        }
    }

    pub fn sample_rate(&self) -> Result<f32> {
        self.config.real("analysisSampleRate")
    }
}

/// One conditionally-executed analysis pass. Stages run in a fixed order;
/// whether one runs at all is decided by the resolved plan, not by the
/// stage itself.
pub trait AnalysisStage {
    fn name(&self) -> &'static str;
    fn should_run(&self, plan: &StagePlan, segment_pass: bool) -> bool;
    fn run(
        &self,
        cb: &mut dyn AudioCallbacks,
        variants: &mut Variants,
        ctx: &StageContext,
    ) -> Result<()>;
}

/// Replay gain and downmix as established by the first pass, read back
/// from whichever variant pool is primary.
pub fn gain_and_downmix(variants: &Variants) -> Result<(f32, Downmix)> {
    let pool = variants.primary()?;
    let gain = pool
        .real("metadata.audio_properties.replay_gain")
        .ok_or_else(|| AnalysisError::MissingDescriptor {
            stage: "loader",
            path: "metadata.audio_properties.replay_gain".into(),
        })?;
    let downmix = match pool.string("metadata.audio_properties.downmix") {
        Some("left") => Downmix::Left,
        Some("right") => Downmix::Right,
        Some(_) => Downmix::Mix,
        None => {
            return Err(AnalysisError::MissingDescriptor {
                stage: "loader",
                path: "metadata.audio_properties.downmix".into(),
            });
        }
    };
    Ok((gain, downmix))
}
