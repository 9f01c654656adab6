use crate::dsp::frames::{apply_window, window, FrameCutter, SilentFrames};
use crate::dsp::panning::{panning_coefficients, PanningParams};
use crate::dsp::spectral::SpectrumAnalyzer;
use crate::error::Result;
use crate::source::{load_stereo, AudioCallbacks};
use crate::stages::{AnalysisStage, StageContext, Variants};

/// Stereo panorama trajectory. The only pass that reads both channels;
/// replay gain and downmix are deliberately not applied here.
pub struct PanningStage;

impl AnalysisStage for PanningStage {
    fn name(&self) -> &'static str {
        "panning"
    }

    fn should_run(&self, plan: &crate::config::StagePlan, segment_pass: bool) -> bool {
        if segment_pass {
            plan.seg_panning
        } else {
            plan.panning
        }
    }

    fn run(
        &self,
        cb: &mut dyn AudioCallbacks,
        variants: &mut Variants,
        ctx: &StageContext,
    ) -> Result<()> {
        let sample_rate = ctx.sample_rate()?;
        let (left, right) = load_stereo(cb, sample_rate, ctx.start_time, ctx.end_time)?;

        let frame_size = ctx.config.real("panning.frameSize")? as usize;
        let hop_size = ctx.config.real("panning.hopSize")? as usize;
        let silent = SilentFrames::parse(ctx.config.string("panning.silentFrames")?);
        let win = window(ctx.config.string("panning.windowType")?, frame_size);
        let padding = ctx.config.real("panning.zeroPadding")? as usize;
        let cutter = FrameCutter::new(frame_size, hop_size, silent);
        let analyzer = SpectrumAnalyzer::new(frame_size + padding);

        let spectra = |channel: &[f32]| -> Vec<Vec<f32>> {
            cutter
                .frames(channel)
                .iter()
                .map(|f| analyzer.magnitude(&apply_window(f, &win)))
                .collect()
        };
        let coefficients = panning_coefficients(
            &spectra(&left),
            &spectra(&right),
            &PanningParams {
                average_frames: ctx.config.real("panning.averageFrames")? as usize,
                panning_bins: ctx.config.real("panning.panningBins")? as usize,
                num_coeffs: ctx.config.real("panning.numCoeffs")? as usize,
                num_bands: ctx.config.real("panning.numBands")? as usize,
                warped: ctx.config.flag("panning.warpedPanorama")?,
            },
        );

        let path = ctx.prefix("panning") + ".panning_coefficients";
        for pool in variants.pools_mut() {
            for coeffs in &coefficients {
                pool.add_vector(&path, coeffs.clone())?;
            }
        }
        Ok(())
    }
}
