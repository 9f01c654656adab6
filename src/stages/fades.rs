use crate::dsp::fades::{detect_fades, FadeParams};
use crate::dsp::frames::{FrameCutter, SilentFrames};
use crate::dsp::level::rms;
use crate::error::Result;
use crate::source::{load_mono, AudioCallbacks};
use crate::stages::{gain_and_downmix, AnalysisStage, StageContext, Variants};

/// Fade-in/fade-out detection over a coarse RMS envelope.
pub struct FadesStage;

impl AnalysisStage for FadesStage {
    fn name(&self) -> &'static str {
        "fades"
    }

    fn should_run(&self, plan: &crate::config::StagePlan, segment_pass: bool) -> bool {
        if segment_pass {
            plan.seg_fades
        } else {
            plan.fades
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

        let frame_size = ctx.config.real("fades.frameSize")? as usize;
        let hop_size = ctx.config.real("fades.hopSize")? as usize;
        let silent = SilentFrames::parse(ctx.config.string("fades.silentFrames")?);
        let envelope: Vec<f32> = FrameCutter::new(frame_size, hop_size, silent)
            .frames(&mono)
            .iter()
            .map(|f| rms(f))
            .collect();

        let (fade_ins, fade_outs) = detect_fades(
            &envelope,
            &FadeParams {
                frame_rate: ctx.config.real("fades.frameRate")?,
                min_length: ctx.config.real("fades.minLength")?,
                cutoff_high: ctx.config.real("fades.cutoffHigh")?,
                cutoff_low: ctx.config.real("fades.cutoffLow")?,
            },
        );

        let fadespace = ctx.prefix("fades");
        for pool in variants.pools_mut() {
            for pair in &fade_ins {
                pool.add_vector(&format!("{fadespace}.fadeIns"), pair.to_vec())?;
            }
            for pair in &fade_outs {
                pool.add_vector(&format!("{fadespace}.fadeOuts"), pair.to_vec())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source::test_support::MemorySource;
    use crate::source::Downmix;

    #[test]
    fn ramped_tone_reports_a_fade_in() {
        let mut config = Config::default();
        config.set_bool("fades.compute", true).unwrap();
        config.set_real("fades.minLength", 1.0).unwrap();
        let plan = config.validate().unwrap();
        let mut variants = Variants::new(&plan).unwrap();
        for pool in variants.pools_mut() {
            pool.set_real("metadata.audio_properties.replay_gain", 0.0).unwrap();
            pool.set_str("metadata.audio_properties.downmix", Downmix::Mix.as_str()).unwrap();
        }

        // four seconds ramping up, six seconds at full level
        let sr = 44100.0;
        let samples: Vec<f32> = (0..(10.0 * sr) as usize)
            .map(|i| {
                let t = i as f32 / sr;
                let level = (t / 4.0).min(1.0);
                level * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
            })
            .collect();
        let mut source = MemorySource::mono(&samples);
        let ctx = StageContext {
            config: &config,
            start_time: 0.0,
            end_time: 10.0,
            nspace: None,
        };
        FadesStage.run(&mut source, &mut variants, &ctx).unwrap();

        let pool = variants.eqloud.as_ref().unwrap();
        let fade_ins = pool.vectors("fades.fadeIns").unwrap();
        assert_eq!(fade_ins.len(), 1);
        assert!(fade_ins[0][0] < fade_ins[0][1]);
        assert!(fade_ins[0][1] <= 4.5);
        assert!(pool.vectors("fades.fadeOuts").is_none());
    }
}
