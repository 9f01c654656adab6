use log::{info, warn};

use crate::dsp::sbic::{segment_boundaries, SegmenterParams};
use crate::error::{AnalysisError, Result};
use crate::stages::Variants;

/// Change-point segmentation over the MFCC matrix of the whole-track
/// pass. Returns the boundary timestamps in seconds; fewer than two
/// points means the track was too short to segment, which is not an
/// error.
pub fn compute_segments(
    variants: &mut Variants,
    config: &crate::config::Config,
) -> Result<Vec<f32>> {
    let features = {
        let pool = variants.primary()?;
        match pool.vectors("lowlevel.mfcc") {
            Some(features) if !features.is_empty() => features.to_vec(),
            _ => {
                return Err(AnalysisError::MissingDescriptor {
                    stage: "segmentation",
                    path: "lowlevel.mfcc".into(),
                });
            }
        }
    };

    let params = SegmenterParams {
        size1: config.real("segmentation.size1")? as usize,
        inc1: config.real("segmentation.inc1")? as usize,
        size2: config.real("segmentation.size2")? as usize,
        inc2: config.real("segmentation.inc2")? as usize,
        cpw: config.real("segmentation.cpw")?,
        min_length: config.real("segmentation.minimumSegmentsLength")? as usize,
    };
    let boundaries = segment_boundaries(&features, &params);
    if boundaries.len() < 2 {
        warn!("not enough frames to segment; skipping segment passes");
        return Ok(Vec::new());
    }

    let sample_rate = config.real("analysisSampleRate")?;
    let hop_size = config.real("lowlevel.hopSize")?;
    let timestamps: Vec<f32> = boundaries
        .iter()
        .map(|b| *b as f32 * hop_size / sample_rate)
        .collect();
    info!("found {} segments", timestamps.len() - 1);

    for pool in variants.pools_mut() {
        for t in &timestamps {
            pool.add_real("segmentation.timestamps", *t)?;
        }
    }
    Ok(timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::stages::Variants;

    fn seg_config() -> Config {
        let mut config = Config::default();
        config.set_bool("segmentation.compute", true).unwrap();
        // small windows so a short synthetic feature matrix is enough
        config.set_real("segmentation.size1", 40.0).unwrap();
        config.set_real("segmentation.inc1", 10.0).unwrap();
        config.set_real("segmentation.size2", 20.0).unwrap();
        config.set_real("segmentation.inc2", 5.0).unwrap();
        config.set_real("segmentation.minimumSegmentsLength", 10.0).unwrap();
        config
    }

    #[test]
    fn timestamps_land_in_every_active_pool() {
        let mut config = seg_config();
        config.set_bool("nequalLoudness", true).unwrap();
        let plan = config.validate().unwrap();
        let mut variants = Variants::new(&plan).unwrap();
        for pool in variants.pools_mut() {
            for i in 0..200 {
                let value = if i < 100 { 1.0 } else { -1.0 };
                pool.add_vector("lowlevel.mfcc", vec![value, value * 2.0]).unwrap();
            }
        }

        let timestamps = compute_segments(&mut variants, &config).unwrap();
        assert!(timestamps.len() >= 2);
        assert_eq!(timestamps[0], 0.0);
        for pool in [variants.neqloud.as_ref(), variants.eqloud.as_ref()] {
            assert_eq!(pool.unwrap().reals("segmentation.timestamps").unwrap(), &timestamps[..]);
        }
    }

    #[test]
    fn missing_features_are_a_hard_error() {
        let config = seg_config();
        let mut variants = Variants::default();
        variants.eqloud = Some(crate::pool::Pool::new());
        let err = compute_segments(&mut variants, &config).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingDescriptor { .. }));
    }

    #[test]
    fn too_few_frames_yield_no_segments() {
        let config = seg_config();
        let plan_config = {
            let mut c = seg_config();
            c.validate().unwrap()
        };
        let mut variants = Variants::new(&plan_config).unwrap();
        for pool in variants.pools_mut() {
            for _ in 0..20 {
                pool.add_vector("lowlevel.mfcc", vec![1.0]).unwrap();
            }
        }
        let timestamps = compute_segments(&mut variants, &config).unwrap();
        assert!(timestamps.is_empty());
        assert!(!variants.eqloud.as_ref().unwrap().contains("segmentation.timestamps"));
    }
}
