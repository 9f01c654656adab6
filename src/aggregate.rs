use log::warn;

use crate::config::Config;
use crate::error::Result;
use crate::pool::{Entry, Pool, Value};

/// Namespace fragments with their own statistics list, tried in order.
/// Matching is by substring so segment-scoped descriptors pick up the
/// same treatment as their whole-track counterparts.
const STAT_EXCEPTIONS: &[(&str, &str)] = &[
    ("lowlevel.mfcc", "lowlevel.mfccStats"),
    ("lowlevel.", "lowlevel.stats"),
    ("rhythm.", "rhythm.stats"),
    ("tonal.", "tonal.stats"),
    ("sfx.", "sfx.stats"),
    ("panning.", "panning.stats"),
    ("fades.", "fades.stats"),
];

const DEFAULT_STATS: &[&str] = &["mean", "var", "min", "max", "dmean", "dmean2", "dvar", "dvar2"];

/// Folds every per-frame series in `pool` into summary statistics,
/// passing single values through untouched. Which statistics apply to a
/// descriptor is decided by the first matching namespace rule; `copy`
/// keeps the raw series. Segment boundary timestamps are only kept
/// verbatim when segments actually exist.
pub fn aggregate(pool: &Pool, config: &Config, n_segments: usize) -> Result<Pool> {
    let mut out = Pool::new();
    for (path, entry) in pool.iter() {
        let stats = stats_for(path, config, n_segments)?;
        match entry {
            Entry::Single(value) => out.set(path, value.clone())?,
            Entry::Strs(values) => {
                for v in values {
                    out.add(path, Value::Str(v.clone()))?;
                }
            }
            Entry::Reals(series) => {
                for stat in &stats {
                    if stat == "copy" {
                        for v in series {
                            out.add_real(path, *v)?;
                        }
                    } else if let Some(value) = scalar_stat(stat, series) {
                        out.set_real(&format!("{path}.{stat}"), value)?;
                    } else {
                        warn!("unknown statistic '{stat}' requested for {path}");
                    }
                }
            }
            Entry::Vectors(rows) => {
                for stat in &stats {
                    if stat == "copy" {
                        for row in rows {
                            out.add_vector(path, row.clone())?;
                        }
                    } else if let Some(folded) = column_stat(stat, rows) {
                        out.set(&format!("{path}.{stat}"), Value::RealVec(folded))?;
                    } else {
                        warn!("unknown statistic '{stat}' requested for {path}");
                    }
                }
            }
        }
    }
    Ok(out)
}

fn stats_for(path: &str, config: &Config, n_segments: usize) -> Result<Vec<String>> {
    if n_segments > 0 && path.contains("segmentation.timestamps") {
        return Ok(vec!["copy".to_string()]);
    }
    for (fragment, option) in STAT_EXCEPTIONS {
        if path.contains(fragment) {
            return Ok(config.list(option)?.to_vec());
        }
    }
    Ok(DEFAULT_STATS.iter().map(|s| s.to_string()).collect())
}

fn column_count(rows: &[Vec<f32>]) -> usize {
    rows.iter().map(Vec::len).min().unwrap_or(0)
}

/// Per-column reduction of a frame matrix; `None` when the statistic
/// name is unknown, so nothing is written under a bogus path.
fn column_stat(stat: &str, rows: &[Vec<f32>]) -> Option<Vec<f32>> {
    let columns = column_count(rows);
    let mut folded = Vec::with_capacity(columns);
    for c in 0..columns {
        let column: Vec<f32> = rows.iter().map(|r| r[c]).collect();
        folded.push(scalar_stat(stat, &column)?);
    }
    // zero columns still needs the name check
    if columns == 0 && scalar_stat(stat, &[]).is_none() {
        return None;
    }
    Some(folded)
}

fn scalar_stat(stat: &str, series: &[f32]) -> Option<f32> {
    let value = match stat {
        "mean" => mean(series),
        "var" => variance(series),
        "median" => median(series),
        "min" => series.iter().copied().fold(f32::INFINITY, f32::min),
        "max" => series.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        "dmean" => mean(&abs_diffs(series)),
        "dvar" => variance(&diffs(series)),
        "dmean2" => mean(&abs_diffs(&diffs(series))),
        "dvar2" => variance(&diffs(&diffs(series))),
        _ => return None,
    };
    // min/max of an empty series degenerate to infinities
    Some(if value.is_finite() { value } else { 0.0 })
}

fn mean(series: &[f32]) -> f32 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f32>() / series.len() as f32
}

fn variance(series: &[f32]) -> f32 {
    if series.is_empty() {
        return 0.0;
    }
    let m = mean(series);
    series.iter().map(|v| (v - m).powi(2)).sum::<f32>() / series.len() as f32
}

fn median(series: &[f32]) -> f32 {
    if series.is_empty() {
        return 0.0;
    }
    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[sorted.len() / 2]
}

fn diffs(series: &[f32]) -> Vec<f32> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}

fn abs_diffs(series: &[f32]) -> Vec<f32> {
    series.windows(2).map(|w| (w[1] - w[0]).abs()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut c = Config::default();
        c.validate().unwrap();
        c
    }

    #[test]
    fn single_values_pass_through() {
        let mut pool = Pool::new();
        pool.set_real("rhythm.bpm", 120.0).unwrap();
        pool.set_str("metadata.audio_properties.downmix", "mix").unwrap();
        let out = aggregate(&pool, &config(), 0).unwrap();
        assert_eq!(out.real("rhythm.bpm"), Some(120.0));
        assert_eq!(out.string("metadata.audio_properties.downmix"), Some("mix"));
    }

    #[test]
    fn series_fold_into_the_configured_statistics() {
        let mut pool = Pool::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            pool.add_real("lowlevel.spectral_centroid", v).unwrap();
        }
        let out = aggregate(&pool, &config(), 0).unwrap();
        assert_eq!(out.real("lowlevel.spectral_centroid.mean"), Some(2.5));
        assert_eq!(out.real("lowlevel.spectral_centroid.min"), Some(1.0));
        assert_eq!(out.real("lowlevel.spectral_centroid.max"), Some(4.0));
        assert_eq!(out.real("lowlevel.spectral_centroid.dmean"), Some(1.0));
        assert_eq!(out.real("lowlevel.spectral_centroid.median"), Some(3.0));
        assert!(!out.contains("lowlevel.spectral_centroid"));
    }

    #[test]
    fn mfcc_matrix_gets_only_the_per_column_mean() {
        let mut pool = Pool::new();
        pool.add_vector("lowlevel.mfcc", vec![1.0, 10.0]).unwrap();
        pool.add_vector("lowlevel.mfcc", vec![3.0, 20.0]).unwrap();
        let out = aggregate(&pool, &config(), 0).unwrap();
        match out.get("lowlevel.mfcc.mean").unwrap() {
            Entry::Single(Value::RealVec(v)) => assert_eq!(v, &vec![2.0, 15.0]),
            other => panic!("unexpected entry {other:?}"),
        }
        assert!(!out.contains("lowlevel.mfcc.var"));
    }

    #[test]
    fn copy_statistics_keep_the_raw_series() {
        let mut pool = Pool::new();
        pool.add_vector("panning.panning_coefficients", vec![0.1, 0.2]).unwrap();
        pool.add_vector("fades.fadeIns", vec![0.0, 3.5]).unwrap();
        let out = aggregate(&pool, &config(), 0).unwrap();
        assert_eq!(out.vectors("panning.panning_coefficients").unwrap().len(), 1);
        assert_eq!(out.vectors("fades.fadeIns").unwrap()[0], vec![0.0, 3.5]);
    }

    #[test]
    fn unknown_statistics_are_skipped_for_all_shapes() {
        let mut cfg = config();
        let mut overrides = Config::empty();
        overrides.add_str("lowlevel.stats", "mean").unwrap();
        overrides.add_str("lowlevel.stats", "kurtosis").unwrap();
        cfg.merge_overrides(&overrides);

        let mut pool = Pool::new();
        pool.add_real("lowlevel.spectral_flux", 1.0).unwrap();
        pool.add_real("lowlevel.spectral_flux", 3.0).unwrap();
        pool.add_vector("lowlevel.barkbands", vec![1.0, 2.0]).unwrap();
        pool.add_vector("lowlevel.barkbands", vec![3.0, 4.0]).unwrap();

        let out = aggregate(&pool, &cfg, 0).unwrap();
        assert_eq!(out.real("lowlevel.spectral_flux.mean"), Some(2.0));
        assert!(!out.contains("lowlevel.spectral_flux.kurtosis"));
        assert!(out.contains("lowlevel.barkbands.mean"));
        assert!(!out.contains("lowlevel.barkbands.kurtosis"));
    }

    #[test]
    fn timestamps_are_copied_only_when_segments_exist() {
        let mut pool = Pool::new();
        for t in [0.0, 4.2, 9.7] {
            pool.add_real("segmentation.timestamps", t).unwrap();
        }
        let with = aggregate(&pool, &config(), 2).unwrap();
        assert_eq!(with.reals("segmentation.timestamps").unwrap(), &[0.0, 4.2, 9.7]);
        let without = aggregate(&pool, &config(), 0).unwrap();
        assert!(without.contains("segmentation.timestamps.mean"));
        assert!(!without.contains("segmentation.timestamps"));
    }

    #[test]
    fn segment_scoped_descriptors_use_their_family_rules() {
        let mut pool = Pool::new();
        pool.add_vector("segments.segment_0.desc.lowlevel.mfcc", vec![1.0, 2.0]).unwrap();
        let out = aggregate(&pool, &config(), 1).unwrap();
        assert!(out.contains("segments.segment_0.desc.lowlevel.mfcc.mean"));
        assert!(!out.contains("segments.segment_0.desc.lowlevel.mfcc.var"));
    }
}
