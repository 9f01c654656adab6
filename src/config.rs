use std::collections::BTreeMap;

use crate::error::{AnalysisError, Result};

/// One configuration value. A path populated via `set_*` is a singleton;
/// a path populated via `add_str` is an append-only ordered list. The two
/// shapes never mix on the same path.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    Bool(bool),
    Real(f32),
    Str(String),
    List(Vec<String>),
}

/// Flat namespaced store of analysis options.
///
/// Built once from the default table, then overridden wholesale by caller
/// values via a replace merge, then validated. Immutable during a run.
#[derive(Debug, Clone)]
pub struct Config {
    entries: BTreeMap<String, Setting>,
}

/// The resolved set of passes to run, computed once during validation so
/// stage selection never depends on ad hoc flag combinations at run time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StagePlan {
    pub eqloud: bool,
    pub neqloud: bool,
    pub lowlevel: bool,
    pub midlevel: bool,
    pub panning: bool,
    pub fades: bool,
    pub segmentation: bool,
    pub seg_lowlevel: bool,
    pub seg_midlevel: bool,
    pub seg_panning: bool,
    pub seg_fades: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut c = Config { entries: BTreeMap::new() };

        // general
        c.put_bool("equalLoudness", true);
        c.put_bool("nequalLoudness", false);
        c.put_bool("shortSound", false);
        c.put_real("startTime", 0.0);
        c.put_real("endTime", 2000.0);
        c.put_real("analysisSampleRate", 44100.0);
        c.put_str("equalOutputPath", "");
        c.put_str("nequalOutputPath", "");
        c.put_str("outputFormat", "json");

        // svm classifiers are an external collaborator; flag kept for
        // config round-tripping only
        c.put_bool("svm.compute", false);

        // segmentation
        c.put_bool("segmentation.compute", false);
        c.put_real("segmentation.size1", 300.0);
        c.put_real("segmentation.inc1", 60.0);
        c.put_real("segmentation.size2", 200.0);
        c.put_real("segmentation.inc2", 20.0);
        c.put_real("segmentation.cpw", 1.5);
        c.put_real("segmentation.minimumSegmentsLength", 10.0);
        for gate in [
            "lowlevel",
            "average_loudness",
            "rhythm.beats",
            "rhythm.beats.loudness",
            "rhythm.bpmhistogram",
            "rhythm.onset",
            "rhythm.danceability",
            "tonal",
            "sfx",
            "panning",
            "fades",
        ] {
            c.put_bool(&format!("segmentation.desc.{gate}.compute"), false);
        }

        // lowlevel
        c.put_bool("lowlevel.compute", false);
        c.put_real("lowlevel.frameSize", 2048.0);
        c.put_real("lowlevel.hopSize", 1024.0);
        c.put_real("lowlevel.zeroPadding", 0.0);
        c.put_str("lowlevel.windowType", "blackmanharris62");
        c.put_str("lowlevel.silentFrames", "noise");

        // average_loudness
        c.put_bool("average_loudness.compute", false);
        c.put_real("average_loudness.frameSize", 88200.0);
        c.put_real("average_loudness.hopSize", 44100.0);
        c.put_str("average_loudness.windowType", "hann");
        c.put_str("average_loudness.silentFrames", "noise");

        // rhythm
        c.put_bool("rhythm.beats.compute", true);
        c.put_str("rhythm.beats.method", "degara");
        c.put_real("rhythm.beats.minTempo", 40.0);
        c.put_real("rhythm.beats.maxTempo", 208.0);
        c.put_bool("rhythm.beats.loudness.compute", false);
        c.put_bool("rhythm.bpmhistogram.compute", false);
        c.put_bool("rhythm.onset.compute", false);
        c.put_bool("rhythm.danceability.compute", false);
        c.put_real("rhythm.danceability.minTau", 310.0);
        c.put_real("rhythm.danceability.maxTau", 8800.0);
        c.put_real("rhythm.danceability.tauMultiplier", 1.1);

        // tonal
        c.put_bool("tonal.compute", false);
        c.put_real("tonal.frameSize", 4096.0);
        c.put_real("tonal.hopSize", 2048.0);
        c.put_real("tonal.zeroPadding", 0.0);
        c.put_str("tonal.windowType", "blackmanharris62");
        c.put_str("tonal.silentFrames", "noise");

        // sfx
        c.put_bool("sfx.compute", false);

        // panning
        c.put_bool("panning.compute", false);
        c.put_real("panning.frameSize", 4096.0);
        c.put_real("panning.hopSize", 2048.0);
        c.put_real("panning.averageFrames", 43.0);
        c.put_real("panning.panningBins", 512.0);
        c.put_real("panning.numCoeffs", 20.0);
        c.put_real("panning.numBands", 1.0);
        c.put_bool("panning.warpedPanorama", true);
        c.put_real("panning.zeroPadding", 8192.0);
        c.put_str("panning.windowType", "hann");
        c.put_str("panning.silentFrames", "noise");

        // fades
        c.put_bool("fades.compute", false);
        c.put_real("fades.frameSize", 11025.0);
        c.put_real("fades.hopSize", 256.0);
        c.put_real("fades.frameRate", 172.265625);
        c.put_real("fades.minLength", 3.0);
        c.put_real("fades.cutoffHigh", 0.85);
        c.put_real("fades.cutoffLow", 0.20);
        c.put_str("fades.silentFrames", "noise");

        // statistics selected per namespace by the aggregation step
        let stats = ["mean", "var", "median", "min", "max", "dmean", "dmean2", "dvar", "dvar2"];
        for ns in ["lowlevel", "tonal", "rhythm", "sfx"] {
            c.entries.insert(
                format!("{ns}.stats"),
                Setting::List(stats.iter().map(|s| s.to_string()).collect()),
            );
        }
        // covariance stats over high-dimensional cepstral frames can blow
        // up on singular matrices, so only the mean is kept for those
        c.entries
            .insert("lowlevel.mfccStats".into(), Setting::List(vec!["mean".into()]));
        c.entries
            .insert("panning.stats".into(), Setting::List(vec!["copy".into()]));
        c.entries
            .insert("fades.stats".into(), Setting::List(vec!["copy".into()]));

        c
    }
}

impl Config {
    /// A config with no entries at all; callers building overrides start
    /// here so `merge_overrides` only sees what they actually set.
    pub fn empty() -> Self {
        Config { entries: BTreeMap::new() }
    }

    fn put_bool(&mut self, name: &str, value: bool) {
        self.entries.insert(name.to_string(), Setting::Bool(value));
    }

    fn put_real(&mut self, name: &str, value: f32) {
        self.entries.insert(name.to_string(), Setting::Real(value));
    }

    fn put_str(&mut self, name: &str, value: &str) {
        self.entries.insert(name.to_string(), Setting::Str(value.to_string()));
    }

    /// Singleton write. Fails if the path was previously built as a list.
    pub fn set_value(&mut self, name: &str, value: Setting) -> Result<()> {
        if matches!(value, Setting::List(_)) {
            return Err(AnalysisError::Configuration(format!(
                "'{name}': lists are built element-wise via add_str"
            )));
        }
        if let Some(Setting::List(_)) = self.entries.get(name) {
            return Err(AnalysisError::Configuration(format!(
                "'{name}' holds a list and cannot be overwritten by a single value"
            )));
        }
        self.entries.insert(name.to_string(), value);
        Ok(())
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.set_value(name, Setting::Bool(value))
    }

    pub fn set_real(&mut self, name: &str, value: f32) -> Result<()> {
        self.set_value(name, Setting::Real(value))
    }

    pub fn set_str(&mut self, name: &str, value: &str) -> Result<()> {
        self.set_value(name, Setting::Str(value.to_string()))
    }

    /// Append write. Fails if the path holds a singleton.
    pub fn add_str(&mut self, name: &str, value: &str) -> Result<()> {
        match self.entries.get_mut(name) {
            Some(Setting::List(list)) => {
                list.push(value.to_string());
                Ok(())
            }
            Some(_) => Err(AnalysisError::Configuration(format!(
                "'{name}' holds a single value and cannot be appended to"
            ))),
            None => {
                self.entries
                    .insert(name.to_string(), Setting::List(vec![value.to_string()]));
                Ok(())
            }
        }
    }

    /// Replace merge: any path present in `overrides` wins wholesale,
    /// every other path keeps its current value.
    pub fn merge_overrides(&mut self, overrides: &Config) {
        for (name, value) in &overrides.entries {
            self.entries.insert(name.clone(), value.clone());
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.entries.get(name) {
            Some(Setting::Bool(v)) => Ok(*v),
            Some(Setting::Real(v)) => Ok(*v != 0.0),
            Some(other) => Err(AnalysisError::Configuration(format!(
                "'{name}' is not a flag: {other:?}"
            ))),
            None => Err(AnalysisError::Configuration(format!("unknown option '{name}'"))),
        }
    }

    pub fn real(&self, name: &str) -> Result<f32> {
        match self.entries.get(name) {
            Some(Setting::Real(v)) => Ok(*v),
            Some(other) => Err(AnalysisError::Configuration(format!(
                "'{name}' is not a number: {other:?}"
            ))),
            None => Err(AnalysisError::Configuration(format!("unknown option '{name}'"))),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str> {
        match self.entries.get(name) {
            Some(Setting::Str(v)) => Ok(v.as_str()),
            Some(other) => Err(AnalysisError::Configuration(format!(
                "'{name}' is not a string: {other:?}"
            ))),
            None => Err(AnalysisError::Configuration(format!("unknown option '{name}'"))),
        }
    }

    pub fn list(&self, name: &str) -> Result<&[String]> {
        match self.entries.get(name) {
            Some(Setting::List(v)) => Ok(v.as_slice()),
            Some(other) => Err(AnalysisError::Configuration(format!(
                "'{name}' is not a list: {other:?}"
            ))),
            None => Err(AnalysisError::Configuration(format!("unknown option '{name}'"))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Setting> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Setting)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether a feature gate is on for the current pass. Whole-track
    /// passes read `<gate>.compute`; segment passes read the
    /// corresponding `segmentation.desc.<gate>.compute` instead.
    pub fn gate(&self, gate: &str, segment_pass: bool) -> Result<bool> {
        if segment_pass {
            self.flag(&format!("segmentation.desc.{gate}.compute"))
        } else {
            self.flag(&format!("{gate}.compute"))
        }
    }

    /// Resolves derived flags and the full stage plan. Rejects a config
    /// that requests neither loudness variant. Called once, before any
    /// audio is read.
    pub fn validate(&mut self) -> Result<StagePlan> {
        // beat positions are an input to both of these, so requesting
        // either forces beat tracking on
        if self.flag("rhythm.beats.loudness.compute")? || self.flag("rhythm.bpmhistogram.compute")? {
            self.put_bool("rhythm.beats.compute", true);
        }

        let eqloud = self.flag("equalLoudness")?;
        let neqloud = self.flag("nequalLoudness")?;
        if !eqloud && !neqloud {
            return Err(AnalysisError::Configuration(
                "both equal loudness and non equal loudness are disabled; at least one result \
                 variant must be requested"
                    .into(),
            ));
        }

        let segmentation = self.flag("segmentation.compute")?;
        let lowlevel = self.flag("lowlevel.compute")?
            || self.flag("average_loudness.compute")?
            || self.flag("tonal.compute")?
            || self.flag("sfx.compute")?
            || self.flag("rhythm.beats.compute")?
            || self.flag("rhythm.onset.compute")?
            || self.flag("rhythm.danceability.compute")?
            || segmentation;
        let midlevel =
            self.flag("tonal.compute")? || self.flag("rhythm.beats.loudness.compute")?;

        let seg_lowlevel = self.flag("segmentation.desc.lowlevel.compute")?
            || self.flag("segmentation.desc.average_loudness.compute")?
            || self.flag("segmentation.desc.tonal.compute")?
            || self.flag("segmentation.desc.sfx.compute")?
            || self.flag("segmentation.desc.rhythm.beats.compute")?
            || self.flag("segmentation.desc.rhythm.onset.compute")?
            || self.flag("segmentation.desc.rhythm.danceability.compute")?;
        let seg_midlevel = self.flag("segmentation.desc.tonal.compute")?
            || self.flag("segmentation.desc.rhythm.beats.loudness.compute")?;

        Ok(StagePlan {
            eqloud,
            neqloud,
            lowlevel,
            midlevel,
            panning: self.flag("panning.compute")?,
            fades: self.flag("fades.compute")?,
            segmentation,
            seg_lowlevel,
            seg_midlevel,
            seg_panning: self.flag("segmentation.desc.panning.compute")?,
            seg_fades: self.flag("segmentation.desc.fades.compute")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_replaces_only_overridden_paths() {
        let mut config = Config::default();
        let mut overrides = Config::empty();
        overrides.set_real("rhythm.beats.minTempo", 60.0).unwrap();

        config.merge_overrides(&overrides);

        assert_eq!(config.real("rhythm.beats.minTempo").unwrap(), 60.0);
        // untouched paths keep their defaults
        assert_eq!(config.real("rhythm.beats.maxTempo").unwrap(), 208.0);
        assert_eq!(config.string("rhythm.beats.method").unwrap(), "degara");
    }

    #[test]
    fn merge_replaces_lists_wholesale() {
        let mut config = Config::default();
        let mut overrides = Config::empty();
        overrides.add_str("lowlevel.stats", "mean").unwrap();

        config.merge_overrides(&overrides);
        assert_eq!(config.list("lowlevel.stats").unwrap(), ["mean".to_string()]);
    }

    #[test]
    fn set_and_add_shapes_do_not_mix() {
        let mut config = Config::default();
        assert!(config.add_str("rhythm.beats.method", "multifeature").is_err());
        assert!(config
            .set_value("lowlevel.stats", Setting::Str("mean".into()))
            .is_err());
    }

    #[test]
    fn beats_loudness_implies_beats() {
        let mut config = Config::default();
        config.set_bool("rhythm.beats.compute", false).unwrap();
        config.set_bool("rhythm.beats.loudness.compute", true).unwrap();
        let plan = config.validate().unwrap();
        assert!(config.flag("rhythm.beats.compute").unwrap());
        assert!(plan.lowlevel);
        assert!(plan.midlevel);
    }

    #[test]
    fn neither_variant_is_rejected() {
        let mut config = Config::default();
        config.set_bool("equalLoudness", false).unwrap();
        config.set_bool("nequalLoudness", false).unwrap();
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::Configuration(_))
        ));
    }

    #[test]
    fn segment_gates_feed_the_plan() {
        let mut config = Config::default();
        config.set_bool("segmentation.compute", true).unwrap();
        config
            .set_bool("segmentation.desc.rhythm.beats.compute", true)
            .unwrap();
        let plan = config.validate().unwrap();
        assert!(plan.segmentation);
        assert!(plan.seg_lowlevel);
        assert!(!plan.seg_midlevel);
        assert!(!plan.seg_panning);
    }
}
