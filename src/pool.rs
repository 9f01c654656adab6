use std::collections::BTreeMap;

use crate::error::{AnalysisError, Result};

/// A single value accepted by [`Pool::set`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f32),
    Str(String),
    Bool(bool),
    RealVec(Vec<f32>),
    StrVec(Vec<String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Real(_) => "real",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::RealVec(_) => "real vector",
            Value::StrVec(_) => "string vector",
        }
    }
}

/// What lives under one descriptor path: either a scalar written via `set`
/// (overwritten on repeat set) or an append-only series built via `add`.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Single(Value),
    Reals(Vec<f32>),
    Strs(Vec<String>),
    Vectors(Vec<Vec<f32>>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Single(v) => v.kind(),
            Entry::Reals(_) => "real series",
            Entry::Strs(_) => "string series",
            Entry::Vectors(_) => "vector series",
        }
    }
}

/// Hierarchical, namespaced accumulator for analysis results.
///
/// Paths are dotted strings (`rhythm.beats.position`). A path's shape is
/// fixed by its first write: mixing `set` and `add` on the same path, or
/// appending an element of a different type, is rejected at the point of
/// mutation. Iteration order is sorted by path, so serialization and
/// aggregation are deterministic.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    entries: BTreeMap<String, Entry>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a scalar descriptor. Repeating a `set` on the same path
    /// overwrites, but only with a value of the same type.
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        match self.entries.get(path) {
            None => {}
            Some(Entry::Single(old)) if old.kind() == value.kind() => {}
            Some(old) => {
                return Err(AnalysisError::TypeConsistency {
                    path: path.to_string(),
                    details: format!("cannot set {} over existing {}", value.kind(), old.kind()),
                });
            }
        }
        self.entries.insert(path.to_string(), Entry::Single(value));
        Ok(())
    }

    /// Appends one element to the series at `path`, creating the series on
    /// first use. Insertion order is preserved.
    pub fn add(&mut self, path: &str, value: Value) -> Result<()> {
        let mismatch = |old: &Entry, new: &Value| AnalysisError::TypeConsistency {
            path: path.to_string(),
            details: format!("cannot add {} to existing {}", new.kind(), old.kind()),
        };
        match self.entries.get_mut(path) {
            None => {
                let entry = match value {
                    Value::Real(v) => Entry::Reals(vec![v]),
                    Value::Str(v) => Entry::Strs(vec![v]),
                    Value::RealVec(v) => Entry::Vectors(vec![v]),
                    other => {
                        return Err(AnalysisError::TypeConsistency {
                            path: path.to_string(),
                            details: format!("cannot build a series of {}", other.kind()),
                        });
                    }
                };
                self.entries.insert(path.to_string(), entry);
                Ok(())
            }
            Some(Entry::Reals(series)) => match value {
                Value::Real(v) => {
                    series.push(v);
                    Ok(())
                }
                other => Err(mismatch(&Entry::Reals(vec![]), &other)),
            },
            Some(Entry::Strs(series)) => match value {
                Value::Str(v) => {
                    series.push(v);
                    Ok(())
                }
                other => Err(mismatch(&Entry::Strs(vec![]), &other)),
            },
            Some(Entry::Vectors(series)) => match value {
                Value::RealVec(v) => {
                    series.push(v);
                    Ok(())
                }
                other => Err(mismatch(&Entry::Vectors(vec![]), &other)),
            },
            Some(single @ Entry::Single(_)) => Err(mismatch(single, &value)),
        }
    }

    pub fn set_real(&mut self, path: &str, value: f32) -> Result<()> {
        self.set(path, Value::Real(value))
    }

    pub fn set_str(&mut self, path: &str, value: &str) -> Result<()> {
        self.set(path, Value::Str(value.to_string()))
    }

    pub fn set_bool(&mut self, path: &str, value: bool) -> Result<()> {
        self.set(path, Value::Bool(value))
    }

    pub fn add_real(&mut self, path: &str, value: f32) -> Result<()> {
        self.add(path, Value::Real(value))
    }

    pub fn add_vector(&mut self, path: &str, value: Vec<f32>) -> Result<()> {
        self.add(path, Value::RealVec(value))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn real(&self, path: &str) -> Option<f32> {
        match self.entries.get(path)? {
            Entry::Single(Value::Real(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn string(&self, path: &str) -> Option<&str> {
        match self.entries.get(path)? {
            Entry::Single(Value::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn reals(&self, path: &str) -> Option<&[f32]> {
        match self.entries.get(path)? {
            Entry::Reals(v) => Some(v.as_slice()),
            Entry::Single(Value::RealVec(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn vectors(&self, path: &str) -> Option<&[Vec<f32>]> {
        match self.entries.get(path)? {
            Entry::Vectors(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    /// Evicts every descriptor whose path is `prefix` itself or starts
    /// with `prefix` plus the namespace separator. `rhythm.beats` does not
    /// match `rhythm.beatsloudness`.
    pub fn remove_namespace(&mut self, prefix: &str) {
        let dotted = format!("{prefix}.");
        self.entries
            .retain(|path, _| path != prefix && !path.starts_with(&dotted));
    }

    pub fn descriptor_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_preserves_insertion_order() {
        let mut pool = Pool::new();
        for v in [3.0, 1.0, 2.0] {
            pool.add_real("rhythm.beats.position", v).unwrap();
        }
        assert_eq!(pool.reals("rhythm.beats.position").unwrap(), &[3.0, 1.0, 2.0]);
    }

    #[test]
    fn set_overwrites_same_type_only() {
        let mut pool = Pool::new();
        pool.set_real("metadata.audio_properties.replay_gain", 3.0).unwrap();
        pool.set_real("metadata.audio_properties.replay_gain", 5.0).unwrap();
        assert_eq!(pool.real("metadata.audio_properties.replay_gain"), Some(5.0));

        let err = pool.set_str("metadata.audio_properties.replay_gain", "loud");
        assert!(matches!(err, Err(AnalysisError::TypeConsistency { .. })));
    }

    #[test]
    fn mixing_set_and_add_is_rejected() {
        let mut pool = Pool::new();
        pool.set_real("lowlevel.average_loudness", 0.5).unwrap();
        assert!(matches!(
            pool.add_real("lowlevel.average_loudness", 0.6),
            Err(AnalysisError::TypeConsistency { .. })
        ));

        let mut pool = Pool::new();
        pool.add_real("lowlevel.loudness", 0.5).unwrap();
        assert!(matches!(
            pool.set_real("lowlevel.loudness", 0.6),
            Err(AnalysisError::TypeConsistency { .. })
        ));
    }

    #[test]
    fn series_element_type_is_fixed() {
        let mut pool = Pool::new();
        pool.add_vector("lowlevel.mfcc", vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            pool.add_real("lowlevel.mfcc", 1.0),
            Err(AnalysisError::TypeConsistency { .. })
        ));
    }

    #[test]
    fn remove_namespace_respects_separator() {
        let mut pool = Pool::new();
        pool.set_real("rhythm.bpm", 120.0).unwrap();
        pool.add_real("rhythm.beats.position", 0.5).unwrap();
        pool.set_real("rhythm.beatsish", 1.0).unwrap();
        pool.remove_namespace("rhythm.beats");
        assert!(!pool.contains("rhythm.beats.position"));
        assert!(pool.contains("rhythm.bpm"));
        assert!(pool.contains("rhythm.beatsish"));
    }

    #[test]
    fn descriptor_names_are_sorted() {
        let mut pool = Pool::new();
        pool.set_real("tonal.key_strength", 0.4).unwrap();
        pool.set_real("lowlevel.average_loudness", 0.9).unwrap();
        let names: Vec<_> = pool.descriptor_names().collect();
        assert_eq!(names, vec!["lowlevel.average_loudness", "tonal.key_strength"]);
    }
}
