use std::fs::File;
use std::io::BufWriter;

use log::info;
use serde_json::{json, Map};

use crate::config::{Config, Setting};
use crate::error::{AnalysisError, Result};
use crate::pool::{Entry, Pool, Value};

/// Renders a pool as a nested document, splitting dotted descriptor
/// paths into objects.
pub fn pool_to_document(pool: &Pool) -> serde_json::Value {
    let mut root = Map::new();
    for (path, entry) in pool.iter() {
        let mut node = &mut root;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                node.insert(part.to_string(), entry_to_value(entry));
            } else {
                let child = node
                    .entry(part.to_string())
                    .or_insert_with(|| serde_json::Value::Object(Map::new()));
                node = match child {
                    serde_json::Value::Object(map) => map,
                    // a leaf and a namespace share a name; keep the leaf
                    _ => break,
                };
            }
        }
    }
    serde_json::Value::Object(root)
}

fn entry_to_value(entry: &Entry) -> serde_json::Value {
    match entry {
        Entry::Single(Value::Real(v)) => json!(v),
        Entry::Single(Value::Str(v)) => json!(v),
        Entry::Single(Value::Bool(v)) => json!(v),
        Entry::Single(Value::RealVec(v)) => json!(v),
        Entry::Single(Value::StrVec(v)) => json!(v),
        Entry::Reals(v) => json!(v),
        Entry::Strs(v) => json!(v),
        Entry::Vectors(v) => json!(v),
    }
}

/// Run options that describe file destinations, not the analysis; they
/// are not mirrored into the results.
const UNMIRRORED_OPTIONS: &[&str] = &["equalOutputPath", "nequalOutputPath", "outputFormat"];

/// Mirrors the effective run options into the results under a
/// `configuration` namespace, so a result file records how it was made.
/// Top-level options without a namespace of their own land under
/// `configuration.general`.
pub fn merge_config_into(pool: &mut Pool, config: &Config) -> Result<()> {
    for (name, setting) in config.iter() {
        if UNMIRRORED_OPTIONS.contains(&name) {
            continue;
        }
        let path = if name.contains('.') {
            format!("configuration.{name}")
        } else {
            format!("configuration.general.{name}")
        };
        match setting {
            Setting::Bool(v) => pool.set_bool(&path, *v)?,
            Setting::Real(v) => pool.set_real(&path, *v)?,
            Setting::Str(v) => pool.set_str(&path, v)?,
            Setting::List(values) => {
                for v in values {
                    pool.add(&path, Value::Str(v.clone()))?;
                }
            }
        }
    }
    Ok(())
}

/// Writes one variant's aggregated results to `path` in the configured
/// format. An empty path means this variant has no file destination.
pub fn write_results(pool: &Pool, config: &Config, path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    let document = pool_to_document(pool);
    let file = File::create(path).map_err(|e| AnalysisError::Output {
        path: path.to_string(),
        details: e.to_string(),
    })?;
    let writer = BufWriter::new(file);
    match config.string("outputFormat")? {
        "yaml" => serde_yml::to_writer(writer, &document).map_err(|e| AnalysisError::Output {
            path: path.to_string(),
            details: e.to_string(),
        })?,
        _ => {
            serde_json::to_writer_pretty(writer, &document).map_err(|e| AnalysisError::Output {
                path: path.to_string(),
                details: e.to_string(),
            })?
        }
    }
    info!("wrote results to {path}");
    Ok(())
}
