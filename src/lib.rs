//! Multi-pass audio feature extraction over a caller-provided decoder.
//!
//! One call to [`analyze`] runs the complete pipeline: replay-gain
//! estimation with a downmix fallback, the conditional low/mid/high
//! level analysis passes, optional change-point segmentation with
//! per-segment re-analysis, statistical aggregation and file output.
//! Audio is pulled through the [`AudioCallbacks`] trait, so any decoder
//! that can rewind and hand out interleaved stereo f32 buffers works
//! as a source.

pub mod aggregate;
pub mod config;
pub mod dsp;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod stages;

pub use config::{Config, Setting, StagePlan};
pub use error::{AnalysisError, Result};
pub use pipeline::{analyze, Analysis, GroupKind, ResultGroup};
pub use pool::{Entry, Pool, Value};
pub use source::{AudioCallbacks, Downmix};
