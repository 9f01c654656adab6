use thiserror::Error;

/// Errors an analysis run can surface to the caller.
///
/// Recoverable conditions (the downmix fallback during replay-gain
/// estimation) are handled inside the stage that owns them and never show
/// up here. Everything below aborts the whole `analyze` call; no partial
/// result store is serialized or returned alongside one of these.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Contradictory configuration, rejected before any audio is read.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A descriptor path was written with a value shape incompatible with
    /// its previous occurrence in the same store.
    #[error("type mismatch for descriptor '{path}': {details}")]
    TypeConsistency { path: String, details: String },

    /// Gain estimation failed under both downmix strategies; the input
    /// reads as pure silence and no meaningful descriptors can be produced.
    #[error("audio looks like a completely silent file, aborting")]
    SilentFile,

    /// Not enough audio for a single loudness frame (track under ~2 s)
    /// while full-track statistics were requested.
    #[error("audio is too short for full-track analysis (< {min_seconds} s)")]
    TooShort { min_seconds: f32 },

    /// A stage needed a descriptor an upstream pass was supposed to
    /// produce, and it is absent.
    #[error("{stage}: required descriptor '{path}' is missing")]
    MissingDescriptor { stage: &'static str, path: String },

    /// The callback source refused to open or misbehaved mid-read.
    #[error("audio source error: {0}")]
    Source(String),

    #[error("failed to write output file '{path}': {details}")]
    Output { path: String, details: String },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
