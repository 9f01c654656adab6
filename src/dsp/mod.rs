//! Self-contained analysis units invoked by the pipeline stages.
//!
//! Each unit is a parameterized function over plain sample or feature
//! slices; none of them touch the result store or the configuration
//! directly. The stages own the wiring.

pub mod fades;
pub mod frames;
pub mod level;
pub mod panning;
pub mod rhythm;
pub mod sbic;
pub mod spectral;
pub mod tonal;
