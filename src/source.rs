use log::debug;

use crate::error::{AnalysisError, Result};

/// Pull bridge to the embedding application's decoder.
///
/// Buffers are interleaved stereo f32 samples; `None` from `read` signals
/// end of stream. Every returned buffer is owned by the callee and freed
/// by `Drop`, exactly once. Each analysis pass runs a full
/// open → read* → close cycle of its own, so `open` must be restartable
/// and must rewind the stream to its beginning.
///
/// There is no cancellation channel here: a stalled `read` stalls the
/// whole pipeline. `progress` is advisory only.
pub trait AudioCallbacks {
    fn open(&mut self, sample_rate: u32, channels: u16) -> bool;
    fn read(&mut self) -> Option<Vec<f32>>;
    fn close(&mut self);
    fn progress(&mut self, _fraction: f32) {}
}

/// Stereo-to-processing-channel combination strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downmix {
    Mix,
    Left,
    Right,
}

impl Downmix {
    pub fn as_str(&self) -> &'static str {
        match self {
            Downmix::Mix => "mix",
            Downmix::Left => "left",
            Downmix::Right => "right",
        }
    }

    fn apply(&self, left: f32, right: f32) -> f32 {
        match self {
            Downmix::Mix => 0.5 * (left + right),
            Downmix::Left => left,
            Downmix::Right => right,
        }
    }
}

const CHANNELS: u16 = 2;

fn drain(cb: &mut dyn AudioCallbacks, sample_rate: f32, start_time: f32, end_time: f32) -> Result<Vec<(f32, f32)>> {
    if !cb.open(sample_rate as u32, CHANNELS) {
        return Err(AnalysisError::Source(format!(
            "source refused to open at {sample_rate} Hz / {CHANNELS} channels"
        )));
    }

    let first = (start_time * sample_rate) as usize;
    let last = (end_time * sample_rate) as usize;

    let mut frames = Vec::new();
    let mut position = 0usize;
    'pull: while let Some(buffer) = cb.read() {
        for pair in buffer.chunks_exact(CHANNELS as usize) {
            if position >= last {
                break 'pull;
            }
            if position >= first {
                frames.push((pair[0], pair[1]));
            }
            position += 1;
        }
    }
    cb.close();
    debug!("pulled {} stereo frames from source", frames.len());
    Ok(frames)
}

/// Pulls the trimmed stereo window as separate left/right channels.
/// Used by the panning pass, which needs both channels untouched.
pub fn load_stereo(
    cb: &mut dyn AudioCallbacks,
    sample_rate: f32,
    start_time: f32,
    end_time: f32,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let frames = drain(cb, sample_rate, start_time, end_time)?;
    let mut left = Vec::with_capacity(frames.len());
    let mut right = Vec::with_capacity(frames.len());
    for (l, r) in frames {
        left.push(l);
        right.push(r);
    }
    Ok((left, right))
}

/// Pulls the trimmed window as one mono channel, downmixed and scaled by
/// the replay gain. Every per-variant analysis pass goes through here.
pub fn load_mono(
    cb: &mut dyn AudioCallbacks,
    sample_rate: f32,
    start_time: f32,
    end_time: f32,
    downmix: Downmix,
    gain_db: f32,
) -> Result<Vec<f32>> {
    let scale = 10f32.powf(gain_db / 20.0);
    let frames = drain(cb, sample_rate, start_time, end_time)?;
    Ok(frames
        .into_iter()
        .map(|(l, r)| downmix.apply(l, r) * scale)
        .collect())
}

/// Equal-loudness pre-filter: a low-cut biquad against inaudible rumble
/// plus a gentle high-shelf cut, run in sequence. The exact curve is not
/// load-bearing for the pipeline; it only has to be a stable, non-trivial
/// loudness weighting so the two result variants genuinely differ.
pub fn equal_loudness(samples: &[f32], sample_rate: f32) -> Vec<f32> {
    let highpassed = biquad(samples, highpass_coeffs(sample_rate, 55.0, 0.707));
    biquad(&highpassed, highshelf_coeffs(sample_rate, 11000.0, -4.0))
}

struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

fn biquad(samples: &[f32], c: Biquad) -> Vec<f32> {
    let mut x1 = 0.0f32;
    let mut x2 = 0.0f32;
    let mut y1 = 0.0f32;
    let mut y2 = 0.0f32;
    samples
        .iter()
        .map(|&x| {
            let y = c.b0 * x + c.b1 * x1 + c.b2 * x2 - c.a1 * y1 - c.a2 * y2;
            x2 = x1;
            x1 = x;
            y2 = y1;
            y1 = y;
            y
        })
        .collect()
}

fn highpass_coeffs(sample_rate: f32, cutoff: f32, q: f32) -> Biquad {
    let w0 = 2.0 * std::f32::consts::PI * cutoff / sample_rate;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let a0 = 1.0 + alpha;
    Biquad {
        b0: (1.0 + cos_w0) / 2.0 / a0,
        b1: -(1.0 + cos_w0) / a0,
        b2: (1.0 + cos_w0) / 2.0 / a0,
        a1: -2.0 * cos_w0 / a0,
        a2: (1.0 - alpha) / a0,
    }
}

fn highshelf_coeffs(sample_rate: f32, cutoff: f32, gain_db: f32) -> Biquad {
    let a = 10f32.powf(gain_db / 40.0);
    let w0 = 2.0 * std::f32::consts::PI * cutoff / sample_rate;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() / 2.0 * std::f32::consts::SQRT_2;
    let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
    let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
    Biquad {
        b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
        b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
        b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
        a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
        a2: ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AudioCallbacks;

    /// In-memory callback source over interleaved stereo samples,
    /// restartable on every `open` as the contract requires.
    pub struct MemorySource {
        pub interleaved: Vec<f32>,
        position: usize,
        chunk: usize,
        pub opens: usize,
    }

    impl MemorySource {
        pub fn new(interleaved: Vec<f32>) -> Self {
            Self { interleaved, position: 0, chunk: 4096, opens: 0 }
        }

        pub fn stereo(left: &[f32], right: &[f32]) -> Self {
            let mut interleaved = Vec::with_capacity(left.len() * 2);
            for (l, r) in left.iter().zip(right) {
                interleaved.push(*l);
                interleaved.push(*r);
            }
            Self::new(interleaved)
        }

        pub fn mono(samples: &[f32]) -> Self {
            Self::stereo(samples, samples)
        }
    }

    impl AudioCallbacks for MemorySource {
        fn open(&mut self, _sample_rate: u32, _channels: u16) -> bool {
            self.position = 0;
            self.opens += 1;
            true
        }

        fn read(&mut self) -> Option<Vec<f32>> {
            if self.position >= self.interleaved.len() {
                return None;
            }
            let end = (self.position + self.chunk).min(self.interleaved.len());
            let buffer = self.interleaved[self.position..end].to_vec();
            self.position = end;
            Some(buffer)
        }

        fn close(&mut self) {}
    }
}
