use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hound::{SampleFormat, WavReader};
use log::{info, warn};

use trackscan::{analyze, AudioCallbacks, Config, Setting};

#[derive(Parser)]
#[command(name = "trackscan")]
#[command(about = "Extract rhythm, tonal and loudness descriptors from an audio file")]
struct Args {
    /// WAV file to analyze
    input_file: PathBuf,

    /// Results file for the equal-loudness variant
    #[arg(short, long, default_value = "")]
    output: String,

    /// Results file for the non-equal-loudness variant (enables that variant)
    #[arg(long, default_value = "")]
    output_nequal: String,

    /// Output format: 'json' or 'yaml'
    #[arg(long, default_value = "json")]
    format: String,

    /// Analysis window start in seconds
    #[arg(long)]
    start: Option<f32>,

    /// Analysis window end in seconds
    #[arg(long)]
    end: Option<f32>,

    /// Run change-point segmentation and re-analyze each segment
    #[arg(long)]
    segmentation: bool,

    /// Treat the input as a short sound effect (skips the duration check)
    #[arg(long)]
    short_sound: bool,

    /// Extra option overrides as name=value, may be repeated
    #[arg(long = "set", value_name = "NAME=VALUE")]
    overrides: Vec<String>,
}

/// Streams a WAV file through the analysis callbacks. `open` rewinds by
/// reopening the file, so repeated passes all see the full stream.
struct WavSource {
    path: PathBuf,
    reader: Option<WavReader<BufReader<File>>>,
    channels: u16,
}

const READ_FRAMES: usize = 4096;

impl WavSource {
    fn new(path: PathBuf) -> Result<Self> {
        let reader = WavReader::open(&path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        let channels = reader.spec().channels;
        if channels == 0 || channels > 2 {
            bail!("{} has {} channels; only mono and stereo are supported", path.display(), channels);
        }
        Ok(Self { path, reader: None, channels })
    }

    fn native_sample_rate(&self) -> Result<u32> {
        let reader = WavReader::open(&self.path)
            .with_context(|| format!("cannot open {}", self.path.display()))?;
        Ok(reader.spec().sample_rate)
    }
}

impl AudioCallbacks for WavSource {
    fn open(&mut self, sample_rate: u32, _channels: u16) -> bool {
        match WavReader::open(&self.path) {
            Ok(reader) => {
                if reader.spec().sample_rate != sample_rate {
                    warn!(
                        "file is {} Hz but {} Hz was requested; analysis keeps the file rate",
                        reader.spec().sample_rate,
                        sample_rate
                    );
                }
                self.reader = Some(reader);
                true
            }
            Err(e) => {
                warn!("reopening {} failed: {e}", self.path.display());
                false
            }
        }
    }

    fn read(&mut self) -> Option<Vec<f32>> {
        let reader = self.reader.as_mut()?;
        let spec = reader.spec();
        let scale = match spec.sample_format {
            SampleFormat::Int => 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32,
            SampleFormat::Float => 1.0,
        };

        let mut buffer = Vec::with_capacity(READ_FRAMES * 2);
        let samples_wanted = READ_FRAMES * self.channels as usize;
        let mut decode_error = None;
        if spec.sample_format == SampleFormat::Float {
            for sample in reader.samples::<f32>().take(samples_wanted) {
                match sample {
                    Ok(s) => buffer.push(s),
                    Err(e) => {
                        decode_error = Some(e);
                        break;
                    }
                }
            }
        } else {
            for sample in reader.samples::<i32>().take(samples_wanted) {
                match sample {
                    Ok(s) => buffer.push(s as f32 * scale),
                    Err(e) => {
                        decode_error = Some(e);
                        break;
                    }
                }
            }
        }
        if let Some(e) = decode_error {
            // keep what decoded cleanly, then treat the stream as ended
            warn!("decode error in {}: {e}; stopping after the readable audio", self.path.display());
            self.reader = None;
        }
        if buffer.is_empty() {
            return None;
        }
        if self.channels == 1 {
            // duplicate mono into both stereo slots
            buffer = buffer.iter().flat_map(|s| [*s, *s]).collect();
        }
        Some(buffer)
    }

    fn close(&mut self) {
        self.reader = None;
    }
}

fn parse_override(config: &mut Config, raw: &str) -> Result<()> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("override '{raw}' is not name=value"))?;
    let setting = if let Ok(flag) = value.parse::<bool>() {
        Setting::Bool(flag)
    } else if let Ok(number) = value.parse::<f32>() {
        Setting::Real(number)
    } else {
        Setting::Str(value.to_string())
    };
    config.set_value(name, setting)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut source = WavSource::new(args.input_file.clone())?;

    let mut overrides = Config::empty();
    overrides.set_str("equalOutputPath", &args.output)?;
    overrides.set_str("nequalOutputPath", &args.output_nequal)?;
    if !args.output_nequal.is_empty() {
        overrides.set_bool("nequalLoudness", true)?;
    }
    overrides.set_str("outputFormat", &args.format)?;
    if let Some(start) = args.start {
        overrides.set_real("startTime", start)?;
    }
    if let Some(end) = args.end {
        overrides.set_real("endTime", end)?;
    }
    if args.segmentation {
        overrides.set_bool("segmentation.compute", true)?;
    }
    if args.short_sound {
        overrides.set_bool("shortSound", true)?;
    }
    for raw in &args.overrides {
        parse_override(&mut overrides, raw)?;
    }
    // analyze at the file's own rate instead of resampling
    overrides.set_real("analysisSampleRate", source.native_sample_rate()? as f32)?;

    info!("analyzing {}", args.input_file.display());
    let analysis = analyze(&mut source, &overrides)?;

    for group in &analysis.groups {
        match group.values.len() {
            1 => println!("{:?}: {:.3}", group.kind, group.values[0]),
            n => println!("{:?}: {} values", group.kind, n),
        }
    }
    if !args.output.is_empty() {
        println!("equal-loudness results written to {}", args.output);
    }
    if !args.output_nequal.is_empty() {
        println!("non-equal-loudness results written to {}", args.output_nequal);
    }
    Ok(())
}
