//! Stream options from `--config` JSON plus command line overrides

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use audioflow_core::{AudioOptions, SampleFormat, StreamConfig};

/// Flags shared by every streaming command
#[derive(Args, Debug, Clone, Default)]
pub struct StreamArgs {
    /// Device id from `audioflow devices`, -1 for the default device
    #[arg(long, allow_negative_numbers = true)]
    pub device: Option<i32>,

    /// Sample rate in Hz
    #[arg(long)]
    pub rate: Option<u32>,

    #[arg(long)]
    pub channels: Option<u16>,

    /// Sample format: int8, int16, int24, int32 or float32
    #[arg(long)]
    pub format: Option<SampleFormat>,

    /// Hardware buffer size in frames (0 lets the driver choose)
    #[arg(long)]
    pub frames: Option<u32>,

    /// JSON file with `inOptions` / `outOptions`; flags override it
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,
}

/// Which directions a command streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directions {
    Input,
    Output,
    Duplex,
}

impl StreamArgs {
    /// Build validated options for `directions`
    pub fn options(&self, directions: Directions) -> Result<AudioOptions> {
        let base = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                AudioOptions::from_json(&json)?
            }
            None => AudioOptions::default(),
        };
        self.merge(base, directions)
    }

    fn merge(&self, mut options: AudioOptions, directions: Directions) -> Result<AudioOptions> {
        let wants_input = directions != Directions::Output;
        let wants_output = directions != Directions::Input;

        options.input = wants_input.then(|| self.apply(options.input.take().unwrap_or_default()));
        options.output =
            wants_output.then(|| self.apply(options.output.take().unwrap_or_default()));

        options.validate()?;
        Ok(options)
    }

    fn apply(&self, mut config: StreamConfig) -> StreamConfig {
        if let Some(device) = self.device {
            config.device_id = device;
        }
        if let Some(rate) = self.rate {
            config.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            config.channel_count = channels;
        }
        if let Some(format) = self.format {
            config.sample_format = format;
        }
        if let Some(frames) = self.frames {
            config.frames_per_buffer = frames;
        }
        config
    }
}
