use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "cueplay", version)]
pub struct Args {
    /// Audio file to play as a cue
    #[arg(required_unless_present = "list_devices")]
    pub path: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Start of the played range in seconds
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// End of the played range in seconds (0 plays to the end of the file)
    #[arg(long, default_value_t = 0.0)]
    pub end: f64,

    /// Fade-in duration in seconds
    #[arg(long, default_value_t = 0.0)]
    pub fade_in: f64,

    /// Fade-out duration in seconds
    #[arg(long, default_value_t = 0.0)]
    pub fade_out: f64,

    /// Extra playthroughs after the first (-1 loops until interrupted)
    #[arg(long = "loop", default_value_t = 0, allow_negative_numbers = true)]
    pub repeat: i64,

    /// Master gain in dB
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub master: f32,

    /// Left channel gain in dB (enables separate channel gains)
    #[arg(long, allow_negative_numbers = true)]
    pub left: Option<f32>,

    /// Right channel gain in dB (enables separate channel gains)
    #[arg(long, allow_negative_numbers = true)]
    pub right: Option<f32>,

    /// Audio written per engine iteration in milliseconds (smaller reacts faster to commands)
    #[arg(long, default_value_t = 100)]
    pub chunk_ms: u64,

    /// Device queue depth in milliseconds
    #[arg(long, default_value_t = 200)]
    pub buffer_ms: u64,
}
