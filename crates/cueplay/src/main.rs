//! cueplay: load one audio file as a cue and play it through the cue engine.
//!
//! Trims, fades, looping and gains come from the command line. The process exits when the cue
//! stops or the output fails; Ctrl-C asks the engine to quit and waits for it.

mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cue_engine::{
    CpalOutput, CpalOutputConfig, Cue, EngineConfig, Fade, Loop, PlaybackListener, PlaybackState,
    Range, Volume, device,
};
use tracing_subscriber::EnvFilter;

/// Logs engine events as they are relayed.
struct LogListener {
    name: String,
}

impl PlaybackListener for LogListener {
    fn state_changed(&mut self, state: PlaybackState) {
        tracing::info!(cue = %self.name, state = ?state, "state");
    }

    fn position_changed(&mut self, elapsed_ms: u64) {
        tracing::debug!(cue = %self.name, elapsed_ms, "position");
    }
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,cue_engine=info")
        }))
        .init();

    if args.list_devices {
        device::list_devices(&cpal::default_host())?;
        return Ok(());
    }

    let path = args.path.as_deref().context("no audio file given")?;
    let mut cue = Cue::from_file(path)?;
    cue.set_range(Range::new(args.start, args.end));
    cue.set_fade(Fade::new(args.fade_in, args.fade_out));
    cue.set_loop(Loop::new(args.repeat));
    cue.set_volume(volume_from_args(&args));
    tracing::info!(
        cue = %cue.description(),
        volume = %cue.volume(),
        fade = %cue.params().fade,
        repeat = cue.repeat().count(),
        "cue ready"
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("install Ctrl-C handler")?;

    let config = EngineConfig {
        chunk_ms: args.chunk_ms,
        ..EngineConfig::default()
    };
    let output = CpalOutput::factory(CpalOutputConfig {
        device: args.device.clone(),
        buffer_ms: args.buffer_ms,
    });
    let name = cue.description();
    let engine = cue.start_engine(config, output)?;
    engine.subscribe(Box::new(LogListener { name }));
    engine.play();

    loop {
        if interrupted.load(Ordering::SeqCst) {
            tracing::info!("interrupted");
            break;
        }
        engine.wait_event(Duration::from_millis(100));
        match engine.state() {
            PlaybackState::Stopped => {
                // Let the device queue drain before closing it.
                std::thread::sleep(Duration::from_millis(args.buffer_ms));
                break;
            }
            PlaybackState::Ended => break,
            _ => {}
        }
    }

    cue.stop_engine()
}

fn volume_from_args(args: &cli::Args) -> Volume {
    if args.left.is_none() && args.right.is_none() {
        return Volume::master_only(args.master);
    }
    Volume::new(
        args.master,
        args.left.unwrap_or(0.0),
        args.right.unwrap_or(0.0),
        true,
    )
}
