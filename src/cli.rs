//! Command-line surface shared by the replay binaries.
use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use tracing_subscriber::EnvFilter;

use crate::options::ReplayOptions;

/// Replay options as accepted on the command line (or from the environment).
#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// Log file to replay
    #[arg(short = 'f', long = "file", env = "REPLAY_FILE")]
    pub file: PathBuf,

    /// Speed factor (1.0 = captured pace, 2.0 = twice as fast)
    #[arg(short = 's', long, env = "REPLAY_SPEED", default_value_t = 1.0)]
    pub speed: f64,

    /// Skip the first N seconds of the capture
    #[arg(short = 'o', long = "offset", env = "REPLAY_OFFSET", default_value_t = 0.0)]
    pub offset_s: f64,

    /// Rewind and replay again at end of file
    #[arg(long = "loop", env = "REPLAY_LOOP", default_value_t = false)]
    pub looping: bool,

    /// Deliver as fast as possible, ignoring timestamps
    #[arg(long, env = "REPLAY_NO_SLEEP", default_value_t = false)]
    pub no_sleep: bool,

    /// Only replay lines containing this literal substring (e.g. a symbol)
    #[arg(long, env = "REPLAY_FILTER")]
    pub filter: Option<String>,

    /// Stop each pass after N delivered frames (0 = unlimited)
    #[arg(long = "max", env = "REPLAY_MAX", default_value_t = 0)]
    pub max: u64,

    /// With --loop, stop after N passes (0 = unlimited)
    #[arg(long, env = "REPLAY_PASSES", default_value_t = 0)]
    pub passes: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ReplayArgs {
    pub fn to_options(&self) -> ReplayOptions {
        let mut opts = ReplayOptions::new(&self.file)
            .speed(self.speed)
            .start_offset_s(self.offset_s)
            .looping(self.looping)
            .no_sleep(self.no_sleep)
            .hard_stop(self.max)
            .max_passes(self.passes)
            .verbose(self.verbose > 0);
        if let Some(f) = &self.filter {
            opts = opts.filter(f.clone());
        }
        opts
    }
}

/// Install a stderr `tracing` subscriber. `RUST_LOG` overrides the `-v` level.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Exit cleanly on Ctrl+C, flushing whatever was written to stdout.
pub fn exit_on_ctrlc() {
    ctrlc::set_handler(|| {
        let _ = std::io::stdout().flush();
        std::process::exit(0);
    })
    .ok();
}
