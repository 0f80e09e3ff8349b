use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::io::{self, Write};
use tracing::{debug, error, info};

use ws_replay::ReplaySession;
use ws_replay::cli::{ReplayArgs, exit_on_ctrlc, init_tracing};

#[derive(Debug, Parser)]
#[command(version, about = "Replay WS frames from a captured log, one JSON payload per stdout line")]
struct Args {
    #[command(flatten)]
    replay: ReplayArgs,
}

fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();
    let args = Args::parse();
    init_tracing(args.replay.verbose);
    exit_on_ctrlc();

    let opts = args.replay.to_options();
    let mut session = ReplaySession::open(opts)
        .with_context(|| format!("create replay session for {:?}", args.replay.file))?;
    debug!(options = ?session.options(), "replay session ready");

    let stdout = io::stdout();
    let summary = session.run(|json| {
        let mut out = stdout.lock();
        let res = out
            .write_all(json)
            .and_then(|_| out.write_all(b"\n"))
            .and_then(|_| out.flush());
        match res {
            Ok(()) => {}
            // a closed pipe (e.g. `| head`) is a normal way to stop reading
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => std::process::exit(0),
            Err(e) => {
                error!("write payload to stdout: {e}");
                std::process::exit(1);
            }
        }
    })?;

    info!(
        passes = summary.passes,
        delivered = summary.delivered,
        skipped = summary.skipped,
        rejected = summary.rejected,
        "replay finished"
    );
    Ok(())
}
