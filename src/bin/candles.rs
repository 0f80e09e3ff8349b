use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::{Receiver, bounded};
use dotenvy::dotenv;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

use ws_replay::ReplaySession;
use ws_replay::candle::{Candle, CandleBook, parse_timeframe};
use ws_replay::cli::{ReplayArgs, exit_on_ctrlc, init_tracing};

#[derive(Debug, Parser)]
#[command(about = "Replay a captured WS log and build OHLC candles from its ticks")]
struct Args {
    #[command(flatten)]
    replay: ReplayArgs,

    /// Candle timeframe(s), e.g. 500us, 500ms, 1s, 3m (repeatable)
    #[arg(long = "tf", default_value = "1s", value_delimiter = ',')]
    timeframes: Vec<String>,

    /// Maximum candles kept per timeframe (oldest dropped)
    #[arg(long, default_value_t = 2048)]
    cap: usize,

    /// Number of most recent candles to print per timeframe
    #[arg(long, default_value_t = 1)]
    top: usize,
}

fn fmt_bucket(ns: u64) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ns))
        .ok()
        .and_then(|t| t.format(&fmt).ok())
        .unwrap_or_else(|| format!("{ns}ns"))
}

fn fmt_candle(c: &Candle) -> String {
    format!(
        "{} O={:.2} H={:.2} L={:.2} C={:.2} ticks={}",
        fmt_bucket(c.bucket_ns),
        c.open,
        c.high,
        c.low,
        c.close,
        c.ticks
    )
}

fn candle_worker(mut book: CandleBook, rx: Receiver<Vec<u8>>) -> CandleBook {
    for payload in rx {
        if let Err(e) = book.ingest(&payload) {
            debug!("skipping payload: {e:#}");
        }
    }
    book
}

fn main() -> Result<()> {
    let _ = dotenv();
    let args = Args::parse();
    init_tracing(args.replay.verbose);
    exit_on_ctrlc();

    let tfs = args
        .timeframes
        .iter()
        .map(|s| parse_timeframe(s))
        .collect::<Result<Vec<_>>>()?;
    let book = CandleBook::new(&tfs, args.cap)?;

    let mut session = ReplaySession::open(args.replay.to_options())
        .with_context(|| format!("create replay session for {:?}", args.replay.file))?;

    // Payloads are only valid inside the callback, so the sink copies them
    // before handing them to the decoding thread.
    let (tx, rx) = bounded::<Vec<u8>>(8192);
    let worker = std::thread::spawn(move || candle_worker(book, rx));

    let summary = session.run(|json| {
        if tx.send(json.to_vec()).is_err() {
            warn!("candle worker stopped; dropping payload");
        }
    })?;
    drop(tx);
    let book = worker.join().map_err(|_| anyhow!("candle worker panicked"))?;

    eprintln!(
        "Replayed {} frames in {} pass(es): {} ticks, {} ignored, {} bad payloads.",
        summary.delivered, summary.passes, book.ticks, book.ignored, book.bad_payloads
    );
    for (label, series) in args.timeframes.iter().zip(book.series()) {
        println!("tf={label} ({}ns): {} candles", series.timeframe_ns(), series.len());
        let skip = series.len().saturating_sub(args.top);
        for c in series.iter().skip(skip) {
            println!("  {}", fmt_candle(c));
        }
    }
    Ok(())
}
