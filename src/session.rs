//! Playback controller.
//!
//! A [`ReplaySession`] owns its source and line buffer, reads the source
//! line by line, and hands each accepted payload to a caller-supplied sink
//! in source order. Per pass it applies, in this order: extraction (level,
//! filter, shape), the start-offset cutoff, pacing, delivery, and the
//! hard-stop counter.
//!
//! Pacing anchors on the first delivered frame of a pass: a frame with
//! timestamp `ns` is released at `wall_anchor + (ns - timing_base) / speed`.
//! Sink latency is not compensated, so a slow sink delays later frames.
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::clock::{scaled_target, sleep_until};
use crate::error::ReplayError;
use crate::frame::try_extract;
use crate::options::ReplayOptions;

/// Counters for one run (all passes).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Passes started.
    pub passes: u64,
    /// Raw lines read.
    pub lines: u64,
    /// Lines that were not frames (wrong level, filtered, malformed).
    pub rejected: u64,
    /// Frames dropped by the start-offset cutoff.
    pub skipped: u64,
    /// Frames handed to the sink.
    pub delivered: u64,
}

impl RunSummary {
    fn absorb(&mut self, pass: &PassStats) {
        self.passes += 1;
        self.lines += pass.lines;
        self.rejected += pass.rejected;
        self.skipped += pass.skipped;
        self.delivered += pass.delivered;
    }
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassEnd {
    /// Source exhausted.
    EndOfStream,
    /// A read error cut the pass short.
    ReadError,
    /// The hard-stop count was reached.
    HardStopped,
}

#[derive(Debug, Default)]
struct PassStats {
    lines: u64,
    rejected: u64,
    skipped: u64,
    delivered: u64,
    accepted_any: bool,
}

/// Pacing anchor captured on the first delivered frame of a pass.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    timing_base_ns: u64,
    wall: Instant,
}

/// A replay session over one source.
///
/// Not meant to be shared between threads; independent sessions are fully
/// isolated from each other. Dropping the session closes the source.
pub struct ReplaySession<R> {
    source: R,
    opts: ReplayOptions,
    line: Vec<u8>,
    /// Timestamp of the first accepted frame in the current pass.
    first_ns: Option<u64>,
}

impl ReplaySession<BufReader<File>> {
    /// Open the configured log file.
    pub fn open(opts: ReplayOptions) -> Result<Self, ReplayError> {
        let opts = opts.validated()?;
        let file = File::open(&opts.source).map_err(|source| ReplayError::Open {
            path: opts.source.clone(),
            source,
        })?;
        debug!(path = %opts.source.display(), "replay source opened");
        Ok(Self::with_validated(BufReader::new(file), opts))
    }
}

impl<R: BufRead + Seek> ReplaySession<R> {
    /// Replay from an already open source. `opts.source` is only used in logs.
    pub fn from_reader(reader: R, opts: ReplayOptions) -> Result<Self, ReplayError> {
        Ok(Self::with_validated(reader, opts.validated()?))
    }

    fn with_validated(source: R, opts: ReplayOptions) -> Self {
        Self { source, opts, line: Vec::with_capacity(4096), first_ns: None }
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.opts
    }

    /// Replay the source, calling `sink` once per delivered payload.
    ///
    /// Blocks until the run completes: after one pass, or when looping,
    /// after `max_passes` passes (forever if unbounded). Each pass starts from
    /// the beginning of the source with a fresh baseline, anchor, and
    /// hard-stop counter. The payload slice is only valid during the call.
    /// A read error ends the current pass like end of stream; a looping run
    /// then rewinds and carries on.
    pub fn run<F>(&mut self, mut sink: F) -> Result<RunSummary, ReplayError>
    where
        F: FnMut(&[u8]),
    {
        let limit = self.opts.pass_limit();
        let mut summary = RunSummary::default();

        while limit.is_none_or(|n| summary.passes < n) {
            self.rewind()?;
            let (stats, end) = self.run_pass(&mut sink);
            summary.absorb(&stats);

            let pass = summary.passes;
            if self.opts.verbose {
                info!(pass, delivered = stats.delivered, skipped = stats.skipped,
                      rejected = stats.rejected, ?end, "replay pass finished");
            } else {
                debug!(pass, delivered = stats.delivered, ?end, "replay pass finished");
            }

            if !self.opts.looping {
                break;
            }
            if end == PassEnd::EndOfStream && !stats.accepted_any {
                warn!(path = %self.opts.source.display(), "no eligible frames in source; stopping loop");
                break;
            }
        }
        Ok(summary)
    }

    fn rewind(&mut self) -> Result<(), ReplayError> {
        self.source.seek(SeekFrom::Start(0))?;
        self.first_ns = None;
        Ok(())
    }

    fn run_pass<F>(&mut self, sink: &mut F) -> (PassStats, PassEnd)
    where
        F: FnMut(&[u8]),
    {
        let Self { source, opts, line, first_ns } = self;
        let filter = opts.filter.as_deref().map(str::as_bytes);
        let offset_ns = opts.start_offset_ns();
        let mut anchor: Option<Anchor> = None;
        let mut stats = PassStats::default();

        loop {
            line.clear();
            match source.read_until(b'\n', line) {
                Ok(0) => return (stats, PassEnd::EndOfStream),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "read failed; ending pass");
                    return (stats, PassEnd::ReadError);
                }
            }
            stats.lines += 1;

            let Some(frame) = try_extract(line, filter) else {
                stats.rejected += 1;
                continue;
            };
            stats.accepted_any = true;

            let base = *first_ns.get_or_insert(frame.ns);
            let cutoff = base.saturating_add_signed(offset_ns);
            if frame.ns < cutoff {
                stats.skipped += 1;
                continue;
            }

            if !opts.no_sleep {
                let a = *anchor.get_or_insert_with(|| Anchor {
                    timing_base_ns: frame.ns,
                    wall: Instant::now(),
                });
                let delta = frame.ns.saturating_sub(a.timing_base_ns);
                match scaled_target(a.wall, delta, opts.speed) {
                    Some(target) => sleep_until(target),
                    None => warn!(ns = frame.ns, "delivery target out of range; not pacing frame"),
                }
            }

            trace!(ns = frame.ns, len = frame.json.len(), "deliver");
            sink(frame.json);
            stats.delivered += 1;

            if opts.hard_stop != 0 && stats.delivered >= opts.hard_stop {
                return (stats, PassEnd::HardStopped);
            }
        }
    }
}

/// Open a session, run it once to completion, and close it.
pub fn run_simple<F>(opts: ReplayOptions, sink: F) -> Result<RunSummary, ReplayError>
where
    F: FnMut(&[u8]),
{
    let mut session = ReplaySession::open(opts)?;
    session.run(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};

    fn session(text: &str, opts: ReplayOptions) -> ReplaySession<Cursor<Vec<u8>>> {
        ReplaySession::from_reader(Cursor::new(text.as_bytes().to_vec()), opts).unwrap()
    }

    fn collect(s: &mut ReplaySession<Cursor<Vec<u8>>>) -> (Vec<String>, RunSummary) {
        let mut out = Vec::new();
        let summary = s.run(|p| out.push(String::from_utf8_lossy(p).into_owned())).unwrap();
        (out, summary)
    }

    const LOG: &str = "\
100 | WS | 1:2 | a.c:1 | [msg] {\"i\":1}
105 | INFO | 1:2 | a.c:2 | [msg] {\"noise\":true}
200 | WS | 1:2 | a.c:1 | [msg] {\"i\":2,\"sym\":\"BANK\"}
300 | WS | 1:2 | a.c:1 | [msg] {\"i\":3}
";

    fn fast() -> ReplayOptions {
        ReplayOptions::new("mem").no_sleep(true)
    }

    #[test]
    fn delivers_ws_frames_in_order() {
        let mut s = session(LOG, fast());
        let (out, summary) = collect(&mut s);
        assert_eq!(out, vec![r#"{"i":1}"#, r#"{"i":2,"sym":"BANK"}"#, r#"{"i":3}"#]);
        assert_eq!(summary, RunSummary { passes: 1, lines: 4, rejected: 1, skipped: 0, delivered: 3 });
    }

    #[test]
    fn filter_limits_frames() {
        let mut s = session(LOG, fast().filter("BANK"));
        let (out, _) = collect(&mut s);
        assert_eq!(out, vec![r#"{"i":2,"sym":"BANK"}"#]);
    }

    #[test]
    fn offset_skips_without_moving_baseline() {
        // cutoff = 100 + 150 = 250 regardless of the skipped 200 frame
        let mut s = session(LOG, fast().start_offset_s(150e-9));
        let (out, summary) = collect(&mut s);
        assert_eq!(out, vec![r#"{"i":3}"#]);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn zero_timestamp_is_a_real_baseline() {
        let log = "0 | WS | a | b | [msg] {\"i\":0}\n5 | WS | a | b | [msg] {\"i\":5}\n";
        let mut s = session(log, fast().start_offset_s(3e-9));
        let (out, _) = collect(&mut s);
        assert_eq!(out, vec![r#"{"i":5}"#]);
    }

    #[test]
    fn hard_stop_ends_pass_early() {
        let mut s = session(LOG, fast().hard_stop(2));
        let (out, summary) = collect(&mut s);
        assert_eq!(out.len(), 2);
        // the 300 line is never read
        assert_eq!(summary.lines, 3);
    }

    #[test]
    fn loop_counts_hard_stop_per_pass() {
        let mut s = session(LOG, fast().looping(true).hard_stop(2).max_passes(3));
        let (out, summary) = collect(&mut s);
        assert_eq!(summary.passes, 3);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0..2], out[2..4]);
        assert_eq!(out[2..4], out[4..6]);
    }

    #[test]
    fn loop_stops_on_source_without_frames() {
        let mut s = session("1 | INFO | a | b | [msg] {}\n", fast().looping(true));
        let (out, summary) = collect(&mut s);
        assert!(out.is_empty());
        assert_eq!(summary.passes, 1);
    }

    #[test]
    fn rerun_starts_from_the_top() {
        let mut s = session(LOG, fast());
        let (first, _) = collect(&mut s);
        let (second, _) = collect(&mut s);
        assert_eq!(first, second);
    }

    #[test]
    fn last_line_without_newline_is_read() {
        let mut s = session("9 | WS | a | b | [msg] [1]", fast());
        let (out, _) = collect(&mut s);
        assert_eq!(out, vec!["[1]"]);
    }

    #[test]
    fn from_reader_validates_options() {
        let err = ReplaySession::from_reader(Cursor::new(Vec::<u8>::new()), ReplayOptions::default());
        assert!(matches!(err, Err(ReplayError::MissingSource)));
    }

    /// In-memory source whose reads fail once at `fail_at` on pass `fail_pass`
    /// (1-based), or whose rewinds always fail.
    struct FlakySource {
        inner: Cursor<Vec<u8>>,
        pass: u32,
        fail_pass: u32,
        fail_at: u64,
        failed: bool,
        seek_fails: bool,
    }

    impl FlakySource {
        fn new(text: &str, fail_pass: u32, fail_at: u64) -> Self {
            Self {
                inner: Cursor::new(text.as_bytes().to_vec()),
                pass: 0,
                fail_pass,
                fail_at,
                failed: false,
                seek_fails: false,
            }
        }
    }

    impl Read for FlakySource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = {
                let avail = self.fill_buf()?;
                let n = avail.len().min(buf.len());
                buf[..n].copy_from_slice(&avail[..n]);
                n
            };
            self.consume(n);
            Ok(n)
        }
    }

    impl BufRead for FlakySource {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            if self.pass == self.fail_pass && !self.failed && self.inner.position() >= self.fail_at {
                self.failed = true;
                return Err(io::Error::other("transient"));
            }
            self.inner.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.inner.consume(amt);
        }
    }

    impl Seek for FlakySource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if self.seek_fails {
                return Err(io::Error::other("cannot rewind"));
            }
            self.pass += 1;
            self.inner.seek(pos)
        }
    }

    const TWO: &str = "1 | WS | a | b | [msg] [1]\n2 | WS | a | b | [msg] [2]\n";

    fn run_flaky(src: FlakySource, opts: ReplayOptions) -> Result<(Vec<String>, RunSummary), ReplayError> {
        let mut s = ReplaySession::from_reader(src, opts)?;
        let mut out = Vec::new();
        let summary = s.run(|p| out.push(String::from_utf8_lossy(p).into_owned()))?;
        Ok((out, summary))
    }

    #[test]
    fn read_error_ends_pass_and_keeps_delivered_frames() {
        let second_line = TWO.find('\n').unwrap() as u64 + 1;
        let (out, summary) = run_flaky(FlakySource::new(TWO, 1, second_line), fast()).unwrap();
        assert_eq!(out, vec!["[1]"]);
        assert_eq!((summary.passes, summary.delivered), (1, 1));
    }

    #[test]
    fn loop_survives_read_error_before_first_frame() {
        let (out, summary) =
            run_flaky(FlakySource::new(TWO, 2, 0), fast().looping(true).max_passes(3)).unwrap();
        assert_eq!(summary.passes, 3);
        assert_eq!(summary.delivered, 4);
        assert_eq!(out, vec!["[1]", "[2]", "[1]", "[2]"]);
    }

    #[test]
    fn rewind_failure_is_an_error() {
        let mut src = FlakySource::new(TWO, 0, 0);
        src.seek_fails = true;
        let err = run_flaky(src, fast()).unwrap_err();
        assert!(matches!(err, ReplayError::Io(_)));
    }
}
