//! Log replay library.
//!
//! Replays previously captured, timestamp-prefixed WS log lines and hands
//! their JSON payloads to a consumer in original order, either paced like
//! the capture (optionally scaled) or as fast as the file can be read:
//!
//! - `frame`: recognizes eligible lines and extracts timestamp + payload
//! - `clock`: monotonic sleep-until gate used for pacing
//! - `options`: per-run replay options and their normalization
//! - `session`: the playback controller (offset, filter, speed, loop, hard stop)
//! - `candle`: example consumer that folds tick payloads into OHLC candles
//! - `cli`: command-line options and logging setup shared by the binaries
//!
//! The binaries (`src/main.rs` and `src/bin/candles.rs`) wire these modules
//! to the command line.
pub mod candle;
pub mod cli;
pub mod clock;
pub mod error;
pub mod frame;
pub mod options;
pub mod session;

pub use error::ReplayError;
pub use frame::{LogFrame, try_extract};
pub use options::ReplayOptions;
pub use session::{ReplaySession, RunSummary, run_simple};
