//! OHLC candles built from replayed tick payloads.
//!
//! This is the downstream consumer used by the `candles` demo. The replay
//! engine never looks inside a payload; this module decodes payloads of the
//! shape
//!
//! ```text
//! {"response":{"BCastTime":"<unix secs>","data":{"ltp":"<price>"}}}
//! ```
//!
//! into ticks and folds them into fixed-width candle series. All state lives
//! in a [`CandleBook`] owned by the caller, so independent replays never share
//! accumulators.
use std::collections::VecDeque;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde::de::IgnoredAny;

const NS_PER_SEC: u64 = 1_000_000_000;

#[derive(Debug, Deserialize)]
struct Envelope {
    response: Option<Lenient<Response>>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(rename = "BCastTime")]
    bcast_time: Option<Lenient<String>>,
    data: Option<Lenient<TickData>>,
}

#[derive(Debug, Deserialize)]
struct TickData {
    ltp: Option<Lenient<String>>,
}

/// A field of the expected type, or any other JSON value (which carries no tick).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Expected(T),
    Other(#[allow(dead_code)] IgnoredAny),
}

impl<T> Lenient<T> {
    fn expected(self) -> Option<T> {
        match self {
            Lenient::Expected(v) => Some(v),
            Lenient::Other(_) => None,
        }
    }
}

/// A last-traded-price update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Broadcast time, whole seconds since the Unix epoch.
    pub ts_s: u64,
    pub price: f64,
}

/// Decode one payload. `Ok(None)` means valid JSON that carries no tick.
///
/// `BCastTime` and `ltp` are only read when they are JSON strings; any other
/// type (or a non-object `response`/`data`) is treated as "no tick". A string
/// that does not parse as a number is an error.
pub fn decode_tick(payload: &[u8]) -> Result<Option<Tick>> {
    let env: Envelope = serde_json::from_slice(payload).context("decode tick payload")?;
    let Some(resp) = env.response.and_then(Lenient::expected) else {
        return Ok(None);
    };
    let ts = resp.bcast_time.and_then(Lenient::expected);
    let ltp = resp
        .data
        .and_then(Lenient::expected)
        .and_then(|d| d.ltp)
        .and_then(Lenient::expected);
    let (Some(ts), Some(ltp)) = (ts, ltp) else {
        return Ok(None);
    };
    let ts_s = ts.trim().parse::<u64>().with_context(|| format!("BCastTime {ts:?}"))?;
    let price = ltp.trim().parse::<f64>().with_context(|| format!("ltp {ltp:?}"))?;
    Ok(Some(Tick { ts_s, price }))
}

/// Parse a timeframe such as `500us`, `250ms`, `1s`, `3m`, `1h` or bare nanoseconds.
pub fn parse_timeframe(s: &str) -> Result<u64> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    if num.is_empty() {
        bail!("timeframe {s:?} has no number");
    }
    let n: u64 = num.parse().with_context(|| format!("timeframe {s:?}"))?;
    let scale = match unit {
        "" | "ns" => 1,
        "us" => 1_000,
        "ms" => 1_000_000,
        "s" => NS_PER_SEC,
        "m" => 60 * NS_PER_SEC,
        "h" => 3_600 * NS_PER_SEC,
        other => bail!("unknown timeframe unit {other:?}"),
    };
    let ns = n.checked_mul(scale).with_context(|| format!("timeframe {s:?} overflows"))?;
    if ns == 0 {
        bail!("timeframe must be positive");
    }
    Ok(ns)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    /// Start of the bucket, ns since the Unix epoch.
    pub bucket_ns: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub ticks: u32,
}

impl Candle {
    fn new(bucket_ns: u64, price: f64) -> Self {
        Self { bucket_ns, open: price, high: price, low: price, close: price, ticks: 1 }
    }

    fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.ticks += 1;
    }
}

/// Candles of one fixed width, oldest first, capped at `cap` entries.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    tf_ns: u64,
    cap: usize,
    candles: VecDeque<Candle>,
}

impl CandleSeries {
    pub fn new(tf_ns: u64, cap: usize) -> Result<Self> {
        if tf_ns == 0 {
            bail!("timeframe must be positive");
        }
        if cap == 0 {
            bail!("candle capacity must be positive");
        }
        Ok(Self { tf_ns, cap, candles: VecDeque::with_capacity(cap.min(4096)) })
    }

    pub fn timeframe_ns(&self) -> u64 {
        self.tf_ns
    }

    /// Fold a price at `ts_ns` into its bucket.
    ///
    /// A tick older than the newest bucket is folded into the newest candle
    /// rather than reopening a closed one.
    pub fn push(&mut self, ts_ns: u64, price: f64) {
        let bucket = ts_ns - ts_ns % self.tf_ns;
        match self.candles.back_mut() {
            Some(last) if bucket <= last.bucket_ns => last.update(price),
            _ => {
                if self.candles.len() == self.cap {
                    self.candles.pop_front();
                }
                self.candles.push_back(Candle::new(bucket, price));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }
}

/// Caller-owned consumer state for one replay.
#[derive(Debug, Clone)]
pub struct CandleBook {
    series: Vec<CandleSeries>,
    /// Ticks folded into the series.
    pub ticks: u64,
    /// Payloads that were not valid JSON or had unparsable fields.
    pub bad_payloads: u64,
    /// Valid payloads without a tick.
    pub ignored: u64,
}

impl CandleBook {
    pub fn new(timeframes_ns: &[u64], cap: usize) -> Result<Self> {
        let series = timeframes_ns
            .iter()
            .map(|&tf| CandleSeries::new(tf, cap))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { series, ticks: 0, bad_payloads: 0, ignored: 0 })
    }

    /// Decode one payload and update every series.
    pub fn ingest(&mut self, payload: &[u8]) -> Result<()> {
        let tick = match decode_tick(payload) {
            Ok(Some(t)) => t,
            Ok(None) => {
                self.ignored += 1;
                return Ok(());
            }
            Err(e) => {
                self.bad_payloads += 1;
                return Err(e);
            }
        };
        let ts_ns = tick.ts_s.saturating_mul(NS_PER_SEC);
        for s in &mut self.series {
            s.push(ts_ns, tick.price);
        }
        self.ticks += 1;
        Ok(())
    }

    pub fn series(&self) -> &[CandleSeries] {
        &self.series
    }
}
