use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::ReplayFormat;
use crate::pairtrade::Quote;

#[derive(Debug)]
pub enum FeedError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json { line: usize, source: serde_json::Error },
    MissingSymbol(String),
    BadValue { row: usize, symbol: String, raw: String },
    Empty,
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Io(e) => write!(f, "failed to read replay file: {}", e),
            FeedError::Csv(e) => write!(f, "CSV parse error: {}", e),
            FeedError::Json { line, source } => {
                write!(f, "failed to parse replay entry on line {}: {}", line, source)
            }
            FeedError::MissingSymbol(s) => write!(f, "symbol '{}' not found in replay data", s),
            FeedError::BadValue { row, symbol, raw } => {
                write!(f, "row {}: bad price '{}' for {}", row, raw, symbol)
            }
            FeedError::Empty => write!(f, "replay file is empty"),
        }
    }
}

impl Error for FeedError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FeedError::Io(e) => Some(e),
            FeedError::Csv(e) => Some(e),
            FeedError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Io(err)
    }
}

impl From<csv::Error> for FeedError {
    fn from(err: csv::Error) -> Self {
        FeedError::Csv(err)
    }
}

/// Quotes of one tick, in universe order.
#[derive(Debug, Clone, PartialEq)]
pub struct TickQuotes {
    pub tick: usize,
    pub quotes: Vec<Quote>,
}

/// Source of per-tick quotes for the engine.
#[async_trait]
pub trait QuoteFeed: Send {
    fn symbols(&self) -> &[String];

    /// `Ok(None)` once the feed is exhausted.
    async fn next_quotes(&mut self) -> Result<Option<TickQuotes>, FeedError>;
}

/// Opens a recorded feed for `universe`. The file may list more symbols than
/// the universe; each universe symbol must be present.
pub fn open_replay<P: AsRef<Path>>(
    path: P,
    format: ReplayFormat,
    universe: &[String],
    half_spread: f64,
) -> Result<Box<dyn QuoteFeed>, FeedError> {
    let feed: Box<dyn QuoteFeed> = match format {
        ReplayFormat::Csv => Box::new(CsvReplayFeed::from_path(path, universe, half_spread)?),
        ReplayFormat::Jsonl => Box::new(JsonlReplayFeed::from_path(path, universe)?),
    };
    Ok(feed)
}

/// In-memory replay shared by both file formats.
#[derive(Debug)]
struct Replay {
    symbols: Vec<String>,
    ticks: Vec<TickQuotes>,
    cursor: usize,
}

impl Replay {
    fn new(symbols: &[String], ticks: Vec<TickQuotes>) -> Result<Self, FeedError> {
        if ticks.is_empty() {
            return Err(FeedError::Empty);
        }
        log::info!(
            "[REPLAY] loaded {} ticks for {}",
            ticks.len(),
            symbols.join(",")
        );
        Ok(Self {
            symbols: symbols.to_vec(),
            ticks,
            cursor: 0,
        })
    }

    fn advance(&mut self) -> Option<TickQuotes> {
        let next = self.ticks.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(next)
    }
}

/// CSV with a header of symbols and one row of prices per tick. A `tick`
/// column, when present, is ignored. Quotes are synthesized at
/// `price +/- half_spread`.
#[derive(Debug)]
pub struct CsvReplayFeed {
    replay: Replay,
}

impl CsvReplayFeed {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        universe: &[String],
        half_spread: f64,
    ) -> Result<Self, FeedError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let headers = reader.headers()?.clone();
        let columns = universe
            .iter()
            .map(|symbol| {
                headers
                    .iter()
                    .position(|h| h.trim() == symbol)
                    .ok_or_else(|| FeedError::MissingSymbol(symbol.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut ticks = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let row = i + 1;
            let mut quotes = Vec::with_capacity(columns.len());
            for (symbol, column) in universe.iter().zip(&columns) {
                let raw = record.get(*column).unwrap_or("").trim();
                let price: f64 = raw.parse().map_err(|_| FeedError::BadValue {
                    row,
                    symbol: symbol.clone(),
                    raw: raw.to_string(),
                })?;
                quotes.push(Quote::new(price - half_spread, price + half_spread));
            }
            ticks.push(TickQuotes { tick: row, quotes });
        }

        Ok(Self {
            replay: Replay::new(universe, ticks)?,
        })
    }
}

#[async_trait]
impl QuoteFeed for CsvReplayFeed {
    fn symbols(&self) -> &[String] {
        &self.replay.symbols
    }

    async fn next_quotes(&mut self) -> Result<Option<TickQuotes>, FeedError> {
        Ok(self.replay.advance())
    }
}

#[derive(Debug, Deserialize)]
struct DumpedQuote {
    bid: f64,
    offer: f64,
}

// One line of the JSONL dump
#[derive(Debug, Deserialize)]
struct DumpedTick {
    #[serde(default)]
    tick: Option<usize>,
    quotes: HashMap<String, DumpedQuote>,
}

/// One JSON object per line:
/// `{"tick": n, "quotes": {"SYM": {"bid": .., "offer": ..}}}`. Lines without
/// a tick number are numbered sequentially.
#[derive(Debug)]
pub struct JsonlReplayFeed {
    replay: Replay,
}

impl JsonlReplayFeed {
    pub fn from_path<P: AsRef<Path>>(path: P, universe: &[String]) -> Result<Self, FeedError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut ticks = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: DumpedTick = serde_json::from_str(&line)
                .map_err(|source| FeedError::Json { line: i + 1, source })?;
            let quotes = universe
                .iter()
                .map(|symbol| {
                    entry
                        .quotes
                        .get(symbol)
                        .map(|q| Quote::new(q.bid, q.offer))
                        .ok_or_else(|| FeedError::MissingSymbol(symbol.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let tick = entry.tick.unwrap_or(ticks.len() + 1);
            ticks.push(TickQuotes { tick, quotes });
        }

        Ok(Self {
            replay: Replay::new(universe, ticks)?,
        })
    }
}

#[async_trait]
impl QuoteFeed for JsonlReplayFeed {
    fn symbols(&self) -> &[String] {
        &self.replay.symbols
    }

    async fn next_quotes(&mut self) -> Result<Option<TickQuotes>, FeedError> {
        Ok(self.replay.advance())
    }
}
