use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::PairTradeConfig;
use crate::pairtrade::{TickOutcome, TickPhase};

#[derive(Debug, Serialize)]
pub struct PnlLogRecord {
    pub ts: i64,
    pub tick: usize,
    pub phase: TickPhase,
    pub cash_and_pnl: f64,
    pub contracts_traded: u64,
    pub fee_proxy: f64,
    pub net_pnl_estimate: f64,
    pub targets: Vec<i64>,
    pub pairs: Vec<String>,
}

impl PnlLogRecord {
    pub fn from_outcome(outcome: &TickOutcome, symbols: &[String], ts: i64) -> Self {
        let name = |i: usize| symbols.get(i).map(String::as_str).unwrap_or("?");
        Self {
            ts,
            tick: outcome.tick,
            phase: outcome.phase,
            cash_and_pnl: outcome.ledger.cash_and_pnl,
            contracts_traded: outcome.ledger.contracts_traded,
            fee_proxy: outcome.ledger.fee_proxy,
            net_pnl_estimate: outcome.ledger.net_pnl_estimate,
            targets: outcome.targets.clone(),
            pairs: outcome
                .pairs
                .iter()
                .map(|p| format!("{}/{}", name(p.pair.x()), name(p.pair.y())))
                .collect(),
        }
    }
}

/// Appends one JSON line per tick to `pnl[-tag]-YYYYMMDD.jsonl`.
pub struct PnlLogger {
    dir: PathBuf,
    tag: Option<String>,
}

impl PnlLogger {
    pub fn new<P: AsRef<Path>>(dir: P, tag: Option<&str>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            tag: tag.map(sanitize_pnl_tag).filter(|t| !t.is_empty()),
        }
    }

    pub fn from_config(cfg: &PairTradeConfig) -> Option<Self> {
        if !cfg.pnl_log {
            return None;
        }
        Some(Self::new(&cfg.pnl_dir, cfg.pnl_tag.as_deref()))
    }

    pub fn log(&mut self, record: &PnlLogRecord) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(file, "{line}")
    }

    pub fn log_path(&self) -> PathBuf {
        let date = Utc::now().format("%Y%m%d").to_string();
        let mut name = String::from("pnl");
        if let Some(tag) = &self.tag {
            name.push('-');
            name.push_str(tag);
        }
        name.push('-');
        name.push_str(&date);
        name.push_str(".jsonl");
        self.dir.join(name)
    }
}

fn sanitize_pnl_tag(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
