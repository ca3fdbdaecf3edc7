//! Pair selection, signal generation and position sizing for a tick-driven
//! pairs strategy.
//!
//! One [`Engine`] owns a trading round. Each tick it appends prices, updates
//! per-pair ratio statistics, filters and matches pairs, runs the per-pair
//! signal machine and sizes both legs of every selected pair.

pub mod engine;
pub mod filter;
pub mod history;
pub mod ledger;
pub mod matcher;
pub mod signal;
pub mod sizing;
pub mod stats;

use serde::Serialize;
use std::fmt;

pub use engine::{
    ConfirmationStats, Engine, EngineError, OrderConfirmation, OrderState, PairReport, Quote,
    TickOutcome, TickPhase,
};
pub use ledger::{Ledger, LedgerSnapshot};
pub use signal::{Decision, HoldSignal, Phase, SignalState};

/// Unordered asset pair stored as `(lower, higher)` index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PairKey {
    x: usize,
    y: usize,
}

impl PairKey {
    /// Returns `None` when both indices name the same asset.
    pub fn new(a: usize, b: usize) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { x: a, y: b }),
            std::cmp::Ordering::Greater => Some(Self { x: b, y: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn x(&self) -> usize {
        self.x
    }

    pub fn y(&self) -> usize {
        self.y
    }

    pub fn contains(&self, asset: usize) -> bool {
        self.x == asset || self.y == asset
    }

    pub fn overlaps(&self, other: &PairKey) -> bool {
        self.contains(other.x) || self.contains(other.y)
    }

    /// Every unordered pair of a universe of `num_assets`, in `(x, y)` order.
    pub fn all(num_assets: usize) -> Vec<PairKey> {
        let mut keys = Vec::with_capacity(num_assets * num_assets.saturating_sub(1) / 2);
        for x in 0..num_assets {
            for y in (x + 1)..num_assets {
                keys.push(PairKey { x, y });
            }
        }
        keys
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.x, self.y)
    }
}
