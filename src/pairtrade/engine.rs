use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::error::Error;
use std::fmt;

use crate::config::{ConfigError, StrategyParams};

use super::filter::{self, LinearFit};
use super::history::PriceHistory;
use super::ledger::{Ledger, LedgerSnapshot};
use super::matcher;
use super::signal::{Decision, HoldSignal, SignalState};
use super::sizing::PositionSizer;
use super::stats::{PairStatistics, ZScore};
use super::PairKey;

#[derive(Debug)]
pub enum EngineError {
    UniverseTooSmall(usize),
    DuplicateSymbol(String),
    PriceCountMismatch { expected: usize, got: usize },
    InvalidPrice { asset: usize, price: f64 },
    OutOfSequence { expected: usize, got: usize },
    Config(ConfigError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UniverseTooSmall(n) => {
                write!(f, "universe needs at least two assets (got {})", n)
            }
            EngineError::DuplicateSymbol(s) => write!(f, "duplicate symbol in universe: {}", s),
            EngineError::PriceCountMismatch { expected, got } => {
                write!(f, "expected {} prices, got {}", expected, got)
            }
            EngineError::InvalidPrice { asset, price } => {
                write!(f, "invalid price {} for asset {}", price, asset)
            }
            EngineError::OutOfSequence { expected, got } => {
                write!(f, "tick {} out of sequence (expected {})", got, expected)
            }
            EngineError::Config(e) => write!(f, "invalid strategy parameters: {}", e),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EngineError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub offer: f64,
}

impl Quote {
    pub fn new(bid: f64, offer: f64) -> Self {
        Self { bid, offer }
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.offer) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    /// Before `minimum_correlation_stage_ticks`: prices are only recorded.
    Warmup,
    /// Correlations are observable but nothing trades yet.
    CorrelationStage,
    Trading,
}

/// What happened to one selected pair during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairReport {
    pub pair: PairKey,
    pub held_before: bool,
    pub z: Option<f64>,
    pub decision: Decision,
    pub signal: HoldSignal,
    pub target_x: i64,
    pub target_y: i64,
    pub cash_flow: f64,
    pub contracts: u64,
    pub clamped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickOutcome {
    pub tick: usize,
    pub phase: TickPhase,
    /// Desired signed holding per asset, in universe order.
    pub targets: Vec<i64>,
    /// `targets` minus the previous tick's holdings.
    pub order_deltas: Vec<i64>,
    pub pairs: Vec<PairReport>,
    pub ledger: LedgerSnapshot,
}

impl TickOutcome {
    pub fn is_noop(&self) -> bool {
        self.order_deltas.iter().all(|d| *d == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Filled,
    Rejected,
    Pending,
}

/// Host report on an order placed for one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub asset: usize,
    pub quantity: i64,
    pub state: OrderState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmationStats {
    pub filled: u64,
    pub rejected: u64,
    pub pending: u64,
}

/// Decision core of one trading round. All state is created by
/// [`Engine::new`] / [`Engine::start_round`] and advanced exactly once per
/// tick, in order.
#[derive(Debug)]
pub struct Engine {
    params: StrategyParams,
    symbols: Vec<String>,
    history: PriceHistory,
    stats: BTreeMap<PairKey, PairStatistics>,
    signals: BTreeMap<PairKey, SignalState>,
    holdings: Vec<i64>,
    held: BTreeSet<PairKey>,
    ledger: Ledger,
    tick: usize,
    confirmations: ConfirmationStats,
}

impl Engine {
    pub fn new(symbols: Vec<String>, params: StrategyParams) -> Result<Self, EngineError> {
        params.validate()?;
        if symbols.len() < 2 {
            return Err(EngineError::UniverseTooSmall(symbols.len()));
        }
        let mut seen = HashSet::new();
        for symbol in &symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(EngineError::DuplicateSymbol(symbol.clone()));
            }
        }

        let n = symbols.len();
        let keys = PairKey::all(n);
        log::info!(
            "[ROUND] tickers available this round: {} ({} pairs)",
            symbols.join(" "),
            keys.len()
        );
        Ok(Self {
            stats: keys.iter().map(|k| (*k, PairStatistics::new())).collect(),
            signals: keys.iter().map(|k| (*k, SignalState::default())).collect(),
            history: PriceHistory::new(n),
            holdings: vec![0; n],
            held: BTreeSet::new(),
            ledger: Ledger::new(params.fee_per_contract),
            tick: 0,
            confirmations: ConfirmationStats::default(),
            symbols,
            params,
        })
    }

    /// Discards every piece of round state and starts over on a new universe
    /// with the same parameters.
    pub fn start_round(&mut self, symbols: Vec<String>) -> Result<(), EngineError> {
        self.start_round_with(symbols, self.params.clone())
    }

    pub fn start_round_with(
        &mut self,
        symbols: Vec<String>,
        params: StrategyParams,
    ) -> Result<(), EngineError> {
        *self = Engine::new(symbols, params)?;
        Ok(())
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Ticks accepted since the round started.
    pub fn tick(&self) -> usize {
        self.tick
    }

    pub fn holdings(&self) -> &[i64] {
        &self.holdings
    }

    pub fn held_pairs(&self) -> &BTreeSet<PairKey> {
        &self.held
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn price_history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn pair_statistics(&self, key: PairKey) -> Option<&PairStatistics> {
        self.stats.get(&key)
    }

    pub fn signal_state(&self, key: PairKey) -> Option<SignalState> {
        self.signals.get(&key).copied()
    }

    pub fn confirmation_stats(&self) -> ConfirmationStats {
        self.confirmations
    }

    pub fn on_quotes(&mut self, quotes: &[Quote]) -> Result<TickOutcome, EngineError> {
        self.process_quotes(self.tick + 1, quotes)
    }

    pub fn process_quotes(&mut self, tick: usize, quotes: &[Quote]) -> Result<TickOutcome, EngineError> {
        let mids: Vec<f64> = quotes.iter().map(Quote::mid).collect();
        self.process_tick(tick, &mids)
    }

    pub fn on_prices(&mut self, prices: &[f64]) -> Result<TickOutcome, EngineError> {
        self.process_tick(self.tick + 1, prices)
    }

    /// Processes tick number `tick` (1-based). Anything but the next tick in
    /// sequence is rejected, so a tick can never be replayed. A rejected tick
    /// leaves all state untouched.
    pub fn process_tick(&mut self, tick: usize, prices: &[f64]) -> Result<TickOutcome, EngineError> {
        let expected = self.tick + 1;
        if tick != expected {
            return Err(EngineError::OutOfSequence {
                expected,
                got: tick,
            });
        }
        self.validate_prices(prices)?;

        self.history.append(prices);
        for (key, stats) in self.stats.iter_mut() {
            stats.push_ratio(prices[key.y()] / prices[key.x()]);
        }
        self.tick = tick;
        let previous = self.holdings.clone();

        if tick < self.params.minimum_correlation_stage_ticks {
            log::debug!("[TICK] {} warming up", tick);
            return Ok(self.outcome(TickPhase::Warmup, &previous, Vec::new()));
        }
        if tick < self.params.maximum_correlation_stage_ticks {
            self.log_correlation_stage();
            return Ok(self.outcome(TickPhase::CorrelationStage, &previous, Vec::new()));
        }

        let reports = self.trade(prices);
        Ok(self.outcome(TickPhase::Trading, &previous, reports))
    }

    /// Advisory only: confirmations are logged and counted but never change
    /// holdings. A rejected order therefore leaves the engine believing it
    /// holds a position the host does not have.
    pub fn on_confirmations(&mut self, confirmations: &[OrderConfirmation]) {
        for c in confirmations {
            let symbol = self
                .symbols
                .get(c.asset)
                .map(String::as_str)
                .unwrap_or("?");
            match c.state {
                OrderState::Filled => {
                    self.confirmations.filled += 1;
                    log::info!("[CONFIRM] order for {} filled ({})", symbol, c.quantity);
                }
                OrderState::Rejected => {
                    self.confirmations.rejected += 1;
                    if c.quantity != 0 {
                        log::warn!(
                            "[CONFIRM] order for {} rejected ({}); engine holding {} may diverge from the host",
                            symbol,
                            c.quantity,
                            self.holdings.get(c.asset).copied().unwrap_or_default()
                        );
                    } else {
                        log::debug!("[CONFIRM] empty order for {} rejected", symbol);
                    }
                }
                OrderState::Pending => {
                    self.confirmations.pending += 1;
                    log::debug!("[CONFIRM] order for {} pending ({})", symbol, c.quantity);
                }
            }
        }
    }

    fn validate_prices(&self, prices: &[f64]) -> Result<(), EngineError> {
        if prices.len() != self.symbols.len() {
            return Err(EngineError::PriceCountMismatch {
                expected: self.symbols.len(),
                got: prices.len(),
            });
        }
        for (asset, price) in prices.iter().enumerate() {
            if !(price.is_finite() && *price > 0.0) {
                return Err(EngineError::InvalidPrice {
                    asset,
                    price: *price,
                });
            }
        }
        Ok(())
    }

    fn trade(&mut self, prices: &[f64]) -> Vec<PairReport> {
        let (ema_short, ema_long) = (self.params.ema_short, self.params.ema_long);
        let mut scores: BTreeMap<PairKey, ZScore> = BTreeMap::new();
        for (key, stats) in self.stats.iter_mut() {
            match stats.evaluate(ema_short, ema_long) {
                Some(score) => {
                    scores.insert(*key, score);
                }
                None => log::debug!("[PAIR] {} has no signal this tick", key),
            }
        }

        let candidates = filter::select_candidates(&self.history, &scores, &self.held);
        if candidates.is_empty() && self.held.is_empty() {
            log::debug!("[TICK] {} no candidate pairs", self.tick);
            return Vec::new();
        }

        let matching = matcher::best_combination(&candidates, self.symbols.len());
        let held: Vec<PairKey> = self.held.iter().copied().collect();
        let selection = matcher::select_pairs(&held, &matching);
        log::debug!(
            "[TICK] {} held={} candidates={} matched={:?} score={:.3}",
            self.tick,
            held.len(),
            candidates.len(),
            matching.pairs,
            matching.score
        );

        let mut reports = Vec::with_capacity(selection.len());
        for key in selection {
            let held_before = self.held.contains(&key);
            let report = match scores.get(&key) {
                Some(score) => self.apply_signal(key, score.z, prices, held_before),
                None => {
                    log::warn!(
                        "[PAIR] held pair {} has no defined z-score this tick; keeping position",
                        key
                    );
                    self.keep_report(key)
                }
            };
            reports.push(report);
        }
        reports
    }

    fn apply_signal(&mut self, key: PairKey, z: f64, prices: &[f64], held_before: bool) -> PairReport {
        let (x, y) = (key.x(), key.y());
        let mut state = self.signals.get(&key).copied().unwrap_or_default();
        let transition = state.transition(z, self.params.trigger_signal, self.params.close_signal);
        let (prev_x, prev_y) = (self.holdings[x], self.holdings[y]);
        let sized = PositionSizer::new(&self.params).size(z, transition, prev_x, prev_y);

        let change = sized.x - prev_x;
        let cash_flow = change as f64 * (prices[y] - prices[x]);
        let contracts = change.unsigned_abs() + (sized.y - prev_y).unsigned_abs();
        self.ledger.record(cash_flow, contracts);

        state.commit(transition);
        self.signals.insert(key, state);
        self.holdings[x] = sized.x;
        self.holdings[y] = sized.y;
        if sized.x != 0 || sized.y != 0 {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }

        if transition.is_close_and_reverse() {
            log::info!("[PAIR] {} closing and reversing at z={:.3}", key, z);
        }
        if sized.clamped {
            log::debug!(
                "[PAIR] {} redistributed to respect {} contracts",
                key,
                self.params.maximum_absolute_contracts
            );
        }
        log::info!(
            "[PAIR] {} z={:.3} {}/{} {} holdings: {}, {} holdings: {}, PnL: {:.2}, fee: {:.2}",
            key,
            z,
            transition.decision.label(),
            transition.signal.label(),
            self.symbols[x],
            sized.x,
            self.symbols[y],
            sized.y,
            self.ledger.net_pnl_estimate(),
            self.ledger.fee_proxy()
        );

        PairReport {
            pair: key,
            held_before,
            z: Some(z),
            decision: transition.decision,
            signal: transition.signal,
            target_x: sized.x,
            target_y: sized.y,
            cash_flow,
            contracts,
            clamped: sized.clamped,
        }
    }

    fn keep_report(&self, key: PairKey) -> PairReport {
        let state = self.signals.get(&key).copied().unwrap_or_default();
        PairReport {
            pair: key,
            held_before: true,
            z: None,
            decision: state.prev_decision(),
            signal: state.prev_signal(),
            target_x: self.holdings[key.x()],
            target_y: self.holdings[key.y()],
            cash_flow: 0.0,
            contracts: 0,
            clamped: false,
        }
    }

    fn log_correlation_stage(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        for key in self.stats.keys() {
            match LinearFit::fit(self.history.series(key.x()), self.history.series(key.y())) {
                Some(fit) => log::debug!(
                    "[CORR] tick {} {} correlation={:.4} fit={} se(slope)={:?} se(intercept)={:?} residual var={:?}",
                    self.tick,
                    key,
                    fit.correlation,
                    fit,
                    fit.slope_std_err(),
                    fit.intercept_std_err(),
                    fit.residual_variance()
                ),
                None => log::debug!("[CORR] tick {} {} correlation undefined", self.tick, key),
            }
        }
    }

    fn outcome(&self, phase: TickPhase, previous: &[i64], pairs: Vec<PairReport>) -> TickOutcome {
        TickOutcome {
            tick: self.tick,
            phase,
            targets: self.holdings.clone(),
            order_deltas: self
                .holdings
                .iter()
                .zip(previous)
                .map(|(now, before)| now - before)
                .collect(),
            pairs,
            ledger: self.ledger.snapshot(),
        }
    }
}
