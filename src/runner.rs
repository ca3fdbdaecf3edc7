use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::PairTradeConfig;
use crate::pairtrade::{
    ConfirmationStats, Engine, LedgerSnapshot, OrderConfirmation, OrderState, TickOutcome,
};
use crate::pnl_log::{PnlLogRecord, PnlLogger};
use crate::ports::replay_feed::{open_replay, QuoteFeed};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub ticks: usize,
    pub rejected_ticks: usize,
    pub holdings: Vec<i64>,
    pub ledger: LedgerSnapshot,
    pub confirmations: ConfirmationStats,
}

/// Drives an [`Engine`] from a recorded quote feed, acting as the host: every
/// target change is reported back as filled.
pub struct PairTradeRunner {
    engine: Engine,
    feed: Box<dyn QuoteFeed>,
    pnl_logger: Option<PnlLogger>,
    interval: Duration,
}

impl PairTradeRunner {
    pub fn new(cfg: &PairTradeConfig) -> Result<Self> {
        let params = cfg.strategy_params();
        log::info!("[CONFIG] round {} parameters: {:?}", cfg.round, params);
        let engine = Engine::new(cfg.universe.clone(), params)?;
        let path = cfg
            .replay_file
            .as_deref()
            .ok_or_else(|| anyhow!("REPLAY_FILE is not set"))?;
        let feed = open_replay(
            path,
            cfg.replay_format,
            &cfg.universe,
            cfg.quote_half_spread,
        )
        .with_context(|| format!("failed to open replay {}", path))?;
        Ok(Self::with_feed(
            engine,
            feed,
            PnlLogger::from_config(cfg),
            Duration::from_millis(cfg.replay_interval_ms),
        ))
    }

    pub fn with_feed(
        engine: Engine,
        feed: Box<dyn QuoteFeed>,
        pnl_logger: Option<PnlLogger>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            feed,
            pnl_logger,
            interval,
        }
    }

    pub async fn run(&mut self) -> Result<ReplaySummary> {
        log::info!(
            "[REPLAY] starting on {}",
            self.feed.symbols().join(",")
        );
        let mut ticks = 0;
        let mut rejected_ticks = 0;

        while let Some(next) = self.feed.next_quotes().await? {
            match self.engine.process_quotes(next.tick, &next.quotes) {
                Ok(outcome) => {
                    ticks += 1;
                    let confirmations = confirm_all(&outcome);
                    self.engine.on_confirmations(&confirmations);
                    self.write_pnl_record(&outcome);
                }
                Err(e) => {
                    rejected_ticks += 1;
                    log::warn!("[TICK] {} rejected: {}", next.tick, e);
                }
            }
            if !self.interval.is_zero() {
                sleep(self.interval).await;
            }
        }

        let ledger = self.engine.ledger();
        log::info!(
            "[REPLAY] finished after {} ticks ({} rejected). PnL: {:.2}, contracts: {}, fee: {:.2}, net: {:.2}",
            ticks,
            rejected_ticks,
            ledger.cash_and_pnl(),
            ledger.contracts_traded(),
            ledger.fee_proxy(),
            ledger.net_pnl_estimate()
        );
        Ok(ReplaySummary {
            ticks,
            rejected_ticks,
            holdings: self.engine.holdings().to_vec(),
            ledger: ledger.snapshot(),
            confirmations: self.engine.confirmation_stats(),
        })
    }

    fn write_pnl_record(&mut self, outcome: &TickOutcome) {
        if let Some(logger) = &mut self.pnl_logger {
            let record =
                PnlLogRecord::from_outcome(outcome, self.engine.symbols(), Utc::now().timestamp_millis());
            if let Err(err) = logger.log(&record) {
                log::warn!("[PNL] failed to write pnl log: {:?}", err);
            }
        }
    }
}

/// One order per asset; an empty order is rejected.
fn confirm_all(outcome: &TickOutcome) -> Vec<OrderConfirmation> {
    outcome
        .order_deltas
        .iter()
        .enumerate()
        .map(|(asset, quantity)| OrderConfirmation {
            asset,
            quantity: *quantity,
            state: if *quantity != 0 {
                OrderState::Filled
            } else {
                OrderState::Rejected
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyParams;
    use crate::ports::replay_feed::CsvReplayFeed;
    use std::io::Write;

    fn params() -> StrategyParams {
        StrategyParams {
            minimum_correlation_stage_ticks: 3,
            maximum_correlation_stage_ticks: 8,
            ema_short: 3,
            ema_long: 3,
            trigger_signal: 2.0,
            close_signal: 0.3,
            position_change_on_trigger: 5,
            position_double_down_rate: 2,
            maximum_absolute_contracts: 40,
            fee_per_contract: 0.5,
        }
    }

    #[tokio::test]
    async fn replays_a_round_trip_from_csv() {
        let ratios = [
            1.00, 1.01, 1.00, 1.01, 1.00, 1.01, 1.00, 1.01, 1.00, 1.08, 1.08, 1.00, 1.00,
        ];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick,ERIE,ONTARIO").unwrap();
        for (i, r) in ratios.iter().enumerate() {
            let a = 101.0 + i as f64;
            writeln!(file, "{},{},{}", i + 1, a, a * r).unwrap();
        }
        file.flush().unwrap();

        let symbols = vec!["ERIE".to_string(), "ONTARIO".to_string()];
        let feed = CsvReplayFeed::from_path(file.path(), &symbols, 0.0).unwrap();
        let engine = Engine::new(symbols, params()).unwrap();
        let mut runner =
            PairTradeRunner::with_feed(engine, Box::new(feed), None, Duration::ZERO);

        let summary = runner.run().await.unwrap();
        assert_eq!(summary.ticks, 13);
        assert_eq!(summary.rejected_ticks, 0);
        assert_eq!(summary.holdings, vec![0, 0]);
        assert_eq!(summary.ledger.contracts_traded, 36);
        assert!((summary.ledger.cash_and_pnl - 79.2).abs() < 1e-6);
        assert_eq!(
            summary.confirmations,
            ConfirmationStats {
                filled: 4,
                rejected: 22,
                pending: 0
            }
        );
    }

    #[test]
    fn only_non_empty_orders_are_filled() {
        let outcome = TickOutcome {
            tick: 1,
            phase: crate::pairtrade::TickPhase::Trading,
            targets: vec![3, 0, -3],
            order_deltas: vec![3, 0, -3],
            pairs: Vec::new(),
            ledger: crate::pairtrade::Ledger::new(0.5).snapshot(),
        };
        let states: Vec<OrderState> = confirm_all(&outcome).iter().map(|c| c.state).collect();
        assert_eq!(
            states,
            vec![OrderState::Filled, OrderState::Rejected, OrderState::Filled]
        );
    }
}
