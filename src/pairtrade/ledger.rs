use serde::Serialize;

/// Running cash flow and traded volume of a round. Gross cash PnL and the
/// per-contract fee proxy are kept apart; the net figure is derived on
/// demand and never written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    cash_and_pnl: f64,
    contracts_traded: u64,
    fee_per_contract: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub cash_and_pnl: f64,
    pub contracts_traded: u64,
    pub fee_proxy: f64,
    pub net_pnl_estimate: f64,
}

impl Ledger {
    pub fn new(fee_per_contract: f64) -> Self {
        Self {
            fee_per_contract,
            ..Self::default()
        }
    }

    pub fn record(&mut self, cash_flow: f64, contracts: u64) {
        self.cash_and_pnl += cash_flow;
        self.contracts_traded = self.contracts_traded.saturating_add(contracts);
    }

    pub fn cash_and_pnl(&self) -> f64 {
        self.cash_and_pnl
    }

    pub fn contracts_traded(&self) -> u64 {
        self.contracts_traded
    }

    pub fn fee_proxy(&self) -> f64 {
        self.contracts_traded as f64 * self.fee_per_contract
    }

    pub fn net_pnl_estimate(&self) -> f64 {
        self.cash_and_pnl - self.fee_proxy()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            cash_and_pnl: self.cash_and_pnl,
            contracts_traded: self.contracts_traded,
            fee_proxy: self.fee_proxy(),
            net_pnl_estimate: self.net_pnl_estimate(),
        }
    }
}
