use std::collections::{BTreeMap, BTreeSet};

use super::history::PriceHistory;
use super::stats::ZScore;
use super::PairKey;

/// Ordinary least squares fit of `y` on `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    pub n: usize,
    pub slope: f64,
    pub intercept: f64,
    pub correlation: f64,
    pub r2: f64,
    // residual variance and the two coefficient variances; undefined for n <= 2
    svar: Option<f64>,
    svar0: Option<f64>,
    svar1: Option<f64>,
}

impl LinearFit {
    /// `None` when the series differ in length, hold fewer than two points,
    /// or either of them is constant.
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.len() != y.len() || x.len() < 2 {
            return None;
        }
        let n = x.len();
        let nf = n as f64;
        let sum_x: f64 = x.iter().sum();
        let sum_y: f64 = y.iter().sum();
        let sum_x2: f64 = x.iter().map(|v| v * v).sum();
        let x_bar = sum_x / nf;
        let y_bar = sum_y / nf;

        let (mut xx, mut yy, mut xy) = (0.0, 0.0, 0.0);
        for (xi, yi) in x.iter().zip(y) {
            let dx = xi - x_bar;
            let dy = yi - y_bar;
            xx += dx * dx;
            yy += dy * dy;
            xy += dx * dy;
        }
        if !(xx > 0.0 && yy > 0.0) {
            return None;
        }
        let slope = xy / xx;
        let intercept = y_bar - slope * x_bar;
        let dof = nf - 1.0;
        let correlation = (xy / dof) / ((yy / dof).sqrt() * (xx / dof).sqrt());
        if !correlation.is_finite() {
            return None;
        }

        let (mut rss, mut ssr) = (0.0, 0.0);
        for (xi, yi) in x.iter().zip(y) {
            let fit = slope * xi + intercept;
            rss += (fit - yi) * (fit - yi);
            ssr += (fit - y_bar) * (fit - y_bar);
        }
        let svar = (n > 2).then(|| rss / (n - 2) as f64);
        Some(Self {
            n,
            slope,
            intercept,
            correlation,
            r2: ssr / yy,
            svar,
            svar0: svar.map(|s| s * sum_x2 / (nf * xx)),
            svar1: svar.map(|s| s / xx),
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    pub fn residual_variance(&self) -> Option<f64> {
        self.svar
    }

    pub fn slope_std_err(&self) -> Option<f64> {
        self.svar1.map(f64::sqrt)
    }

    pub fn intercept_std_err(&self) -> Option<f64> {
        self.svar0.map(f64::sqrt)
    }
}

impl std::fmt::Display for LinearFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} N + {:.2}  (R^2 = {:.3})",
            self.slope, self.intercept, self.r2
        )
    }
}

/// Pearson correlation of the two legs' full price histories.
pub fn price_correlation(history: &PriceHistory, key: PairKey) -> Option<f64> {
    LinearFit::fit(history.series(key.x()), history.series(key.y())).map(|f| f.correlation)
}

/// True when the pair shares an asset with any held pair.
pub fn is_exposed(key: PairKey, held: &BTreeSet<PairKey>) -> bool {
    held.iter().any(|h| h.overlaps(&key))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub key: PairKey,
    pub z: f64,
}

impl Candidate {
    pub fn weight(&self) -> f64 {
        self.z.abs()
    }
}

/// Pairs eligible for fresh selection this tick, in key order: a defined
/// z-score, positively correlated prices, and no asset tied up in a held
/// pair. Held pairs themselves are handled by the caller.
pub fn select_candidates(
    history: &PriceHistory,
    scores: &BTreeMap<PairKey, ZScore>,
    held: &BTreeSet<PairKey>,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (key, score) in scores {
        if held.contains(key) || is_exposed(*key, held) {
            continue;
        }
        match price_correlation(history, *key) {
            Some(corr) if corr > 0.0 => candidates.push(Candidate {
                key: *key,
                z: score.z,
            }),
            // ratio mean reversion is not modelled for negatively correlated legs
            Some(corr) => log::debug!("[FILTER] {} dropped, correlation {:.4}", key, corr),
            None => log::debug!("[FILTER] {} dropped, correlation undefined", key),
        }
    }
    candidates
}
