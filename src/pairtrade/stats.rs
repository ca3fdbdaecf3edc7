/// Values behind one tick's z-score for a pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScore {
    pub ratio: f64,
    pub ema: f64,
    pub stdev: f64,
    pub z: f64,
}

/// Ratio history and smoothing state of one unordered pair. The ratio is
/// always `price[y] / price[x]`.
#[derive(Debug, Clone, Default)]
pub struct PairStatistics {
    ratios: Vec<f64>,
    prev_ema: Option<f64>,
}

impl PairStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ratios(&self) -> &[f64] {
        &self.ratios
    }

    pub fn prev_ema(&self) -> Option<f64> {
        self.prev_ema
    }

    pub fn latest_ratio(&self) -> Option<f64> {
        self.ratios.last().copied()
    }

    pub fn push_ratio(&mut self, ratio: f64) {
        self.ratios.push(ratio);
    }

    /// Moves the EMA forward to the latest ratio. The first call seeds it
    /// with the mean of the `ema_short` ratios preceding the latest one;
    /// later calls use the recursive update. Returns `None` only while there
    /// is not enough history to seed.
    pub fn advance_ema(&mut self, ema_short: usize) -> Option<f64> {
        let ratio = self.latest_ratio()?;
        let ema = match self.prev_ema {
            Some(prev) => (ratio - prev) * 2.0 / (ema_short as f64 + 1.0) + prev,
            None => {
                let end = self.ratios.len() - 1;
                if ema_short == 0 || end < ema_short {
                    return None;
                }
                mean(&self.ratios[end - ema_short..end])?
            }
        };
        self.prev_ema = Some(ema);
        Some(ema)
    }

    /// Sample standard deviation of the `ema_long + 2` ratios preceding the
    /// latest one. `None` when the window is short or flat.
    pub fn trailing_stdev(&self, ema_long: usize) -> Option<f64> {
        let window = ema_long + 2;
        let end = self.ratios.len().checked_sub(1)?;
        if end < window {
            return None;
        }
        let var = sample_variance(&self.ratios[end - window..end])?;
        if !(var.is_finite() && var > 0.0) {
            return None;
        }
        Some(var.sqrt())
    }

    /// Advances the EMA and returns this tick's z-score, if one is defined.
    pub fn evaluate(&mut self, ema_short: usize, ema_long: usize) -> Option<ZScore> {
        let ema = self.advance_ema(ema_short)?;
        let ratio = self.latest_ratio()?;
        let stdev = self.trailing_stdev(ema_long)?;
        let z = (ratio - ema) / stdev;
        if !z.is_finite() {
            return None;
        }
        Some(ZScore {
            ratio,
            ema,
            stdev,
            z,
        })
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Variance with an `n - 1` denominator.
pub fn sample_variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let m = mean(data)?;
    let ss = data
        .iter()
        .map(|v| {
            let d = m - v;
            d * d
        })
        .sum::<f64>();
    Some(ss / (data.len() - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(ratios: &[f64]) -> PairStatistics {
        let mut stats = PairStatistics::new();
        for r in ratios {
            stats.push_ratio(*r);
        }
        stats
    }

    #[test]
    fn ema_seeds_from_preceding_ratios_then_recurses() {
        let mut stats = stats_with(&[1.0, 2.0, 3.0, 10.0]);
        // mean of 1, 2, 3; the latest ratio is excluded
        assert_eq!(stats.advance_ema(3), Some(2.0));
        stats.push_ratio(4.0);
        // alpha = 2 / (3 + 1)
        assert_eq!(stats.advance_ema(3), Some(3.0));
        assert_eq!(stats.prev_ema(), Some(3.0));
    }

    #[test]
    fn ema_waits_for_enough_history() {
        let mut stats = stats_with(&[1.0, 2.0]);
        assert_eq!(stats.advance_ema(3), None);
        assert_eq!(stats.prev_ema(), None);
    }

    #[test]
    fn stdev_excludes_latest_ratio() {
        // window = ema_long + 2 = 3 -> [1, 2, 3]
        let stats = stats_with(&[100.0, 1.0, 2.0, 3.0, 50.0]);
        assert_eq!(stats.trailing_stdev(1), Some(1.0));
        assert_eq!(stats_with(&[1.0, 2.0, 3.0]).trailing_stdev(1), None);
    }

    #[test]
    fn flat_window_has_no_signal() {
        let mut stats = stats_with(&[1.0; 12]);
        assert_eq!(stats.trailing_stdev(3), None);
        assert_eq!(stats.evaluate(3, 3), None);
        // the EMA still advances so the seed happens exactly once
        assert_eq!(stats.prev_ema(), Some(1.0));
    }

    #[test]
    fn z_score_uses_ema_and_trailing_stdev() {
        let mut stats = stats_with(&[1.0, 2.0, 3.0, 4.0]);
        let z = stats.evaluate(3, 1).unwrap();
        assert_eq!(z.ema, 2.0);
        assert_eq!(z.stdev, 1.0);
        assert_eq!(z.z, 2.0);
    }

    #[test]
    fn sample_variance_uses_n_minus_one() {
        assert_eq!(sample_variance(&[2.0, 4.0]), Some(2.0));
        assert_eq!(sample_variance(&[2.0]), None);
        assert_eq!(mean(&[]), None);
    }
}
