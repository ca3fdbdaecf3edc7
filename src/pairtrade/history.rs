/// Append-only mid-price series, one per asset, growing one element per
/// accepted tick.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    series: Vec<Vec<f64>>,
}

impl PriceHistory {
    pub fn new(num_assets: usize) -> Self {
        Self {
            series: vec![Vec::new(); num_assets],
        }
    }

    pub fn num_assets(&self) -> usize {
        self.series.len()
    }

    /// Number of ticks recorded. Every series has the same length.
    pub fn len(&self) -> usize {
        self.series.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Callers validate the slice length before appending.
    pub fn append(&mut self, prices: &[f64]) {
        debug_assert_eq!(prices.len(), self.num_assets());
        for (series, price) in self.series.iter_mut().zip(prices) {
            series.push(*price);
        }
    }

    pub fn series(&self, asset: usize) -> &[f64] {
        self.series.get(asset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest(&self, asset: usize) -> Option<f64> {
        self.series.get(asset).and_then(|s| s.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_every_series_in_lockstep() {
        let mut history = PriceHistory::new(3);
        assert!(history.is_empty());
        assert_eq!(history.num_assets(), 3);
        history.append(&[1.0, 2.0, 3.0]);
        history.append(&[1.5, 2.5, 3.5]);
        assert_eq!(history.len(), 2);
        assert_eq!(history.series(1), &[2.0, 2.5]);
        assert_eq!(history.latest(2), Some(3.5));
        assert_eq!(history.latest(9), None);
        assert!(history.series(9).is_empty());
    }
}
