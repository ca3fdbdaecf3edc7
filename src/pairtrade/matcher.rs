//! Chooses which candidate pairs to trade this tick.
//!
//! The problem is maximum-weight matching on the asset graph with `|z|` as
//! edge weight. Small universes are searched exhaustively: the number of
//! matchings of a complete graph on 10 vertices is 9 496, which is cheap per
//! tick, but it grows faster than exponentially. Past
//! [`EXHAUSTIVE_MATCH_MAX_ASSETS`] the greedy heaviest-edge-first matching
//! is used instead, which is guaranteed at least half of the optimum.

use super::filter::Candidate;
use super::PairKey;

pub const EXHAUSTIVE_MATCH_MAX_ASSETS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matching {
    pub pairs: Vec<PairKey>,
    pub score: f64,
}

impl Matching {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Best set of asset-disjoint candidates, with at most `num_assets / 2`
/// pairs. Empty input gives an empty matching.
pub fn best_combination(candidates: &[Candidate], num_assets: usize) -> Matching {
    if candidates.is_empty() || num_assets < 2 {
        return Matching::default();
    }
    if num_assets <= EXHAUSTIVE_MATCH_MAX_ASSETS {
        exhaustive(candidates, num_assets)
    } else {
        greedy(candidates, num_assets)
    }
}

/// Held pairs first, then the matched candidates.
pub fn select_pairs(held: &[PairKey], matching: &Matching) -> Vec<PairKey> {
    let mut selected = Vec::with_capacity(held.len() + matching.pairs.len());
    selected.extend_from_slice(held);
    selected.extend(matching.pairs.iter().filter(|k| !held.contains(k)));
    selected
}

#[derive(Debug, Clone)]
struct Combination {
    next: usize,
    picked: Vec<usize>,
    used: u64,
    score: f64,
}

fn asset_mask(key: PairKey) -> u64 {
    (1u64 << key.x()) | (1u64 << key.y())
}

/// Walks every disjoint combination with an explicit stack. Each frame owns
/// its own combination; ties go to fewer pairs, then to the lexicographically
/// smaller list of candidate positions.
fn exhaustive(candidates: &[Candidate], num_assets: usize) -> Matching {
    let max_pairs = num_assets / 2;
    let mut best: Option<Combination> = None;
    let mut stack = vec![Combination {
        next: 0,
        picked: Vec::new(),
        used: 0,
        score: 0.0,
    }];

    while let Some(combo) = stack.pop() {
        if !combo.picked.is_empty() && improves(&combo, best.as_ref()) {
            best = Some(combo.clone());
        }
        if combo.picked.len() == max_pairs {
            continue;
        }
        for i in (combo.next..candidates.len()).rev() {
            let mask = asset_mask(candidates[i].key);
            if combo.used & mask != 0 {
                continue;
            }
            let mut picked = combo.picked.clone();
            picked.push(i);
            stack.push(Combination {
                next: i + 1,
                picked,
                used: combo.used | mask,
                score: combo.score + candidates[i].weight(),
            });
        }
    }

    best.map(|c| Matching {
        pairs: c.picked.iter().map(|&i| candidates[i].key).collect(),
        score: c.score,
    })
    .unwrap_or_default()
}

fn improves(combo: &Combination, best: Option<&Combination>) -> bool {
    let Some(best) = best else {
        return true;
    };
    if combo.score != best.score {
        return combo.score > best.score;
    }
    (combo.picked.len(), &combo.picked) < (best.picked.len(), &best.picked)
}

/// Heaviest candidate first, skipping any that reuses an asset.
fn greedy(candidates: &[Candidate], num_assets: usize) -> Matching {
    let max_pairs = num_assets / 2;
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .weight()
            .total_cmp(&candidates[a].weight())
            .then(a.cmp(&b))
    });

    let mut used = vec![false; num_assets];
    let mut picked = Vec::new();
    for i in order {
        if picked.len() == max_pairs {
            break;
        }
        let key = candidates[i].key;
        if key.y() >= num_assets || used[key.x()] || used[key.y()] {
            continue;
        }
        used[key.x()] = true;
        used[key.y()] = true;
        picked.push(i);
    }
    picked.sort_unstable();

    Matching {
        score: picked.iter().map(|&i| candidates[i].weight()).sum(),
        pairs: picked.iter().map(|&i| candidates[i].key).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn cand(x: usize, y: usize, z: f64) -> Candidate {
        Candidate {
            key: PairKey::new(x, y).unwrap(),
            z,
        }
    }

    fn all_candidates(n: usize, z: impl Fn(usize, usize) -> f64) -> Vec<Candidate> {
        PairKey::all(n)
            .into_iter()
            .map(|k| Candidate {
                key: k,
                z: z(k.x(), k.y()),
            })
            .collect()
    }

    fn assert_disjoint(m: &Matching) {
        let mut seen = HashSet::new();
        for k in &m.pairs {
            assert!(seen.insert(k.x()), "asset {} reused", k.x());
            assert!(seen.insert(k.y()), "asset {} reused", k.y());
        }
    }

    #[test]
    fn two_disjoint_pairs_beat_the_single_strongest() {
        // five assets: 0/1 is the single strongest pair, but 0/2 + 1/3
        // together outweigh it and any pairing that includes it
        let candidates = vec![
            cand(0, 1, 4.0),
            cand(0, 2, 3.0),
            cand(1, 3, -2.5),
            cand(2, 4, 0.2),
            cand(3, 4, 0.1),
        ];
        let m = best_combination(&candidates, 5);
        assert_eq!(
            m.pairs,
            vec![PairKey::new(0, 2).unwrap(), PairKey::new(1, 3).unwrap()]
        );
        assert!((m.score - 5.5).abs() < 1e-12);
        assert_disjoint(&m);
    }

    #[test]
    fn disjoint_pair_is_added_when_it_raises_the_total() {
        let candidates = vec![cand(0, 1, 3.0), cand(2, 3, -2.2), cand(1, 2, 3.5)];
        let m = best_combination(&candidates, 5);
        assert_eq!(
            m.pairs,
            vec![PairKey::new(0, 1).unwrap(), PairKey::new(2, 3).unwrap()]
        );
    }

    #[test]
    fn overlapping_candidates_yield_best_single() {
        let candidates = vec![cand(0, 1, 1.0), cand(1, 2, -2.0), cand(0, 2, 1.5)];
        let m = best_combination(&candidates, 3);
        assert_eq!(m.pairs, vec![PairKey::new(1, 2).unwrap()]);
        assert_eq!(m.score, 2.0);
    }

    #[test]
    fn ties_prefer_fewer_pairs_then_earlier_candidates() {
        let candidates = vec![cand(0, 1, 1.0), cand(2, 3, 0.0), cand(0, 2, 1.0)];
        let m = best_combination(&candidates, 4);
        assert_eq!(m.pairs, vec![PairKey::new(0, 1).unwrap()]);
    }

    #[test]
    fn empty_input_gives_empty_matching() {
        assert!(best_combination(&[], 5).is_empty());
    }

    #[test]
    fn exhaustive_never_reuses_assets() {
        for n in 2..=EXHAUSTIVE_MATCH_MAX_ASSETS {
            let candidates =
                all_candidates(n, |x, y| ((x * 7 + y * 3) % 5) as f64 - 2.0 + 0.01 * y as f64);
            let m = best_combination(&candidates, n);
            assert!(!m.is_empty());
            assert!(m.pairs.len() <= n / 2);
            assert_disjoint(&m);
        }
    }

    #[test]
    fn exhaustive_finds_perfect_matching_on_six_assets() {
        // a heavy triangle tempts greedy; the optimum avoids it
        let mut candidates = vec![
            cand(0, 1, 10.0),
            cand(0, 2, 9.0),
            cand(1, 3, 9.0),
            cand(4, 5, 1.0),
        ];
        candidates.sort_by_key(|c| c.key);
        let exact = exhaustive(&candidates, 6);
        let approx = greedy(&candidates, 6);
        assert_eq!(exact.score, 19.0);
        assert_eq!(approx.score, 11.0);
        assert!(approx.score * 2.0 >= exact.score);
    }

    #[test]
    fn large_universe_uses_greedy_and_stays_disjoint() {
        let n = 14;
        let candidates = all_candidates(n, |x, y| ((x + 2 * y) % 9) as f64 * 0.5);
        let m = best_combination(&candidates, n);
        assert_eq!(m, greedy(&candidates, n));
        assert!(m.pairs.len() <= n / 2);
        assert_disjoint(&m);
    }

    #[test]
    fn held_pairs_lead_the_selection() {
        let held = [PairKey::new(3, 4).unwrap()];
        let matching = Matching {
            pairs: vec![PairKey::new(0, 1).unwrap()],
            score: 2.0,
        };
        assert_eq!(
            select_pairs(&held, &matching),
            vec![PairKey::new(3, 4).unwrap(), PairKey::new(0, 1).unwrap()]
        );
    }
}
