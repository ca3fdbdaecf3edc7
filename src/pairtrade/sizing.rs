use crate::config::StrategyParams;

use super::signal::{Decision, Transition};

/// Extra z beyond the trigger that earns one double-down step.
const DOUBLE_DOWN_STEP_Z: f64 = 0.5;
const MAX_DOUBLE_DOWN_STEPS: i64 = 2;

/// Sized holdings for both legs of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegTargets {
    pub x: i64,
    pub y: i64,
    pub double_down_x: i64,
    pub double_down_y: i64,
    pub clamped: bool,
}

impl LegTargets {
    pub fn gross(&self) -> i64 {
        self.x.abs() + self.y.abs()
    }
}

/// Number of double-down steps for one leg; zero unless `|z|` clears the
/// trigger by a full step and the leg is no larger than one trigger clip.
pub fn double_down_steps(z: f64, trigger: f64, prev_leg: i64, position_change: i64) -> i64 {
    if z.abs() <= trigger + DOUBLE_DOWN_STEP_Z || prev_leg.abs() > position_change {
        return 0;
    }
    let steps = ((z.abs() - trigger) / DOUBLE_DOWN_STEP_Z).floor() as i64;
    steps.min(MAX_DOUBLE_DOWN_STEPS)
}

/// Shrinks both legs toward zero until `|x| + |y| <= cap`. `y` gives up half
/// the excess (rounded down) and `x` the rest; a leg that reaches zero hands
/// the remainder to the other. Signs never flip.
pub fn redistribute(x: i64, y: i64, cap: i64) -> (i64, i64) {
    let excess = x.abs() + y.abs() - cap.max(0);
    if excess <= 0 {
        return (x, y);
    }
    let cut_y = (excess / 2).min(y.abs());
    let cut_x = (excess - cut_y).min(x.abs());
    let cut_y = cut_y + (excess - cut_y - cut_x).min(y.abs() - cut_y);
    (shrink(x, cut_x), shrink(y, cut_y))
}

fn shrink(leg: i64, by: i64) -> i64 {
    leg - leg.signum() * by
}

pub struct PositionSizer<'a> {
    params: &'a StrategyParams,
}

impl<'a> PositionSizer<'a> {
    pub fn new(params: &'a StrategyParams) -> Self {
        Self { params }
    }

    /// Target holdings for the `x` (lower index) and `y` legs. A fresh
    /// trigger moves each leg at least one clip toward its side, holds add
    /// only the double-down, anything else flattens.
    pub fn size(&self, z: f64, transition: Transition, prev_x: i64, prev_y: i64) -> LegTargets {
        let p = self.params;
        let clip = p.position_change_on_trigger;
        let direction = if z > 0.0 { 1 } else { -1 };
        let double_down_x = direction
            * double_down_steps(z, p.trigger_signal, prev_x, clip)
            * p.position_double_down_rate;
        let double_down_y = -direction
            * double_down_steps(z, p.trigger_signal, prev_y, clip)
            * p.position_double_down_rate;

        let holding = transition.signal.is_hold();
        let (x, y) = match transition.decision {
            Decision::SellY => (
                (clip + double_down_x).max(prev_x),
                (-clip + double_down_y).min(prev_y),
            ),
            Decision::BuyY => (
                (-clip + double_down_x).min(prev_x),
                (clip + double_down_y).max(prev_y),
            ),
            Decision::None if holding => (prev_x + double_down_x, prev_y + double_down_y),
            Decision::None => (0, 0),
        };

        let (cx, cy) = redistribute(x, y, p.maximum_absolute_contracts);
        LegTargets {
            x: cx,
            y: cy,
            double_down_x,
            double_down_y,
            clamped: (cx, cy) != (x, y),
        }
    }
}
