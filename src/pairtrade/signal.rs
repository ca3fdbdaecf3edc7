use serde::Serialize;

/// Trigger decision of a single tick. `SellY` shorts the higher-indexed
/// leg and buys the lower one; `BuyY` is the inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Decision {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "sellY")]
    SellY,
    #[serde(rename = "buyY")]
    BuyY,
}

/// Persistent signal of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HoldSignal {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "sellhold")]
    SellHold,
    #[serde(rename = "buyhold")]
    BuyHold,
    #[serde(rename = "close")]
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Flat,
    EngagedShort,
    EngagedLong,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::None => "none",
            Decision::SellY => "sellY",
            Decision::BuyY => "buyY",
        }
    }
}

impl HoldSignal {
    pub fn label(&self) -> &'static str {
        match self {
            HoldSignal::None => "none",
            HoldSignal::SellHold => "sellhold",
            HoldSignal::BuyHold => "buyhold",
            HoldSignal::Close => "close",
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, HoldSignal::SellHold | HoldSignal::BuyHold)
    }
}

/// Outcome of one transition, not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub decision: Decision,
    pub signal: HoldSignal,
}

impl Transition {
    /// Closing one side while the opposite trigger fires in the same tick.
    pub fn is_close_and_reverse(&self) -> bool {
        self.signal == HoldSignal::Close && self.decision != Decision::None
    }
}

/// Per-pair trigger/hold/close machine. Only the last decision and signal
/// are kept; position size lives with the sizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalState {
    prev_decision: Decision,
    prev_signal: HoldSignal,
}

impl SignalState {
    pub fn prev_decision(&self) -> Decision {
        self.prev_decision
    }

    pub fn prev_signal(&self) -> HoldSignal {
        self.prev_signal
    }

    pub fn phase(&self) -> Phase {
        if self.prev_decision == Decision::SellY || self.prev_signal == HoldSignal::SellHold {
            Phase::EngagedShort
        } else if self.prev_decision == Decision::BuyY || self.prev_signal == HoldSignal::BuyHold
        {
            Phase::EngagedLong
        } else {
            Phase::Flat
        }
    }

    /// Evaluates `z` against the thresholds. `trigger > close >= 0` is
    /// guaranteed by parameter validation.
    pub fn transition(&self, z: f64, trigger: f64, close: f64) -> Transition {
        let decision = if z > trigger {
            Decision::SellY
        } else if z < -trigger {
            Decision::BuyY
        } else {
            Decision::None
        };

        // exactly on the close threshold neither branch holds
        let signal = match self.phase() {
            Phase::EngagedShort if z > close => HoldSignal::SellHold,
            Phase::EngagedShort if z < close => HoldSignal::Close,
            Phase::EngagedLong if z < -close => HoldSignal::BuyHold,
            Phase::EngagedLong if z > -close => HoldSignal::Close,
            _ => HoldSignal::None,
        };

        Transition { decision, signal }
    }

    pub fn commit(&mut self, transition: Transition) {
        self.prev_decision = transition.decision;
        self.prev_signal = transition.signal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIGGER: f64 = 2.0;
    const CLOSE: f64 = 0.3;

    fn step(state: &mut SignalState, z: f64) -> Transition {
        let t = state.transition(z, TRIGGER, CLOSE);
        state.commit(t);
        t
    }

    #[test]
    fn flat_stays_flat_inside_trigger_band() {
        let mut state = SignalState::default();
        let t = step(&mut state, 1.9);
        assert_eq!(t.decision, Decision::None);
        assert_eq!(t.signal, HoldSignal::None);
        assert_eq!(state.phase(), Phase::Flat);
    }

    #[test]
    fn short_side_triggers_holds_and_closes() {
        let mut state = SignalState::default();
        let t = step(&mut state, 2.4);
        assert_eq!((t.decision, t.signal), (Decision::SellY, HoldSignal::None));
        assert_eq!(state.phase(), Phase::EngagedShort);

        let t = step(&mut state, 1.0);
        assert_eq!((t.decision, t.signal), (Decision::None, HoldSignal::SellHold));
        assert_eq!(state.phase(), Phase::EngagedShort);

        let t = step(&mut state, 0.1);
        assert_eq!((t.decision, t.signal), (Decision::None, HoldSignal::Close));
        assert_eq!(state.phase(), Phase::Flat);
    }

    #[test]
    fn long_side_mirrors_short_side() {
        let mut state = SignalState::default();
        assert_eq!(step(&mut state, -2.1).decision, Decision::BuyY);
        assert_eq!(step(&mut state, -0.5).signal, HoldSignal::BuyHold);
        assert_eq!(state.phase(), Phase::EngagedLong);
        assert_eq!(step(&mut state, 0.0).signal, HoldSignal::Close);
    }

    #[test]
    fn opposite_trigger_closes_and_reverses() {
        let mut state = SignalState::default();
        step(&mut state, 2.5);
        let t = step(&mut state, -2.5);
        assert_eq!((t.decision, t.signal), (Decision::BuyY, HoldSignal::Close));
        assert!(t.is_close_and_reverse());
        assert_eq!(state.phase(), Phase::EngagedLong);
    }

    #[test]
    fn sitting_on_close_threshold_yields_no_signal() {
        let mut state = SignalState::default();
        step(&mut state, 3.0);
        let t = step(&mut state, CLOSE);
        assert_eq!(t.signal, HoldSignal::None);
        assert_eq!(state.phase(), Phase::Flat);
    }
}
