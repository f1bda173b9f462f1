use crate::devices::types::{Device, DeviceContext, RandomSource};

/// Discrete charging state of an EV charger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerState {
    Idle,
    Charging { ticks_remaining: u32 },
}

/// An EV charger driven by a two-state Idle/Charging machine.
///
/// While idle, a session starts on each tick with probability
/// `start_probability`; its length is drawn uniformly from
/// `[min_session_ticks, max_session_ticks]`. The session emits `rated_kw` for
/// exactly that many ticks (the start tick included), then returns to idle.
/// No start attempt is made on the tick a session ends.
///
/// Virtual time does not influence the charger.
#[derive(Debug, Clone)]
pub struct Charger {
    /// Constant output while charging (kW).
    pub rated_kw: f64,

    /// Per-tick probability of leaving `Idle`.
    pub start_probability: f64,

    /// Shortest session length in ticks.
    pub min_session_ticks: u32,

    /// Longest session length in ticks.
    pub max_session_ticks: u32,

    state: ChargerState,
}

impl Default for Charger {
    fn default() -> Self {
        Self::new(11.0, 0.2, 3, 10)
    }
}

impl Charger {
    /// Creates an idle charger.
    ///
    /// # Panics
    ///
    /// Panics if `min_session_ticks` is zero or exceeds `max_session_ticks`.
    pub fn new(
        rated_kw: f64,
        start_probability: f64,
        min_session_ticks: u32,
        max_session_ticks: u32,
    ) -> Self {
        assert!(min_session_ticks > 0);
        assert!(max_session_ticks >= min_session_ticks);
        Self {
            rated_kw: rated_kw.max(0.0),
            start_probability: start_probability.clamp(0.0, 1.0),
            min_session_ticks,
            max_session_ticks,
            state: ChargerState::Idle,
        }
    }

    pub fn state(&self) -> ChargerState {
        self.state
    }

    pub fn is_charging(&self) -> bool {
        matches!(self.state, ChargerState::Charging { .. })
    }

    /// Ticks left in the current session, 0 when idle.
    pub fn charging_ticks_remaining(&self) -> u32 {
        match self.state {
            ChargerState::Idle => 0,
            ChargerState::Charging { ticks_remaining } => ticks_remaining,
        }
    }

    fn transition(&mut self, rng: &mut dyn RandomSource) {
        self.state = match self.state {
            ChargerState::Charging { ticks_remaining } => {
                let left = ticks_remaining.saturating_sub(1);
                if left == 0 {
                    ChargerState::Idle
                } else {
                    ChargerState::Charging {
                        ticks_remaining: left,
                    }
                }
            }
            ChargerState::Idle => {
                if rng.chance(self.start_probability) {
                    ChargerState::Charging {
                        ticks_remaining: rng
                            .int_inclusive(self.min_session_ticks, self.max_session_ticks),
                    }
                } else {
                    ChargerState::Idle
                }
            }
        };
    }
}

impl Device for Charger {
    fn power_kw(&mut self, _context: &DeviceContext, rng: &mut dyn RandomSource) -> f64 {
        self.transition(rng);
        if self.is_charging() {
            self.rated_kw
        } else {
            0.0
        }
    }

    fn device_type(&self) -> &'static str {
        "Charger"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::types::SeededRandom;

    /// Always starts a session of a fixed length.
    struct AlwaysStart(u32);

    impl RandomSource for AlwaysStart {
        fn uniform(&mut self, low: f64, _high: f64) -> f64 {
            low
        }
        fn chance(&mut self, _p: f64) -> bool {
            true
        }
        fn int_inclusive(&mut self, low: u32, high: u32) -> u32 {
            self.0.clamp(low, high)
        }
    }

    fn ctx() -> DeviceContext {
        DeviceContext::new(0.0)
    }

    #[test]
    fn starts_idle() {
        let ch = Charger::default();
        assert_eq!(ch.state(), ChargerState::Idle);
        assert_eq!(ch.charging_ticks_remaining(), 0);
    }

    #[test]
    fn session_lasts_exactly_drawn_duration() {
        for duration in 3..=10 {
            let mut ch = Charger::default();
            let mut rng = AlwaysStart(duration);
            for tick in 0..duration {
                assert_eq!(ch.power_kw(&ctx(), &mut rng), 11.0, "tick {tick}");
                assert!(ch.is_charging());
            }
            assert_eq!(ch.power_kw(&ctx(), &mut rng), 0.0);
            assert_eq!(ch.state(), ChargerState::Idle);
        }
    }

    #[test]
    fn never_starts_with_zero_probability() {
        let mut ch = Charger::new(11.0, 0.0, 3, 10);
        let mut rng = SeededRandom::from_seed(42);
        for _ in 0..500 {
            assert_eq!(ch.power_kw(&ctx(), &mut rng), 0.0);
        }
    }

    #[test]
    fn power_is_either_rated_or_zero() {
        let mut ch = Charger::default();
        let mut rng = SeededRandom::from_seed(9);
        let mut charging_ticks = 0;
        for _ in 0..1000 {
            let p = ch.power_kw(&ctx(), &mut rng);
            assert!(p == 0.0 || p == 11.0);
            if p > 0.0 {
                charging_ticks += 1;
            }
        }
        assert!(charging_ticks > 0);
    }

    #[test]
    fn sessions_drawn_within_bounds() {
        let mut ch = Charger::default();
        let mut rng = SeededRandom::from_seed(11);
        let mut run = 0u32;
        for _ in 0..5000 {
            if ch.power_kw(&ctx(), &mut rng) > 0.0 {
                run += 1;
            } else if run > 0 {
                // back-to-back sessions are impossible: the end tick is always idle
                assert!((3..=10).contains(&run), "session of {run} ticks");
                run = 0;
            }
        }
    }

    #[test]
    #[should_panic]
    fn zero_length_sessions_panic() {
        Charger::new(11.0, 0.2, 0, 10);
    }
}
