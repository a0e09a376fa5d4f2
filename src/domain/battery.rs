use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use super::{Action, FcasMarket, FcasValues, FCAS_MARKETS};

/// Power below this magnitude (MW) is treated as idle
pub const POWER_EPSILON_MW: f64 = 1e-9;

/// Battery-specific errors
#[derive(Debug, Error, PartialEq)]
pub enum BatteryError {
    #[error("Invalid power rating: {0} MW (must be positive)")]
    InvalidPower(f64),
    #[error("Invalid energy capacity: {0} MWh (must be positive)")]
    InvalidCapacity(f64),
    #[error("Invalid {name} efficiency: {value} (must be in (0, 1])")]
    InvalidEfficiency { name: &'static str, value: f64 },
    #[error("Invalid degradation rate: {0} (must be in [0, 1))")]
    InvalidDegradation(f64),
    #[error("Initial state of charge out of bounds: {0}")]
    SocOutOfBounds(f64),
}

/// Physical description of a battery energy storage system.
///
/// For brevity:
/// * `p_max` (MW) is how much the battery can charge/discharge at once.
/// * `e_max` (MWh) is how much energy the battery can hold in total.
/// * duration (hours) is how long the battery can discharge at full power.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatterySpec {
    /// Max charge/discharge power rating (MW)
    pub p_max: f64,
    /// Usable energy capacity (MWh)
    pub e_max: f64,
    /// Fractional capacity lost per action
    pub deg: f64,
    /// Charging efficiency
    pub eta_chg: f64,
    /// Discharging efficiency
    pub eta_dchg: f64,
}

impl Default for BatterySpec {
    fn default() -> Self {
        Self {
            p_max: 50.0,
            e_max: 50.0,
            deg: 0.0,
            eta_chg: 0.90,
            eta_dchg: 0.95,
        }
    }
}

impl BatterySpec {
    /// Construct from the industry-standard power + duration description,
    /// e.g. `BatterySpec::from_power_and_duration(111.0, 2.7)` for Templers BESS.
    pub fn from_power_and_duration(p_max: f64, duration: f64) -> Self {
        Self {
            p_max,
            e_max: p_max * duration,
            ..Default::default()
        }
    }

    pub fn with_degradation(mut self, deg: f64) -> Self {
        self.deg = deg;
        self
    }

    pub fn with_efficiencies(mut self, eta_chg: f64, eta_dchg: f64) -> Self {
        self.eta_chg = eta_chg;
        self.eta_dchg = eta_dchg;
        self
    }

    /// Discharge duration at full power (hours)
    pub fn duration(&self) -> f64 {
        self.e_max / self.p_max
    }

    pub fn validate(&self) -> Result<(), BatteryError> {
        if !(self.p_max > 0.0) {
            return Err(BatteryError::InvalidPower(self.p_max));
        }
        if !(self.e_max > 0.0) {
            return Err(BatteryError::InvalidCapacity(self.e_max));
        }
        for (name, value) in [("charging", self.eta_chg), ("discharging", self.eta_dchg)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(BatteryError::InvalidEfficiency { name, value });
            }
        }
        if !(0.0..1.0).contains(&self.deg) {
            return Err(BatteryError::InvalidDegradation(self.deg));
        }
        Ok(())
    }
}

/// Energy held by the battery (MWh)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    pub c_soc: f64,
    pub c_max: f64,
}

/// What actually happened over one interval once physical limits applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Grid-side energy power (MW), positive when charging
    pub power_mw: f64,
    /// Capacity enabled in each FCAS market (MW)
    pub fcas_mw: FcasValues,
    pub c_soc: f64,
    pub c_max: f64,
    /// Whether this interval counts towards degradation
    pub is_action: bool,
}

impl BatteryState {
    /// Start a battery at `fraction` of its rated capacity.
    pub fn initial(spec: &BatterySpec, fraction: f64) -> Result<Self, BatteryError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(BatteryError::SocOutOfBounds(fraction));
        }
        Ok(Self {
            c_soc: spec.e_max * fraction,
            c_max: spec.e_max,
        })
    }

    /// Apply one interval of `action` lasting `dt` hours.
    pub fn apply(&mut self, spec: &BatterySpec, action: &Action, dt: f64) -> Dispatch {
        let action = action.sanitised();

        // Grid-side power, limited by what the cell can absorb or supply
        let mut power_mw = action.energy * spec.p_max;
        if power_mw > 0.0 {
            let headroom_mw = (self.c_max - self.c_soc).max(0.0) / (spec.eta_chg * dt);
            power_mw = power_mw.min(headroom_mw);
        } else if power_mw < 0.0 {
            let available_mw = self.c_soc.max(0.0) * spec.eta_dchg / dt;
            power_mw = power_mw.max(-available_mw);
        }
        if power_mw.abs() < POWER_EPSILON_MW {
            power_mw = 0.0;
        }

        let mut delta = if power_mw >= 0.0 {
            spec.eta_chg * power_mw * dt
        } else {
            power_mw * dt / spec.eta_dchg
        };

        let mut fcas_mw = [0.0; FCAS_MARKETS];
        for market in FcasMarket::iter() {
            let mw = action.fcas_for(market) * spec.p_max;
            fcas_mw[market.index()] = mw;
            let expected = market.expected_hours() * mw;
            if market.is_raise() {
                delta -= expected / spec.eta_dchg;
            } else {
                delta += expected * spec.eta_chg;
            }
        }

        self.c_soc = (self.c_soc + delta).clamp(0.0, self.c_max);

        let is_action = power_mw != 0.0;
        if is_action {
            self.c_max *= 1.0 - spec.deg;
            self.c_soc = self.c_soc.min(self.c_max);
        }

        Dispatch {
            power_mw,
            fcas_mw,
            c_soc: self.c_soc,
            c_max: self.c_max,
            is_action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DISPATCH_INTERVAL_HOURS as DT;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_duration_constructor() {
        let templers = BatterySpec::from_power_and_duration(111.0, 2.7);
        assert!((templers.e_max - 299.7).abs() < 1e-9);
        assert!((templers.duration() - 2.7).abs() < 1e-9);
        assert_eq!(templers.eta_chg, 0.90);
    }

    #[rstest]
    #[case(BatterySpec { p_max: 0.0, ..Default::default() })]
    #[case(BatterySpec { e_max: -1.0, ..Default::default() })]
    #[case(BatterySpec { eta_chg: 1.2, ..Default::default() })]
    #[case(BatterySpec { eta_dchg: 0.0, ..Default::default() })]
    #[case(BatterySpec { deg: 1.0, ..Default::default() })]
    #[case(BatterySpec { p_max: f64::NAN, ..Default::default() })]
    fn test_invalid_specs_rejected(#[case] spec: BatterySpec) {
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_charge_applies_efficiency() {
        let spec = BatterySpec::default();
        let mut state = BatteryState::initial(&spec, 0.0).unwrap();
        let d = state.apply(&spec, &Action::charge(1.0), DT);
        assert_eq!(d.power_mw, 50.0);
        // 50 MW for 5 minutes at 90%
        assert!((state.c_soc - 50.0 * DT * 0.9).abs() < 1e-9);
        assert!(d.is_action);
    }

    #[test]
    fn test_discharge_limited_by_stored_energy() {
        let spec = BatterySpec::default();
        let mut state = BatteryState { c_soc: 1.0, c_max: 50.0 };
        let d = state.apply(&spec, &Action::discharge(1.0), DT);
        // Only 1 MWh stored, delivering 0.95 MWh over the interval
        assert!((d.power_mw + 0.95 / DT).abs() < 1e-9);
        assert!(state.c_soc.abs() < 1e-9);
    }

    #[test]
    fn test_full_battery_cannot_charge() {
        let spec = BatterySpec::default().with_degradation(0.01);
        let mut state = BatteryState { c_soc: 50.0, c_max: 50.0 };
        let d = state.apply(&spec, &Action::charge(1.0), DT);
        assert_eq!(d.power_mw, 0.0);
        assert!(!d.is_action);
        assert_eq!(state.c_max, 50.0);
    }

    #[test]
    fn test_degradation_per_action() {
        let spec = BatterySpec::default().with_degradation(0.001);
        let mut state = BatteryState::initial(&spec, 0.5).unwrap();
        state.apply(&spec, &Action::charge(1.0), DT);
        state.apply(&spec, &Action::idle(), DT);
        state.apply(&spec, &Action::discharge(1.0), DT);
        assert!((state.c_max - 50.0 * 0.999 * 0.999).abs() < 1e-9);
    }

    #[test]
    fn test_fcas_expected_energy() {
        let spec = BatterySpec::default().with_efficiencies(1.0, 1.0);
        let mut state = BatteryState::initial(&spec, 0.5).unwrap();
        let mut action = Action::idle();
        action.fcas[FcasMarket::Raise5Min.index()] = 1.0;
        let d = state.apply(&spec, &action, DT);
        assert_eq!(d.fcas_mw[FcasMarket::Raise5Min.index()], 50.0);
        assert!((state.c_soc - (25.0 - 0.05 * DT * 50.0)).abs() < 1e-9);
        assert!(!d.is_action);
    }

    proptest! {
        #[test]
        fn prop_soc_stays_in_bounds(
            start in 0.0f64..=1.0,
            actions in proptest::collection::vec(-1.5f64..1.5, 1..200),
            deg in 0.0f64..0.01,
        ) {
            let spec = BatterySpec::default().with_degradation(deg);
            let mut state = BatteryState::initial(&spec, start).unwrap();
            let mut last_c_max = state.c_max;
            for a in actions {
                let d = state.apply(&spec, &Action::energy(a), DT);
                prop_assert!(d.c_soc >= 0.0);
                prop_assert!(d.c_soc <= d.c_max + 1e-9);
                prop_assert!(d.c_max <= last_c_max);
                prop_assert!(d.power_mw.abs() <= spec.p_max + 1e-9);
                last_c_max = d.c_max;
            }
        }
    }
}
