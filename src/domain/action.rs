use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::{FcasMarket, FcasValues, FCAS_MARKETS};

/// A dispatch decision for one interval, expressed as fractions of `p_max`.
///
/// * `energy < 0` discharges, `energy == 0` idles, `energy > 0` charges.
/// * `fcas[m]` is the capacity enabled in FCAS market `m`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Action {
    pub energy: f64,
    pub fcas: FcasValues,
}

impl Action {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn charge(fraction: f64) -> Self {
        Self::energy(fraction.abs())
    }

    pub fn discharge(fraction: f64) -> Self {
        Self::energy(-fraction.abs())
    }

    pub fn energy(energy: f64) -> Self {
        Self {
            energy,
            fcas: [0.0; FCAS_MARKETS],
        }
    }

    /// Build from the optimiser's 8-column layout
    /// `[charge, discharge, R6, R60, R5, L6, L60, L5]`.
    pub fn from_allocation(x: &[f64; 2 + FCAS_MARKETS]) -> Self {
        let mut fcas = [0.0; FCAS_MARKETS];
        fcas.copy_from_slice(&x[2..]);
        Self {
            energy: x[0] - x[1],
            fcas,
        }
    }

    pub fn fcas_for(&self, market: FcasMarket) -> f64 {
        self.fcas[market.index()]
    }

    pub fn is_idle(&self) -> bool {
        self.energy == 0.0 && self.fcas.iter().all(|f| *f == 0.0)
    }

    /// Clamp into the feasible action space.
    ///
    /// NaN becomes zero, energy is clamped to `[-1, 1]` and FCAS to `[0, 1]`.
    /// Raise services share the discharge headroom and lower services share
    /// the charge headroom; an oversubscribed side is scaled down.
    pub fn sanitised(&self) -> Self {
        let finite = |v: f64| if v.is_finite() { v } else { 0.0 };

        let energy = finite(self.energy).clamp(-1.0, 1.0);
        let mut fcas = self.fcas.map(|v| finite(v).clamp(0.0, 1.0));

        let discharge = (-energy).max(0.0);
        let charge = energy.max(0.0);

        for raise in [true, false] {
            let used = if raise { discharge } else { charge };
            let markets = FcasMarket::iter().filter(|m| m.is_raise() == raise);
            let total: f64 = markets.clone().map(|m| fcas[m.index()]).sum();
            let room = (1.0 - used).max(0.0);
            if total > room && total > 0.0 {
                let scale = room / total;
                for m in markets {
                    fcas[m.index()] *= scale;
                }
            }
        }

        Self { energy, fcas }
    }
}
