//! Breathing gas mixes and the ordered gas list.
//!
//! A [`Gas`] is an immutable value: O₂ and He percentages plus a role
//! ([`GasType`]) and an availability flag ([`GasStatus`]). Everything else —
//! MOD, both END variants, density — derives from those and the configured
//! parameters. The [`GasList`] holds the ordered set and implements the
//! selection rules the profile builder relies on.

use crate::error::PlanError;
use crate::parameters::Parameters;
use crate::units::{
    Environment, AIR_FN2, MOLAR_MASS_HE, MOLAR_MASS_N2, MOLAR_MASS_O2, MOLAR_VOLUME,
};

/// Role of a mix in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasType {
    Bottom,
    Deco,
    Diluent,
}

impl GasType {
    /// Stable integer tag used by the binary gas list format.
    pub fn as_i32(self) -> i32 {
        match self {
            GasType::Bottom => 0,
            GasType::Deco => 1,
            GasType::Diluent => 2,
        }
    }

    pub fn from_i32(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(GasType::Bottom),
            1 => Some(GasType::Deco),
            2 => Some(GasType::Diluent),
            _ => None,
        }
    }
}

/// Whether a mix takes part in selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasStatus {
    Active,
    Inactive,
}

impl GasStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            GasStatus::Active => 0,
            GasStatus::Inactive => 1,
        }
    }

    pub fn from_i32(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(GasStatus::Active),
            1 => Some(GasStatus::Inactive),
            _ => None,
        }
    }
}

/// A breathing mix. N₂ is the remainder once O₂ and He are set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gas {
    pub o2_pct: f64,
    pub he_pct: f64,
    pub gas_type: GasType,
    pub status: GasStatus,
}

impl Gas {
    /// Build a validated mix.
    ///
    /// Rejects fractions outside `[0, 100]`, `o2 + he > 100`, and mixes whose
    /// surface PpO₂ already exceeds the limit for their type.
    pub fn new(
        o2_pct: f64,
        he_pct: f64,
        gas_type: GasType,
        status: GasStatus,
        params: &Parameters,
    ) -> Result<Self, PlanError> {
        if !o2_pct.is_finite() || !he_pct.is_finite() {
            return Err(PlanError::InvalidGasMix(
                "fractions must be finite".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&o2_pct) || !(0.0..=100.0).contains(&he_pct) {
            return Err(PlanError::InvalidGasMix(format!(
                "fractions out of range: o2 {o2_pct}%, he {he_pct}%"
            )));
        }
        if o2_pct + he_pct > 100.0 {
            return Err(PlanError::InvalidGasMix(format!(
                "o2 {o2_pct}% + he {he_pct}% exceeds 100%"
            )));
        }
        let surface_ppo2 = o2_pct / 100.0 * params.atm_pressure;
        if surface_ppo2 > params.ppo2_limit(gas_type) {
            return Err(PlanError::InvalidGasMix(format!(
                "surface PpO2 {surface_ppo2:.2} bar exceeds the {gas_type:?} limit"
            )));
        }
        Ok(Gas {
            o2_pct,
            he_pct,
            gas_type,
            status,
        })
    }

    /// Air, the default bottom mix.
    pub fn air(gas_type: GasType) -> Self {
        Gas {
            o2_pct: 21.0,
            he_pct: 0.0,
            gas_type,
            status: GasStatus::Active,
        }
    }

    pub fn n2_pct(&self) -> f64 {
        100.0 - self.o2_pct - self.he_pct
    }

    pub fn fo2(&self) -> f64 {
        self.o2_pct / 100.0
    }

    pub fn fhe(&self) -> f64 {
        self.he_pct / 100.0
    }

    pub fn fn2(&self) -> f64 {
        self.n2_pct() / 100.0
    }

    pub fn is_active(&self) -> bool {
        self.status == GasStatus::Active
    }

    /// Maximum operating depth (m) under the PpO₂ limit for this mix's type.
    pub fn mod_depth(&self, params: &Parameters) -> f64 {
        let fo2 = self.fo2();
        if fo2 <= f64::EPSILON {
            return f64::INFINITY;
        }
        params
            .environment()
            .depth_at(params.ppo2_limit(self.gas_type) / fo2)
    }

    /// Equivalent narcotic depth (m) counting only N₂ as narcotic.
    pub fn end_without_o2(&self, depth_m: f64, env: &Environment) -> f64 {
        let p_amb = env.pressure_at(depth_m);
        env.depth_at(p_amb * self.fn2() / AIR_FN2)
    }

    /// Equivalent narcotic depth (m) counting both O₂ and N₂ as narcotic.
    pub fn end_with_o2(&self, depth_m: f64, env: &Environment) -> f64 {
        let p_amb = env.pressure_at(depth_m);
        env.depth_at(p_amb * (1.0 - self.fhe()))
    }

    /// END under the configured narcosis convention.
    pub fn end(&self, depth_m: f64, params: &Parameters) -> f64 {
        let env = params.environment();
        if params.o2_narcotic {
            self.end_with_o2(depth_m, &env)
        } else {
            self.end_without_o2(depth_m, &env)
        }
    }

    /// Density of the mix (g/L) at depth.
    pub fn density(&self, depth_m: f64, env: &Environment) -> f64 {
        let molar_mass =
            self.fo2() * MOLAR_MASS_O2 + self.fn2() * MOLAR_MASS_N2 + self.fhe() * MOLAR_MASS_HE;
        molar_mass / MOLAR_VOLUME * env.pressure_at(depth_m)
    }

    /// Best mix for a target depth: the highest O₂ the type's PpO₂ limit
    /// allows, then the least helium that keeps END at or under the
    /// configured limit. Both are floored to whole percentages; a negative
    /// helium requirement yields the non-trimix best.
    pub fn best_for_depth(
        depth_m: f64,
        gas_type: GasType,
        params: &Parameters,
    ) -> Result<Self, PlanError> {
        let env = params.environment();
        let p_amb = env.pressure_at(depth_m);
        let o2_pct = (100.0 * params.ppo2_limit(gas_type) / p_amb)
            .floor()
            .min(100.0)
            .max(1.0);

        let p_end = env.pressure_at(params.end_limit);
        let fhe = if params.o2_narcotic {
            1.0 - p_end / p_amb
        } else {
            1.0 - o2_pct / 100.0 - AIR_FN2 * p_end / p_amb
        };
        let he_pct = (fhe * 100.0).floor().max(0.0).min(100.0 - o2_pct);

        Gas::new(o2_pct, he_pct, gas_type, GasStatus::Active, params)
    }
}

/// Ordered list of gas mixes with the builder's selection rules.
#[derive(Debug, Clone, PartialEq)]
pub struct GasList {
    pub gases: Vec<Gas>,
}

impl Default for GasList {
    /// One active 21% bottom mix, the seed the original data file gets.
    fn default() -> Self {
        GasList {
            gases: vec![Gas::air(GasType::Bottom)],
        }
    }
}

impl GasList {
    pub fn new() -> Self {
        GasList { gases: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.gases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gases.is_empty()
    }

    pub fn add(&mut self, gas: Gas) {
        self.gases.push(gas);
    }

    pub fn edit(&mut self, index: usize, gas: Gas) -> bool {
        match self.gases.get_mut(index) {
            Some(slot) => {
                *slot = gas;
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, index: usize) -> bool {
        if index < self.gases.len() {
            self.gases.remove(index);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.gases.clear();
    }

    /// Select the active mix of `gas_type` usable at `depth_m`: MOD at or
    /// beyond the depth, highest O₂, ties broken by higher He.
    pub fn select(&self, depth_m: f64, gas_type: GasType, params: &Parameters) -> Option<&Gas> {
        self.gases
            .iter()
            .filter(|g| {
                g.is_active() && g.gas_type == gas_type && g.mod_depth(params) >= depth_m - 1e-9
            })
            .max_by(|a, b| {
                (a.o2_pct, a.he_pct)
                    .partial_cmp(&(b.o2_pct, b.he_pct))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Select the diluent for closed-circuit use at `depth_m`: the active
    /// diluent with MOD at or beyond the depth carrying the most helium.
    pub fn select_diluent(&self, depth_m: f64, params: &Parameters) -> Option<&Gas> {
        self.gases
            .iter()
            .filter(|g| {
                g.is_active()
                    && g.gas_type == GasType::Diluent
                    && g.mod_depth(params) >= depth_m - 1e-9
            })
            .max_by(|a, b| {
                (a.he_pct, a.o2_pct)
                    .partial_cmp(&(b.he_pct, b.o2_pct))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}
