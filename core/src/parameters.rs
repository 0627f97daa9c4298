//! Planner configuration.
//!
//! All knobs the engine reads live here: gradient factors, PpO₂ limits,
//! consumption rates, warning thresholds, kinematics, and the environment.
//! The struct is a plain value; the engine snapshots it at build entry, so
//! callers may mutate their copy freely between builds.

use serde::{Deserialize, Serialize};

use crate::gas::GasType;
use crate::units::{Environment, DEFAULT_SURFACE_PRESSURE, DEFAULT_WATER_DENSITY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Gradient factor at the first deco stop (%).
    pub gf_low: f64,
    /// Gradient factor at the surface (%).
    pub gf_high: f64,

    /// PpO₂ ceiling for bottom mixes (bar).
    pub max_ppo2_bottom: f64,
    /// PpO₂ ceiling for deco mixes (bar).
    pub max_ppo2_deco: f64,
    /// PpO₂ ceiling for diluents, and the setpoint fallback when no
    /// setpoint is configured (bar).
    pub max_ppo2_diluent: f64,
    /// Hypoxia warning threshold (bar).
    pub warning_ppo2_low: f64,

    /// Surface air consumption during descent and bottom (L/min).
    pub sac_bottom: f64,
    /// Surface air consumption during ascent and stops (L/min).
    pub sac_deco: f64,

    /// Gas density warning threshold (g/L).
    pub warning_gas_density: f64,
    /// CNS warning threshold (%).
    pub warning_cns_max: f64,
    /// OTU warning threshold.
    pub warning_otu_max: f64,

    /// Equivalent narcotic depth limit used when blending gases (m).
    pub end_limit: f64,
    /// Whether O₂ counts as narcotic in END computations.
    pub o2_narcotic: bool,

    /// Ascent rate (m/min).
    pub ascent_rate: f64,
    /// Descent rate (m/min).
    pub descent_rate: f64,
    /// Spacing of the decompression stop grid (m).
    pub stop_increment: f64,
    /// Depth of the default shallow waypoint (m).
    pub last_stop_depth: f64,
    /// A stop that has not cleared its ceiling after this many minutes makes
    /// the dive unplannable.
    pub max_stop_minutes: u32,

    /// Surface atmospheric pressure (bar).
    pub atm_pressure: f64,
    /// Water density (kg/m³).
    pub water_density: f64,

    /// Extra time-to-surface the MaxTime service may spend over the original
    /// plan (min).
    pub max_time_budget_min: f64,

    /// Default tank count per mix for consumption roll-ups.
    pub tank_count: u32,
    /// Default tank water capacity (L).
    pub tank_capacity_l: f64,
    /// Default tank filling pressure (bar).
    pub tank_filling_pressure: f64,
    /// Reserve multiplier applied to consumed gas when estimating the
    /// required end pressure (1.5 = rule of thirds).
    pub reserve_multiplier: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            gf_low: 30.0,
            gf_high: 70.0,
            max_ppo2_bottom: 1.4,
            max_ppo2_deco: 1.6,
            max_ppo2_diluent: 1.3,
            warning_ppo2_low: 0.7,
            sac_bottom: 20.0,
            sac_deco: 20.0,
            warning_gas_density: 6.3,
            warning_cns_max: 80.0,
            warning_otu_max: 250.0,
            end_limit: 30.0,
            o2_narcotic: true,
            ascent_rate: 9.0,
            descent_rate: 18.0,
            stop_increment: 3.0,
            last_stop_depth: 3.0,
            max_stop_minutes: 999,
            atm_pressure: DEFAULT_SURFACE_PRESSURE,
            water_density: DEFAULT_WATER_DENSITY,
            max_time_budget_min: 1.0,
            tank_count: 1,
            tank_capacity_l: 12.0,
            tank_filling_pressure: 200.0,
            reserve_multiplier: 1.5,
        }
    }
}

impl Parameters {
    /// The environment (atmosphere + water column) these parameters describe.
    pub fn environment(&self) -> Environment {
        Environment {
            atm_pressure: self.atm_pressure,
            water_density: self.water_density,
        }
    }

    /// PpO₂ ceiling for a gas of the given type (bar).
    pub fn ppo2_limit(&self, gas_type: GasType) -> f64 {
        match gas_type {
            GasType::Bottom => self.max_ppo2_bottom,
            GasType::Deco => self.max_ppo2_deco,
            GasType::Diluent => self.max_ppo2_diluent,
        }
    }

    /// Gradient factor low as a fraction.
    pub fn gf_low_fraction(&self) -> f64 {
        self.gf_low / 100.0
    }

    /// Gradient factor high as a fraction.
    pub fn gf_high_fraction(&self) -> f64 {
        self.gf_high / 100.0
    }
}
