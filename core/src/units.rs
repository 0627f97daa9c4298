//! Physical constants and depth/pressure conversions.
//!
//! Pressures are in bar, depths in metres, times in minutes throughout the
//! crate. Ambient pressure follows `P_amb = P_atm + depth · ρ · g`, with the
//! atmospheric pressure and water density taken from the configured
//! [`Environment`].

/// Water vapour pressure in the lungs (bar), at 37°C.
pub const P_WATER_VAPOR: f64 = 0.0627;

/// Default surface atmospheric pressure (bar) at sea level.
pub const DEFAULT_SURFACE_PRESSURE: f64 = 1.01325;

/// Default water density (kg/m³), salt water.
pub const DEFAULT_WATER_DENSITY: f64 = 1025.0;

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.80665;

/// Fraction of N2 in air.
pub const AIR_FN2: f64 = 0.7902;

/// Fraction of O2 in air.
pub const AIR_FO2: f64 = 0.2095;

/// Molar mass of O2 (g/mol).
pub const MOLAR_MASS_O2: f64 = 31.9988;

/// Molar mass of N2 (g/mol).
pub const MOLAR_MASS_N2: f64 = 28.0134;

/// Molar mass of He (g/mol).
pub const MOLAR_MASS_HE: f64 = 4.0026;

/// Molar volume of an ideal gas at 0°C / 1 atm (L/mol).
pub const MOLAR_VOLUME: f64 = 22.414;

/// Water column and atmosphere a dive takes place in.
///
/// Owns the two quantities every depth/pressure conversion needs; the rest
/// of the crate converts through this type rather than hard-coding sea-level
/// salt water.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    /// Surface atmospheric pressure (bar).
    pub atm_pressure: f64,
    /// Water density (kg/m³).
    pub water_density: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            atm_pressure: DEFAULT_SURFACE_PRESSURE,
            water_density: DEFAULT_WATER_DENSITY,
        }
    }
}

impl Environment {
    /// Ambient pressure (bar) at a depth in metres.
    pub fn pressure_at(&self, depth_m: f64) -> f64 {
        self.atm_pressure + depth_m * self.water_density * GRAVITY / 100_000.0
    }

    /// Depth (m) at which the given ambient pressure is reached.
    ///
    /// Pressures at or above the surface map to 0.
    pub fn depth_at(&self, pressure_bar: f64) -> f64 {
        let depth = (pressure_bar - self.atm_pressure) * 100_000.0 / (self.water_density * GRAVITY);
        depth.max(0.0)
    }
}
