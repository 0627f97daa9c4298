//! Bühlmann ZH-L16C tissue model with gradient factors.
//!
//! Sixteen compartments track N₂ and He partial pressures through the
//! Schreiner equation (closed-form loading under a linear ambient-pressure
//! ramp). Ceilings come from the Workman/Baker weighted M-value coefficients
//! with the gradient-factor reformulation; the GF schedule interpolates
//! linearly from GF-low at the first deco stop to GF-high at the surface.

use crate::units::P_WATER_VAPOR;

// ============================================================================
// ZHL-16C Compartment Constants (Bühlmann / Baker)
// ============================================================================

/// Number of tissue compartments.
pub const NUM_COMPARTMENTS: usize = 16;

/// N2 half-times in minutes for compartments 1–16 (ZHL-16C).
const N2_HALF_TIMES: [f64; NUM_COMPARTMENTS] = [
    5.0, 8.0, 12.5, 18.5, 27.0, 38.3, 54.3, 77.0, 109.0, 146.0, 187.0, 239.0, 305.0, 390.0, 498.0,
    635.0,
];

/// He half-times in minutes for compartments 1–16 (ZHL-16C).
const HE_HALF_TIMES: [f64; NUM_COMPARTMENTS] = [
    1.88, 3.02, 4.72, 6.99, 10.21, 14.48, 20.53, 29.11, 41.20, 55.19, 70.69, 90.34, 115.29, 147.42,
    188.24, 240.03,
];

/// N2 'a' coefficients (bar) for ZHL-16C.
const A_N2: [f64; NUM_COMPARTMENTS] = [
    1.1696, 1.0000, 0.8618, 0.7562, 0.6200, 0.5043, 0.4410, 0.4000, 0.3750, 0.3500, 0.3295, 0.3065,
    0.2835, 0.2610, 0.2480, 0.2327,
];

/// N2 'b' coefficients (dimensionless) for ZHL-16C.
const B_N2: [f64; NUM_COMPARTMENTS] = [
    0.5578, 0.6514, 0.7222, 0.7825, 0.8126, 0.8434, 0.8693, 0.8910, 0.9092, 0.9222, 0.9319, 0.9403,
    0.9477, 0.9544, 0.9602, 0.9653,
];

/// He 'a' coefficients (bar) for ZHL-16C.
const A_HE: [f64; NUM_COMPARTMENTS] = [
    1.6189, 1.3830, 1.1919, 1.0458, 0.9220, 0.8205, 0.7305, 0.6502, 0.5950, 0.5545, 0.5333, 0.5189,
    0.5181, 0.5176, 0.5172, 0.5119,
];

/// He 'b' coefficients (dimensionless) for ZHL-16C.
const B_HE: [f64; NUM_COMPARTMENTS] = [
    0.4770, 0.5747, 0.6527, 0.7223, 0.7582, 0.7957, 0.8279, 0.8553, 0.8757, 0.8903, 0.8997, 0.9073,
    0.9122, 0.9171, 0.9217, 0.9267,
];

/// Fraction of N2 in air, for surface equilibrium.
const AIR_FN2: f64 = crate::units::AIR_FN2;

const EPS_TIME: f64 = 1e-9;
const EPS_PRESSURE: f64 = 1e-10;

// ============================================================================
// Inspired gas
// ============================================================================

/// Inert fractions of the inspired gas for one segment.
///
/// For open circuit these are the mix fractions; for closed circuit they are
/// the effective loop fractions once the setpoint has displaced its share of
/// the inspired pressure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InspiredFractions {
    pub f_n2: f64,
    pub f_he: f64,
}

// ============================================================================
// Tissue State
// ============================================================================

/// State of the 16 tissue compartments.
#[derive(Debug, Clone, PartialEq)]
pub struct TissueState {
    /// N2 partial pressure in each compartment (bar).
    p_n2: [f64; NUM_COMPARTMENTS],
    /// He partial pressure in each compartment (bar).
    p_he: [f64; NUM_COMPARTMENTS],
}

impl TissueState {
    /// Tissues at surface equilibrium, breathing air.
    pub fn surface_equilibrium(surface_pressure: f64) -> Self {
        let p_n2_surface = (surface_pressure - P_WATER_VAPOR) * AIR_FN2;
        TissueState {
            p_n2: [p_n2_surface; NUM_COMPARTMENTS],
            p_he: [0.0; NUM_COMPARTMENTS],
        }
    }

    /// N2 loading of compartment `i` (bar).
    pub fn n2(&self, i: usize) -> f64 {
        self.p_n2[i]
    }

    /// He loading of compartment `i` (bar).
    pub fn he(&self, i: usize) -> f64 {
        self.p_he[i]
    }

    /// Per-compartment `(pN2, pHe)` pairs.
    pub fn loads(&self) -> Vec<(f64, f64)> {
        (0..NUM_COMPARTMENTS)
            .map(|i| (self.p_n2[i], self.p_he[i]))
            .collect()
    }

    /// Load all compartments through a linear ambient-pressure ramp from
    /// `p_amb_start` to `p_amb_end` over `time` minutes.
    pub fn load(&mut self, p_amb_start: f64, p_amb_end: f64, time: f64, inspired: &InspiredFractions) {
        if time <= EPS_TIME {
            return;
        }
        for i in 0..NUM_COMPARTMENTS {
            self.p_n2[i] = schreiner(
                self.p_n2[i],
                N2_HALF_TIMES[i],
                p_amb_start,
                p_amb_end,
                time,
                inspired.f_n2,
            );
            self.p_he[i] = schreiner(
                self.p_he[i],
                HE_HALF_TIMES[i],
                p_amb_start,
                p_amb_end,
                time,
                inspired.f_he,
            );
            debug_assert!(
                self.p_n2[i].is_finite() && self.p_n2[i] >= 0.0,
                "compartment {i} N2 load invalid: {}",
                self.p_n2[i]
            );
            debug_assert!(
                self.p_he[i].is_finite() && self.p_he[i] >= 0.0,
                "compartment {i} He load invalid: {}",
                self.p_he[i]
            );
        }
    }

    /// Weighted Workman/Baker coefficients for compartment `i`, falling back
    /// to the N2 pair when the compartment is effectively empty.
    fn weighted_ab(&self, i: usize) -> (f64, f64) {
        let p_total = self.p_n2[i] + self.p_he[i];
        if p_total > EPS_PRESSURE {
            let a = (A_N2[i] * self.p_n2[i] + A_HE[i] * self.p_he[i]) / p_total;
            let b = (B_N2[i] * self.p_n2[i] + B_HE[i] * self.p_he[i]) / p_total;
            (a, b)
        } else {
            (A_N2[i], B_N2[i])
        }
    }

    /// Lowest ambient pressure (bar) every compartment tolerates at the
    /// given gradient factor (fraction).
    pub fn ceiling_pressure(&self, gf: f64) -> f64 {
        let mut max_tolerated: f64 = 0.0;
        for i in 0..NUM_COMPARTMENTS {
            let p_total = self.p_n2[i] + self.p_he[i];
            let (a, b) = self.weighted_ab(i);
            let tolerated = (p_total - gf * a) / (gf / b + 1.0 - gf);
            if tolerated > max_tolerated {
                max_tolerated = tolerated;
            }
        }
        max_tolerated
    }

    /// Current gradient as a percentage of the M-value gradient at the given
    /// ambient pressure, over the leading compartment. At the surface this is
    /// the surfacing gradient factor.
    pub fn supersaturation_pct(&self, ambient_pressure: f64) -> f64 {
        let mut max_gf: f64 = 0.0;
        for i in 0..NUM_COMPARTMENTS {
            let p_total = self.p_n2[i] + self.p_he[i];
            let (a, b) = self.weighted_ab(i);

            let m_value = a + ambient_pressure / b;
            let denom = m_value - ambient_pressure;
            if denom > EPS_PRESSURE {
                let gf = (p_total - ambient_pressure) / denom * 100.0;
                if gf > max_gf {
                    max_gf = gf;
                }
            }
        }
        max_gf
    }
}

// ============================================================================
// Kinetics and the GF schedule
// ============================================================================

/// Schreiner equation for one compartment and one inert gas.
///
/// `p0` is the compartment load at segment start, `f` the inspired inert
/// fraction. When the pressure ramp vanishes this reduces to the instantaneous
/// exponential (Haldane) form, which avoids the 0/0 in the rate term.
fn schreiner(p0: f64, half_time: f64, p_amb_start: f64, p_amb_end: f64, time: f64, f: f64) -> f64 {
    let k = std::f64::consts::LN_2 / half_time;
    let p_alv0 = (p_amb_start - P_WATER_VAPOR) * f;
    let rate = (p_amb_end - p_amb_start) * f / time;

    if rate.abs() < EPS_PRESSURE {
        p_alv0 + (p0 - p_alv0) * (-k * time).exp()
    } else {
        p_alv0 + rate * (time - 1.0 / k) - (p_alv0 - p0 - rate / k) * (-k * time).exp()
    }
}

/// Gradient factor (fraction) in effect at `depth`.
///
/// Interpolates linearly from `gf_lo` at `first_deco_depth` to `gf_hi` at the
/// surface and clamps to that range. A zero or unset first deco depth means
/// no obligation was ever detected, and `gf_hi` applies.
pub fn gf_at(depth: f64, first_deco_depth: f64, gf_lo: f64, gf_hi: f64) -> f64 {
    if first_deco_depth <= 0.0 {
        return gf_hi;
    }
    if depth >= first_deco_depth {
        return gf_lo;
    }
    if depth <= 0.0 {
        return gf_hi;
    }
    let gf = gf_lo + (gf_hi - gf_lo) * (first_deco_depth - depth) / first_deco_depth;
    gf.clamp(gf_lo.min(gf_hi), gf_hi.max(gf_lo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::DEFAULT_SURFACE_PRESSURE;

    const AIR: InspiredFractions = InspiredFractions {
        f_n2: 0.7902,
        f_he: 0.0,
    };

    #[test]
    fn test_surface_equilibrium() {
        let tissues = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        let expected = (DEFAULT_SURFACE_PRESSURE - P_WATER_VAPOR) * 0.7902;
        for i in 0..NUM_COMPARTMENTS {
            assert!((tissues.n2(i) - expected).abs() < 1e-12);
            assert_eq!(tissues.he(i), 0.0);
        }
        // At equilibrium the surfacing gradient is ~0.
        let sgf = tissues.supersaturation_pct(DEFAULT_SURFACE_PRESSURE);
        assert!(sgf < 1.0, "equilibrium SurfGF should be ~0, got {sgf}");
    }

    #[test]
    fn test_constant_depth_loading_approaches_inspired() {
        let mut tissues = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        let p_amb = 4.0;
        // Fourteen half-times of the fastest compartment at constant depth.
        tissues.load(p_amb, p_amb, 70.0, &AIR);
        let inspired = (p_amb - P_WATER_VAPOR) * AIR.f_n2;
        assert!(
            (tissues.n2(0) - inspired).abs() < 1e-3,
            "fast compartment should be saturated: {} vs {inspired}",
            tissues.n2(0)
        );
        // The slowest compartment is far from saturated.
        assert!(tissues.n2(15) < inspired * 0.5);
    }

    #[test]
    fn test_zero_time_is_identity() {
        let mut tissues = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        let before = tissues.clone();
        tissues.load(1.0, 5.0, 0.0, &AIR);
        assert_eq!(tissues, before);
    }

    #[test]
    fn test_ramp_matches_split_constant_segments() {
        // A slow ramp integrated in one Schreiner call should land close to
        // the same ramp chopped into many small constant-pressure pieces.
        let mut ramped = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        ramped.load(1.0, 4.0, 3.0, &AIR);

        let mut chopped = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        let n = 3000;
        for step in 0..n {
            let p = 1.0 + 3.0 * (step as f64 + 0.5) / n as f64;
            chopped.load(p, p, 3.0 / n as f64, &AIR);
        }

        for i in 0..NUM_COMPARTMENTS {
            assert!(
                (ramped.n2(i) - chopped.n2(i)).abs() < 1e-3,
                "compartment {i}: ramp {} vs chopped {}",
                ramped.n2(i),
                chopped.n2(i)
            );
        }
    }

    #[test]
    fn test_helium_loads_faster_than_nitrogen() {
        let mut tissues = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        let trimix = InspiredFractions {
            f_n2: 0.40,
            f_he: 0.40,
        };
        tissues.load(4.0, 4.0, 5.0, &trimix);
        // Equal fractions, but He half-times are shorter: compartment 1 He
        // load should exceed the N2 *delta* from its starting level.
        let n2_delta = tissues.n2(0) - (DEFAULT_SURFACE_PRESSURE - P_WATER_VAPOR) * 0.7902;
        assert!(
            tissues.he(0) > n2_delta,
            "He {} should outpace N2 delta {n2_delta}",
            tissues.he(0)
        );
    }

    #[test]
    fn test_ceiling_rises_with_loading() {
        let mut tissues = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        let before = tissues.ceiling_pressure(0.3);
        tissues.load(4.0, 4.0, 30.0, &AIR);
        let after = tissues.ceiling_pressure(0.3);
        assert!(
            after > before,
            "loading must raise the ceiling: {before} -> {after}"
        );
        assert!(
            after > DEFAULT_SURFACE_PRESSURE,
            "30 min at ~30 m on air at GF30 must show an obligation"
        );
    }

    #[test]
    fn test_ceiling_lower_at_higher_gf() {
        let mut tissues = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        tissues.load(4.0, 4.0, 30.0, &AIR);
        assert!(tissues.ceiling_pressure(0.9) < tissues.ceiling_pressure(0.3));
    }

    #[test]
    fn test_empty_compartment_uses_n2_coefficients() {
        // All-zero loads exercise the fallback; tolerated pressure must be
        // finite and non-positive in deco terms.
        let tissues = TissueState {
            p_n2: [0.0; NUM_COMPARTMENTS],
            p_he: [0.0; NUM_COMPARTMENTS],
        };
        let p = tissues.ceiling_pressure(0.85);
        assert!(p.is_finite());
        assert!(p <= 0.0, "empty tissues tolerate any ambient: {p}");
    }

    #[test]
    fn test_supersaturation_grows_with_exposure() {
        let mut tissues = TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE);
        tissues.load(4.0, 4.0, 10.0, &AIR);
        let early = tissues.supersaturation_pct(DEFAULT_SURFACE_PRESSURE);
        tissues.load(4.0, 4.0, 20.0, &AIR);
        let late = tissues.supersaturation_pct(DEFAULT_SURFACE_PRESSURE);
        assert!(late > early, "SurfGF should grow: {early} -> {late}");
        assert!(
            (80.0..140.0).contains(&late),
            "30 min at ~30 m air SurfGF expected ~100-120%, got {late}"
        );
    }

    #[test]
    fn test_gf_schedule_interpolation() {
        let lo = 0.3;
        let hi = 0.7;
        // No obligation: high GF everywhere.
        assert_eq!(gf_at(12.0, 0.0, lo, hi), hi);
        // At and below the first stop: low GF.
        assert_eq!(gf_at(12.0, 12.0, lo, hi), lo);
        assert_eq!(gf_at(30.0, 12.0, lo, hi), lo);
        // Surface: high GF.
        assert_eq!(gf_at(0.0, 12.0, lo, hi), hi);
        // Midpoint.
        let mid = gf_at(6.0, 12.0, lo, hi);
        assert!((mid - 0.5).abs() < 1e-12, "expected 0.5, got {mid}");
    }
}
