//! Oxygen toxicity accounting: CNS and OTU.
//!
//! CNS exposure fractions come from a piecewise-linear fit of the NOAA
//! single-exposure limits; OTU follows the Harlan–Hamilton power law. Both
//! accumulate per segment in the plan.

/// One band of the CNS exposure-limit table.
///
/// Within `[ppo2_min, ppo2_max)` the tolerated exposure in minutes is
/// `slope · PpO2 + intercept`.
#[derive(Debug, Clone, Copy)]
pub struct CnsCoeffRow {
    pub ppo2_min: f64,
    pub ppo2_max: f64,
    pub slope: f64,
    pub intercept: f64,
}

/// Piecewise-linear NOAA limits, 0.5–1.65 bar.
pub const CNS_COEFFICIENTS: [CnsCoeffRow; 7] = [
    CnsCoeffRow { ppo2_min: 0.5, ppo2_max: 0.6, slope: -1800.0, intercept: 1800.0 },
    CnsCoeffRow { ppo2_min: 0.6, ppo2_max: 0.7, slope: -1500.0, intercept: 1620.0 },
    CnsCoeffRow { ppo2_min: 0.7, ppo2_max: 0.8, slope: -1200.0, intercept: 1410.0 },
    CnsCoeffRow { ppo2_min: 0.8, ppo2_max: 0.9, slope: -900.0, intercept: 1170.0 },
    CnsCoeffRow { ppo2_min: 0.9, ppo2_max: 1.1, slope: -600.0, intercept: 900.0 },
    CnsCoeffRow { ppo2_min: 1.1, ppo2_max: 1.5, slope: -300.0, intercept: 570.0 },
    CnsCoeffRow { ppo2_min: 1.5, ppo2_max: 1.65, slope: -750.0, intercept: 1245.0 },
];

/// Half-life of the CNS clock during a surface interval (minutes).
pub const CNS_HALF_LIFE_MIN: f64 = 90.0;

/// Tolerated single-exposure time (minutes) at a PpO₂, or `None` below the
/// table floor where the CNS clock does not run.
pub fn exposure_limit_min(ppo2: f64) -> Option<f64> {
    if ppo2 < CNS_COEFFICIENTS[0].ppo2_min {
        return None;
    }
    for row in &CNS_COEFFICIENTS {
        if ppo2 < row.ppo2_max {
            return Some(row.slope * ppo2 + row.intercept);
        }
    }
    // Beyond the table the top-edge limit keeps applying; the linear band
    // would collapse to zero just past it. The PpO2 warning flags the
    // excursion itself.
    let last = CNS_COEFFICIENTS[CNS_COEFFICIENTS.len() - 1];
    Some(last.slope * last.ppo2_max + last.intercept)
}

/// CNS fraction (%) accrued over `time_min` at a PpO₂.
pub fn cns_fraction_pct(ppo2: f64, time_min: f64) -> f64 {
    match exposure_limit_min(ppo2) {
        Some(limit) => time_min / limit * 100.0,
        None => 0.0,
    }
}

/// OTU accrued over `time_min` at a PpO₂ (Harlan–Hamilton).
pub fn otu(ppo2: f64, time_min: f64) -> f64 {
    if ppo2 <= 0.5 {
        return 0.0;
    }
    time_min * ((ppo2 - 0.5) / 0.5).powf(5.0 / 6.0)
}

/// A prior dive's CNS (%) decayed across a surface interval.
pub fn decayed_cns_pct(cns_pct: f64, surface_interval_min: f64) -> f64 {
    cns_pct * 0.5_f64.powf(surface_interval_min / CNS_HALF_LIFE_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_noaa_anchors() {
        // NOAA single-exposure limits: 45 min at 1.6, 150 min at 1.4,
        // 720 min at 0.6.
        assert!((exposure_limit_min(1.6).unwrap() - 45.0).abs() < 1e-9);
        assert!((exposure_limit_min(1.4).unwrap() - 150.0).abs() < 1e-9);
        assert!((exposure_limit_min(0.6).unwrap() - 720.0).abs() < 1e-9);
    }

    #[test]
    fn test_table_is_continuous_at_band_edges() {
        for pair in CNS_COEFFICIENTS.windows(2) {
            let edge = pair[1].ppo2_min;
            let left = pair[0].slope * edge + pair[0].intercept;
            let right = pair[1].slope * edge + pair[1].intercept;
            assert!(
                (left - right).abs() < 1e-9,
                "discontinuity at {edge}: {left} vs {right}"
            );
        }
    }

    #[test]
    fn test_no_cns_below_half_bar() {
        assert_eq!(exposure_limit_min(0.3), None);
        assert_eq!(cns_fraction_pct(0.49, 60.0), 0.0);
    }

    #[test]
    fn test_cns_fraction() {
        // 30 minutes at 1.4 bar is a fifth of the 150-minute limit.
        let cns = cns_fraction_pct(1.4, 30.0);
        assert!((cns - 20.0).abs() < 1e-9, "expected 20%, got {cns}");
    }

    #[test]
    fn test_extrapolation_saturates_at_table_edge() {
        let edge = exposure_limit_min(1.649).unwrap();
        let beyond = exposure_limit_min(1.9).unwrap();
        assert!((beyond - 7.5).abs() < 1e-9, "expected 7.5 min, got {beyond}");
        assert!(beyond <= edge);
        assert!(cns_fraction_pct(1.9, 1.0).is_finite());
    }

    #[test]
    fn test_otu() {
        // At 1.0 bar the power term is 1: OTU equals minutes.
        assert!((otu(1.0, 30.0) - 30.0).abs() < 1e-9);
        assert_eq!(otu(0.4, 30.0), 0.0);
        assert!(otu(1.4, 30.0) > otu(1.0, 30.0));
    }

    #[test]
    fn test_cns_decay_half_life() {
        assert!((decayed_cns_pct(40.0, 90.0) - 20.0).abs() < 1e-9);
        assert!((decayed_cns_pct(40.0, 0.0) - 40.0).abs() < 1e-9);
        assert!(decayed_cns_pct(40.0, 360.0) < 3.0);
    }
}
