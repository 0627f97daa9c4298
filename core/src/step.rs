//! One row of a computed dive profile.

use crate::buhlmann::TissueState;
use crate::parameters::Parameters;

/// What a profile segment is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Descent,
    Bottom,
    Ascent,
    /// User-pinned hold from the stop-step list.
    Stop,
    /// Stop generated by the decompression engine.
    DecoStop,
    Surface,
}

/// Breathing mode of a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    OpenCircuit,
    ClosedCircuit,
    Bailout,
}

impl StepMode {
    /// True when the segment draws on open-circuit gas.
    pub fn consumes_gas(self) -> bool {
        !matches!(self, StepMode::ClosedCircuit)
    }
}

/// Warning conditions a step can carry; mirrors the highlighted cells of the
/// original plan table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepWarning {
    GasDensity,
    PpO2High,
    PpO2Low,
    Cns,
    Otu,
}

/// A fully annotated profile segment.
#[derive(Debug, Clone, PartialEq)]
pub struct DiveStep {
    pub phase: Phase,
    pub mode: StepMode,
    /// Depth at segment entry (m).
    pub start_depth: f64,
    /// Depth at segment exit (m).
    pub end_depth: f64,
    /// Duration (min).
    pub time: f64,
    /// Cumulative run time at segment exit (min).
    pub run_time: f64,
    /// Highest ambient pressure seen in the segment (bar).
    pub p_amb_max: f64,
    /// Highest inspired PpO₂ in the segment (bar).
    pub p_o2_max: f64,
    pub o2_pct: f64,
    pub n2_pct: f64,
    pub he_pct: f64,
    /// Supersaturation at segment exit, % of the M-value gradient at depth.
    pub gf_pct: f64,
    /// Supersaturation at segment exit against surface pressure.
    pub gf_surface_pct: f64,
    /// Surface consumption rate applied to the segment (L/min).
    pub sac_rate: f64,
    /// Consumption rate at depth (L/min).
    pub amb_consumption: f64,
    /// Gas drawn over the segment (L).
    pub step_consumption: f64,
    /// Density of the breathed mix at the segment's deepest point (g/L).
    pub gas_density: f64,
    /// END counting only N₂, at the deepest point (m).
    pub end_without_o2: f64,
    /// END counting O₂ and N₂, at the deepest point (m).
    pub end_with_o2: f64,
    /// Cumulative CNS for this dive (%).
    pub cns_single_pct: f64,
    /// Cumulative CNS including decayed prior-dive load (%).
    pub cns_multiple_pct: f64,
    /// Cumulative OTU.
    pub otu_total: f64,
    /// Tissue state at segment exit.
    pub tissue: TissueState,
}

impl DiveStep {
    /// A bare skeleton segment; annotation fields are filled by
    /// `DivePlan::calculate`.
    pub(crate) fn skeleton(
        phase: Phase,
        mode: StepMode,
        start_depth: f64,
        end_depth: f64,
        time: f64,
        o2_pct: f64,
        he_pct: f64,
        tissue: TissueState,
    ) -> Self {
        DiveStep {
            phase,
            mode,
            start_depth,
            end_depth,
            time,
            run_time: 0.0,
            p_amb_max: 0.0,
            p_o2_max: 0.0,
            o2_pct,
            n2_pct: 100.0 - o2_pct - he_pct,
            he_pct,
            gf_pct: 0.0,
            gf_surface_pct: 0.0,
            sac_rate: 0.0,
            amb_consumption: 0.0,
            step_consumption: 0.0,
            gas_density: 0.0,
            end_without_o2: 0.0,
            end_with_o2: 0.0,
            cns_single_pct: 0.0,
            cns_multiple_pct: 0.0,
            otu_total: 0.0,
            tissue,
        }
    }

    /// Deepest point of the segment (m).
    pub fn max_depth(&self) -> f64 {
        self.start_depth.max(self.end_depth)
    }

    /// PpO₂ ceiling that applies to this segment.
    pub fn ppo2_limit(&self, params: &Parameters) -> f64 {
        match (self.mode, self.phase) {
            (StepMode::ClosedCircuit, _) => params.max_ppo2_deco,
            (_, Phase::Descent | Phase::Bottom) => params.max_ppo2_bottom,
            _ => params.max_ppo2_deco,
        }
    }

    /// Warning conditions this step triggers under the given thresholds.
    pub fn warnings(&self, params: &Parameters) -> Vec<StepWarning> {
        let mut out = Vec::new();
        if self.gas_density > params.warning_gas_density {
            out.push(StepWarning::GasDensity);
        }
        if self.p_o2_max > self.ppo2_limit(params) + 1e-9 {
            out.push(StepWarning::PpO2High);
        }
        if self.p_o2_max < params.warning_ppo2_low {
            out.push(StepWarning::PpO2Low);
        }
        if self.cns_single_pct > params.warning_cns_max {
            out.push(StepWarning::Cns);
        }
        if self.otu_total > params.warning_otu_max {
            out.push(StepWarning::Otu);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::DEFAULT_SURFACE_PRESSURE;

    fn step() -> DiveStep {
        DiveStep::skeleton(
            Phase::Bottom,
            StepMode::OpenCircuit,
            30.0,
            30.0,
            20.0,
            21.0,
            0.0,
            TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE),
        )
    }

    #[test]
    fn test_skeleton_derives_n2() {
        let s = DiveStep::skeleton(
            Phase::Bottom,
            StepMode::OpenCircuit,
            60.0,
            60.0,
            25.0,
            18.0,
            45.0,
            TissueState::surface_equilibrium(DEFAULT_SURFACE_PRESSURE),
        );
        assert!((s.n2_pct - 37.0).abs() < 1e-12);
    }

    #[test]
    fn test_mode_consumption_flag() {
        assert!(StepMode::OpenCircuit.consumes_gas());
        assert!(StepMode::Bailout.consumes_gas());
        assert!(!StepMode::ClosedCircuit.consumes_gas());
    }

    #[test]
    fn test_ppo2_limit_by_phase() {
        let params = Parameters::default();
        let mut s = step();
        assert_eq!(s.ppo2_limit(&params), params.max_ppo2_bottom);
        s.phase = Phase::DecoStop;
        assert_eq!(s.ppo2_limit(&params), params.max_ppo2_deco);
        s.mode = StepMode::ClosedCircuit;
        s.phase = Phase::Bottom;
        assert_eq!(s.ppo2_limit(&params), params.max_ppo2_deco);
    }

    #[test]
    fn test_warnings() {
        let params = Parameters::default();
        let mut s = step();
        s.p_o2_max = 1.0;
        assert!(s.warnings(&params).is_empty());

        s.p_o2_max = 1.7;
        s.gas_density = 7.0;
        s.cns_single_pct = 90.0;
        s.otu_total = 300.0;
        let w = s.warnings(&params);
        assert!(w.contains(&StepWarning::PpO2High));
        assert!(w.contains(&StepWarning::GasDensity));
        assert!(w.contains(&StepWarning::Cns));
        assert!(w.contains(&StepWarning::Otu));

        s = step();
        s.p_o2_max = 0.15;
        assert_eq!(s.warnings(&params), vec![StepWarning::PpO2Low]);
    }
}
