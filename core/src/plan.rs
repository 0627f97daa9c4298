//! The dive plan: profile construction and per-step annotation.
//!
//! `build()` runs the profile state machine — descent, bottom, user stop
//! steps interleaved with generated decompression stops, surfacing — while
//! integrating the tissue model, then derives every step field. `calculate()`
//! re-derives the fields for a fixed step skeleton, which is what a
//! non-structural input change (a setpoint value, a SAC rate) needs.
//!
//! The plan owns value snapshots of its collaborators (parameters, gas list,
//! setpoints, stop steps); callers mutate those copies between builds, never
//! during one.

use tracing::debug;

use crate::buhlmann::{gf_at, InspiredFractions, TissueState};
use crate::error::PlanError;
use crate::gas::{Gas, GasList, GasStatus, GasType};
use crate::oxygen;
use crate::parameters::Parameters;
use crate::setpoints::SetPoints;
use crate::step::{DiveStep, Phase, StepMode};
use crate::stopsteps::{StopStep, StopSteps};
use crate::units::{Environment, P_WATER_VAPOR};

/// Breathing mode of the plan as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiveMode {
    OpenCircuit,
    ClosedCircuit,
}

/// Per-mix consumption roll-up, one row of the original gases table.
#[derive(Debug, Clone, PartialEq)]
pub struct GasUse {
    pub o2_pct: f64,
    pub he_pct: f64,
    /// Gas drawn across all segments on this mix (L).
    pub litres: f64,
    pub tank_count: u32,
    pub tank_capacity_l: f64,
    pub filling_pressure_bar: f64,
    /// Pressure that should still be in the tanks back at the surface.
    pub reserve_pressure_bar: f64,
    /// Estimated tank pressure after the dive.
    pub end_pressure_bar: f64,
    /// Whether the estimated end pressure clears the reserve.
    pub sufficient: bool,
}

/// Headline numbers for a built plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub max_depth_m: f64,
    pub runtime_min: f64,
    /// Time to surface measured from the end of the bottom phase.
    pub tts_min: f64,
    /// Total generated decompression-stop time.
    pub deco_time_min: f64,
    pub cns_pct: f64,
    pub otu: f64,
    pub gas_use: Vec<GasUse>,
}

#[derive(Debug, Clone)]
pub struct DivePlan {
    pub target_depth: f64,
    pub bottom_time: f64,
    pub mode: DiveMode,
    /// In CC mode, plan the ascent as an open-circuit bailout.
    pub bailout: bool,
    /// Enables the depth-dependent setpoint schedule; off means the deepest
    /// setpoint applies throughout.
    pub gf_boosted: bool,
    /// Surface interval before this dive (min), for the multi-dive CNS clock.
    pub surface_interval_min: f64,
    /// CNS carried into this dive before decay (%).
    pub prior_cns_pct: f64,

    pub parameters: Parameters,
    pub gases: GasList,
    pub set_points: SetPoints,
    pub stop_steps: StopSteps,

    initial_tissue: TissueState,
    steps: Vec<DiveStep>,
    first_deco_depth: Option<f64>,
}

impl DivePlan {
    pub fn new(
        target_depth: f64,
        bottom_time: f64,
        mode: DiveMode,
        gf_boosted: bool,
        initial_tissue: TissueState,
    ) -> Self {
        DivePlan {
            target_depth,
            bottom_time,
            mode,
            bailout: false,
            gf_boosted,
            surface_interval_min: 0.0,
            prior_cns_pct: 0.0,
            parameters: Parameters::default(),
            gases: GasList::default(),
            set_points: SetPoints::default(),
            stop_steps: StopSteps::default(),
            initial_tissue,
            steps: Vec::new(),
            first_deco_depth: None,
        }
    }

    pub fn steps(&self) -> &[DiveStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&DiveStep> {
        self.steps.get(index)
    }

    pub fn nb_of_steps(&self) -> usize {
        self.steps.len()
    }

    /// Depth of the first generated deco stop, once one was detected.
    pub fn first_deco_depth(&self) -> Option<f64> {
        self.first_deco_depth
    }

    /// Total run time of the built profile (min).
    pub fn runtime(&self) -> f64 {
        self.steps.last().map(|s| s.run_time).unwrap_or(0.0)
    }

    /// Rebuild the profile from the current inputs.
    pub fn build(&mut self) -> Result<(), PlanError> {
        let mut steps = Vec::new();
        self.first_deco_depth = None;
        let result = self.build_profile(&mut steps);
        // On an unplannable ascent the offending stop is still emitted, so
        // the partial profile remains inspectable next to the error.
        self.steps = steps;
        self.calculate()?;
        result
    }

    fn build_profile(&mut self, steps: &mut Vec<DiveStep>) -> Result<(), PlanError> {
        let params = self.parameters.clone();
        let env = params.environment();
        let mut tissue = self.initial_tissue.clone();

        let plan_cc = self.mode == DiveMode::ClosedCircuit;
        let bottom_mode = if plan_cc {
            StepMode::ClosedCircuit
        } else {
            StepMode::OpenCircuit
        };
        let ascent_mode = match (plan_cc, self.bailout) {
            (true, true) => StepMode::Bailout,
            (true, false) => StepMode::ClosedCircuit,
            (false, _) => StepMode::OpenCircuit,
        };

        let bottom_gas = if plan_cc {
            self.gases
                .select_diluent(self.target_depth, &params)
                .copied()
                .ok_or(PlanError::NoGasForDepth {
                    depth_m: self.target_depth,
                })?
        } else {
            self.gases
                .select(self.target_depth, GasType::Bottom, &params)
                .copied()
                .ok_or(PlanError::NoGasForDepth {
                    depth_m: self.target_depth,
                })?
        };

        // Descent, then the remainder of the bottom time at target depth.
        let descent_time = self.target_depth / params.descent_rate;
        self.push(
            steps,
            &mut tissue,
            Phase::Descent,
            bottom_mode,
            0.0,
            self.target_depth,
            descent_time,
            bottom_gas,
            &params,
            &env,
        );
        let bottom_segment = (self.bottom_time - descent_time).max(0.0);
        self.push(
            steps,
            &mut tissue,
            Phase::Bottom,
            bottom_mode,
            self.target_depth,
            self.target_depth,
            bottom_segment,
            bottom_gas,
            &params,
            &env,
        );

        // Ascend, holding each pinned waypoint on the way up.
        let mut current = self.target_depth;
        let mut current_gas = bottom_gas;
        let pinned: Vec<StopStep> = self.stop_steps.as_slice().to_vec();
        for stop in pinned {
            if stop.depth > current + 1e-9 {
                debug!(depth = stop.depth, "skipping stop step below current depth");
                continue;
            }
            self.ascend(
                steps,
                &mut tissue,
                &mut current,
                &mut current_gas,
                stop.depth,
                ascent_mode,
                &params,
                &env,
            )?;
            self.push(
                steps,
                &mut tissue,
                Phase::Stop,
                ascent_mode,
                current,
                current,
                stop.time,
                current_gas,
                &params,
                &env,
            );
        }
        self.ascend(
            steps,
            &mut tissue,
            &mut current,
            &mut current_gas,
            0.0,
            ascent_mode,
            &params,
            &env,
        )?;
        self.push(
            steps,
            &mut tissue,
            Phase::Surface,
            ascent_mode,
            0.0,
            0.0,
            0.0,
            current_gas,
            &params,
            &env,
        );

        Ok(())
    }

    /// Ascend from `*current` to `to`, one stop-grid increment at a time,
    /// inserting decompression stops whenever the ceiling still reaches the
    /// depth being vacated.
    #[allow(clippy::too_many_arguments)]
    fn ascend(
        &mut self,
        steps: &mut Vec<DiveStep>,
        tissue: &mut TissueState,
        current: &mut f64,
        current_gas: &mut Gas,
        to: f64,
        mode: StepMode,
        params: &Parameters,
        env: &Environment,
    ) -> Result<(), PlanError> {
        let gf_lo = params.gf_low_fraction();
        let gf_hi = params.gf_high_fraction();

        while *current > to + 1e-9 {
            let next = next_grid_depth(*current, to, params.stop_increment);
            let fd = self.first_deco_depth.unwrap_or(0.0);
            let gf_next = gf_at(next, fd, gf_lo, gf_hi);

            // A stop breathes the deco mix selectable at its own depth.
            if mode.consumes_gas() {
                if let Some(g) = self.gases.select(*current, GasType::Deco, params) {
                    if *g != *current_gas {
                        *current_gas = *g;
                    }
                }
            }

            // Probe minute by minute until the ceiling no longer reaches the
            // depth being vacated; the travel segment itself supplies the
            // remaining off-gassing on the way to the next stop.
            let mut minutes: u32 = 0;
            let mut probe = tissue.clone();
            let p_stop = env.pressure_at(*current);
            loop {
                if ceiling_depth(&probe, gf_next, params, env) <= *current + 1e-6 {
                    break;
                }
                if minutes >= params.max_stop_minutes {
                    self.push(
                        steps,
                        tissue,
                        Phase::DecoStop,
                        mode,
                        *current,
                        *current,
                        minutes as f64,
                        *current_gas,
                        params,
                        env,
                    );
                    return Err(PlanError::Unplannable {
                        depth_m: *current,
                        max_stop_min: params.max_stop_minutes,
                        tissue: probe,
                    });
                }
                let probe_step = DiveStep::skeleton(
                    Phase::DecoStop,
                    mode,
                    *current,
                    *current,
                    1.0,
                    current_gas.o2_pct,
                    current_gas.he_pct,
                    probe.clone(),
                );
                let breath = breathing(&probe_step, &self.set_points, self.gf_boosted, params, env);
                probe.load(p_stop, p_stop, 1.0, &breath.fractions);
                minutes += 1;
            }
            if minutes > 0 {
                self.push(
                    steps,
                    tissue,
                    Phase::DecoStop,
                    mode,
                    *current,
                    *current,
                    minutes as f64,
                    *current_gas,
                    params,
                    env,
                );
            }

            // Travel segment; its mix is selected against the shallow end.
            if mode.consumes_gas() {
                if let Some(g) = self.gases.select(next, GasType::Deco, params) {
                    if *g != *current_gas {
                        debug!(depth = next, o2 = g.o2_pct, he = g.he_pct, "gas switch");
                        *current_gas = *g;
                    }
                }
            }
            let travel_time = (*current - next) / params.ascent_rate;
            self.push(
                steps,
                tissue,
                Phase::Ascent,
                mode,
                *current,
                next,
                travel_time,
                *current_gas,
                params,
                env,
            );
            *current = next;
        }
        Ok(())
    }

    /// Append a skeleton step, advance the working tissue through it, and
    /// watch for the first deco obligation.
    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        steps: &mut Vec<DiveStep>,
        tissue: &mut TissueState,
        phase: Phase,
        mode: StepMode,
        start_depth: f64,
        end_depth: f64,
        time: f64,
        gas: Gas,
        params: &Parameters,
        env: &Environment,
    ) {
        let step = DiveStep::skeleton(
            phase,
            mode,
            start_depth,
            end_depth,
            time,
            gas.o2_pct,
            gas.he_pct,
            tissue.clone(),
        );
        let breath = breathing(&step, &self.set_points, self.gf_boosted, params, env);
        tissue.load(
            env.pressure_at(start_depth),
            env.pressure_at(end_depth),
            time,
            &breath.fractions,
        );
        steps.push(step);

        if self.first_deco_depth.is_none() {
            let d = ceiling_depth(tissue, params.gf_low_fraction(), params, env);
            if d > 0.0 {
                debug!(first_deco_depth = d, "deco obligation detected");
                self.first_deco_depth = Some(d);
            }
        }
    }

    /// Re-derive every annotation for the current step skeleton.
    pub fn calculate(&mut self) -> Result<(), PlanError> {
        let params = self.parameters.clone();
        let env = params.environment();
        let surface_pressure = env.pressure_at(0.0);
        let prior = oxygen::decayed_cns_pct(self.prior_cns_pct, self.surface_interval_min);

        let mut tissue = self.initial_tissue.clone();
        let mut run_time = 0.0;
        let mut cns = 0.0;
        let mut otu_total = 0.0;

        let mut steps = std::mem::take(&mut self.steps);
        for step in steps.iter_mut() {
            let p_start = env.pressure_at(step.start_depth);
            let p_end = env.pressure_at(step.end_depth);
            let p_max = p_start.max(p_end);
            let p_mean = 0.5 * (p_start + p_end);

            let breath = breathing(step, &self.set_points, self.gf_boosted, &params, &env);
            tissue.load(p_start, p_end, step.time, &breath.fractions);
            run_time += step.time;
            cns += oxygen::cns_fraction_pct(breath.po2_max, step.time);
            otu_total += oxygen::otu(breath.po2_max, step.time);

            step.run_time = run_time;
            step.p_amb_max = p_max;
            step.p_o2_max = breath.po2_max;
            step.gf_pct = tissue.supersaturation_pct(p_end);
            step.gf_surface_pct = tissue.supersaturation_pct(surface_pressure);

            let sac = if step.mode.consumes_gas() {
                match step.phase {
                    Phase::Descent | Phase::Bottom => params.sac_bottom,
                    _ => params.sac_deco,
                }
            } else {
                0.0
            };
            step.sac_rate = sac;
            step.amb_consumption = sac * p_mean;
            step.step_consumption = step.amb_consumption * step.time;

            let mix = Gas {
                o2_pct: step.o2_pct,
                he_pct: step.he_pct,
                gas_type: GasType::Bottom,
                status: GasStatus::Active,
            };
            let deepest = step.max_depth();
            step.gas_density = mix.density(deepest, &env);
            step.end_without_o2 = mix.end_without_o2(deepest, &env);
            step.end_with_o2 = mix.end_with_o2(deepest, &env);

            step.cns_single_pct = cns;
            step.cns_multiple_pct = cns + prior;
            step.otu_total = otu_total;
            step.tissue = tissue.clone();
        }
        self.steps = steps;
        Ok(())
    }

    /// Per-mix consumption totals over the built profile.
    pub fn gas_consumption(&self) -> Vec<GasUse> {
        let params = &self.parameters;
        let mut rows: Vec<GasUse> = Vec::new();
        for step in &self.steps {
            if step.step_consumption <= 0.0 {
                continue;
            }
            let row = rows
                .iter_mut()
                .find(|r| r.o2_pct == step.o2_pct && r.he_pct == step.he_pct);
            match row {
                Some(r) => r.litres += step.step_consumption,
                None => rows.push(GasUse {
                    o2_pct: step.o2_pct,
                    he_pct: step.he_pct,
                    litres: step.step_consumption,
                    tank_count: params.tank_count,
                    tank_capacity_l: params.tank_capacity_l,
                    filling_pressure_bar: params.tank_filling_pressure,
                    reserve_pressure_bar: 0.0,
                    end_pressure_bar: 0.0,
                    sufficient: false,
                }),
            }
        }
        for r in rows.iter_mut() {
            let tank_litres = r.tank_count as f64 * r.tank_capacity_l;
            let end = r.filling_pressure_bar - r.litres / tank_litres;
            r.end_pressure_bar = end.max(0.0);
            r.reserve_pressure_bar = r.filling_pressure_bar * (params.reserve_multiplier - 1.0)
                / params.reserve_multiplier;
            r.sufficient = end >= r.reserve_pressure_bar;
        }
        rows
    }

    /// Headline numbers for the built profile.
    pub fn summary(&self) -> PlanSummary {
        let runtime = self.runtime();
        let bottom_end = self
            .steps
            .iter()
            .rev()
            .find(|s| s.phase == Phase::Bottom)
            .map(|s| s.run_time)
            .unwrap_or(0.0);
        PlanSummary {
            max_depth_m: self
                .steps
                .iter()
                .map(|s| s.max_depth())
                .fold(0.0, f64::max),
            runtime_min: runtime,
            tts_min: runtime - bottom_end,
            deco_time_min: self
                .steps
                .iter()
                .filter(|s| s.phase == Phase::DecoStop)
                .map(|s| s.time)
                .sum(),
            cns_pct: self.steps.last().map(|s| s.cns_single_pct).unwrap_or(0.0),
            otu: self.steps.last().map(|s| s.otu_total).unwrap_or(0.0),
            gas_use: self.gas_consumption(),
        }
    }
}

/// Inspired-gas resolution for one segment.
struct Breath {
    fractions: InspiredFractions,
    po2_max: f64,
}

/// Resolve what a segment actually breathes.
///
/// Open circuit and bailout breathe the mix as-is. Closed circuit holds the
/// loop at the effective setpoint — capped by what ambient pressure can
/// deliver — and fills the remaining inspired pressure with the diluent's
/// inert gases in their own ratio.
fn breathing(
    step: &DiveStep,
    set_points: &SetPoints,
    boosted: bool,
    params: &Parameters,
    env: &Environment,
) -> Breath {
    let p_start = env.pressure_at(step.start_depth);
    let p_end = env.pressure_at(step.end_depth);
    let p_max = p_start.max(p_end);

    match step.mode {
        StepMode::OpenCircuit | StepMode::Bailout => Breath {
            fractions: InspiredFractions {
                f_n2: step.n2_pct / 100.0,
                f_he: step.he_pct / 100.0,
            },
            po2_max: step.o2_pct / 100.0 * p_max,
        },
        StepMode::ClosedCircuit => {
            let setpoint = set_points.effective(step.end_depth, boosted, params);
            let po2_at = |p: f64| setpoint.min((p - P_WATER_VAPOR).max(0.0));

            let p_mean = 0.5 * (p_start + p_end);
            let inspired_total = (p_mean - P_WATER_VAPOR).max(0.0);
            let inert_total = (inspired_total - po2_at(p_mean)).max(0.0);
            let diluent_inert = step.n2_pct + step.he_pct;
            let (f_n2, f_he) = if inspired_total > 1e-9 && diluent_inert > 1e-9 {
                let scale = inert_total / inspired_total / diluent_inert;
                (step.n2_pct * scale, step.he_pct * scale)
            } else {
                (0.0, 0.0)
            };

            Breath {
                fractions: InspiredFractions { f_n2, f_he },
                po2_max: po2_at(p_max),
            }
        }
    }
}

/// Tissue ceiling as a stop-grid depth (m): 0 means clear to surface.
fn ceiling_depth(tissue: &TissueState, gf: f64, params: &Parameters, env: &Environment) -> f64 {
    let depth = env.depth_at(tissue.ceiling_pressure(gf));
    round_up_to_increment(depth, params.stop_increment)
}

fn round_up_to_increment(depth: f64, increment: f64) -> f64 {
    if depth <= 1e-9 {
        0.0
    } else {
        ((depth - 1e-6) / increment).ceil() * increment
    }
}

/// Largest stop-grid depth strictly above `to` and strictly below `current`,
/// or `to` itself once the grid passes it.
fn next_grid_depth(current: f64, to: f64, increment: f64) -> f64 {
    let grid = ((current - 1e-6) / increment).floor() * increment;
    grid.max(to).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepWarning;

    fn surface_tissue() -> TissueState {
        TissueState::surface_equilibrium(Parameters::default().atm_pressure)
    }

    fn oc_air_plan(depth: f64, time: f64) -> DivePlan {
        DivePlan::new(depth, time, DiveMode::OpenCircuit, false, surface_tissue())
    }

    /// Trimix 18/45 bottom mix with an EAN50 deco mix.
    fn oc_trimix_plan(depth: f64, time: f64) -> DivePlan {
        let mut plan = oc_air_plan(depth, time);
        let p = plan.parameters.clone();
        plan.gases.clear();
        plan.gases
            .add(Gas::new(18.0, 45.0, GasType::Bottom, GasStatus::Active, &p).unwrap());
        plan.gases
            .add(Gas::new(50.0, 0.0, GasType::Deco, GasStatus::Active, &p).unwrap());
        plan
    }

    fn cc_air_plan(depth: f64, time: f64, boosted: bool) -> DivePlan {
        let mut plan = DivePlan::new(depth, time, DiveMode::ClosedCircuit, boosted, surface_tissue());
        let p = plan.parameters.clone();
        plan.gases.clear();
        plan.gases
            .add(Gas::new(21.0, 0.0, GasType::Diluent, GasStatus::Active, &p).unwrap());
        plan
    }

    /// The universal step-list invariants every built plan must satisfy.
    fn check_invariants(plan: &DivePlan) {
        let steps = plan.steps();
        assert!(!steps.is_empty());
        assert_eq!(steps[0].start_depth, 0.0, "first step must leave the surface");
        assert_eq!(
            steps.last().unwrap().end_depth,
            0.0,
            "last step must touch the surface"
        );
        for pair in steps.windows(2) {
            assert_eq!(
                pair[0].end_depth, pair[1].start_depth,
                "step list must be contiguous"
            );
            assert!(pair[0].run_time <= pair[1].run_time + 1e-9);
            assert!(pair[0].cns_single_pct <= pair[1].cns_single_pct + 1e-9);
            assert!(pair[0].otu_total <= pair[1].otu_total + 1e-9);
        }
        for step in steps {
            assert!(step.time >= 0.0);
            assert!(step.p_amb_max > 0.0);
            // Either the PpO2 is inside the limit or the step is flagged.
            let limit = step.ppo2_limit(&plan.parameters);
            if step.p_o2_max > limit + 1e-9 {
                assert!(step.warnings(&plan.parameters).contains(&StepWarning::PpO2High));
            }
        }
    }

    #[test]
    fn test_air_dive_shape_and_deco() {
        // 30 m / 20 min on air, GF 30/70: a short shallow-stop obligation.
        let mut plan = oc_air_plan(30.0, 20.0);
        plan.build().unwrap();
        check_invariants(&plan);

        let steps = plan.steps();
        assert_eq!(steps[0].phase, Phase::Descent);
        assert_eq!(steps[1].phase, Phase::Bottom);
        assert_eq!(steps.last().unwrap().phase, Phase::Surface);

        // Run time at the end of the bottom equals the requested bottom time.
        assert!((steps[1].run_time - 20.0).abs() < 1e-9);

        // The default pinned waypoint shows up at 3 m.
        assert!(steps
            .iter()
            .any(|s| s.phase == Phase::Stop && s.start_depth == 3.0));

        // One 3 m deco stop of one minute, nothing deeper.
        let deco: Vec<&DiveStep> = steps.iter().filter(|s| s.phase == Phase::DecoStop).collect();
        assert_eq!(deco.len(), 1, "expected exactly one deco stop, got {deco:?}");
        assert_eq!(deco[0].start_depth, 3.0);
        assert_eq!(deco[0].time, 1.0);

        // Bottom time, the 9 m/min ascent, and the single stop: ~24.3 min.
        assert!(
            (23.0..25.0).contains(&plan.runtime()),
            "runtime out of range: {}",
            plan.runtime()
        );

        // The deco obligation was detected during the bottom phase, one grid
        // step above the 10-11 m raw ceiling.
        assert_eq!(plan.first_deco_depth(), Some(12.0));

        // Surfacing stays inside the raw M-value envelope.
        let surf_gf = steps.last().unwrap().gf_surface_pct;
        assert!(surf_gf < 100.0, "surfacing gradient too high: {surf_gf}");
    }

    #[test]
    fn test_shallow_dive_has_no_deco() {
        let mut plan = oc_air_plan(12.0, 10.0);
        plan.build().unwrap();
        check_invariants(&plan);
        assert!(plan.steps().iter().all(|s| s.phase != Phase::DecoStop));
        assert!(plan.first_deco_depth().is_none());
    }

    #[test]
    fn test_trimix_gas_switch_at_mod() {
        // 60 m / 25 min on 18/45 with EAN50: the switch lands on the ascent
        // segment whose shallow end first sits inside the EAN50 MOD (~22 m).
        let mut plan = oc_trimix_plan(60.0, 25.0);
        plan.build().unwrap();
        check_invariants(&plan);

        let steps = plan.steps();
        let first_ean = steps
            .iter()
            .find(|s| s.o2_pct == 50.0)
            .expect("EAN50 must be picked up during the ascent");
        assert_eq!(first_ean.phase, Phase::Ascent);
        assert_eq!(first_ean.end_depth, 21.0);
        assert_eq!(first_ean.start_depth, 24.0);

        // Deeper than its MOD nothing breathes the deco mix.
        for s in steps.iter().filter(|s| s.end_depth > 21.5) {
            assert_eq!(s.o2_pct, 18.0, "deep segment must stay on bottom mix");
        }

        let cns = steps.last().unwrap().cns_single_pct;
        assert!(cns < 50.0, "CNS out of range: {cns}");
    }

    #[test]
    fn test_cc_setpoint_schedule_and_no_consumption() {
        let mut plan = cc_air_plan(50.0, 40.0, true);
        plan.set_points.clear();
        plan.set_points.add(40.0, 1.3);
        plan.set_points.add(6.0, 1.0);
        plan.build().unwrap();
        check_invariants(&plan);

        let steps = plan.steps();
        assert!(steps.iter().all(|s| s.mode == StepMode::ClosedCircuit));
        assert!(
            steps.iter().all(|s| s.step_consumption == 0.0),
            "closed circuit draws no open-circuit gas"
        );

        // Deep segments run at 1.3; above 6 m the loop drops to 1.0.
        let bottom = &steps[1];
        assert!((bottom.p_o2_max - 1.3).abs() < 1e-9);
        let shallow = steps
            .iter()
            .find(|s| s.end_depth < 6.0 && s.time > 0.0)
            .unwrap();
        assert!(shallow.p_o2_max <= 1.0 + 1e-9);
    }

    #[test]
    fn test_cc_not_boosted_keeps_deepest_setpoint() {
        let mut plan = cc_air_plan(30.0, 20.0, false);
        plan.set_points.clear();
        plan.set_points.add(40.0, 1.3);
        plan.set_points.add(6.0, 1.0);
        plan.build().unwrap();

        for step in plan.steps() {
            // Shallow steps cap at what ambient pressure can deliver, never
            // at the shallow setpoint.
            let cap = (step.p_amb_max - P_WATER_VAPOR).min(1.3);
            assert!(
                (step.p_o2_max - cap).abs() < 1e-9,
                "step at {} m: {} vs {cap}",
                step.end_depth,
                step.p_o2_max
            );
        }
    }

    #[test]
    fn test_bailout_inherits_cc_tissue() {
        let build_cc = |bailout: bool| {
            let mut plan = cc_air_plan(40.0, 20.0, true);
            let p = plan.parameters.clone();
            plan.gases
                .add(Gas::new(50.0, 0.0, GasType::Deco, GasStatus::Active, &p).unwrap());
            plan.stop_steps.add(30.0, 2.0);
            plan.bailout = bailout;
            plan.build().unwrap();
            plan
        };

        let cc = build_cc(false);
        let bo = build_cc(true);

        // Tissue loads at the end of the bottom match: bailout inherits the
        // closed-circuit integration up to the engagement point.
        assert_eq!(cc.steps()[1].tissue, bo.steps()[1].tissue);

        // Descent and bottom stay closed circuit, the ascent is open.
        assert_eq!(bo.steps()[0].mode, StepMode::ClosedCircuit);
        assert_eq!(bo.steps()[1].mode, StepMode::ClosedCircuit);
        let ascent_steps: Vec<&DiveStep> =
            bo.steps()[2..].iter().collect();
        assert!(ascent_steps.iter().all(|s| s.mode == StepMode::Bailout));
        assert!(
            ascent_steps
                .iter()
                .filter(|s| s.time > 0.0)
                .all(|s| s.step_consumption > 0.0),
            "bailout consumes open-circuit gas"
        );
        // The deco mix gets picked up once its MOD allows.
        assert!(ascent_steps.iter().any(|s| s.o2_pct == 50.0));
    }

    #[test]
    fn test_stop_steps_are_held() {
        let mut plan = oc_air_plan(30.0, 15.0);
        plan.stop_steps.add(18.0, 4.0);
        plan.stop_steps.add(9.0, 2.0);
        plan.build().unwrap();
        check_invariants(&plan);

        let stops: Vec<(f64, f64)> = plan
            .steps()
            .iter()
            .filter(|s| s.phase == Phase::Stop)
            .map(|s| (s.start_depth, s.time))
            .collect();
        assert_eq!(stops, vec![(18.0, 4.0), (9.0, 2.0), (3.0, 0.0)]);
    }

    #[test]
    fn test_stop_step_below_target_is_skipped() {
        let mut plan = oc_air_plan(20.0, 15.0);
        plan.stop_steps.add(40.0, 5.0);
        plan.build().unwrap();
        assert!(plan
            .steps()
            .iter()
            .all(|s| !(s.phase == Phase::Stop && s.start_depth == 40.0)));
    }

    #[test]
    fn test_no_gas_for_depth() {
        let mut plan = oc_trimix_plan(60.0, 20.0);
        let p = plan.parameters.clone();
        plan.gases.clear();
        plan.gases
            .add(Gas::new(32.0, 0.0, GasType::Bottom, GasStatus::Active, &p).unwrap());
        assert!(matches!(
            plan.build(),
            Err(PlanError::NoGasForDepth { .. })
        ));
    }

    #[test]
    fn test_unplannable_surfaces_fatal_error() {
        let mut plan = oc_air_plan(45.0, 30.0);
        plan.parameters.max_stop_minutes = 1;
        let err = plan.build().unwrap_err();
        assert!(matches!(err, PlanError::Unplannable { .. }));
        // The offending stop is still in the (partial) profile.
        assert!(plan.steps().iter().any(|s| s.phase == Phase::DecoStop));
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut plan = oc_trimix_plan(60.0, 25.0);
        plan.build().unwrap();
        let first = plan.steps().to_vec();
        plan.build().unwrap();
        assert_eq!(plan.steps(), &first[..]);
    }

    #[test]
    fn test_calculate_is_idempotent() {
        let mut plan = oc_air_plan(30.0, 20.0);
        plan.build().unwrap();
        let built = plan.steps().to_vec();
        plan.calculate().unwrap();
        assert_eq!(plan.steps(), &built[..]);
    }

    #[test]
    fn test_deco_stops_clear_their_ceiling() {
        // A stop only releases once the ceiling no longer reaches the depth
        // being vacated.
        let mut plan = oc_trimix_plan(60.0, 25.0);
        plan.build().unwrap();
        let params = plan.parameters.clone();
        let env = params.environment();
        let fd = plan.first_deco_depth().unwrap_or(0.0);
        for (i, step) in plan.steps().iter().enumerate() {
            if step.phase != Phase::DecoStop {
                continue;
            }
            let next = next_grid_depth(step.start_depth, 0.0, params.stop_increment);
            let gf = gf_at(next, fd, params.gf_low_fraction(), params.gf_high_fraction());
            let ceiling = ceiling_depth(&step.tissue, gf, &params, &env);
            assert!(
                ceiling <= step.start_depth + 1e-6,
                "stop {i} at {} m ended with ceiling {ceiling} still deeper",
                step.start_depth
            );
        }
    }

    #[test]
    fn test_cns_multiple_carries_decayed_prior() {
        let mut plan = oc_air_plan(30.0, 20.0);
        plan.prior_cns_pct = 40.0;
        plan.surface_interval_min = 90.0;
        plan.build().unwrap();
        let last = plan.steps().last().unwrap();
        let carried = last.cns_multiple_pct - last.cns_single_pct;
        assert!((carried - 20.0).abs() < 1e-9, "expected 20% carried, got {carried}");
    }

    #[test]
    fn test_consumption_rollup() {
        let mut plan = oc_trimix_plan(60.0, 25.0);
        plan.build().unwrap();
        let use_rows = plan.gas_consumption();
        assert_eq!(use_rows.len(), 2, "bottom mix and deco mix");
        let total: f64 = use_rows.iter().map(|r| r.litres).sum();
        let by_steps: f64 = plan.steps().iter().map(|s| s.step_consumption).sum();
        assert!((total - by_steps).abs() < 1e-6);
        for r in &use_rows {
            assert!(r.litres > 0.0);
            assert!(r.end_pressure_bar <= r.filling_pressure_bar);
        }
    }

    #[test]
    fn test_summary() {
        let mut plan = oc_air_plan(30.0, 20.0);
        plan.build().unwrap();
        let s = plan.summary();
        assert_eq!(s.max_depth_m, 30.0);
        assert!((s.runtime_min - plan.runtime()).abs() < 1e-9);
        assert!(s.tts_min > 0.0);
        assert!(s.deco_time_min > 0.0);
        assert!(s.cns_pct > 0.0);
        assert!(!s.gas_use.is_empty());
    }

    #[test]
    fn test_grid_helpers() {
        assert_eq!(next_grid_depth(30.0, 0.0, 3.0), 27.0);
        assert_eq!(next_grid_depth(28.0, 0.0, 3.0), 27.0);
        assert_eq!(next_grid_depth(27.0, 0.0, 3.0), 24.0);
        assert_eq!(next_grid_depth(6.0, 5.0, 3.0), 5.0);
        assert_eq!(next_grid_depth(2.0, 0.0, 3.0), 0.0);

        assert_eq!(round_up_to_increment(11.1, 3.0), 12.0);
        assert_eq!(round_up_to_increment(12.0, 3.0), 12.0);
        assert_eq!(round_up_to_increment(0.0, 3.0), 0.0);
        assert_eq!(round_up_to_increment(-2.0, 3.0), 0.0);
    }
}
