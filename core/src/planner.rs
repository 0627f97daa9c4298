//! Planner services layered on the profile builder.
//!
//! Both services work on a clone of the plan and leave the original
//! untouched until a result is committed, so a cancellation or error never
//! exposes a half-mutated plan. They are iteration-bounded and check the
//! caller's [`CancelToken`] between builds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::PlanError;
use crate::gas::{GasStatus, GasType};
use crate::plan::DivePlan;
use crate::step::Phase;

/// Cooperative cancellation flag shared between a caller and a running
/// planner service.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl DivePlan {
    /// How long the first pinned stop can be held before the time-to-surface
    /// from the end of that stop exceeds the original TTS plus the configured
    /// budget. Returns `(minutes, tts_at_that_duration)`.
    pub fn max_time_and_tts(&self) -> Result<(f64, f64), PlanError> {
        self.max_time_and_tts_with(&CancelToken::new())
    }

    /// [`DivePlan::max_time_and_tts`] with cooperative cancellation.
    pub fn max_time_and_tts_with(&self, cancel: &CancelToken) -> Result<(f64, f64), PlanError> {
        let mut work = self.clone();
        work.build()?;

        let Some(first_stop) = work.steps().iter().find(|s| s.phase == Phase::Stop) else {
            warn!("profile has no pinned stop to extend");
            return Ok((0.0, 0.0));
        };
        let stop_depth = first_stop.start_depth;
        let Some(ss_idx) = work
            .stop_steps
            .as_slice()
            .iter()
            .position(|s| (s.depth - stop_depth).abs() < 0.1)
        else {
            warn!("no stop step matches the first profile stop");
            return Ok((0.0, 0.0));
        };
        let base_minutes = work.stop_steps.as_slice()[ss_idx].time;

        let tts0 = match stop_tts(&mut work, ss_idx, stop_depth, base_minutes)? {
            Some(tts) => tts,
            None => return Ok((0.0, 0.0)),
        };
        let budget = tts0 + work.parameters.max_time_budget_min;
        let cap = work.parameters.max_stop_minutes as f64;

        let mut best = (base_minutes, tts0);
        let mut lo = base_minutes;
        let mut hi = (base_minutes.floor() + 1.0).max(1.0);

        // Coarse doubling until infeasible or capped.
        loop {
            if cancel.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            let clamped = hi.min(cap);
            match stop_tts(&mut work, ss_idx, stop_depth, clamped)? {
                Some(tts) if tts <= budget + 1e-9 => {
                    best = (clamped, tts);
                    lo = clamped;
                    if clamped >= cap {
                        debug!(minutes = clamped, "max time capped at max stop minutes");
                        return Ok(best);
                    }
                    hi = clamped * 2.0;
                }
                _ => {
                    hi = clamped;
                    break;
                }
            }
        }

        // Whole-minute refinement between the last feasible and first
        // infeasible durations.
        while hi - lo > 1.0 {
            if cancel.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            let mid = ((lo + hi) / 2.0).floor();
            if mid <= lo {
                break;
            }
            match stop_tts(&mut work, ss_idx, stop_depth, mid)? {
                Some(tts) if tts <= budget + 1e-9 => {
                    best = (mid, tts);
                    lo = mid;
                }
                _ => hi = mid,
            }
        }
        Ok(best)
    }

    /// Try each active deco mix as the sole deco gas, keep the selection that
    /// minimises total ascent time (ties: lower CNS, then lower consumption),
    /// and return the improvement in minutes. The plan's gas list is only
    /// mutated when a strictly better selection exists.
    pub fn optimise_deco_gas(&mut self) -> Result<f64, PlanError> {
        self.optimise_deco_gas_with(&CancelToken::new())
    }

    /// [`DivePlan::optimise_deco_gas`] with cooperative cancellation.
    pub fn optimise_deco_gas_with(&mut self, cancel: &CancelToken) -> Result<f64, PlanError> {
        let mut baseline = self.clone();
        baseline.build()?;
        let base_time = ascent_time(&baseline);

        let deco_idx: Vec<usize> = self
            .gases
            .gases
            .iter()
            .enumerate()
            .filter(|(_, g)| g.gas_type == GasType::Deco && g.is_active())
            .map(|(i, _)| i)
            .collect();
        if deco_idx.is_empty() {
            return Ok(0.0);
        }

        let mut best: Option<(usize, f64, f64, f64)> = None;
        for &candidate in &deco_idx {
            if cancel.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            let mut trial = self.clone();
            for &j in &deco_idx {
                trial.gases.gases[j].status = if j == candidate {
                    GasStatus::Active
                } else {
                    GasStatus::Inactive
                };
            }
            match trial.build() {
                Ok(()) => {
                    let time = ascent_time(&trial);
                    let cns = trial
                        .steps()
                        .last()
                        .map(|s| s.cns_single_pct)
                        .unwrap_or(0.0);
                    let litres: f64 = trial.steps().iter().map(|s| s.step_consumption).sum();
                    let better = match best {
                        None => true,
                        Some((_, bt, bc, bl)) => (time, cns, litres) < (bt, bc, bl),
                    };
                    if better {
                        best = Some((candidate, time, cns, litres));
                    }
                }
                Err(PlanError::Unplannable { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        let Some((winner, time, _, _)) = best else {
            return Ok(0.0);
        };
        if time + 1e-9 < base_time {
            for &j in &deco_idx {
                self.gases.gases[j].status = if j == winner {
                    GasStatus::Active
                } else {
                    GasStatus::Inactive
                };
            }
            self.build()?;
            info!(improvement_min = base_time - time, "deco gas selection improved");
            Ok(base_time - time)
        } else {
            Ok(0.0)
        }
    }
}

/// Rebuild with the pinned stop at `minutes` and measure the time-to-surface
/// from the end of that stop. `None` means the variant is unplannable.
fn stop_tts(
    plan: &mut DivePlan,
    ss_idx: usize,
    depth: f64,
    minutes: f64,
) -> Result<Option<f64>, PlanError> {
    plan.stop_steps.edit(ss_idx, depth, minutes);
    match plan.build() {
        Ok(()) => {
            let stop = plan
                .steps()
                .iter()
                .find(|s| s.phase == Phase::Stop && (s.start_depth - depth).abs() < 0.1);
            Ok(stop.map(|s| plan.runtime() - s.run_time))
        }
        Err(PlanError::Unplannable { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Time from the end of the bottom phase to the surface.
fn ascent_time(plan: &DivePlan) -> f64 {
    let bottom_end = plan
        .steps()
        .iter()
        .rev()
        .find(|s| s.phase == Phase::Bottom)
        .map(|s| s.run_time)
        .unwrap_or(0.0);
    plan.runtime() - bottom_end
}
