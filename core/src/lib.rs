//! Technical dive planning engine.
//!
//! Builds complete dive profiles — descent, bottom, pinned stop steps,
//! decompression stops, surfacing — from a target depth, bottom time,
//! breathing mode, gas list, and setpoint schedule. Inert gas loading runs a
//! 16-compartment Bühlmann ZH-L16C model with gradient factors; every step
//! carries the derived physiology (PpO₂, END, density, CNS, OTU) and gas
//! consumption. Planner services answer "how long can the first stop be
//! held" (MaxTime) and "which deco mix minimises the ascent"
//! (deco-gas optimisation).
//!
//! The engine is synchronous and deterministic: a plan is a pure function of
//! its inputs, and all collaborators are value snapshots taken at build
//! entry.

pub mod buhlmann;
pub mod error;
pub mod gas;
pub mod oxygen;
pub mod parameters;
pub mod plan;
pub mod planner;
pub mod setpoints;
pub mod step;
pub mod stopsteps;
pub mod storage;
pub mod units;

pub use buhlmann::{gf_at, InspiredFractions, TissueState, NUM_COMPARTMENTS};
pub use error::{PlanError, StoreError};
pub use gas::{Gas, GasList, GasStatus, GasType};
pub use parameters::Parameters;
pub use plan::{DiveMode, DivePlan, GasUse, PlanSummary};
pub use planner::CancelToken;
pub use setpoints::{SetPoint, SetPoints};
pub use step::{DiveStep, Phase, StepMode, StepWarning};
pub use stopsteps::{StopStep, StopSteps};
pub use storage::Store;
pub use units::Environment;
