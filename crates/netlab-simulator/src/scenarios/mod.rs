//! Topology builders for the three experiments and the report lines they print.

pub mod dumbbell;
pub mod mesh;
pub mod queue;

pub use dumbbell::Dumbbell;
pub use mesh::Mesh;
pub use queue::QueueExperiment;

use crate::engine::Simulator;
use crate::error::{Result, SimError};
use crate::report::ReportLine;
use crate::trace::SimulationReport;
use netlab_abstract::{SimConfig, SimTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;
use tracing::info;

/// Mixed into the run seed for setup draws so they do not share a stream
/// with the engine.
const SETUP_STREAM: u64 = 6110;

/// A fully wired experiment, ready to run.
pub trait Scenario {
    fn name(&self) -> &'static str;

    fn simulator(&self) -> &Simulator;

    fn simulator_mut(&mut self) -> &mut Simulator;

    /// Result lines, read from the simulator after the run.
    fn report_lines(&self) -> Vec<ReportLine>;
}

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub lines: Vec<ReportLine>,
    pub report: SimulationReport,
}

/// Run `scenario` to its configured stop time and collect the results.
pub fn execute<S: Scenario>(mut scenario: S) -> ScenarioOutcome {
    info!("Running scenario `{}`", scenario.name());
    scenario.simulator_mut().run();
    ScenarioOutcome {
        lines: scenario.report_lines(),
        report: scenario.simulator().export_report(),
    }
}

/// Run-wide settings every builder shares.
pub(crate) fn check_config(config: &SimConfig) -> Result<()> {
    if !(config.stop_time.is_finite() && config.stop_time > 0.0) {
        return Err(SimError::invalid(
            "stop_time",
            format!("{} s is not a positive duration", config.stop_time),
        ));
    }
    if !(config.sample_period.is_finite() && config.sample_period > 0.0) {
        return Err(SimError::invalid(
            "sample_period",
            format!("{} s is not a positive period", config.sample_period),
        ));
    }
    Ok(())
}

pub(crate) fn setup_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ SETUP_STREAM)
}

/// One start offset per flow, uniform on `[0, max_secs)`.
pub fn start_offsets(seed: u64, count: usize, max_secs: f64) -> Vec<SimTime> {
    let mut rng = setup_rng(seed);
    (0..count)
        .map(|_| {
            if max_secs > 0.0 {
                SimTime::from_secs_f64(rng.random_range(0.0..max_secs))
            } else {
                SimTime::ZERO
            }
        })
        .collect()
}

/// The `index`-th address after `base`.
pub(crate) fn host_addr(base: Ipv4Addr, index: u32) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(base).wrapping_add(index))
}
