use crate::time::SimTime;
use serde::{Deserialize, Serialize};

/// Engine-wide settings shared by every scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    /// Run length in seconds. Events due at or after this point never run.
    pub stop_time: f64,
    /// Sampling period of the throughput series in seconds.
    pub sample_period: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 11223344,
            stop_time: 10.0,
            sample_period: 0.1,
        }
    }
}

impl SimConfig {
    pub fn stop_at(&self) -> SimTime {
        SimTime::from_secs_f64(self.stop_time)
    }

    pub fn sample_interval(&self) -> SimTime {
        SimTime::from_secs_f64(self.sample_period)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub seed: Option<u64>,
    pub stop_time: Option<f64>,
    pub sample_period: Option<f64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.stop_time {
            config.stop_time = v;
        }
        if let Some(v) = self.sample_period {
            config.sample_period = v;
        }
    }
}
