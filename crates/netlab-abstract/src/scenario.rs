use crate::config::SimConfigOverride;
use serde::{Deserialize, Serialize};

/// A scenario file: engine overrides plus the parameter table of one or more
/// scenarios. Field names inside the tables match the command-line flags.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ScenarioFile {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub dumbbell: Option<DumbbellParams>,
    pub queue: Option<QueueParams>,
    pub mesh: Option<MeshParams>,
}

/// Bulk transfers sharing one bottleneck link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DumbbellParams {
    /// Bytes each sender transfers; 0 means unlimited.
    pub max_bytes: u64,
    /// Maximum bytes in flight per sender.
    pub window_size: u32,
    /// Bottleneck queue limit in bytes.
    pub queue_size: u64,
    pub seg_size: u32,
    pub n_flows: u32,
    /// 0 for Tahoe, anything else for Reno. Reported only.
    pub tcp_type: u32,
}

impl Default for DumbbellParams {
    fn default() -> Self {
        Self {
            max_bytes: 100_000_000,
            window_size: 2000,
            queue_size: 2000,
            seg_size: 128,
            n_flows: 1,
            tcp_type: 0,
        }
    }
}

impl DumbbellParams {
    pub fn tcp_flavor(&self) -> &'static str {
        if self.tcp_type == 0 { "Tahoe" } else { "Reno" }
    }
}

/// On/off sources across a router chain with two managed bottlenecks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueParams {
    pub max_bytes: u64,
    /// Receive window of the TCP-labelled flows. Reported only.
    pub window_size: u32,
    /// Offered load as a fraction of the 1 Mbit/s reference bandwidth.
    pub load: f64,
    /// `RED` selects Random Early Detection; anything else is DropTail.
    pub queue: String,
    #[serde(rename = "MinTh")]
    pub min_th: f64,
    #[serde(rename = "MaxTh")]
    pub max_th: f64,
    #[serde(rename = "Wq")]
    pub wq: f64,
    /// Queue limit in bytes, for both disciplines.
    pub qlen: u64,
    pub max_p: f64,
}

impl Default for QueueParams {
    fn default() -> Self {
        Self {
            max_bytes: 100_000_000,
            window_size: 2000,
            load: 0.9,
            queue: String::new(),
            min_th: 500.0,
            max_th: 1500.0,
            wq: 1.0 / 128.0,
            qlen: 2000,
            max_p: 1.0 / 10.0,
        }
    }
}

impl QueueParams {
    pub fn uses_red(&self) -> bool {
        self.queue == "RED"
    }

    pub fn queue_label(&self) -> &'static str {
        if self.uses_red() { "RED" } else { "DropTail" }
    }
}

/// Ad-hoc nodes sending bounded constant-rate jobs over a shared medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshParams {
    /// Nodes per square metre of the 1000 m x 1000 m area.
    pub node_density: f64,
    /// 0 = OLSR, 1 = AODV. Reported only.
    pub protocol: u32,
    /// Transmission power in mW.
    pub txp: f64,
    /// Offered load as a fraction of the medium capacity.
    pub intensity: f64,
    /// Signal-to-noise ratio used for the Shannon capacity of the medium.
    pub snr_db: f64,
    pub packet_size: u32,
    pub queue_packets: usize,
    pub loss_rate: f64,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            node_density: 0.00002,
            protocol: 0,
            txp: 500.0,
            intensity: 0.1,
            snr_db: 10.0,
            packet_size: 2000,
            queue_packets: 100,
            loss_rate: 0.0,
        }
    }
}

impl MeshParams {
    /// Unknown protocol numbers fall back to OLSR.
    pub fn normalized_protocol(&self) -> u32 {
        if self.protocol == 1 { 1 } else { 0 }
    }

    pub fn protocol_name(&self) -> &'static str {
        if self.normalized_protocol() == 1 { "AODV" } else { "OLSR" }
    }

    pub fn txp_dbm(&self) -> f64 {
        10.0 * self.txp.log10()
    }
}
