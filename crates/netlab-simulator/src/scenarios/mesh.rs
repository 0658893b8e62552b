use super::{Scenario, check_config, host_addr, setup_rng};
use crate::engine::Simulator;
use crate::error::{Result, SimError};
use crate::network::{LinkConfig, QueueConfig};
use crate::queue::QueueLimit;
use crate::report::{self, ReportLine};
use crate::sampler::SampleMode;
use crate::traffic::{PacketSink, TrafficJob, TrafficSource};
use netlab_abstract::{Endpoint, MeshParams, SimConfig, SimTime};
use rand::Rng;
use std::net::Ipv4Addr;
use tracing::info;

/// Side of the square area is 1000 m, so density per m^2 times this is the
/// node count.
const AREA_M2: f64 = 1_000_000.0;
const CHANNEL_BANDWIDTH_HZ: f64 = 20_000_000.0;
const MEDIUM_DELAY: SimTime = SimTime::from_micros(1);
const PORT: u16 = 5000;
const JOB_START: SimTime = SimTime::from_secs(1);
const JOB_SPAN: SimTime = SimTime::from_secs(9);

/// Shannon capacity of the shared channel in bit/s.
pub fn network_capacity(snr_db: f64) -> u64 {
    let snr = 10f64.powf(snr_db / 10.0);
    (CHANNEL_BANDWIDTH_HZ * (1.0 + snr).log2()).floor() as u64
}

pub struct Mesh {
    params: MeshParams,
    sim: Simulator,
    capacity_bps: u64,
}

impl Mesh {
    pub fn build(config: SimConfig, params: MeshParams) -> Result<Self> {
        check_config(&config)?;
        let nodes = (params.node_density * AREA_M2).floor();
        if !(nodes >= 2.0) {
            return Err(SimError::invalid(
                "nodeDensity",
                format!("{} gives fewer than two nodes", params.node_density),
            ));
        }
        let nodes = nodes.min(f64::from(u32::MAX)) as u32;
        if params.packet_size == 0 {
            return Err(SimError::invalid("packetSize", "packets must carry at least one byte"));
        }
        if !(params.intensity.is_finite() && params.intensity >= 0.0) {
            return Err(SimError::invalid(
                "intensity",
                format!("{} is not a non-negative fraction", params.intensity),
            ));
        }
        if !(params.txp > 0.0) {
            return Err(SimError::invalid("txp", format!("{} mW is not positive", params.txp)));
        }

        let capacity_bps = network_capacity(params.snr_db);
        if capacity_bps == 0 {
            return Err(SimError::invalid(
                "snrDb",
                format!("{} dB leaves no channel capacity", params.snr_db),
            ));
        }
        let data_rate = (capacity_bps as f64 * params.intensity).floor() / f64::from(nodes);
        let packets_per_node = (data_rate / f64::from(params.packet_size))
            .floor()
            .min(f64::from(u32::MAX)) as u32;

        let mut rng = setup_rng(config.seed);
        let sample_period = config.sample_interval();
        let mut sim = Simulator::new(config);
        let medium = sim.add_link(
            LinkConfig::new("medium", capacity_bps, MEDIUM_DELAY)
                .with_queue(QueueConfig::DropTail(QueueLimit::Packets(params.queue_packets)))
                .with_loss_rate(params.loss_rate),
        )?;

        let endpoint = |i: u32| Endpoint::new(host_addr(Ipv4Addr::new(10, 0, 0, 1), i), PORT);
        for i in 0..nodes {
            sim.add_sink(Box::new(PacketSink), endpoint(i), SimTime::ZERO)?;
        }
        for i in 0..nodes {
            let peer = loop {
                let j = rng.random_range(0..nodes);
                if j != i {
                    break j;
                }
            };
            let flow = sim.add_flow(endpoint(i), endpoint(peer), vec![medium])?;
            let job = TrafficJob::spread(params.packet_size, packets_per_node, JOB_SPAN);
            sim.add_source(Box::new(TrafficSource::new(job)), flow, JOB_START)?;
        }
        sim.enable_sampler(sample_period, SampleMode::CumulativeMbits)?;

        info!(
            nodes,
            protocol = params.protocol_name(),
            capacity_bps,
            data_rate,
            packets_per_node,
            "mesh configured"
        );
        Ok(Self {
            params,
            sim,
            capacity_bps,
        })
    }
}

impl Scenario for Mesh {
    fn name(&self) -> &'static str {
        "mesh"
    }

    fn simulator(&self) -> &Simulator {
        &self.sim
    }

    fn simulator_mut(&mut self) -> &mut Simulator {
        &mut self.sim
    }

    fn report_lines(&self) -> Vec<ReportLine> {
        let sent = self.sim.total_sent();
        let received = self.sim.total_received();
        let elapsed = self
            .sim
            .current_time()
            .saturating_sub(JOB_START)
            .as_secs_f64();
        let metrics = report::finalize(sent, received, elapsed);

        vec![
            ReportLine::new()
                .field("nodeDensity", self.params.node_density)
                .field("protocol", self.params.normalized_protocol())
                .field("txp(dBm/n)", self.params.txp_dbm())
                .field("intensity", self.params.intensity)
                .field("Efficiency", metrics.efficiency)
                .field("totalRxBytes", received)
                .field("totalTxBytes", sent)
                .field("Network Capacity(Mbs)", self.capacity_bps / 1_000_000),
        ]
    }
}
