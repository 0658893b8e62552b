use super::{Scenario, check_config, host_addr, start_offsets};
use crate::engine::{FlowId, Simulator};
use crate::error::{Result, SimError};
use crate::network::{LinkConfig, QueueConfig};
use crate::queue::QueueLimit;
use crate::report::{self, ReportLine};
use crate::traffic::{BulkConfig, BulkSource, PacketSink};
use netlab_abstract::{DumbbellParams, Endpoint, SimConfig, SimTime};
use std::net::Ipv4Addr;
use tracing::info;

const LEAF_RATE_BPS: u64 = 5_000_000;
const LEAF_DELAY: SimTime = SimTime::from_millis(10);
const BOTTLENECK_RATE_BPS: u64 = 1_000_000;
const BOTTLENECK_DELAY: SimTime = SimTime::from_millis(20);
const SINK_PORT: u16 = 9;
/// Flow start offsets are drawn from `[0, MAX_START_OFFSET_SECS)`.
const MAX_START_OFFSET_SECS: f64 = 0.1;

pub struct Dumbbell {
    params: DumbbellParams,
    sim: Simulator,
    flows: Vec<FlowId>,
}

impl Dumbbell {
    pub fn build(config: SimConfig, params: DumbbellParams) -> Result<Self> {
        check_config(&config)?;
        if params.n_flows == 0 {
            return Err(SimError::invalid("nFlows", "need at least one flow"));
        }
        if params.seg_size == 0 {
            return Err(SimError::invalid("segSize", "segments must carry at least one byte"));
        }

        let offsets = start_offsets(
            config.seed,
            params.n_flows as usize,
            MAX_START_OFFSET_SECS,
        );
        let mut sim = Simulator::new(config);
        let bottleneck = sim.add_link(
            LinkConfig::new("bottleneck", BOTTLENECK_RATE_BPS, BOTTLENECK_DELAY)
                .with_queue(QueueConfig::DropTail(QueueLimit::Bytes(params.queue_size))),
        )?;

        let mut flows = Vec::with_capacity(offsets.len());
        for (i, start) in offsets.into_iter().enumerate() {
            let left = sim.add_link(LinkConfig::new(
                format!("left-{i}"),
                LEAF_RATE_BPS,
                LEAF_DELAY,
            ))?;
            let right = sim.add_link(LinkConfig::new(
                format!("right-{i}"),
                LEAF_RATE_BPS,
                LEAF_DELAY,
            ))?;

            let src = Endpoint::new(host_addr(Ipv4Addr::new(10, 1, 1, 1), i as u32), 0);
            let dst = Endpoint::new(host_addr(Ipv4Addr::new(10, 2, 1, 1), i as u32), SINK_PORT);
            let flow = sim.add_flow(src, dst, vec![left, bottleneck, right])?;

            let sender = BulkSource::new(BulkConfig {
                max_bytes: params.max_bytes,
                seg_size: params.seg_size,
                window: params.window_size,
            });
            sim.add_source(Box::new(sender), flow, start)?;
            sim.add_sink(Box::new(PacketSink), dst, SimTime::ZERO)?;
            info!("flow {} starts at {}", i, start);
            flows.push(flow);
        }

        info!(
            "Dumbbell with {} flow(s), Tcp{} labels, window {} B, bottleneck queue {} B",
            params.n_flows,
            params.tcp_flavor(),
            params.window_size,
            params.queue_size
        );
        Ok(Self { params, sim, flows })
    }

    pub fn flows(&self) -> &[FlowId] {
        &self.flows
    }
}

impl Scenario for Dumbbell {
    fn name(&self) -> &'static str {
        "dumbbell"
    }

    fn simulator(&self) -> &Simulator {
        &self.sim
    }

    fn simulator_mut(&mut self) -> &mut Simulator {
        &mut self.sim
    }

    fn report_lines(&self) -> Vec<ReportLine> {
        let stop = self.sim.config().stop_time;
        self.flows
            .iter()
            .enumerate()
            .filter_map(|(i, id)| self.sim.flow(*id).map(|flow| (i, flow)))
            .map(|(i, flow)| {
                let elapsed = stop - flow.start().as_secs_f64();
                let counters = flow.counters();
                let metrics = report::finalize(counters.sent(), counters.received(), elapsed);
                ReportLine::new()
                    .field("tcp", self.params.tcp_type)
                    .field("flow", i)
                    .field("windowSize", self.params.window_size)
                    .field("queueSize", self.params.queue_size)
                    .field("segSize", self.params.seg_size)
                    .field("goodput", metrics.goodput_bytes_per_sec)
            })
            .collect()
    }
}
