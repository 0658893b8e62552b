use super::{Scenario, check_config, host_addr};
use crate::engine::{FlowId, Simulator};
use crate::error::{Result, SimError};
use crate::network::{LinkConfig, QueueConfig};
use crate::queue::{QueueLimit, RedConfig};
use crate::report::{self, ReportLine};
use crate::traffic::{OnOffConfig, OnOffSource, PacketSink};
use netlab_abstract::{Endpoint, QueueParams, SimConfig, SimTime};
use std::net::Ipv4Addr;
use tracing::info;

const PACKET_SIZE: u32 = 512;
const SINK_PORT: u16 = 9;
const ON_TIME: SimTime = SimTime::from_millis(500);
const OFF_TIME: SimTime = SimTime::from_millis(500);
/// Offered load is a fraction of this rate, split over three sources worth
/// of on-time.
const REFERENCE_RATE_BPS: f64 = 1_000_000.0;

/// Transport label of each source, left to right.
const TRANSPORTS: [&str; 5] = ["udp", "udp", "tcp", "tcp", "tcp"];

pub struct QueueExperiment {
    params: QueueParams,
    sim: Simulator,
    flows: Vec<FlowId>,
}

impl QueueExperiment {
    pub fn build(config: SimConfig, params: QueueParams) -> Result<Self> {
        check_config(&config)?;
        if !(params.load.is_finite() && params.load >= 0.0) {
            return Err(SimError::invalid(
                "load",
                format!("{} is not a non-negative fraction", params.load),
            ));
        }

        let managed = if params.uses_red() {
            QueueConfig::Red(RedConfig {
                min_th: params.min_th,
                max_th: params.max_th,
                wq: params.wq,
                max_p: params.max_p,
                limit_bytes: params.qlen,
                mean_packet_size: PACKET_SIZE,
            })
        } else {
            QueueConfig::DropTail(QueueLimit::Bytes(params.qlen))
        };

        let mut sim = Simulator::new(config);
        let r0_r1 = sim.add_link(
            LinkConfig::new("r0-r1", 10_000_000, SimTime::from_millis(10))
                .with_queue(managed.clone()),
        )?;
        let r1_r2 = sim.add_link(
            LinkConfig::new("r1-r2", 5_000_000, SimTime::from_millis(100)).with_queue(managed),
        )?;
        let r2_r3 = sim.add_link(LinkConfig::new("r2-r3", 10_000_000, SimTime::from_millis(10)))?;

        let rate_bps = rate_for_load(params.load);
        let mut flows = Vec::with_capacity(TRANSPORTS.len());
        for (i, transport) in TRANSPORTS.iter().enumerate() {
            let left = sim.add_link(LinkConfig::new(
                format!("l{i}-r0"),
                15_000_000,
                SimTime::from_millis(10),
            ))?;
            let right = sim.add_link(LinkConfig::new(
                format!("r3-r{i}"),
                5_000_000,
                SimTime::from_millis(10),
            ))?;

            let src = Endpoint::new(host_addr(Ipv4Addr::new(10, 1, 4, 2), i as u32 * 256), 0);
            let dst = Endpoint::new(
                host_addr(Ipv4Addr::new(10, 1, 9, 2), i as u32 * 256),
                SINK_PORT,
            );
            let flow = sim.add_flow(src, dst, vec![left, r0_r1, r1_r2, r2_r3, right])?;

            let source = OnOffSource::new(OnOffConfig {
                packet_size: PACKET_SIZE,
                rate_bps,
                on_time: ON_TIME,
                off_time: OFF_TIME,
            });
            sim.add_source(Box::new(source), flow, SimTime::ZERO)?;
            sim.add_sink(Box::new(PacketSink), dst, SimTime::ZERO)?;
            info!("{} source {} -> {}", transport, src.addr, dst);
            flows.push(flow);
        }

        info!(
            queue = params.queue_label(),
            load = params.load,
            max_bytes = params.max_bytes,
            window_size = params.window_size,
            min_th = params.min_th,
            max_th = params.max_th,
            wq = params.wq,
            qlen = params.qlen,
            max_p = params.max_p,
            rate_bps,
            "queue experiment configured"
        );
        Ok(Self { params, sim, flows })
    }
}

/// Per-source sending rate while on.
pub fn rate_for_load(load: f64) -> u64 {
    let on_fraction = ON_TIME.as_secs_f64() / (ON_TIME + OFF_TIME).as_secs_f64();
    (load * REFERENCE_RATE_BPS / 3.0 / on_fraction).floor() as u64
}

impl Scenario for QueueExperiment {
    fn name(&self) -> &'static str {
        "queue"
    }

    fn simulator(&self) -> &Simulator {
        &self.sim
    }

    fn simulator_mut(&mut self) -> &mut Simulator {
        &mut self.sim
    }

    fn report_lines(&self) -> Vec<ReportLine> {
        let stop = self.sim.config().stop_time;
        let label = self.params.queue_label();
        let header = || {
            ReportLine::new()
                .field("queue", label)
                .field("load", self.params.load)
        };

        let mut lines = Vec::with_capacity(self.flows.len() + 1);
        let mut total_sent = 0u64;
        let mut total_received = 0u64;
        for (i, id) in self.flows.iter().enumerate() {
            let Some(flow) = self.sim.flow(*id) else {
                continue;
            };
            let counters = flow.counters();
            total_sent = total_sent.saturating_add(counters.sent());
            total_received = total_received.saturating_add(counters.received());
            let metrics = report::finalize(counters.sent(), counters.received(), stop);
            lines.push(
                header()
                    .field("flow", i)
                    .field("transport", TRANSPORTS[i])
                    .field("goodput", metrics.goodput_bytes_per_sec),
            );
        }

        let overall = report::finalize(total_sent, total_received, stop);
        lines.push(
            header()
                .tag("overall")
                .field("goodput", overall.goodput_bytes_per_sec),
        );
        lines
    }
}
