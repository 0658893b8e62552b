//! Serializable snapshot of a finished run, written by `--trace-out`.

use crate::counters::FlowCounters;
use crate::engine::{Flow, FlowId};
use crate::network::{Link, LinkId, LinkStats};
use crate::sampler::SamplePoint;
use netlab_abstract::{Endpoint, SimConfig, SimTime};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub id: FlowId,
    pub src: Endpoint,
    pub dst: Endpoint,
    pub path: Vec<LinkId>,
    pub start: SimTime,
    pub counters: FlowCounters,
}

impl From<&Flow> for FlowSummary {
    fn from(flow: &Flow) -> Self {
        Self {
            id: flow.id(),
            src: flow.src(),
            dst: flow.dst(),
            path: flow.path().to_vec(),
            start: flow.start(),
            counters: flow.counters().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub id: LinkId,
    pub name: String,
    pub rate_bps: u64,
    pub delay: SimTime,
    pub queued_bytes: u64,
    pub stats: LinkStats,
}

impl From<&Link> for LinkSummary {
    fn from(link: &Link) -> Self {
        Self {
            id: link.id(),
            name: link.name().to_string(),
            rate_bps: link.rate_bps(),
            delay: link.delay(),
            queued_bytes: link.queued_bytes(),
            stats: link.stats().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration: SimTime,
    pub events_processed: u64,
    pub total_sent: u64,
    pub total_received: u64,
    pub flows: Vec<FlowSummary>,
    pub links: Vec<LinkSummary>,
    pub samples: Vec<SamplePoint>,
}

#[cfg(test)]
mod tests {
    use crate::network::LinkConfig;
    use crate::traffic::{PacketSink, TrafficJob, TrafficSource};
    use crate::Simulator;
    use netlab_abstract::{Endpoint, SimConfig, SimTime};
    use std::net::Ipv4Addr;

    #[test]
    fn report_serializes_flows_and_links() {
        let mut sim = Simulator::new(SimConfig {
            stop_time: 1.0,
            ..SimConfig::default()
        });
        let link = sim
            .add_link(LinkConfig::new("wire", 1_000_000, SimTime::from_millis(1)))
            .unwrap();
        let src = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 1);
        let dst = Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 9);
        let flow = sim.add_flow(src, dst, vec![link]).unwrap();
        let job = TrafficJob::new(100, 2, SimTime::from_millis(10));
        sim.add_source(Box::new(TrafficSource::new(job)), flow, SimTime::ZERO)
            .unwrap();
        sim.add_sink(Box::new(PacketSink), dst, SimTime::ZERO).unwrap();
        sim.run();

        let json = serde_json::to_value(sim.export_report()).unwrap();
        assert_eq!(json["total_received"], 200);
        assert_eq!(json["duration"], 1_000_000_000u64);
        assert_eq!(json["flows"][0]["dst"]["port"], 9);
        assert_eq!(json["flows"][0]["counters"]["sent"], 200);
        assert_eq!(json["links"][0]["name"], "wire");
        assert_eq!(json["links"][0]["stats"]["transmitted_packets"], 2);
    }
}
