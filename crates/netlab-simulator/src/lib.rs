pub mod counters;
pub mod engine;
pub mod error;
pub mod network;
pub mod packet;
pub mod queue;
pub mod report;
pub mod sampler;
pub mod scenarios;
pub mod trace;
pub mod traffic;

pub use counters::{ByteCounter, FlowCounters};
pub use engine::{AppId, Flow, FlowId, Simulator};
pub use error::{Result, SimError};
pub use network::{Link, LinkConfig, LinkId, LinkStats, QueueConfig};
pub use queue::{DropTail, QueueDisc, QueueLimit, Red, RedConfig};
pub use report::{FlowMetrics, ReportLine};
pub use sampler::{PeriodicSampler, SampleMode, SamplePoint};
pub use trace::SimulationReport;
pub use traffic::{BulkSource, OnOffSource, PacketSink, TrafficJob, TrafficSource};
