use crate::engine::FlowId;
use netlab_abstract::SimTime;

/// A payload travelling along its flow's path. Only the size is modelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub flow: FlowId,
    pub seq: u64,
    pub size: u32,
    /// Index into the flow path of the link the packet is on or heading to.
    pub hop: usize,
    pub sent_at: SimTime,
}

impl Packet {
    pub fn new(flow: FlowId, seq: u64, size: u32, sent_at: SimTime) -> Self {
        Self {
            flow,
            seq,
            size,
            hop: 0,
            sent_at,
        }
    }

    pub fn bytes(&self) -> u64 {
        u64::from(self.size)
    }
}
