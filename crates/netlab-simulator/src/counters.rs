use serde::Serialize;

/// Monotonic byte accumulator for one direction of one flow.
///
/// Additions saturate at `u64::MAX` instead of wrapping, so the value never
/// decreases. There is no reset: a fresh scenario run builds fresh counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ByteCounter(u64);

impl ByteCounter {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn add(&mut self, bytes: u64) {
        self.0 = self.0.saturating_add(bytes);
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Per-flow accounting owned by the engine and fed by its send, delivery and
/// drop callbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowCounters {
    sent: ByteCounter,
    received: ByteCounter,
    dropped: ByteCounter,
}

impl FlowCounters {
    pub fn on_bytes_sent(&mut self, bytes: u32) {
        self.sent.add(u64::from(bytes));
    }

    pub fn on_bytes_received(&mut self, bytes: u32) {
        self.received.add(u64::from(bytes));
    }

    pub fn on_bytes_dropped(&mut self, bytes: u32) {
        self.dropped.add(u64::from(bytes));
    }

    pub fn sent(&self) -> u64 {
        self.sent.get()
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}
