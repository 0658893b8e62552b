//! Traffic sources and sinks.
//!
//! Every source drives itself through timers: a firing does its work and
//! schedules the next firing, so the engine can interleave other events in
//! between.

use netlab_abstract::{Application, Endpoint, Feedback, SimTime, SystemContext};

/// Smallest inter-packet interval a job will use.
pub const MIN_INTERVAL: SimTime = SimTime::from_nanos(1);

const FIRE_TIMER: u32 = 0;
const SEND_TIMER: u32 = 1;
const TOGGLE_TIMER: u32 = 2;

/// A bounded run of fixed-size payloads at a fixed interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficJob {
    payload_size: u32,
    remaining: u32,
    interval: SimTime,
}

impl TrafficJob {
    /// A zero interval is clamped to [`MIN_INTERVAL`].
    pub fn new(payload_size: u32, count: u32, interval: SimTime) -> Self {
        Self {
            payload_size,
            remaining: count,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Spread `count` payloads evenly over `total`. A zero count is a job that
    /// never fires.
    pub fn spread(payload_size: u32, count: u32, total: SimTime) -> Self {
        if count == 0 {
            return Self::new(payload_size, 0, MIN_INTERVAL);
        }
        let interval = SimTime::from_nanos(total.as_nanos() / u64::from(count));
        Self::new(payload_size, count, interval)
    }

    pub fn payload_size(&self) -> u32 {
        self.payload_size
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn interval(&self) -> SimTime {
        self.interval
    }

    /// Consume one firing, returning the payload size while packets remain.
    fn take(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.payload_size)
    }
}

/// Runs one [`TrafficJob`] and closes its channel when the job is done.
#[derive(Debug)]
pub struct TrafficSource {
    job: TrafficJob,
    closed: bool,
}

impl TrafficSource {
    pub fn new(job: TrafficJob) -> Self {
        Self { job, closed: false }
    }

    fn fire(&mut self, ctx: &mut dyn SystemContext) {
        match self.job.take() {
            Some(size) => {
                ctx.send(size);
                ctx.start_timer(self.job.interval(), FIRE_TIMER);
            }
            None if !self.closed => {
                ctx.log("traffic job complete");
                ctx.close();
                self.closed = true;
            }
            None => {}
        }
    }
}

impl Application for TrafficSource {
    fn on_start(&mut self, ctx: &mut dyn SystemContext) {
        self.fire(ctx);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        if timer_id == FIRE_TIMER {
            self.fire(ctx);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnOffConfig {
    pub packet_size: u32,
    pub rate_bps: u64,
    pub on_time: SimTime,
    pub off_time: SimTime,
}

/// Constant-rate source that alternates between sending and idle periods.
#[derive(Debug)]
pub struct OnOffSource {
    config: OnOffConfig,
    /// `None` when the rate is zero and the source never sends.
    interval: Option<SimTime>,
    on: bool,
}

impl OnOffSource {
    pub fn new(mut config: OnOffConfig) -> Self {
        config.on_time = config.on_time.max(MIN_INTERVAL);
        config.off_time = config.off_time.max(MIN_INTERVAL);
        let interval = (config.rate_bps > 0).then(|| {
            let bits = u128::from(config.packet_size) * 8;
            let nanos = bits * 1_000_000_000 / u128::from(config.rate_bps);
            SimTime::from_nanos(nanos.min(u128::from(u64::MAX)) as u64).max(MIN_INTERVAL)
        });
        Self {
            config,
            interval,
            on: false,
        }
    }

    pub fn interval(&self) -> Option<SimTime> {
        self.interval
    }

    fn turn_on(&mut self, ctx: &mut dyn SystemContext) {
        self.on = true;
        if let Some(interval) = self.interval {
            ctx.send(self.config.packet_size);
            ctx.start_timer(interval, SEND_TIMER);
        }
        ctx.start_timer(self.config.on_time, TOGGLE_TIMER);
    }

    fn turn_off(&mut self, ctx: &mut dyn SystemContext) {
        self.on = false;
        ctx.cancel_timer(SEND_TIMER);
        ctx.start_timer(self.config.off_time, TOGGLE_TIMER);
    }
}

impl Application for OnOffSource {
    fn on_start(&mut self, ctx: &mut dyn SystemContext) {
        self.turn_on(ctx);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        match timer_id {
            SEND_TIMER if self.on => {
                if let Some(interval) = self.interval {
                    ctx.send(self.config.packet_size);
                    ctx.start_timer(interval, SEND_TIMER);
                }
            }
            TOGGLE_TIMER if self.on => self.turn_off(ctx),
            TOGGLE_TIMER => self.turn_on(ctx),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkConfig {
    /// Total bytes to transfer; 0 means unlimited.
    pub max_bytes: u64,
    pub seg_size: u32,
    /// Maximum bytes in flight. One segment is always allowed when nothing is
    /// in flight.
    pub window: u32,
}

/// Window-limited bulk sender. In-flight bytes are released by delivery and
/// loss feedback; lost segments are not retransmitted.
#[derive(Debug)]
pub struct BulkSource {
    config: BulkConfig,
    handed: u64,
    in_flight: u64,
    closed: bool,
}

impl BulkSource {
    pub fn new(config: BulkConfig) -> Self {
        Self {
            config,
            handed: 0,
            in_flight: 0,
            closed: false,
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight
    }

    fn next_segment(&self) -> u32 {
        let seg = u64::from(self.config.seg_size);
        if self.config.max_bytes == 0 {
            return self.config.seg_size;
        }
        let left = self.config.max_bytes.saturating_sub(self.handed);
        left.min(seg) as u32
    }

    fn fill_window(&mut self, ctx: &mut dyn SystemContext) {
        if self.closed {
            return;
        }
        loop {
            let size = self.next_segment();
            if size == 0 {
                ctx.log("bulk transfer fully handed to transport");
                ctx.close();
                self.closed = true;
                return;
            }
            let fits = self.in_flight + u64::from(size) <= u64::from(self.config.window);
            if self.in_flight > 0 && !fits {
                return;
            }
            ctx.send(size);
            self.handed += u64::from(size);
            self.in_flight += u64::from(size);
        }
    }
}

impl Application for BulkSource {
    fn on_start(&mut self, ctx: &mut dyn SystemContext) {
        self.fill_window(ctx);
    }

    fn on_feedback(&mut self, ctx: &mut dyn SystemContext, feedback: Feedback) {
        self.in_flight = self.in_flight.saturating_sub(u64::from(feedback.size()));
        self.fill_window(ctx);
    }
}

/// Accepts every payload addressed to its endpoint. Accounting happens in the
/// engine's flow counters.
#[derive(Debug, Default)]
pub struct PacketSink;

impl Application for PacketSink {
    fn on_start(&mut self, _ctx: &mut dyn SystemContext) {}

    fn on_receive(&mut self, _ctx: &mut dyn SystemContext, _from: Endpoint, _size: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records what an application asks for without running an engine.
    #[derive(Default)]
    struct MockContext {
        now: SimTime,
        sent: Vec<u32>,
        timers: Vec<(SimTime, u32)>,
        cancelled: Vec<u32>,
        closed: bool,
    }

    impl SystemContext for MockContext {
        fn send(&mut self, size: u32) {
            self.sent.push(size);
        }

        fn start_timer(&mut self, delay: SimTime, timer_id: u32) {
            self.timers.push((self.now + delay, timer_id));
        }

        fn cancel_timer(&mut self, timer_id: u32) {
            self.cancelled.push(timer_id);
            self.timers.retain(|(_, id)| *id != timer_id);
        }

        fn close(&mut self) {
            self.closed = true;
        }

        fn log(&mut self, _message: &str) {}

        fn now(&self) -> SimTime {
            self.now
        }
    }

    impl MockContext {
        /// Pop the earliest pending timer and advance the clock to it.
        fn advance(&mut self) -> Option<u32> {
            let idx = self
                .timers
                .iter()
                .enumerate()
                .min_by_key(|(i, (at, _))| (*at, *i))
                .map(|(i, _)| i)?;
            let (at, id) = self.timers.remove(idx);
            self.now = at;
            Some(id)
        }
    }

    #[test]
    fn job_fires_exactly_count_times_at_interval() {
        let mut ctx = MockContext::default();
        let mut source = TrafficSource::new(TrafficJob::new(2000, 5, SimTime::from_secs(1)));
        source.on_start(&mut ctx);

        let mut fire_times = vec![ctx.now];
        let mut last_sent = ctx.sent.len();
        while let Some(id) = ctx.advance() {
            source.on_timer(&mut ctx, id);
            if ctx.sent.len() > last_sent {
                fire_times.push(ctx.now);
                last_sent = ctx.sent.len();
            }
        }

        assert_eq!(ctx.sent, vec![2000; 5]);
        assert!(ctx.closed);
        assert!(ctx.timers.is_empty());
        let gaps: Vec<SimTime> = fire_times.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps, vec![SimTime::from_secs(1); 4]);
    }

    #[test]
    fn zero_count_job_never_fires() {
        let mut ctx = MockContext::default();
        let mut source = TrafficSource::new(TrafficJob::spread(2000, 0, SimTime::from_secs(9)));
        source.on_start(&mut ctx);
        assert!(ctx.sent.is_empty());
        assert!(ctx.closed);
        assert!(ctx.timers.is_empty());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let job = TrafficJob::new(10, 3, SimTime::ZERO);
        assert_eq!(job.interval(), MIN_INTERVAL);
        let spread = TrafficJob::spread(10, 4, SimTime::from_secs(9));
        assert_eq!(spread.interval(), SimTime::from_millis(2250));
        assert_eq!(spread.remaining(), 4);
    }

    #[test]
    fn on_off_sends_only_while_on() {
        let mut ctx = MockContext::default();
        let mut source = OnOffSource::new(OnOffConfig {
            packet_size: 500,
            rate_bps: 40_000,
            on_time: SimTime::from_millis(500),
            off_time: SimTime::from_millis(500),
        });
        // 4000 bits at 40 kbit/s.
        assert_eq!(source.interval(), Some(SimTime::from_millis(100)));

        source.on_start(&mut ctx);
        let mut sends_at = vec![ctx.now];
        while let Some(id) = ctx.advance() {
            if ctx.now >= SimTime::from_secs(2) {
                break;
            }
            let before = ctx.sent.len();
            source.on_timer(&mut ctx, id);
            if ctx.sent.len() > before {
                sends_at.push(ctx.now);
            }
        }

        let on = |t: &SimTime| (t.as_nanos() / 500_000_000) % 2 == 0;
        assert!(sends_at.iter().all(on));
        assert!(ctx.cancelled.contains(&SEND_TIMER));
        // Two on periods of five packets each.
        assert_eq!(sends_at.len(), 10);
    }

    #[test]
    fn zero_rate_on_off_is_silent() {
        let mut ctx = MockContext::default();
        let mut source = OnOffSource::new(OnOffConfig {
            packet_size: 512,
            rate_bps: 0,
            on_time: SimTime::from_millis(500),
            off_time: SimTime::from_millis(500),
        });
        source.on_start(&mut ctx);
        assert!(ctx.sent.is_empty());
    }

    #[test]
    fn bulk_source_respects_window() {
        let mut ctx = MockContext::default();
        let mut source = BulkSource::new(BulkConfig {
            max_bytes: 1000,
            seg_size: 128,
            window: 300,
        });
        source.on_start(&mut ctx);
        assert_eq!(ctx.sent, vec![128, 128]);
        assert_eq!(source.in_flight(), 256);

        source.on_feedback(&mut ctx, Feedback::Delivered { size: 128 });
        assert_eq!(ctx.sent.len(), 3);
        assert!(source.in_flight() <= 300);

        for _ in 0..10 {
            source.on_feedback(&mut ctx, Feedback::Lost { size: 128 });
        }
        let total: u32 = ctx.sent.iter().sum();
        assert_eq!(total, 1000);
        assert_eq!(ctx.sent.last(), Some(&(1000 - 7 * 128)));
        assert!(ctx.closed);
    }

    #[test]
    fn bulk_source_sends_one_segment_larger_than_window() {
        let mut ctx = MockContext::default();
        let mut source = BulkSource::new(BulkConfig {
            max_bytes: 0,
            seg_size: 1500,
            window: 1000,
        });
        source.on_start(&mut ctx);
        assert_eq!(ctx.sent, vec![1500]);
        assert!(!ctx.closed);
    }
}
