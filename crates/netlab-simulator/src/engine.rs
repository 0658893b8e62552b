use crate::counters::FlowCounters;
use crate::error::{Result, SimError};
use crate::network::{Link, LinkConfig, LinkId};
use crate::packet::Packet;
use crate::sampler::{PeriodicSampler, SampleMode, SamplePoint};
use crate::trace::{FlowSummary, LinkSummary, SimulationReport};
use netlab_abstract::{Application, Endpoint, Feedback, SimConfig, SimTime, SystemContext};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FlowId(pub usize);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub usize);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app#{}", self.0)
    }
}

#[derive(Debug)]
enum EventType {
    AppStart {
        app: AppId,
    },
    TimerExpiry {
        app: AppId,
        timer_id: u32,
        generation: u64,
    },
    TxComplete {
        link: LinkId,
    },
    HopArrival {
        packet: Packet,
    },
    Feedback {
        app: AppId,
        feedback: Feedback,
    },
    Sample,
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison: smallest (time, id) is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Actions buffered during an application callback
#[derive(Default)]
struct ActionBuffer {
    outgoing: Vec<u32>,
    timers_start: Vec<(SimTime, u32)>, // (delay, id)
    timers_cancel: Vec<u32>,
    logs: Vec<String>,
    close: bool,
}

/// Context implementation passed to applications
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: SimTime,
}

impl SystemContext for ScopedContext<'_> {
    fn send(&mut self, size: u32) {
        self.buffer.outgoing.push(size);
    }

    fn start_timer(&mut self, delay: SimTime, timer_id: u32) {
        self.buffer.timers_start.push((delay, timer_id));
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.buffer.timers_cancel.push(timer_id);
    }

    fn close(&mut self) {
        self.buffer.close = true;
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> SimTime {
        self.now
    }
}

#[derive(Debug, Clone, Copy)]
enum Binding {
    Source(FlowId),
    Sink(Endpoint),
}

struct AppSlot {
    app: Box<dyn Application>,
    binding: Binding,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DropReason {
    Queue(LinkId),
    Loss(LinkId),
    NoListener,
}

/// A unidirectional stream of payloads from one endpoint to another over a
/// fixed path.
#[derive(Debug, Clone)]
pub struct Flow {
    id: FlowId,
    src: Endpoint,
    dst: Endpoint,
    path: Vec<LinkId>,
    counters: FlowCounters,
    source: Option<AppId>,
    start: SimTime,
    next_seq: u64,
    /// Sum of the propagation delays along the path.
    path_delay: SimTime,
}

impl Flow {
    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn src(&self) -> Endpoint {
        self.src
    }

    pub fn dst(&self) -> Endpoint {
        self.dst
    }

    pub fn path(&self) -> &[LinkId] {
        &self.path
    }

    pub fn counters(&self) -> &FlowCounters {
        &self.counters
    }

    /// Start time of the source bound to this flow.
    pub fn start(&self) -> SimTime {
        self.start
    }
}

pub struct Simulator {
    time: SimTime,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    events_processed: u64,

    config: SimConfig,
    rng: StdRng,

    apps: Vec<AppSlot>,
    flows: Vec<Flow>,
    links: Vec<Link>,
    sinks: HashMap<Endpoint, AppId>,

    sampler: Option<PeriodicSampler>,

    /// Timer generations to handle cancellation.
    /// Key: (app, timer_id), Value: generation counter
    timer_generations: HashMap<(AppId, u32), u64>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            time: SimTime::ZERO,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            events_processed: 0,
            config,
            rng,
            apps: Vec::new(),
            flows: Vec::new(),
            links: Vec::new(),
            sinks: HashMap::new(),
            sampler: None,
            timer_generations: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn current_time(&self) -> SimTime {
        self.time
    }

    pub fn peek_next_event_time(&self) -> Option<SimTime> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn add_link(&mut self, config: LinkConfig) -> Result<LinkId> {
        let id = LinkId(self.links.len());
        let link = Link::new(id, config)?;
        debug!(
            "Added {} `{}`: {} bit/s, delay {}",
            id,
            link.name(),
            link.rate_bps(),
            link.delay()
        );
        self.links.push(link);
        Ok(id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn add_flow(&mut self, src: Endpoint, dst: Endpoint, path: Vec<LinkId>) -> Result<FlowId> {
        if path.is_empty() {
            return Err(SimError::EmptyPath { src, dst });
        }
        let mut path_delay = SimTime::ZERO;
        for link in &path {
            let link = self.links.get(link.0).ok_or(SimError::UnknownLink(link.0))?;
            path_delay += link.delay();
        }

        let id = FlowId(self.flows.len());
        self.flows.push(Flow {
            id,
            src,
            dst,
            path,
            counters: FlowCounters::default(),
            source: None,
            start: SimTime::ZERO,
            next_seq: 0,
            path_delay,
        });
        Ok(id)
    }

    pub fn flow(&self, id: FlowId) -> Option<&Flow> {
        self.flows.get(id.0)
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Bind `app` as the sender of `flow`, starting at `start`.
    pub fn add_source(
        &mut self,
        app: Box<dyn Application>,
        flow: FlowId,
        start: SimTime,
    ) -> Result<AppId> {
        let id = AppId(self.apps.len());
        let entry = self
            .flows
            .get_mut(flow.0)
            .ok_or(SimError::UnknownFlow(flow.0))?;
        if entry.source.is_some() {
            return Err(SimError::FlowAlreadyBound(flow.0));
        }
        entry.source = Some(id);
        entry.start = start;

        self.apps.push(AppSlot {
            app,
            binding: Binding::Source(flow),
            closed: false,
        });
        self.push_event(start, EventType::AppStart { app: id });
        Ok(id)
    }

    /// Register `app` as the receiver for payloads addressed to `endpoint`.
    pub fn add_sink(
        &mut self,
        app: Box<dyn Application>,
        endpoint: Endpoint,
        start: SimTime,
    ) -> Result<AppId> {
        if self.sinks.contains_key(&endpoint) {
            return Err(SimError::DuplicateSink(endpoint));
        }
        let id = AppId(self.apps.len());
        self.sinks.insert(endpoint, id);
        self.apps.push(AppSlot {
            app,
            binding: Binding::Sink(endpoint),
            closed: false,
        });
        self.push_event(start, EventType::AppStart { app: id });
        Ok(id)
    }

    /// Sample the received-byte total every `period`, starting now.
    ///
    /// A simulator carries at most one sampler.
    pub fn enable_sampler(&mut self, period: SimTime, mode: SampleMode) -> Result<()> {
        if self.sampler.is_some() {
            return Err(SimError::SamplerAlreadyEnabled);
        }
        if period == SimTime::ZERO {
            return Err(SimError::invalid("sample_period", "period must be positive"));
        }
        self.sampler = Some(PeriodicSampler::new(period, mode, self.time));
        self.push_event(self.time, EventType::Sample);
        Ok(())
    }

    pub fn samples(&self) -> &[SamplePoint] {
        self.sampler.as_ref().map_or(&[], |s| s.points())
    }

    pub fn total_sent(&self) -> u64 {
        self.flows
            .iter()
            .fold(0u64, |acc, f| acc.saturating_add(f.counters.sent()))
    }

    pub fn total_received(&self) -> u64 {
        self.flows
            .iter()
            .fold(0u64, |acc, f| acc.saturating_add(f.counters.received()))
    }

    fn push_event(&mut self, time: SimTime, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        self.events_processed += 1;

        match event.event_type {
            EventType::AppStart { app } => {
                self.dispatch(app, |app, ctx| app.on_start(ctx));
            }
            EventType::TimerExpiry {
                app,
                timer_id,
                generation,
            } => {
                // Check if this timer event is still valid by comparing generations
                let current = self.timer_generations.get(&(app, timer_id)).copied();
                if current != Some(generation) {
                    debug!("Skipping cancelled timer {} of {}", timer_id, app);
                    return true;
                }
                self.dispatch(app, |app, ctx| app.on_timer(ctx, timer_id));
            }
            EventType::TxComplete { link } => self.complete_transmission(link),
            EventType::HopArrival { packet } => self.forward(packet),
            EventType::Feedback { app, feedback } => {
                self.dispatch(app, |app, ctx| app.on_feedback(ctx, feedback));
            }
            EventType::Sample => self.sample(),
        }
        true
    }

    /// Run until the configured stop time.
    pub fn run(&mut self) {
        let stop = self.config.stop_at();
        self.run_until(stop);
    }

    /// Process every event due strictly before `stop`, then discard the rest
    /// and park the clock at `stop`.
    pub fn run_until(&mut self, stop: SimTime) {
        info!("Running simulation until {}", stop);
        while let Some(next) = self.peek_next_event_time() {
            if next >= stop {
                break;
            }
            self.step();
        }

        let discarded = self.event_queue.len();
        self.event_queue.clear();
        self.time = self.time.max(stop);
        info!(
            "Simulation stopped at {} ({} events processed, {} pending events cancelled)",
            self.time, self.events_processed, discarded
        );
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            events_processed: self.events_processed,
            total_sent: self.total_sent(),
            total_received: self.total_received(),
            flows: self.flows.iter().map(FlowSummary::from).collect(),
            links: self.links.iter().map(LinkSummary::from).collect(),
            samples: self.samples().to_vec(),
        }
    }

    fn dispatch<F>(&mut self, app: AppId, call: F)
    where
        F: FnOnce(&mut dyn Application, &mut dyn SystemContext),
    {
        let mut buffer = ActionBuffer::default();
        {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            };
            call(self.apps[app.0].app.as_mut(), &mut ctx);
        }
        self.process_actions(app, buffer);
    }

    fn process_actions(&mut self, app: AppId, buffer: ActionBuffer) {
        for log in buffer.logs {
            debug!("[{}] {}", app, log);
        }

        // Handle timer cancellations by incrementing the generation counter
        for timer_id in buffer.timers_cancel {
            let generation = self.timer_generations.entry((app, timer_id)).or_insert(0);
            *generation += 1;
        }

        for (delay, timer_id) in buffer.timers_start {
            let generation = *self.timer_generations.entry((app, timer_id)).or_insert(0);
            self.push_event(
                self.time + delay,
                EventType::TimerExpiry {
                    app,
                    timer_id,
                    generation,
                },
            );
        }

        for size in buffer.outgoing {
            self.transmit(app, size);
        }

        if buffer.close {
            debug!("[{}] closed at {}", app, self.time);
            self.apps[app.0].closed = true;
        }
    }

    fn transmit(&mut self, app: AppId, size: u32) {
        let slot = &self.apps[app.0];
        if slot.closed {
            warn!("[{}] send of {} bytes after close ignored", app, size);
            return;
        }
        let flow_id = match slot.binding {
            Binding::Source(flow) => flow,
            Binding::Sink(endpoint) => {
                warn!("[{}] sink at {} cannot send", app, endpoint);
                return;
            }
        };

        let flow = &mut self.flows[flow_id.0];
        flow.counters.on_bytes_sent(size);
        let packet = Packet::new(flow_id, flow.next_seq, size, self.time);
        flow.next_seq += 1;
        self.enqueue_at_hop(packet);
    }

    fn enqueue_at_hop(&mut self, packet: Packet) {
        let link_id = self.flows[packet.flow.0].path[packet.hop];
        let link = &mut self.links[link_id.0];
        match link.enqueue(packet, self.time, &mut self.rng) {
            Ok(()) => self.try_start_transmission(link_id),
            Err(packet) => self.drop_packet(packet, DropReason::Queue(link_id)),
        }
    }

    fn try_start_transmission(&mut self, link_id: LinkId) {
        if let Some(done) = self.links[link_id.0].start_next(self.time) {
            self.push_event(done, EventType::TxComplete { link: link_id });
        }
    }

    fn complete_transmission(&mut self, link_id: LinkId) {
        let link = &mut self.links[link_id.0];
        if let Some(mut packet) = link.finish() {
            let loss_rate = link.loss_rate();
            if loss_rate > 0.0 && self.rng.random::<f64>() < loss_rate {
                self.links[link_id.0].record_loss();
                self.drop_packet(packet, DropReason::Loss(link_id));
            } else {
                let arrival = self.time + self.links[link_id.0].delay();
                packet.hop += 1;
                self.push_event(arrival, EventType::HopArrival { packet });
            }
        }
        self.try_start_transmission(link_id);
    }

    fn forward(&mut self, packet: Packet) {
        if packet.hop < self.flows[packet.flow.0].path.len() {
            self.enqueue_at_hop(packet);
        } else {
            self.deliver(packet);
        }
    }

    fn deliver(&mut self, packet: Packet) {
        let flow = &mut self.flows[packet.flow.0];
        let Some(sink) = self.sinks.get(&flow.dst).copied() else {
            self.drop_packet(packet, DropReason::NoListener);
            return;
        };

        flow.counters.on_bytes_received(packet.size);
        let src = flow.src;
        let source = flow.source;
        let ack_at = self.time + flow.path_delay;
        if let Some(source) = source {
            self.push_event(
                ack_at,
                EventType::Feedback {
                    app: source,
                    feedback: Feedback::Delivered { size: packet.size },
                },
            );
        }
        self.dispatch(sink, |app, ctx| app.on_receive(ctx, src, packet.size));
    }

    fn drop_packet(&mut self, packet: Packet, reason: DropReason) {
        let flow = &mut self.flows[packet.flow.0];
        flow.counters.on_bytes_dropped(packet.size);
        debug!(
            "{} seq={} ({} bytes) dropped at {}: {:?}",
            flow.id, packet.seq, packet.size, self.time, reason
        );
        // The sender notices the loss one round trip after the drop.
        let noticed_at = self.time + flow.path_delay * 2;
        let source = flow.source;
        if let Some(source) = source {
            self.push_event(
                noticed_at,
                EventType::Feedback {
                    app: source,
                    feedback: Feedback::Lost { size: packet.size },
                },
            );
        }
    }

    fn sample(&mut self) {
        let received = self.total_received();
        if let Some(sampler) = self.sampler.as_mut() {
            let next = sampler.tick(self.time, received);
            self.push_event(next, EventType::Sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::QueueConfig;
    use crate::queue::QueueLimit;
    use crate::traffic::{PacketSink, TrafficJob, TrafficSource};
    use std::cell::RefCell;
    use std::net::Ipv4Addr;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(SimTime, u32)>>>;

    /// Starts timers on start-up and records every firing.
    struct TimerRecorder {
        log: Log,
        start: Vec<(SimTime, u32)>,
        cancel_on: Option<(u32, u32)>,
    }

    impl Application for TimerRecorder {
        fn on_start(&mut self, ctx: &mut dyn SystemContext) {
            for (delay, id) in &self.start {
                ctx.start_timer(*delay, *id);
            }
        }

        fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
            self.log.borrow_mut().push((ctx.now(), timer_id));
            match self.cancel_on {
                Some((trigger, victim)) if trigger == timer_id => ctx.cancel_timer(victim),
                _ => {}
            }
        }
    }

    fn endpoint(last: u8, port: u16) -> Endpoint {
        Endpoint::new(Ipv4Addr::new(10, 0, 0, last), port)
    }

    fn timer_sim(start: Vec<(SimTime, u32)>, cancel_on: Option<(u32, u32)>) -> (Simulator, Log) {
        let log: Log = Rc::default();
        let mut sim = Simulator::new(SimConfig::default());
        let link = sim
            .add_link(LinkConfig::new("l", 1_000_000, SimTime::ZERO))
            .unwrap();
        let flow = sim.add_flow(endpoint(1, 1), endpoint(2, 1), vec![link]).unwrap();
        let recorder = TimerRecorder {
            log: log.clone(),
            start,
            cancel_on,
        };
        sim.add_source(Box::new(recorder), flow, SimTime::ZERO).unwrap();
        (sim, log)
    }

    #[test]
    fn same_time_events_fire_in_scheduling_order() {
        let at = SimTime::from_millis(5);
        let (mut sim, log) = timer_sim(
            vec![
                (SimTime::from_millis(9), 9),
                (at, 3),
                (at, 1),
                (at, 2),
                (SimTime::from_millis(1), 0),
            ],
            None,
        );
        sim.run();
        let ids: Vec<u32> = log.borrow().iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, vec![0, 3, 1, 2, 9]);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let (mut sim, log) = timer_sim(
            vec![(SimTime::from_millis(10), 0), (SimTime::from_millis(5), 1)],
            Some((1, 0)),
        );
        sim.run();
        assert_eq!(*log.borrow(), vec![(SimTime::from_millis(5), 1)]);
    }

    #[test]
    fn events_at_or_after_stop_are_discarded() {
        let (mut sim, log) = timer_sim(
            vec![
                (SimTime::from_millis(999), 1),
                (SimTime::from_secs(1), 2),
                (SimTime::from_secs(3), 3),
            ],
            None,
        );
        sim.run_until(SimTime::from_secs(1));
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(sim.current_time(), SimTime::from_secs(1));
        assert_eq!(sim.remaining_events(), 0);
    }

    #[test]
    fn stop_cancels_remaining_job_firings() {
        let mut sim = Simulator::new(SimConfig::default());
        let link = sim
            .add_link(LinkConfig::new("fast", 1_000_000_000, SimTime::ZERO))
            .unwrap();
        let dst = endpoint(2, 9);
        let flow = sim.add_flow(endpoint(1, 9), dst, vec![link]).unwrap();
        let job = TrafficJob::new(100, 100, SimTime::from_secs(1));
        sim.add_source(Box::new(TrafficSource::new(job)), flow, SimTime::ZERO)
            .unwrap();
        sim.add_sink(Box::new(PacketSink), dst, SimTime::ZERO).unwrap();

        sim.run();
        // Firings at 0 s through 9 s; the one due at 10 s is cancelled.
        assert_eq!(sim.total_sent(), 1000);
        assert_eq!(sim.total_received(), 1000);
    }

    #[test]
    fn packets_without_listener_are_dropped() {
        let mut sim = Simulator::new(SimConfig::default());
        let link = sim
            .add_link(LinkConfig::new("l", 1_000_000, SimTime::from_millis(1)))
            .unwrap();
        let flow = sim.add_flow(endpoint(1, 1), endpoint(2, 1), vec![link]).unwrap();
        let job = TrafficJob::new(500, 3, SimTime::from_millis(100));
        sim.add_source(Box::new(TrafficSource::new(job)), flow, SimTime::ZERO)
            .unwrap();
        sim.run();

        let counters = sim.flow(flow).unwrap().counters();
        assert_eq!(counters.sent(), 1500);
        assert_eq!(counters.received(), 0);
        assert_eq!(counters.dropped(), 1500);
    }

    #[test]
    fn queue_overflow_drops_and_counts() {
        let mut sim = Simulator::new(SimConfig::default());
        let link = sim
            .add_link(
                LinkConfig::new("narrow", 8_000, SimTime::ZERO)
                    .with_queue(QueueConfig::DropTail(QueueLimit::Packets(1))),
            )
            .unwrap();
        let dst = endpoint(2, 1);
        let flow = sim.add_flow(endpoint(1, 1), dst, vec![link]).unwrap();
        // Four back-to-back payloads: one on the wire, one queued, two dropped.
        let job = TrafficJob::new(100, 4, SimTime::from_nanos(1));
        sim.add_source(Box::new(TrafficSource::new(job)), flow, SimTime::ZERO)
            .unwrap();
        sim.add_sink(Box::new(PacketSink), dst, SimTime::ZERO).unwrap();
        sim.run();

        let counters = sim.flow(flow).unwrap().counters();
        assert_eq!(counters.received(), 200);
        assert_eq!(counters.dropped(), 200);
        assert_eq!(sim.link(link).unwrap().stats().dropped_packets, 2);
    }

    #[test]
    fn registration_errors() {
        let mut sim = Simulator::new(SimConfig::default());
        let a = endpoint(1, 1);
        let b = endpoint(2, 1);
        assert!(matches!(
            sim.add_flow(a, b, vec![]),
            Err(SimError::EmptyPath { .. })
        ));
        assert!(matches!(
            sim.add_flow(a, b, vec![LinkId(4)]),
            Err(SimError::UnknownLink(4))
        ));
        sim.add_sink(Box::new(PacketSink), b, SimTime::ZERO).unwrap();
        assert!(matches!(
            sim.add_sink(Box::new(PacketSink), b, SimTime::ZERO),
            Err(SimError::DuplicateSink(_))
        ));
        assert!(matches!(
            sim.add_source(Box::new(PacketSink), FlowId(0), SimTime::ZERO),
            Err(SimError::UnknownFlow(0))
        ));
    }

    /// Sends `count` payloads on start-up and records every feedback.
    struct FeedbackLog {
        log: Rc<RefCell<Vec<(SimTime, Feedback)>>>,
        count: u32,
        size: u32,
    }

    impl Application for FeedbackLog {
        fn on_start(&mut self, ctx: &mut dyn SystemContext) {
            for _ in 0..self.count {
                ctx.send(self.size);
            }
        }

        fn on_feedback(&mut self, ctx: &mut dyn SystemContext, feedback: Feedback) {
            self.log.borrow_mut().push((ctx.now(), feedback));
        }
    }

    fn feedback_sim(
        loss_rate: f64,
    ) -> (Simulator, LinkId, Rc<RefCell<Vec<(SimTime, Feedback)>>>) {
        let mut sim = Simulator::new(SimConfig::default());
        let link = sim
            .add_link(
                LinkConfig::new("lossy", 8_000_000, SimTime::from_millis(10))
                    .with_loss_rate(loss_rate),
            )
            .unwrap();
        let (a, b) = (endpoint(1, 1), endpoint(2, 9));
        let flow = sim.add_flow(a, b, vec![link]).unwrap();
        let log: Rc<RefCell<Vec<(SimTime, Feedback)>>> = Rc::default();
        let app = FeedbackLog {
            log: Rc::clone(&log),
            count: 3,
            size: 100,
        };
        sim.add_source(Box::new(app), flow, SimTime::ZERO).unwrap();
        sim.add_sink(Box::new(PacketSink), b, SimTime::ZERO).unwrap();
        (sim, link, log)
    }

    #[test]
    fn random_loss_drops_every_packet_and_reports_after_a_round_trip() {
        let (mut sim, link, log) = feedback_sim(1.0);
        sim.run();

        assert_eq!(sim.total_sent(), 300);
        assert_eq!(sim.total_received(), 0);
        assert_eq!(sim.flows()[0].counters().dropped(), 300);
        assert_eq!(sim.link(link).unwrap().stats().lost_packets, 3);

        // 100 bytes take 100 us at 8 Mbit/s; each drop is noticed 20 ms later.
        let expected: Vec<(SimTime, Feedback)> = [100, 200, 300]
            .into_iter()
            .map(|us| {
                (
                    SimTime::from_micros(20_000 + us),
                    Feedback::Lost { size: 100 },
                )
            })
            .collect();
        assert_eq!(*log.borrow(), expected);
    }

    #[test]
    fn delivery_is_acknowledged_one_path_delay_later() {
        let (mut sim, link, log) = feedback_sim(0.0);
        sim.run();

        assert_eq!(sim.total_received(), 300);
        assert_eq!(sim.link(link).unwrap().stats().lost_packets, 0);
        let log = log.borrow();
        assert_eq!(log.len(), 3);
        // Serialized by 100 us, propagated 10 ms, acknowledged 10 ms later.
        assert_eq!(
            log[0],
            (SimTime::from_micros(20_100), Feedback::Delivered { size: 100 })
        );
        assert!(log.iter().all(|(_, f)| matches!(f, Feedback::Delivered { .. })));
    }

    #[test]
    fn sampler_can_be_enabled_only_once() {
        let mut sim = Simulator::new(SimConfig {
            stop_time: 1.0,
            ..SimConfig::default()
        });
        let period = SimTime::from_millis(100);
        sim.enable_sampler(period, SampleMode::CumulativeMbits).unwrap();
        assert!(matches!(
            sim.enable_sampler(period, SampleMode::AverageMbps),
            Err(SimError::SamplerAlreadyEnabled)
        ));
        sim.run();

        let samples = sim.samples();
        assert_eq!(samples.len(), 10);
        assert!(samples.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn sampler_rejects_zero_period() {
        let mut sim = Simulator::new(SimConfig::default());
        assert!(matches!(
            sim.enable_sampler(SimTime::ZERO, SampleMode::CumulativeMbits),
            Err(SimError::InvalidParameter { name: "sample_period", .. })
        ));
        assert!(sim.samples().is_empty());
    }
}
