//! Store-and-forward links.

use crate::error::{Result, SimError};
use crate::packet::Packet;
use crate::queue::{DropTail, QueueDisc, QueueLimit, Red, RedConfig};
use netlab_abstract::SimTime;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fmt;

/// Default buffer of a link nobody asked to manage.
pub const DEFAULT_QUEUE_PACKETS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LinkId(pub usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueConfig {
    DropTail(QueueLimit),
    Red(RedConfig),
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::DropTail(QueueLimit::Packets(DEFAULT_QUEUE_PACKETS))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub name: String,
    pub rate_bps: u64,
    pub delay: SimTime,
    /// Probability that a packet is lost at the end of its transmission.
    pub loss_rate: f64,
    pub queue: QueueConfig,
}

impl LinkConfig {
    pub fn new(name: impl Into<String>, rate_bps: u64, delay: SimTime) -> Self {
        Self {
            name: name.into(),
            rate_bps,
            delay,
            loss_rate: 0.0,
            queue: QueueConfig::default(),
        }
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.rate_bps == 0 {
            return Err(SimError::invalid(
                "rate_bps",
                format!("link `{}` needs a positive rate", self.name),
            ));
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(SimError::invalid(
                "loss_rate",
                format!("{} is not a probability", self.loss_rate),
            ));
        }
        if let QueueConfig::Red(red) = &self.queue {
            if !(red.min_th >= 0.0 && red.min_th < red.max_th) {
                return Err(SimError::invalid(
                    "MinTh",
                    format!("need 0 <= MinTh < MaxTh, got {} and {}", red.min_th, red.max_th),
                ));
            }
            if !(red.wq > 0.0 && red.wq <= 1.0) {
                return Err(SimError::invalid("Wq", format!("{} is not in (0, 1]", red.wq)));
            }
            if !(0.0..=1.0).contains(&red.max_p) {
                return Err(SimError::invalid(
                    "maxP",
                    format!("{} is not a probability", red.max_p),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub enqueued_packets: u64,
    pub enqueued_bytes: u64,
    /// Rejected by the queueing discipline.
    pub dropped_packets: u64,
    pub dropped_bytes: u64,
    /// Lost to random loss after transmission.
    pub lost_packets: u64,
    pub transmitted_packets: u64,
    pub transmitted_bytes: u64,
}

#[derive(Debug)]
pub struct Link {
    id: LinkId,
    name: String,
    rate_bps: u64,
    delay: SimTime,
    loss_rate: f64,
    queue: Box<dyn QueueDisc>,
    transmitting: Option<Packet>,
    stats: LinkStats,
}

impl Link {
    pub fn new(id: LinkId, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let LinkConfig {
            name,
            rate_bps,
            delay,
            loss_rate,
            queue,
        } = config;

        let queue: Box<dyn QueueDisc> = match queue {
            QueueConfig::DropTail(limit) => Box::new(DropTail::new(limit)),
            QueueConfig::Red(red) => {
                let packet_time = tx_time(rate_bps, red.mean_packet_size);
                Box::new(Red::new(red, packet_time))
            }
        };

        Ok(Self {
            id,
            name,
            rate_bps,
            delay,
            loss_rate,
            queue,
            transmitting: None,
            stats: LinkStats::default(),
        })
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rate_bps(&self) -> u64 {
        self.rate_bps
    }

    pub fn delay(&self) -> SimTime {
        self.delay
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn queued_bytes(&self) -> u64 {
        self.queue.len_bytes()
    }

    /// Serialization time of `bytes` on this link, rounded up to the nanosecond.
    pub fn tx_time(&self, bytes: u32) -> SimTime {
        tx_time(self.rate_bps, bytes)
    }

    pub(crate) fn enqueue(
        &mut self,
        packet: Packet,
        now: SimTime,
        rng: &mut StdRng,
    ) -> std::result::Result<(), Packet> {
        let size = packet.bytes();
        match self.queue.enqueue(packet, now, rng) {
            Ok(()) => {
                self.stats.enqueued_packets += 1;
                self.stats.enqueued_bytes += size;
                Ok(())
            }
            Err(packet) => {
                self.stats.dropped_packets += 1;
                self.stats.dropped_bytes += size;
                Err(packet)
            }
        }
    }

    /// Start serializing the head of the queue if the link is idle.
    /// Returns when the transmission completes.
    pub(crate) fn start_next(&mut self, now: SimTime) -> Option<SimTime> {
        if self.transmitting.is_some() {
            return None;
        }
        let packet = self.queue.dequeue(now)?;
        let done = now + self.tx_time(packet.size);
        self.transmitting = Some(packet);
        Some(done)
    }

    pub(crate) fn finish(&mut self) -> Option<Packet> {
        let packet = self.transmitting.take()?;
        self.stats.transmitted_packets += 1;
        self.stats.transmitted_bytes += packet.bytes();
        Some(packet)
    }

    pub(crate) fn record_loss(&mut self) {
        self.stats.lost_packets += 1;
    }
}

fn tx_time(rate_bps: u64, bytes: u32) -> SimTime {
    if rate_bps == 0 {
        return SimTime::MAX;
    }
    let bits = u128::from(bytes) * 8;
    let nanos = (bits * 1_000_000_000 + u128::from(rate_bps) - 1) / u128::from(rate_bps);
    SimTime::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
}
