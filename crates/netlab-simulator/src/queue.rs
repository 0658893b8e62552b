//! Queueing disciplines sitting in front of a link.

use crate::packet::Packet;
use netlab_abstract::SimTime;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::fmt::Debug;

/// Capacity of a queue, counted in bytes or in packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLimit {
    Bytes(u64),
    Packets(usize),
}

pub trait QueueDisc: Debug {
    /// Accept `packet` or hand it back when the discipline drops it.
    fn enqueue(&mut self, packet: Packet, now: SimTime, rng: &mut StdRng) -> Result<(), Packet>;

    fn dequeue(&mut self, now: SimTime) -> Option<Packet>;

    fn len_bytes(&self) -> u64;

    fn len_packets(&self) -> usize;
}

/// FIFO with tail drop.
#[derive(Debug)]
pub struct DropTail {
    limit: QueueLimit,
    fifo: VecDeque<Packet>,
    bytes: u64,
}

impl DropTail {
    pub fn new(limit: QueueLimit) -> Self {
        Self {
            limit,
            fifo: VecDeque::new(),
            bytes: 0,
        }
    }

    fn would_overflow(&self, packet: &Packet) -> bool {
        match self.limit {
            QueueLimit::Bytes(max) => self.bytes + packet.bytes() > max,
            QueueLimit::Packets(max) => self.fifo.len() + 1 > max,
        }
    }
}

impl QueueDisc for DropTail {
    fn enqueue(&mut self, packet: Packet, _now: SimTime, _rng: &mut StdRng) -> Result<(), Packet> {
        if self.would_overflow(&packet) {
            return Err(packet);
        }
        self.bytes += packet.bytes();
        self.fifo.push_back(packet);
        Ok(())
    }

    fn dequeue(&mut self, _now: SimTime) -> Option<Packet> {
        let packet = self.fifo.pop_front()?;
        self.bytes -= packet.bytes();
        Some(packet)
    }

    fn len_bytes(&self) -> u64 {
        self.bytes
    }

    fn len_packets(&self) -> usize {
        self.fifo.len()
    }
}

/// Parameters of byte-mode Random Early Detection. Thresholds are in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RedConfig {
    pub min_th: f64,
    pub max_th: f64,
    /// Weight of the newest queue size in the moving average.
    pub wq: f64,
    /// Drop probability reached as the average approaches `max_th`.
    pub max_p: f64,
    pub limit_bytes: u64,
    /// Used to estimate how many packets the link could have sent while idle.
    pub mean_packet_size: u32,
}

/// Random Early Detection (Floyd and Jacobson, 1993).
#[derive(Debug)]
pub struct Red {
    config: RedConfig,
    fifo: VecDeque<Packet>,
    bytes: u64,
    avg: f64,
    /// Packets accepted since the last drop while between thresholds; -1 when
    /// the average is below `min_th`.
    count: i64,
    idle_since: Option<SimTime>,
    packet_time: SimTime,
}

impl Red {
    /// `packet_time` is the transmission time of a mean-size packet on the link.
    pub fn new(config: RedConfig, packet_time: SimTime) -> Self {
        Self {
            config,
            fifo: VecDeque::new(),
            bytes: 0,
            avg: 0.0,
            count: -1,
            idle_since: None,
            packet_time,
        }
    }

    pub fn average(&self) -> f64 {
        self.avg
    }

    fn update_average(&mut self, now: SimTime) {
        let wq = self.config.wq;
        match self.idle_since {
            Some(since) if self.fifo.is_empty() && !self.packet_time.is_zero() => {
                let idle = now.saturating_sub(since);
                let m = idle.as_nanos() as f64 / self.packet_time.as_nanos() as f64;
                self.avg *= (1.0 - wq).powf(m);
                self.idle_since = Some(now);
            }
            _ => {
                self.avg = (1.0 - wq) * self.avg + wq * self.bytes as f64;
            }
        }
    }

    fn early_drop(&mut self, rng: &mut StdRng) -> bool {
        let RedConfig {
            min_th,
            max_th,
            max_p,
            ..
        } = self.config;

        if self.avg < min_th {
            self.count = -1;
            return false;
        }
        if self.avg >= max_th {
            self.count = 0;
            return true;
        }

        self.count += 1;
        let pb = max_p * (self.avg - min_th) / (max_th - min_th);
        let denom = 1.0 - self.count as f64 * pb;
        let pa = if denom <= 0.0 { 1.0 } else { (pb / denom).min(1.0) };
        if rng.random::<f64>() < pa {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

impl QueueDisc for Red {
    fn enqueue(&mut self, packet: Packet, now: SimTime, rng: &mut StdRng) -> Result<(), Packet> {
        self.update_average(now);

        if self.early_drop(rng) {
            return Err(packet);
        }
        if self.bytes + packet.bytes() > self.config.limit_bytes {
            self.count = 0;
            return Err(packet);
        }

        self.idle_since = None;
        self.bytes += packet.bytes();
        self.fifo.push_back(packet);
        Ok(())
    }

    fn dequeue(&mut self, now: SimTime) -> Option<Packet> {
        let packet = self.fifo.pop_front()?;
        self.bytes -= packet.bytes();
        if self.fifo.is_empty() {
            self.idle_since = Some(now);
        }
        Some(packet)
    }

    fn len_bytes(&self) -> u64 {
        self.bytes
    }

    fn len_packets(&self) -> usize {
        self.fifo.len()
    }
}
