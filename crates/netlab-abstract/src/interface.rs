use crate::endpoint::Endpoint;
use crate::time::SimTime;

/// Outcome of a previously sent payload, reported back to the sending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Delivered { size: u32 },
    Lost { size: u32 },
}

impl Feedback {
    pub fn size(&self) -> u32 {
        match self {
            Feedback::Delivered { size } | Feedback::Lost { size } => *size,
        }
    }
}

/// The capability provided by the engine to an application.
/// Every call is buffered and applied once the application callback returns.
pub trait SystemContext {
    /// Hand a payload of `size` bytes to the transport of the flow this
    /// application is bound to.
    fn send(&mut self, size: u32);

    /// Run `on_timer(timer_id)` after `delay` of simulated time.
    /// Starting a timer twice with the same id schedules two firings.
    fn start_timer(&mut self, delay: SimTime, timer_id: u32);

    /// Cancel every pending firing of `timer_id`.
    fn cancel_timer(&mut self, timer_id: u32);

    /// Close the send channel. Later sends are discarded.
    fn close(&mut self);

    /// Log a message to the engine's debug output.
    fn log(&mut self, message: &str);

    /// Current simulated time.
    fn now(&self) -> SimTime;
}

/// Traffic sources and sinks attached to the engine.
pub trait Application {
    /// Called once at the application's start time.
    fn on_start(&mut self, ctx: &mut dyn SystemContext);

    /// Called when a timer started through the context expires.
    fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {}

    /// Called on a sink when a payload sent by `from` arrives.
    fn on_receive(&mut self, _ctx: &mut dyn SystemContext, _from: Endpoint, _size: u32) {}

    /// Called on a source once the fate of one of its payloads is known.
    fn on_feedback(&mut self, _ctx: &mut dyn SystemContext, _feedback: Feedback) {}
}
