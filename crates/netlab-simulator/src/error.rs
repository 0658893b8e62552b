use netlab_abstract::Endpoint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("unknown link id {0}")]
    UnknownLink(usize),

    #[error("unknown flow id {0}")]
    UnknownFlow(usize),

    #[error("flow {src} -> {dst} has an empty path")]
    EmptyPath { src: Endpoint, dst: Endpoint },

    #[error("a sink is already bound to {0}")]
    DuplicateSink(Endpoint),

    #[error("flow {0} already has a source application")]
    FlowAlreadyBound(usize),

    #[error("the sampler is already running")]
    SamplerAlreadyEnabled,
}

impl SimError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        SimError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
