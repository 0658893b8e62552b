pub mod config;
pub mod endpoint;
pub mod interface;
pub mod scenario;
pub mod time;

pub use config::{SimConfig, SimConfigOverride};
pub use endpoint::Endpoint;
pub use interface::{Application, Feedback, SystemContext};
pub use scenario::{DumbbellParams, MeshParams, QueueParams, ScenarioFile};
pub use time::SimTime;
