pub mod chain;
pub mod config;
pub mod error;
pub mod notes;
pub mod physics;
pub mod scheduler;
pub mod sink;
pub mod snapshot;
pub mod stage;
pub mod transport;

pub use chain::{ChainCoordinator, ChainLinks, ChainRole};
pub use config::ToyConfig;
pub use error::*;
pub use physics::{BallState, Bounds, Edge, PhysicsNode};
pub use scheduler::{ScheduledEvent, Scheduler};
pub use sink::{NoteSink, NullSink, RecordingSink, SinkError, TracingSink};
pub use snapshot::{NodeState, StageSnapshot};
pub use stage::Stage;
pub use transport::{LoopInfo, TransportClock};

/// Build a stage from a YAML config.
/// This is the main entry point for hosts that keep their scene in a file.
pub fn stage_from_yaml(source: &str) -> Result<Stage, BouncerError> {
    let config = ToyConfig::from_yaml(source)?;
    Ok(Stage::new(config))
}
