pub mod config;
pub mod error;
pub mod paths;
pub mod portal;
pub mod recorder;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use paths::Paths;
pub use portal::{PortalDriver, PortalFactory};
pub use recorder::{AgentEvent, NullRecorder, RunRecorder};
pub use types::{
    Confirmation, FailureKind, Identity, QueueStatus, ReservationTarget, RowAcquisition, RowRef,
    Suggestion, TargetKind, TeeRow,
};
