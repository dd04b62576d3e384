pub mod artifacts;

pub use artifacts::{latest_run, RunArtifacts, StoredEvent};
