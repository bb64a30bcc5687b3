//! Knowledge graph storage: domain models, store ports and the in-memory
//! reference implementation.

pub mod memory;
pub mod models;
pub mod snapshot;
pub mod traits;

pub use memory::{InMemoryGraphStore, InMemoryLearnerHistory};
pub use models::*;
pub use snapshot::{AttemptRecord, GraphSnapshot, LearnerRecord};
pub use traits::{GraphStore, LearnerHistory};
