pub mod error;
pub mod types;

pub use error::{HavenError, HavenResult};
pub use types::{ResourceType, UpsertOutcome};
