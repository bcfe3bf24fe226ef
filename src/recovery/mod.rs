//! Recovery: request validation and the pure transition from a source
//! incarnation to its recovered child.

pub mod engine;
pub mod options;

pub use engine::{recover, try_recover, Recovered};
pub use options::{RecoveryMetadata, RecoveryOptions, RecoveryResult, RecoveryTarget, RecoveryType};
