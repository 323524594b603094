#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
pub mod core;

pub use crate::core::engine::policy::EligibilityPolicy;
pub use crate::core::engine::Engine;
pub use crate::core::source::{FetchError, RemoteEntity, Snapshot, SnapshotSource};
