//! Storage backends.
//!
//! * [`sqlite`] persists orders, gateway events and side-effect records in SQLite. Serialization comes from unique
//!   keys and compare-and-swap updates.
//! * [`memory`] keeps everything in a single mutex-guarded state. It is meant for tests and single-process
//!   deployments where losing state on restart is acceptable.
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// An effect that has failed this many times is left alone by the background retry worker.
pub const MAX_EFFECT_ATTEMPTS: i64 = 5;
