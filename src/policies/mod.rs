//! Spawn pacing policies.
//!
//! When worker spawns keep failing (a broken start task, thread creation
//! errors), the pool delays the next attempt instead of respawning in a hot
//! loop. [`BackoffPolicy`] controls how that delay grows; [`JitterPolicy`]
//! randomizes it so several pools on one host do not respawn in lockstep.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
