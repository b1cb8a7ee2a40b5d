//! jamloop - interval synced jam session core
//!
//! provides the scheduling, mixing and encoding state machine for a
//! networked jam client: a shared beat grid, tempo and signature changes
//! deferred to interval boundaries, per-channel chunk encoding on a
//! background worker, and playback of the other users' channels.
pub mod codec;
pub mod common;
pub mod session;
pub mod sound;
