//! boxed error type used throughout the session core.
//!
//! Everything that can fail here crosses a thread boundary at some point
//! (audio callback, encode worker, network receive), so the error type
//! has to be Send + Sync to move between them.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send // needed for threads
        + std::marker::Sync, // needed for threads
>;
