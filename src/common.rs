//! These modules are shared across the session core threads.
pub mod box_error;
