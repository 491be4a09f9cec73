//! relay-switcher library crate.
//!
//! Owns the closed decision loop of the relay: probe the RTMP statistics
//! endpoint, decide which scene should be on program, and effect the change
//! on the encoder process.

pub mod api;
pub mod config;
pub mod decider;
pub mod driver;
pub mod error;
pub mod logging;
pub mod notify;
pub mod scene;
pub mod switcher;

pub use error::{Error, Result};
pub use scene::Scene;
