//! Managed service fleet.

pub mod controller;
pub mod status;

pub use controller::{OpAck, ServiceController, ServiceList, ServiceLogs};
pub use status::ServiceStatus;
