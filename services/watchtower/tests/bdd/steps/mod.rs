//! BDD step definitions for watchtower service

pub mod dispatch_steps;
pub mod monitoring_steps;
pub mod registry_steps;
pub mod uptime_steps;
