//! HTTP handlers for the X-ray service.

pub mod analyze;
pub mod health;
pub mod metrics;
