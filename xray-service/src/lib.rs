//! X-ray image analysis service.
//!
//! Accepts an X-ray image reference (or an uploaded file), asks a hosted
//! vision model for findings, and returns a schema-checked result.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod services;
pub mod startup;
