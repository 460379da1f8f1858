// ABOUTME: Library root for podgarden - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod cluster;
pub mod config;
pub mod error;
pub mod garden;
pub mod http;
pub mod identity;
pub mod properties;
pub mod runtime;
pub mod stream;
pub mod telemetry;
pub mod types;
