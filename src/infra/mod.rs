//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod http;
pub mod s3;
pub mod telemetry;
