//! Magicbox: a caching reverse proxy in front of an S3-compatible object store.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
