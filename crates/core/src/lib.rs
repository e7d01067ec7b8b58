//! Core types and shared functionality for larder.
//!
//! This crate provides:
//! - TTL store trait with in-memory and SQLite backends
//! - Store key derivation
//! - Clock abstraction for expiry decisions
//! - Unified error types
//! - Configuration structures

pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, NoCacheMode};
pub use error::Error;
pub use store::{MAX_TTL_SECS, MemoryStore, SqliteStore, TtlStore, clamp_ttl, read_json, ttl_from_secs, write_json};
