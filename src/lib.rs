//! # incident-dedup
//!
//! Exactly-once coordination for incident actions taken by many short-lived,
//! stateless invocations.
//!
//! Two tiers: a bounded per-process [`cache::LocalCache`] that short-circuits
//! retries seen by a warm process, and a durable [`store::LockStore`] whose
//! atomic create-if-absent write (with TTL expiry) is the only cross-process
//! serialization point. [`coordinator::Coordinator`] combines them and falls
//! back to a [`coordinator::DegradationPolicy`] when the store is down.

pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod event;
pub mod model;
pub mod normalize;
pub mod store;
pub mod telemetry;
