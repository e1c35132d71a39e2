//! Server-side components of the change feed worker process.
//!
//! ## Submodules
//!
//! - [`config`] - CLI / environment configuration.
//! - [`probe`] - `grpc.health.v1` probe used by the local frontend health
//!   checker.
//! - [`service`] - gRPC service implementation (`Subscribe`).
//! - [`streaming`] - Subscriber fan-out plus the poller, pinger and synthetic
//!   ingest tasks.
//! - [`telemetry`] - Tracing and metrics initialization.

pub mod config;
pub mod probe;
pub mod service;
pub mod streaming;
pub mod telemetry;
