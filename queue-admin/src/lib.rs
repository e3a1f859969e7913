//! Queue administration service

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

/// Request middleware
pub mod middleware;

/// Route handlers
pub mod routes;

/// HTTP server
pub mod server;

/// Periodic DLQ retry
pub mod sweeper;

/// Environment and error types
pub mod types;
