//! Veritas Backend Library
//!
//! Exposes the full module tree for the `veritas` binary and the
//! integration tests.

pub mod agents;
pub mod api;
pub mod auth;
pub mod blob;
pub mod brief;
pub mod clients;
pub mod config;
pub mod middleware;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod store;
