//! Common library for the issue-triage gateway
//!
//! This crate provides the infrastructure shared by the gateway service:
//! the Redis cache pool used as the durable session backend, and the
//! typed store error.

pub mod cache;
pub mod error;
