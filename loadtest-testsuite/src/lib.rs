//! Testing utilities for load-test sessions.
//!
//! This crate provides an in-memory management portal, schema registry and
//! ingestion gateway behind the [`loadtest_client::HttpTransport`] seam, so
//! whole runs can be tested without a deployed platform.

pub mod platform;

pub use platform::*;
