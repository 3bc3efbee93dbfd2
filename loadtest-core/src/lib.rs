//! Core types and utilities for the ingestion load test.
//!
//! This crate provides the error taxonomy, the resource and token types
//! exchanged with the platform, and the run-wide registry cache shared by
//! every virtual session.

pub mod cache;
pub mod error;
pub mod types;

pub use cache::*;
pub use error::*;
pub use types::*;
