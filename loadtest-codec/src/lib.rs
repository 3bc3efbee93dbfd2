//! Payload encoding for the ingestion gateway.
//!
//! Records are modelled as plain Rust types that convert to and from Avro
//! values. The encoder renders them either as a JSON envelope (Avro JSON
//! encoding) or as a binary record set encoded with registry schemas.

pub mod avro_json;
pub mod encoder;
pub mod generator;
pub mod model;
pub mod schemas;

pub use encoder::*;
pub use generator::*;
pub use model::*;
