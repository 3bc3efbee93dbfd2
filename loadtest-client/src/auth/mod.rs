//! Authentication against the management portal.

mod broker;
mod provider;

pub use broker::{BrokerCredentials, TokenBroker};
pub use provider::ClientCredentials;
