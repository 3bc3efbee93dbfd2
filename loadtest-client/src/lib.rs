//! Clients of the RADAR-base platform used by the ingestion load test.
//!
//! All clients share one [`HttpTransport`]; the management portal, schema
//! registry and gateway differ only in their path prefix.

pub mod auth;
pub mod ensure;
pub mod gateway;
pub mod management;
pub mod options;
pub mod requests;
pub mod schema_registry;
pub mod transport;

pub use auth::{BrokerCredentials, ClientCredentials, TokenBroker};
pub use ensure::ResourceEnsurer;
pub use gateway::GatewayClient;
pub use management::ManagementClient;
pub use options::{ClientOptions, RetryOptions};
pub use schema_registry::{SchemaRegistryClient, SubjectVersion};
pub use transport::{
    BoxedTransport, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, RequestBody,
};

/// The three platform clients over one transport.
#[derive(Debug, Clone)]
pub struct PlatformClients {
    pub management: ManagementClient,
    pub registry: SchemaRegistryClient,
    pub gateway: GatewayClient,
}

impl PlatformClients {
    pub fn new(transport: BoxedTransport, options: &ClientOptions) -> Self {
        Self {
            management: ManagementClient::new(transport.clone(), options),
            registry: SchemaRegistryClient::new(transport.clone(), options),
            gateway: GatewayClient::new(transport, options),
        }
    }
}
