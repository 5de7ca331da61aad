//! The FluxMCP client protocol engine: session coordinator, inbound and
//! notification handlers, entity catalog, and the host-facing client facade
//! built on top of [`fluxmcp_transport`] and [`fluxmcp_protocol`].

pub mod catalog;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod handlers;
pub mod notifications;
pub mod router;

pub use catalog::Catalog;
pub use client::Client;
pub use config::{AuthProvider, ClientConfig, SamplingPolicy};
pub use coordinator::{Coordinator, ConnectionState};
pub use handlers::elicitation::{ElicitationComponent, ElicitationHandler, ElicitationOutcome, SchemaValidator};
pub use handlers::roots::RootsComponent;
pub use handlers::sampling::{PreferredModel, SamplingBackend, SamplingComponent};
pub use notifications::{LoggingHandler, NotificationRouter, ProgressHandler};
pub use router::{CancelToken, MessageRouter};

pub use fluxmcp_protocol::*;
pub use fluxmcp_transport::{
    HttpConfig, ReconnectionConfig, StdioConfig, Transport, TransportConfig,
};
