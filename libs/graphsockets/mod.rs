//! # GraphSockets
//!
//! GraphQL client with a subscription engine over a persistent WebSocket.
//!
//! ## Features
//!
//! - **Two vocabularies**: `graphql-transport-ws` and legacy `graphql-ws`, negotiated per connection
//! - **Single reader per socket**: registrations and stops are commands into the reader task
//! - **Per-subscription state machine**: illegal frames become scoped errors, never connection failures
//! - **Ordered callbacks**: type-specific then wildcard; async callbacks tracked, never awaited inline
//! - **Plain path**: POST/GET queries, introspection with a per-header schema cache, client-side validation

pub mod core;
pub mod graphql;
pub mod manager;
pub mod protocol;
pub mod subscription;
pub mod traits;

// Re-export all traits
pub use traits::*;

pub use crate::core::{
    builder, config, connection, connection_state, states, Connection, ConnectionConfig, ConnectionState,
    GraphQLClientBuilder, Metrics,
};
pub use graphql::{
    Document, DocumentValidator, GraphQLClient, GraphQLError, GraphQLRequest, GraphQLResponse, Location,
    OperationKind, QueryMethod, RequestOverrides, Schema, SubscribeOptions,
};
pub use manager::ConnectionPool;
pub use protocol::{ProtocolError, SubProtocol, SubscriptionState};
pub use subscription::{
    CallbackFailure, CallbackHandle, CallbackRegistry, EventKey, EventType, Subscription, SubscriptionEvent,
    FAILURE_CAPACITY,
};

/// Create a new client builder
pub fn builder() -> GraphQLClientBuilder<states::NoEndpoint> {
    GraphQLClientBuilder::new()
}
