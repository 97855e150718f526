//! GraphQL request/response model, schema, validation and the client facade

pub mod client;
pub mod document;
pub mod http;
pub mod request;
pub mod response;
pub mod schema;

pub use client::{GraphQLClient, SubscribeOptions, INTROSPECTION_QUERY};
pub use document::{Document, DocumentValidator, OperationKind};
pub use http::{HttpTransport, QueryMethod};
pub use request::{GraphQLRequest, RequestOverrides};
pub use response::{GraphQLError, GraphQLResponse, Location, PathSegment};
pub use schema::{Schema, SchemaCache, SchemaType};
