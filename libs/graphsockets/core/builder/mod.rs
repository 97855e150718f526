pub mod states;

use crate::core::config::ConnectionConfig;
use crate::graphql::client::{ClientParts, GraphQLClient};
use crate::graphql::document::DocumentValidator;
use crate::graphql::http::QueryMethod;
use crate::graphql::schema::Schema;
use crate::protocol::SubProtocol;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`GraphQLClient`]
///
/// The HTTP endpoint is required; everything else has a default. The
/// streaming endpoint is derived from the HTTP one unless given.
pub struct GraphQLClientBuilder<E>
where
    E: EndpointState,
{
    _state: TypeState<E>,
    endpoint: Option<String>,
    ws_endpoint: Option<String>,
    headers: Headers,
    header_provider: Option<Arc<dyn HeaderProvider>>,
    method: QueryMethod,
    protocols: Option<Vec<SubProtocol>>,
    schema: Option<Schema>,
    validator: Option<Arc<dyn QueryValidator>>,
    config: ConnectionConfig,
    request_timeout: Option<Duration>,
}

impl GraphQLClientBuilder<NoEndpoint> {
    /// Create a new builder instance
    pub fn new() -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Self {
            _state: TypeState::new(),
            endpoint: None,
            ws_endpoint: None,
            headers,
            header_provider: None,
            method: QueryMethod::Post,
            protocols: None,
            schema: None,
            validator: None,
            config: ConnectionConfig::default(),
            request_timeout: None,
        }
    }

    pub fn endpoint(self, endpoint: impl Into<String>) -> GraphQLClientBuilder<HasEndpoint> {
        GraphQLClientBuilder {
            _state: TypeState::new(),
            endpoint: Some(endpoint.into()),
            ws_endpoint: self.ws_endpoint,
            headers: self.headers,
            header_provider: self.header_provider,
            method: self.method,
            protocols: self.protocols,
            schema: self.schema,
            validator: self.validator,
            config: self.config,
            request_timeout: self.request_timeout,
        }
    }
}

impl Default for GraphQLClientBuilder<NoEndpoint> {
    fn default() -> Self {
        Self::new()
    }
}

// Optional configuration methods
impl<E> GraphQLClientBuilder<E>
where
    E: EndpointState,
{
    /// Streaming endpoint, if it differs from the HTTP endpoint
    pub fn ws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.ws_endpoint = Some(endpoint.into());
        self
    }

    /// Default header sent with every request and upgrade
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn header_provider(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.header_provider = Some(Arc::new(provider));
        self
    }

    pub fn method(mut self, method: QueryMethod) -> Self {
        self.method = method;
        self
    }

    /// Sub-protocols offered by default, most preferred first
    pub fn protocols(mut self, protocols: Vec<SubProtocol>) -> Self {
        self.protocols = Some(protocols);
        self
    }

    /// Use this schema instead of introspecting the endpoint
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn validator(mut self, validator: impl QueryValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Timeout for plain HTTP requests
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

// Build method - only available once the endpoint is set
impl GraphQLClientBuilder<HasEndpoint> {
    pub fn build(self) -> Result<GraphQLClient> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| GraphSocketError::Configuration("endpoint must be set".into()))?;
        if endpoint.trim().is_empty() {
            return Err(GraphSocketError::Configuration("endpoint must not be empty".into()));
        }

        let protocols = self.protocols.unwrap_or_else(|| self.config.protocols.clone());
        let config = self.config.protocols(protocols.clone());
        config.validate()?;

        let ws_endpoint = self.ws_endpoint.unwrap_or_else(|| http_to_ws(&endpoint));

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        Ok(GraphQLClient::from_parts(ClientParts {
            endpoint,
            ws_endpoint,
            headers: self.headers,
            header_provider: self.header_provider,
            method: self.method,
            protocols,
            schema: self.schema,
            validator: self.validator.unwrap_or_else(|| Arc::new(DocumentValidator::new())),
            config,
            http,
        }))
    }
}

/// `http://` becomes `ws://`, `https://` becomes `wss://`
pub fn http_to_ws(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws() {
        assert_eq!(http_to_ws("http://localhost:8080/graphql"), "ws://localhost:8080/graphql");
        assert_eq!(http_to_ws("https://api.example.com/graphql"), "wss://api.example.com/graphql");
        assert_eq!(http_to_ws("ws://already"), "ws://already");
    }

    #[test]
    fn test_build_defaults() {
        let client = GraphQLClient::builder()
            .endpoint("https://api.example.com/graphql")
            .build()
            .unwrap();

        assert_eq!(client.ws_endpoint(), "wss://api.example.com/graphql");
        assert_eq!(client.method(), QueryMethod::Post);
        assert_eq!(client.protocols(), &SubProtocol::DEFAULT_PREFERENCE);
        assert_eq!(client.headers()["Content-Type"], "application/json");
    }

    #[test]
    fn test_build_overrides() {
        let client = GraphQLClient::builder()
            .ws_endpoint("ws://stream.example.com/graphql")
            .endpoint("http://api.example.com/graphql")
            .header("Content-Type", "application/graphql+json")
            .method(QueryMethod::Get)
            .protocols(vec![SubProtocol::GraphqlWs])
            .build()
            .unwrap();

        assert_eq!(client.ws_endpoint(), "ws://stream.example.com/graphql");
        assert_eq!(client.headers()["Content-Type"], "application/graphql+json");
        assert_eq!(client.protocols(), &[SubProtocol::GraphqlWs]);
        assert_eq!(client.connection_config().protocols, vec![SubProtocol::GraphqlWs]);
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let result = GraphQLClient::builder().endpoint("  ").build();
        assert!(matches!(result, Err(GraphSocketError::Configuration(_))));

        let result = GraphQLClient::builder()
            .endpoint("http://h/graphql")
            .protocols(vec![])
            .build();
        assert!(result.is_err());

        let result = GraphQLClient::builder()
            .endpoint("http://h/graphql")
            .connection_config(ConnectionConfig::new().stop_grace_timeout(Duration::ZERO))
            .build();
        assert!(result.is_err());
    }
}
