//! Client facade for queries, introspection and subscriptions

use super::http::{HttpTransport, QueryMethod};
use super::request::{GraphQLRequest, RequestOverrides};
use super::response::GraphQLResponse;
use super::schema::{Schema, SchemaCache};
use crate::core::builder::{states::NoEndpoint, GraphQLClientBuilder};
use crate::core::config::ConnectionConfig;
use crate::manager::ConnectionPool;
use crate::protocol::{SubProtocol, SubscriptionState};
use crate::subscription::event::{EventType, SubscriptionEvent};
use crate::subscription::handle::{Subscription, SubscriptionShared};
use crate::subscription::next_operation_id;
use crate::subscription::registry::CallbackRegistry;
use crate::traits::{
    fingerprint, merge_headers, EventCallback, GraphSocketError, HeaderProvider, Headers, QueryValidator,
    Result, ValidationErrors,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Introspection query sent by [`GraphQLClient::introspect`]
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types { ...FullType }
    directives {
      name
      locations
      args { ...InputValue }
    }
  }
}

fragment FullType on __Type {
  kind
  name
  fields(includeDeprecated: true) {
    name
    args { ...InputValue }
    type { ...TypeRef }
    isDeprecated
    deprecationReason
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) {
    name
    isDeprecated
    deprecationReason
  }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType { kind name }
      }
    }
  }
}
"#;

/// Per-call options for [`GraphQLClient::subscribe`]
pub struct SubscribeOptions {
    pub overrides: RequestOverrides,
    pub callbacks: CallbackRegistry,
    /// Offer list for this subscription; the client default when `None`
    pub protocols: Option<Vec<SubProtocol>>,
    /// Stop automatically on ERROR, CONNECTION_ERROR or COMPLETE
    pub auto_close: bool,
    /// Return only once the subscription is terminal
    pub wait: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            overrides: RequestOverrides::default(),
            callbacks: CallbackRegistry::new(),
            protocols: None,
            auto_close: true,
            wait: false,
        }
    }
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overrides(mut self, overrides: RequestOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn on_data(mut self, callback: Arc<dyn EventCallback>) -> Self {
        self.callbacks = self.callbacks.on_data(callback);
        self
    }

    pub fn on_error(mut self, callback: Arc<dyn EventCallback>) -> Self {
        self.callbacks = self.callbacks.on_error(callback);
        self
    }

    pub fn protocols(mut self, protocols: Vec<SubProtocol>) -> Self {
        self.protocols = Some(protocols);
        self
    }

    pub fn auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = auto_close;
        self
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }
}

/// Everything the builder hands over
pub(crate) struct ClientParts {
    pub endpoint: String,
    pub ws_endpoint: String,
    pub headers: Headers,
    pub header_provider: Option<Arc<dyn HeaderProvider>>,
    pub method: QueryMethod,
    pub protocols: Vec<SubProtocol>,
    pub schema: Option<Schema>,
    pub validator: Arc<dyn QueryValidator>,
    pub config: ConnectionConfig,
    pub http: reqwest::Client,
}

struct ClientInner {
    http: HttpTransport,
    ws_endpoint: String,
    headers: Headers,
    header_provider: Option<Arc<dyn HeaderProvider>>,
    method: QueryMethod,
    protocols: Vec<SubProtocol>,
    pinned_schema: RwLock<Option<Arc<Schema>>>,
    schemas: SchemaCache,
    validator: Arc<dyn QueryValidator>,
    config: ConnectionConfig,
    pool: ConnectionPool,
}

/// GraphQL client over HTTP and a pooled streaming socket
///
/// Cheap to clone; clones share the schema cache and the connection pool.
///
/// # Example
///
/// ```ignore
/// let client = GraphQLClient::builder()
///     .endpoint("http://localhost:8080/v1/graphql")
///     .header("Authorization", "Bearer token")
///     .build()?;
///
/// let subscription = client
///     .subscribe(
///         &GraphQLRequest::new("subscription { messageAdded { id text } }"),
///         SubscribeOptions::new().on_data(sync_callback(|event| {
///             println!("{:?}", event.data_value());
///             Ok(())
///         })),
///     )
///     .await?;
/// ```
#[derive(Clone)]
pub struct GraphQLClient {
    inner: Arc<ClientInner>,
}

impl GraphQLClient {
    pub fn builder() -> GraphQLClientBuilder<NoEndpoint> {
        GraphQLClientBuilder::new()
    }

    pub(crate) fn from_parts(parts: ClientParts) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http: HttpTransport::with_client(parts.http, parts.endpoint),
                ws_endpoint: parts.ws_endpoint,
                headers: parts.headers,
                header_provider: parts.header_provider,
                method: parts.method,
                protocols: parts.protocols,
                pinned_schema: RwLock::new(parts.schema.map(Arc::new)),
                schemas: SchemaCache::new(),
                validator: parts.validator,
                config: parts.config,
                pool: ConnectionPool::new(),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.inner.http.endpoint()
    }

    pub fn ws_endpoint(&self) -> &str {
        &self.inner.ws_endpoint
    }

    /// Default headers sent with every request
    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn method(&self) -> QueryMethod {
        self.inner.method
    }

    pub fn protocols(&self) -> &[SubProtocol] {
        &self.inner.protocols
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Copy of `request` with client headers and call-time overrides applied
    ///
    /// Header precedence, lowest first: header provider, client defaults,
    /// request headers, call headers.
    pub async fn prepare(&self, request: &GraphQLRequest, overrides: &RequestOverrides) -> GraphQLRequest {
        let provided = match self.inner.header_provider {
            Some(ref provider) => provider.get_headers().await,
            None => Headers::new(),
        };
        let fallback = merge_headers([&provided, &self.inner.headers]);
        request.merged(overrides, &fallback)
    }

    /// Run the validation collaborator against a request
    ///
    /// Skipped when the request disables validation, unless `force` is set.
    /// The schema is fetched (and cached) when none is given.
    pub async fn validate(&self, request: &GraphQLRequest, schema: Option<&Schema>, force: bool) -> Result<()> {
        if !request.validate() && !force {
            return Ok(());
        }

        let fetched;
        let schema = match schema {
            Some(schema) => schema,
            None => {
                fetched = self.get_schema(false, request.headers()).await?;
                fetched.as_ref()
            }
        };

        let validator = &self.inner.validator;
        let document = validator
            .parse(request.query())
            .map_err(|e| GraphSocketError::Validation(ValidationErrors(vec![e])))?;
        let errors = validator.validate(schema, &document);
        if errors.is_empty() {
            Ok(())
        } else {
            debug!("Request failed validation with {} error(s)", errors.len());
            Err(ValidationErrors(errors).into())
        }
    }

    /// Introspect the endpoint and build its schema
    ///
    /// Sent straight to the transport; validation depends on the result.
    pub async fn introspect(&self, headers: &Headers) -> Result<Schema> {
        let request = GraphQLRequest::new(INTROSPECTION_QUERY)
            .with_validate(false)
            .with_headers(headers.clone());
        let request = self.prepare(&request, &RequestOverrides::default()).await;
        let response = self.inner.http.send(&request, QueryMethod::Post).await?;

        match response.data {
            Some(ref data) if !data.is_null() => Schema::from_introspection(data),
            _ => Err(GraphSocketError::Introspection(format!(
                "Failed to build schema from introspection data: {}",
                response.error_message().unwrap_or_else(|| "no data".into())
            ))),
        }
    }

    /// Schema for this endpoint, cached per header fingerprint
    pub async fn get_schema(&self, refresh: bool, headers: &Headers) -> Result<Arc<Schema>> {
        if !refresh {
            if let Some(schema) = self.inner.pinned_schema.read().clone() {
                return Ok(schema);
            }
        }

        let key = fingerprint(self.endpoint(), headers);
        if !refresh {
            if let Some(schema) = self.inner.schemas.get(&key) {
                return Ok(schema);
            }
        }

        info!("Introspecting {}", self.endpoint());
        let schema = self.inner.schemas.insert(key, self.introspect(headers).await?);

        let mut pinned = self.inner.pinned_schema.write();
        if pinned.is_some() {
            *pinned = Some(Arc::clone(&schema));
        }
        Ok(schema)
    }

    /// Send a query or mutation with the client's default method
    pub async fn query(&self, request: &GraphQLRequest, overrides: RequestOverrides) -> Result<GraphQLResponse> {
        self.query_with(request, self.inner.method, overrides).await
    }

    pub async fn query_with(
        &self,
        request: &GraphQLRequest,
        method: QueryMethod,
        overrides: RequestOverrides,
    ) -> Result<GraphQLResponse> {
        let request = self.prepare(request, &overrides).await;
        self.validate(&request, None, false).await?;
        self.inner.http.send(&request, method).await
    }

    pub async fn post(&self, request: &GraphQLRequest, overrides: RequestOverrides) -> Result<GraphQLResponse> {
        self.query_with(request, QueryMethod::Post, overrides).await
    }

    pub async fn get(&self, request: &GraphQLRequest, overrides: RequestOverrides) -> Result<GraphQLResponse> {
        self.query_with(request, QueryMethod::Get, overrides).await
    }

    /// Start a subscription
    ///
    /// Validation and handshake failures are returned here and no
    /// subscription is created. Afterwards failures arrive as ERROR or
    /// CONNECTION_ERROR events.
    pub async fn subscribe(&self, request: &GraphQLRequest, options: SubscribeOptions) -> Result<Subscription> {
        let request = self.prepare(request, &options.overrides).await;
        self.validate(&request, None, false).await?;

        let protocols = options.protocols.unwrap_or_else(|| self.inner.protocols.clone());
        let headers = request.headers().clone();
        let shared = SubscriptionShared::new(
            next_operation_id(),
            request,
            Arc::new(options.callbacks),
            options.auto_close,
        );
        shared.dispatch(&SubscriptionEvent::new(EventType::Connecting, &shared.id));

        let pool = &self.inner.pool;
        let connection = pool
            .acquire(&self.inner.ws_endpoint, &protocols, &headers, &self.inner.config)
            .await?;
        if let Err(e) = connection.attach(&shared).await {
            // The pooled connection went idle and closed under us
            if !matches!(e, GraphSocketError::ConnectionClosed(_)) || shared.state() != SubscriptionState::Init {
                return Err(e);
            }
            warn!("{}, retrying on a fresh connection", e);
            pool.prune();
            let connection = pool
                .acquire(&self.inner.ws_endpoint, &protocols, &headers, &self.inner.config)
                .await?;
            connection.attach(&shared).await?;
        }

        let subscription = Subscription::new(shared);
        if options.wait {
            let state = subscription.wait().await;
            debug!("Subscription {} finished in {}", subscription.id(), state);
        }
        Ok(subscription)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.inner.pool.close_all().await;
    }
}

impl std::fmt::Debug for GraphQLClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLClient")
            .field("endpoint", &self.endpoint())
            .field("ws_endpoint", &self.inner.ws_endpoint)
            .field("method", &self.inner.method)
            .field("protocols", &self.inner.protocols)
            .finish()
    }
}
