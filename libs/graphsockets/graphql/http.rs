//! Request/response transport for queries and mutations

use super::request::GraphQLRequest;
use super::response::GraphQLResponse;
use crate::traits::{GraphSocketError, Result};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// HTTP method used to submit a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMethod {
    /// JSON body
    #[default]
    Post,
    /// Payload as query parameters
    Get,
}

impl QueryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMethod::Post => "post",
            QueryMethod::Get => "get",
        }
    }
}

impl fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMethod {
    type Err = GraphSocketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "post" => Ok(QueryMethod::Post),
            "get" => Ok(QueryMethod::Get),
            other => Err(GraphSocketError::Configuration(format!(
                "Invalid method ({}) specified",
                other
            ))),
        }
    }
}

/// Thin wrapper over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a fully merged request
    ///
    /// Any 2xx status yields the decoded response, server-reported errors
    /// included. Other statuses fail with [`GraphSocketError::Request`].
    pub async fn send(&self, request: &GraphQLRequest, method: QueryMethod) -> Result<GraphQLResponse> {
        let builder = match method {
            QueryMethod::Post => self.client.post(&self.endpoint).json(&request.payload()),
            QueryMethod::Get => self.client.get(&self.endpoint).query(&request.query_params()),
        };
        let builder = with_headers(builder, request);

        debug!("{} {} (operation: {:?})", method, self.endpoint, request.operation());
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(GraphSocketError::Request {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = serde_json::from_str(&text)?;
        Ok(GraphQLResponse::from_value(body)?)
    }
}

fn with_headers(builder: RequestBuilder, request: &GraphQLRequest) -> RequestBuilder {
    request
        .headers()
        .iter()
        .fold(builder, |b, (k, v)| b.header(k.as_str(), v.as_str()))
}
