use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// HTTP headers sent with requests and with the WebSocket upgrade
pub type Headers = HashMap<String, String>;

/// Trait for providing HTTP headers dynamically
///
/// Called every time a connection is opened or a plain request is sent,
/// so tokens that rotate can be refreshed without rebuilding the client.
/// Provider headers have the lowest precedence: client defaults, request
/// headers and call-time headers all override them.
///
/// # Example
/// ```ignore
/// struct BearerToken {
///     token: Arc<RwLock<String>>,
/// }
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for BearerToken {
///     async fn get_headers(&self) -> Headers {
///         let mut headers = HashMap::new();
///         headers.insert("Authorization".to_string(), format!("Bearer {}", self.token.read()));
///         headers
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers for the next connection or request
    async fn get_headers(&self) -> Headers;
}

/// A no-op header provider that doesn't add any headers
pub struct NoHeaders;

#[async_trait]
impl HeaderProvider for NoHeaders {
    async fn get_headers(&self) -> Headers {
        HashMap::new()
    }
}

/// Provider returning a fixed set of headers
pub struct StaticHeaders(pub Headers);

#[async_trait]
impl HeaderProvider for StaticHeaders {
    async fn get_headers(&self) -> Headers {
        self.0.clone()
    }
}

/// Merge header layers, later layers overriding earlier ones
pub fn merge_headers<'a>(layers: impl IntoIterator<Item = &'a Headers>) -> Headers {
    let mut merged = Headers::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Stable key for an endpoint plus the headers used to reach it
///
/// Header names are compared case-insensitively and order does not matter.
pub fn fingerprint(endpoint: &str, headers: &Headers) -> String {
    let sorted: BTreeMap<String, &String> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    for (key, value) in sorted {
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_merge_later_layers_win() {
        let defaults = headers(&[("Content-Type", "application/json"), ("X-Env", "dev")]);
        let request = headers(&[("X-Env", "prod")]);
        let call = headers(&[("Authorization", "Bearer abc")]);

        let merged = merge_headers([&defaults, &request, &call]);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged["X-Env"], "prod");
        assert_eq!(merged["Authorization"], "Bearer abc");
    }

    #[tokio::test]
    async fn test_static_headers_provider() {
        let provider = StaticHeaders(headers(&[("X-Api-Key", "k")]));
        assert_eq!(provider.get_headers().await["X-Api-Key"], "k");
        assert!(NoHeaders.get_headers().await.is_empty());
    }

    #[test]
    fn test_fingerprint_ignores_header_order_and_case() {
        let a = headers(&[("Authorization", "Bearer x"), ("X-Trace", "1")]);
        let mut b = headers(&[("x-trace", "1"), ("authorization", "Bearer x")]);

        assert_eq!(fingerprint("http://h/graphql", &a), fingerprint("http://h/graphql", &b));
        assert_ne!(fingerprint("http://h/graphql", &a), fingerprint("http://other/graphql", &a));
        assert_eq!(fingerprint("http://h/graphql", &a).len(), 64);

        b.insert("authorization".into(), "Bearer y".into());
        assert_ne!(fingerprint("http://h/graphql", &a), fingerprint("http://h/graphql", &b));
    }
}
