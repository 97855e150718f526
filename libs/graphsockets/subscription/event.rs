use crate::graphql::response::GraphQLResponse;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// Kinds of events a subscription emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Connecting,
    ConnectionAck,
    Data,
    Error,
    ConnectionError,
    KeepAlive,
    Complete,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::Connecting,
        EventType::ConnectionAck,
        EventType::Data,
        EventType::Error,
        EventType::ConnectionError,
        EventType::KeepAlive,
        EventType::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Connecting => "connecting",
            EventType::ConnectionAck => "connection_ack",
            EventType::Data => "data",
            EventType::Error => "error",
            EventType::ConnectionError => "connection_error",
            EventType::KeepAlive => "keep_alive",
            EventType::Complete => "complete",
        }
    }

    /// Events that end the subscription under the auto-close policy
    pub fn is_stop_event(&self) -> bool {
        matches!(
            self,
            EventType::Error | EventType::ConnectionError | EventType::Complete
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key: one event type or every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Type(EventType),
    Any,
}

impl From<EventType> for EventKey {
    fn from(kind: EventType) -> Self {
        EventKey::Type(kind)
    }
}

/// One event delivered to subscription callbacks
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    pub kind: EventType,
    pub subscription_id: String,
    /// Decoded frame payload as received
    pub payload: Option<Value>,
    /// Parsed result for DATA and ERROR events
    pub response: Option<GraphQLResponse>,
    pub received_at: DateTime<Utc>,
}

impl SubscriptionEvent {
    pub fn new(kind: EventType, subscription_id: impl Into<String>) -> Self {
        Self {
            kind,
            subscription_id: subscription_id.into(),
            payload: None,
            response: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_response(mut self, response: GraphQLResponse) -> Self {
        self.response = Some(response);
        self
    }

    /// DATA event from a `data`/`next` payload
    ///
    /// Fails when the payload is not a GraphQL response object.
    pub fn data(subscription_id: &str, payload: Value) -> serde_json::Result<Self> {
        let response = GraphQLResponse::from_value(payload.clone())?;
        Ok(Self::new(EventType::Data, subscription_id)
            .with_payload(Some(payload))
            .with_response(response))
    }

    /// ERROR event from a server `error` payload
    pub fn error(subscription_id: &str, payload: Value) -> Self {
        let response = GraphQLResponse::from_error_payload(payload.clone());
        Self::new(EventType::Error, subscription_id)
            .with_payload(Some(payload))
            .with_response(response)
    }

    /// ERROR event for a failure detected on the client side
    pub fn local_error(subscription_id: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::error(subscription_id, Value::String(message))
    }

    /// CONNECTION_ERROR event with a reason
    pub fn connection_error(subscription_id: &str, reason: Option<Value>) -> Self {
        Self::new(EventType::ConnectionError, subscription_id).with_payload(reason)
    }

    pub fn response(&self) -> Option<&GraphQLResponse> {
        self.response.as_ref()
    }

    pub fn data_value(&self) -> Option<&Value> {
        self.response.as_ref().and_then(|r| r.data.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_event_parses_response() {
        let event = SubscriptionEvent::data("1", json!({"data": {"tick": 3}})).unwrap();
        assert_eq!(event.kind, EventType::Data);
        assert_eq!(event.data_value().unwrap()["tick"], 3);
        assert!(!event.response().unwrap().has_errors());
    }

    #[test]
    fn test_data_event_rejects_malformed_payload() {
        assert!(SubscriptionEvent::data("1", json!("not-a-response")).is_err());
        assert!(SubscriptionEvent::data("1", json!({"data": 5, "errors": "bogus"})).is_err());
        assert!(SubscriptionEvent::data("1", json!([1, 2])).is_err());
    }

    #[test]
    fn test_error_event_carries_errors() {
        let event = SubscriptionEvent::error("1", json!([{"message": "denied"}]));
        assert_eq!(event.response().unwrap().errors[0].message, "denied");
        assert_eq!(event.payload, Some(json!([{"message": "denied"}])));
    }

    #[test]
    fn test_stop_events() {
        let stops: Vec<_> = EventType::ALL.iter().filter(|t| t.is_stop_event()).collect();
        assert_eq!(
            stops,
            vec![&EventType::Error, &EventType::ConnectionError, &EventType::Complete]
        );
    }
}
