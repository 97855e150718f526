//! `graphql-transport-ws` vocabulary
//!
//! Client: `connection_init`, `subscribe`, `complete`, `ping`, `pong`.
//! Server: `connection_ack`, `next`, `error`, `complete`, `ping`, `pong`.
//! A client `complete` is final; the server does not answer it.

use super::frame::{render, ClientFrame, DecodeError, RawFrame, ServerFrame};
use super::SubProtocol;
use crate::traits::FrameCodec;
use serde_json::Value;

pub struct TransportWsCodec;

impl FrameCodec for TransportWsCodec {
    fn protocol(&self) -> SubProtocol {
        SubProtocol::GraphqlTransportWs
    }

    fn encode(&self, frame: &ClientFrame) -> serde_json::Result<Option<String>> {
        let text = match frame {
            ClientFrame::ConnectionInit { payload } => render("connection_init", None, payload.as_ref())?,
            ClientFrame::Start { id, payload } => render("subscribe", Some(id), Some(payload))?,
            ClientFrame::Stop { id } => render("complete", Some(id), None)?,
            ClientFrame::Ping { payload } => render("ping", None, payload.as_ref())?,
            ClientFrame::Pong { payload } => render("pong", None, payload.as_ref())?,
            // Shutdown is a normal close frame
            ClientFrame::ConnectionTerminate => return Ok(None),
        };
        Ok(Some(text))
    }

    fn decode(&self, text: &str) -> Result<ServerFrame, DecodeError> {
        let mut raw = RawFrame::parse(text)?;

        let frame = match raw.kind.as_str() {
            "connection_ack" => ServerFrame::ConnectionAck { payload: raw.payload },
            "ping" => ServerFrame::Ping { payload: raw.payload },
            "pong" => ServerFrame::Pong { payload: raw.payload },
            "next" => ServerFrame::Data {
                id: raw.require_id()?,
                payload: raw.payload.unwrap_or(Value::Null),
            },
            "error" => ServerFrame::Error {
                id: raw.require_id()?,
                payload: raw.payload.unwrap_or(Value::Null),
            },
            "complete" => ServerFrame::Complete { id: raw.require_id()? },
            _ => raw.into_unexpected(),
        };

        Ok(frame)
    }

    fn acknowledges_stop(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_client_frames() {
        let codec = TransportWsCodec;

        let start = codec
            .encode(&ClientFrame::Start {
                id: "1".into(),
                payload: json!({"query": "subscription { tick }"}),
            })
            .unwrap();
        assert_eq!(
            start.as_deref(),
            Some(r#"{"type":"subscribe","id":"1","payload":{"query":"subscription { tick }"}}"#)
        );

        let stop = codec.encode(&ClientFrame::Stop { id: "1".into() }).unwrap();
        assert_eq!(stop.as_deref(), Some(r#"{"type":"complete","id":"1"}"#));

        let ping = codec.encode(&ClientFrame::Ping { payload: None }).unwrap();
        assert_eq!(ping.as_deref(), Some(r#"{"type":"ping"}"#));
    }

    #[test]
    fn test_terminate_has_no_frame() {
        let codec = TransportWsCodec;
        assert!(codec.encode(&ClientFrame::ConnectionTerminate).unwrap().is_none());
    }

    #[test]
    fn test_decode_server_frames() {
        let codec = TransportWsCodec;

        assert_eq!(
            codec.decode(r#"{"type":"ping"}"#).unwrap(),
            ServerFrame::Ping { payload: None }
        );

        match codec.decode(r#"{"type":"error","id":"2","payload":[{"message":"boom"}]}"#).unwrap() {
            ServerFrame::Error { id, payload } => {
                assert_eq!(id, "2");
                assert_eq!(payload[0]["message"], "boom");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_legacy_types_are_unexpected() {
        let codec = TransportWsCodec;
        let frame = codec.decode(r#"{"type":"ka"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Unexpected { id: None, .. }));
    }
}
