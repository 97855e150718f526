//! Legacy `graphql-ws` vocabulary
//!
//! Client: `connection_init`, `start`, `stop`, `connection_terminate`.
//! Server: `connection_ack`, `connection_error`, `ka`, `data`, `error`,
//! `complete`. There is no client-initiated ping.

use super::frame::{render, ClientFrame, DecodeError, RawFrame, ServerFrame};
use super::SubProtocol;
use crate::traits::FrameCodec;
use serde_json::{json, Value};

pub struct GraphqlWsCodec;

impl FrameCodec for GraphqlWsCodec {
    fn protocol(&self) -> SubProtocol {
        SubProtocol::GraphqlWs
    }

    fn encode(&self, frame: &ClientFrame) -> serde_json::Result<Option<String>> {
        let text = match frame {
            ClientFrame::ConnectionInit { payload } => {
                let payload = payload.clone().unwrap_or_else(|| json!({}));
                render("connection_init", None, Some(&payload))?
            }
            ClientFrame::Start { id, payload } => render("start", Some(id), Some(payload))?,
            ClientFrame::Stop { id } => render("stop", Some(id), None)?,
            ClientFrame::ConnectionTerminate => render("connection_terminate", None, None)?,
            ClientFrame::Ping { .. } | ClientFrame::Pong { .. } => return Ok(None),
        };
        Ok(Some(text))
    }

    fn decode(&self, text: &str) -> Result<ServerFrame, DecodeError> {
        let mut raw = RawFrame::parse(text)?;

        let frame = match raw.kind.as_str() {
            "connection_ack" => ServerFrame::ConnectionAck { payload: raw.payload },
            "connection_error" => ServerFrame::ConnectionError { payload: raw.payload },
            "ka" => ServerFrame::KeepAlive,
            "data" => ServerFrame::Data {
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
        true
    }
}
