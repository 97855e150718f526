//! Sub-protocol vocabularies and the per-subscription state machine

pub mod frame;
pub mod graphql_ws;
pub mod state;
pub mod transport_ws;

use crate::traits::{FrameCodec, GraphSocketError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use frame::{ClientFrame, DecodeError, ServerFrame};
pub use graphql_ws::GraphqlWsCodec;
pub use state::{ProtocolError, StateInput, StateMachine, SubscriptionState, Transition};
pub use transport_ws::TransportWsCodec;

/// WebSocket sub-protocols a connection can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubProtocol {
    /// Legacy Apollo vocabulary (`start`/`data`/`stop`/`ka`)
    #[serde(rename = "graphql-ws")]
    GraphqlWs,
    /// Current vocabulary (`subscribe`/`next`/`complete`/`ping`)
    #[serde(rename = "graphql-transport-ws")]
    GraphqlTransportWs,
}

static GRAPHQL_WS: GraphqlWsCodec = GraphqlWsCodec;
static TRANSPORT_WS: TransportWsCodec = TransportWsCodec;

impl SubProtocol {
    /// Offered by default, most preferred first
    pub const DEFAULT_PREFERENCE: [SubProtocol; 2] =
        [SubProtocol::GraphqlTransportWs, SubProtocol::GraphqlWs];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubProtocol::GraphqlWs => "graphql-ws",
            SubProtocol::GraphqlTransportWs => "graphql-transport-ws",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "graphql-ws" => Some(SubProtocol::GraphqlWs),
            "graphql-transport-ws" => Some(SubProtocol::GraphqlTransportWs),
            _ => None,
        }
    }

    pub fn codec(&self) -> &'static dyn FrameCodec {
        match self {
            SubProtocol::GraphqlWs => &GRAPHQL_WS,
            SubProtocol::GraphqlTransportWs => &TRANSPORT_WS,
        }
    }

    /// `Sec-WebSocket-Protocol` value for an offer list
    ///
    /// No whitespace after the commas: tungstenite splits the offer on `,`
    /// without trimming and compares the server's choice verbatim.
    pub fn header_value(offered: &[SubProtocol]) -> String {
        offered
            .iter()
            .map(SubProtocol::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Resolve the protocol the server selected during the upgrade
    pub fn negotiate(offered: &[SubProtocol], selected: Option<&str>) -> Result<SubProtocol> {
        let selected = selected.ok_or_else(|| {
            GraphSocketError::UnsupportedProtocol(format!(
                "server selected no sub-protocol (offered: {})",
                Self::header_value(offered)
            ))
        })?;

        match Self::from_name(selected) {
            Some(protocol) if offered.contains(&protocol) => Ok(protocol),
            _ => Err(GraphSocketError::UnsupportedProtocol(format!(
                "server selected '{}' (offered: {})",
                selected,
                Self::header_value(offered)
            ))),
        }
    }
}

impl fmt::Display for SubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubProtocol {
    type Err = GraphSocketError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| GraphSocketError::UnsupportedProtocol(s.to_string()))
    }
}
