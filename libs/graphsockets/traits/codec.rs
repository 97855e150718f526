use crate::protocol::frame::{ClientFrame, DecodeError, ServerFrame};
use crate::protocol::SubProtocol;

/// Frame vocabulary of one sub-protocol generation
///
/// A codec translates between the protocol-neutral [`ClientFrame`] /
/// [`ServerFrame`] enums and the wire text of its vocabulary. Everything
/// above the codec (handshake, dispatch loop, state machine) only ever sees
/// the neutral frames.
pub trait FrameCodec: Send + Sync + 'static {
    /// Protocol this codec speaks
    fn protocol(&self) -> SubProtocol;

    /// Encode a client frame
    ///
    /// Returns `Ok(None)` when the vocabulary has no equivalent (for example
    /// a client ping on a protocol that only knows server keep-alives).
    fn encode(&self, frame: &ClientFrame) -> serde_json::Result<Option<String>>;

    /// Decode one server frame
    ///
    /// Errors are frame-level: the text is not a frame of this vocabulary at
    /// all and cannot be attributed to a single operation.
    fn decode(&self, text: &str) -> Result<ServerFrame, DecodeError>;

    /// Whether the server answers a client stop with a `complete` frame
    fn acknowledges_stop(&self) -> bool;
}
