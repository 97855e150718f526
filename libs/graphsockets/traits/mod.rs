//! # GraphSockets Traits
//!
//! Seams between the subscription engine and the code around it:
//!
//! - **FrameCodec**: one implementation per sub-protocol frame vocabulary
//! - **EventCallback**: listeners invoked for subscription events
//! - **QueryValidator**: parse/validate collaborator run before dispatch
//! - **HeaderProvider**: dynamic headers for connections and requests
//!
//! ## Example
//!
//! ```rust,ignore
//! use graphsockets::*;
//!
//! let on_data = sync_callback(|event| {
//!     println!("data: {:?}", event.response());
//!     Ok(())
//! });
//!
//! let on_error = async_callback(|event| async move {
//!     report_upstream(event).await?;
//!     Ok(())
//! });
//! ```

pub mod callback;
pub mod codec;
pub mod error;
pub mod headers;
pub mod validator;

// Re-export commonly used types
pub use callback::{
    async_callback, sync_callback, AsyncCallback, CallbackError, CallbackResult, EventCallback,
    Invocation, SyncCallback,
};
pub use codec::FrameCodec;
pub use error::{GraphSocketError, Result};
pub use headers::{fingerprint, merge_headers, HeaderProvider, Headers, NoHeaders, StaticHeaders};
pub use validator::{QueryValidator, ValidationError, ValidationErrors};
