//! # Connection core
//!
//! One [`Connection`] per socket. Opening it negotiates the sub-protocol and
//! runs the init handshake; afterwards a single reader task
//! ([`dispatch`]) owns the socket and the subscription table:
//!
//! ```rust,ignore
//! let connection = Connection::open(
//!     "ws://localhost:4000/graphql",
//!     &SubProtocol::DEFAULT_PREFERENCE,
//!     &Headers::new(),
//!     ConnectionConfig::new().keep_alive_timeout(Some(Duration::from_secs(30))),
//! )
//! .await?;
//!
//! let registry = CallbackRegistry::new().on_data(sync_callback(|event| {
//!     println!("{:?}", event.data_value());
//!     Ok(())
//! }));
//! let subscription = connection
//!     .subscribe(GraphQLRequest::new("subscription { ticks }"), Arc::new(registry), true)
//!     .await?;
//! ```

pub mod builder;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod dispatch;
pub mod heartbeat;
pub mod watchdog;

// Re-export main types
pub use builder::{http_to_ws, states, GraphQLClientBuilder};
pub use config::ConnectionConfig;
pub use connection::Connection;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use watchdog::Watchdog;
