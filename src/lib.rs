//! GraphWire - GraphQL client application layer
//!
//! Wraps the `graphsockets` library with what the binaries need.
//!
//! ## Architecture
//!
//! - **graphsockets**: client, connections and subscriptions (re-exported from workspace)
//! - **config**: YAML client settings with environment overrides
//! - **logging**: tracing initialisation
//! - **bin_common**: shared helpers for the binaries (CLI, runner)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use graphwire::bin_common::load_config_from_env;
//! use graphwire::config::ClientSettings;
//!
//! # fn main() -> anyhow::Result<()> {
//! let settings = ClientSettings::load(load_config_from_env())?;
//! let client = settings.build_client()?;
//! # Ok(())
//! # }
//! ```

// Re-export workspace library for convenience
pub use graphsockets;

pub mod config;
pub mod logging;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, CliArgs, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
    pub use runner::{print_banner, print_shutdown, wait_for_shutdown, RunConfig};
}
