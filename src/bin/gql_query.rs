//! One-shot GraphQL query or mutation over HTTP
//!
//! Reads endpoint settings from `config/client.yaml` (or `GRAPHWIRE_CONFIG`),
//! with `GRAPHQL_ENDPOINT` / `GRAPHQL_AUTH_TOKEN` overrides from `.env`.
//!
//! Usage:
//!   cargo run --bin gql-query -- '{ pokemons(first: 3) { name } }'
//!   cargo run --bin gql-query -- @queries/find.graphql --var id=25 --method get

use anyhow::Result;
use graphwire::bin_common::{parse_args, CliArgs};
use graphwire::config::ClientSettings;
use graphwire::graphsockets::RequestOverrides;
use graphwire::logging::init_tracing;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse(&parse_args())?;

    // Load config first (before logging is initialized)
    let settings = ClientSettings::load(args.config_path())?;
    init_tracing(&settings.log_level);
    settings.log();

    let client = settings.build_client()?;
    let method = args.method.unwrap_or_else(|| client.method());
    info!("Sending {} to {}", method, client.endpoint());

    let response = client
        .query_with(&args.request(), method, RequestOverrides::new())
        .await?;

    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.has_errors() {
        error!(
            "Server returned {} error(s): {}",
            response.errors.len(),
            response.error_message().unwrap_or_default()
        );
        std::process::exit(2);
    }
    Ok(())
}
