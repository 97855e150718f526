//! Stream a GraphQL subscription until it completes or Ctrl+C
//!
//! Every DATA payload is printed as one JSON line on stdout; lifecycle
//! events are logged.
//!
//! Usage:
//!   cargo run --bin gql-subscribe -- 'subscription { messageAdded { text } }'
//!   cargo run --bin gql-subscribe -- @subs/ticks.graphql --var room=general

use anyhow::Result;
use graphwire::bin_common::{
    parse_args, print_banner, print_shutdown, wait_for_shutdown, CliArgs, RunConfig,
};
use graphwire::config::ClientSettings;
use graphwire::graphsockets::{sync_callback, CallbackRegistry, EventKey, SubscribeOptions, SubscriptionState};
use graphwire::logging::init_tracing;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse(&parse_args())?;

    // Load config first (before logging is initialized)
    let settings = ClientSettings::load(args.config_path())?;
    init_tracing(&settings.log_level);
    settings.log();

    let client = settings.build_client()?;
    let run_config = RunConfig::new("gql-subscribe").with_heartbeat(60);

    let received = Arc::new(AtomicU64::new(0));
    let registry = {
        let received = Arc::clone(&received);
        CallbackRegistry::new()
            .on_data(sync_callback(move |event| {
                received.fetch_add(1, Ordering::Relaxed);
                if let Some(payload) = &event.payload {
                    println!("{}", payload);
                }
                Ok(())
            }))
            .on_error(sync_callback(|event| {
                let message = event
                    .response()
                    .and_then(|r| r.error_message())
                    .unwrap_or_else(|| "unknown error".into());
                warn!("Subscription {} error: {}", event.subscription_id, message);
                Ok(())
            }))
            .with(
                EventKey::Any,
                sync_callback(|event| {
                    info!("Subscription {}: {}", event.subscription_id, event.kind);
                    Ok(())
                }),
            )
    };

    print_banner(&run_config);
    let subscription = client
        .subscribe(&args.request(), SubscribeOptions::new().callbacks(registry))
        .await?;

    let mut heartbeat = tokio::time::interval(Duration::from_secs(run_config.heartbeat_interval_secs));
    heartbeat.tick().await;

    let state = loop {
        tokio::select! {
            state = subscription.wait() => break state,
            _ = wait_for_shutdown() => {
                subscription.unsubscribe_and_wait().await;
                break subscription.state();
            }
            _ = heartbeat.tick() => {
                info!("Heartbeat: {} events received", received.load(Ordering::Relaxed));
            }
        }
    };

    client.close().await;
    let stats = format!(
        "Subscription finished in {} after {} events",
        state,
        received.load(Ordering::Relaxed)
    );
    print_shutdown(&run_config, Some(&stats));

    if state == SubscriptionState::Errored {
        std::process::exit(1);
    }
    Ok(())
}
