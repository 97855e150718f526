//! Binary runner utilities
//!
//! Banners, heartbeat settings and Ctrl+C handling shared by the binaries.

use tracing::{info, warn};

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heartbeat_interval_secs: 300, // 5 minutes default
        }
    }

    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }
}

/// Print startup banner
pub fn print_banner(config: &RunConfig) {
    info!("");
    info!("========================================");
    info!("Starting {}", config.name);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

/// Print shutdown banner
pub fn print_shutdown(config: &RunConfig, stats: Option<&str>) {
    info!("");
    info!("========================================");
    info!("{} stopped gracefully", config.name);
    if let Some(stats) = stats {
        info!("{}", stats);
    }
    info!("========================================");
}

/// Resolve on Ctrl+C
pub async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("test-binary").with_heartbeat(120);

        assert_eq!(config.name, "test-binary");
        assert_eq!(config.heartbeat_interval_secs, 120);
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::new("default");
        assert_eq!(config.heartbeat_interval_secs, 300);
    }
}
