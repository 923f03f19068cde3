//! Simulation configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reply latency commonly used when latency simulation is switched on.
pub const DEFAULT_SIMULATE_LATENCY_MS: u64 = 150;

/// Configuration for the simulated transport and its request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// How long `send_request` waits for a reply, in milliseconds.
    pub reply_timeout_ms: u64,

    /// Nominal reply latency in milliseconds. Each reply sleeps a random
    /// time around a tenth of this value; 0 disables the sleep.
    pub simulate_latency_ms: u64,

    /// Number of worker tasks each request handler runs.
    pub handler_count: usize,

    /// Poll interval while a sender is blocked by fault injection.
    pub block_poll_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 3000,
            simulate_latency_ms: 0,
            handler_count: 1,
            block_poll_interval_ms: 10,
        }
    }
}

impl SimulationConfig {
    /// Create a new configuration builder.
    pub fn builder() -> SimulationConfigBuilder {
        SimulationConfigBuilder::default()
    }

    /// Get the reply timeout as a Duration.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Get the block poll interval as a Duration.
    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.reply_timeout_ms == 0 {
            return Err("reply_timeout_ms must be > 0".to_string());
        }
        if self.handler_count == 0 {
            return Err("handler_count must be > 0".to_string());
        }
        if self.block_poll_interval_ms == 0 {
            return Err("block_poll_interval_ms must be > 0".to_string());
        }
        Ok(())
    }
}

/// Builder for SimulationConfig.
#[derive(Debug, Default)]
pub struct SimulationConfigBuilder {
    config: SimulationConfig,
}

impl SimulationConfigBuilder {
    /// Set the reply timeout in milliseconds.
    pub fn reply_timeout_ms(mut self, ms: u64) -> Self {
        self.config.reply_timeout_ms = ms;
        self
    }

    /// Set the simulated reply latency in milliseconds.
    pub fn simulate_latency_ms(mut self, ms: u64) -> Self {
        self.config.simulate_latency_ms = ms;
        self
    }

    /// Set the number of handler workers per node.
    pub fn handler_count(mut self, count: usize) -> Self {
        self.config.handler_count = count;
        self
    }

    /// Set the poll interval used while blocked.
    pub fn block_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.block_poll_interval_ms = ms;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<SimulationConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
