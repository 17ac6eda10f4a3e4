// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Runtime configuration
//!
//! Every field has a default, so a partial JSON document or an empty one is a
//! valid configuration.

use crate::registry::DEFAULT_NAME_PREFIX;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding a fixed jitter seed
pub const ENV_SEED: &str = "CUSTOM_DRONES_SEED";

/// Environment variable holding the tick period in milliseconds
pub const ENV_TICK_MS: &str = "CUSTOM_DRONES_TICK_MS";

/// Settings for a [`DroneRuntime`](crate::runtime::DroneRuntime)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Fixed length of one simulation tick
    pub tick_period: Duration,
    /// Minimum time between two decision updates of one drone
    pub decision_base: Duration,
    /// Upper bound (exclusive) of the random delay added to `decision_base`
    pub decision_stagger: Duration,
    /// Seed for the jitter generator; entropy when absent
    pub seed: Option<u64>,
    /// Storage key of the integrity metadata document
    pub metadata_key: String,
    /// Storage key of the record store document
    pub records_key: String,
    /// Mandatory prefix of every registered type name
    pub name_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            tick_period: Duration::from_micros(62_500),
            decision_base: Duration::from_secs(1),
            decision_stagger: Duration::from_millis(500),
            seed: None,
            metadata_key: "CustomDrones.METADATA".to_string(),
            records_key: "CustomDrones.PERMADATA".to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Default settings overlaid with the environment
    ///
    /// Reads `CUSTOM_DRONES_SEED` and `CUSTOM_DRONES_TICK_MS`. Values that do
    /// not parse are logged and ignored.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay settings from a variable lookup
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SEED) {
            match raw.trim().parse::<u64>() {
                Ok(seed) => {
                    info!("Using fixed jitter seed {seed}");
                    self.seed = Some(seed);
                }
                Err(err) => warn!("Ignoring {ENV_SEED}='{raw}': {err}"),
            }
        }
        if let Some(raw) = lookup(ENV_TICK_MS) {
            match raw.trim().parse::<u64>() {
                Ok(0) => warn!("Ignoring {ENV_TICK_MS}=0: tick period must be positive"),
                Ok(ms) => self.tick_period = Duration::from_millis(ms),
                Err(err) => warn!("Ignoring {ENV_TICK_MS}='{raw}': {err}"),
            }
        }
        self
    }

    /// Set the tick period
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        assert!(!period.is_zero(), "Tick period must be positive");
        self.tick_period = period;
        self
    }

    /// Set the decision cadence base and stagger
    pub fn with_decision_cadence(mut self, base: Duration, stagger: Duration) -> Self {
        self.decision_base = base;
        self.decision_stagger = stagger;
        self
    }

    /// Use a fixed jitter seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use different storage keys for the two documents
    pub fn with_keys(mut self, metadata_key: impl Into<String>, records_key: impl Into<String>) -> Self {
        self.metadata_key = metadata_key.into();
        self.records_key = records_key.into();
        self
    }

    /// Use a different mandatory type name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Tick rate in ticks per second
    pub fn tick_rate(&self) -> f64 {
        1.0 / self.tick_period.as_secs_f64()
    }
}
