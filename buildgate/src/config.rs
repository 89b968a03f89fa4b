//! Configuration for the orchestration core.
//!
//! Deployment policy (throttle exemptions, lock timings, ancestry depth)
//! is injected through [`BuildCoreConfig`] instead of being hardcoded.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::build::ChannelCode;
use crate::errors::Result;
use crate::lock::LockConfig;

/// Launcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Channels whose launches bypass the frequency limit.
    #[serde(default = "default_no_limit_channels")]
    pub no_limit_channels: HashSet<ChannelCode>,
    /// TTL of the per-pipeline throttle token in milliseconds.
    #[serde(default = "default_rate_limit_ttl_ms")]
    pub rate_limit_ttl_ms: u64,
}

fn default_no_limit_channels() -> HashSet<ChannelCode> {
    HashSet::from([ChannelCode::Codecc])
}

fn default_rate_limit_ttl_ms() -> u64 {
    5_000
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            no_limit_channels: default_no_limit_channels(),
            rate_limit_ttl_ms: default_rate_limit_ttl_ms(),
        }
    }
}

impl LauncherConfig {
    /// Returns true if launches on `channel` skip the throttle.
    #[must_use]
    pub fn is_exempt(&self, channel: ChannelCode) -> bool {
        self.no_limit_channels.contains(&channel)
    }

    /// Lock config of the throttle token; it is never waited on.
    #[must_use]
    pub fn rate_limit_lock(&self) -> LockConfig {
        LockConfig::with_ttl_ms(self.rate_limit_ttl_ms).with_acquire_timeout_ms(0)
    }
}

/// Timings of the per-build locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocksConfig {
    /// TTL of the exclusive per-build lock.
    #[serde(default = "default_build_lock_ttl_ms")]
    pub build_lock_ttl_ms: u64,
    /// TTL of the service shutdown lock.
    #[serde(default = "default_shutdown_lock_ttl_ms")]
    pub shutdown_lock_ttl_ms: u64,
    /// How long callers wait for a per-build lock.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Initial backoff between attempts.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Maximum backoff between attempts.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_build_lock_ttl_ms() -> u64 {
    60_000
}

fn default_shutdown_lock_ttl_ms() -> u64 {
    10_000
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_initial_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1_000
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            build_lock_ttl_ms: default_build_lock_ttl_ms(),
            shutdown_lock_ttl_ms: default_shutdown_lock_ttl_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl LocksConfig {
    fn lock(&self, ttl_ms: u64) -> LockConfig {
        LockConfig {
            ttl_ms,
            acquire_timeout_ms: self.acquire_timeout_ms,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }

    /// Lock config of the exclusive per-build lock.
    #[must_use]
    pub fn build_lock(&self) -> LockConfig {
        self.lock(self.build_lock_ttl_ms)
    }

    /// Lock config of the service shutdown lock.
    #[must_use]
    pub fn shutdown_lock(&self) -> LockConfig {
        self.lock(self.shutdown_lock_ttl_ms)
    }
}

/// Cancellation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationConfig {
    /// Maximum number of parent hops a service shutdown may climb.
    #[serde(default = "default_max_parent_depth")]
    pub max_parent_depth: u32,
}

fn default_max_parent_depth() -> u32 {
    16
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            max_parent_depth: default_max_parent_depth(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCoreConfig {
    /// Launcher settings.
    #[serde(default)]
    pub launcher: LauncherConfig,
    /// Lock timings.
    #[serde(default)]
    pub locks: LocksConfig,
    /// Cancellation settings.
    #[serde(default)]
    pub cancellation: CancellationConfig,
}

impl BuildCoreConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Replaces the throttle-exempt channels.
    #[must_use]
    pub fn with_no_limit_channels(mut self, channels: impl IntoIterator<Item = ChannelCode>) -> Self {
        self.launcher.no_limit_channels = channels.into_iter().collect();
        self
    }

    /// Sets the per-build lock acquire timeout.
    #[must_use]
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.locks.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Sets the maximum parent depth of service shutdown.
    #[must_use]
    pub fn with_max_parent_depth(mut self, depth: u32) -> Self {
        self.cancellation.max_parent_depth = depth;
        self
    }
}
