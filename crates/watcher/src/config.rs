//! Configuration types for the change observers
//!
//! These are immutable once built. The session derives them from the
//! `[sync]` section of the podsync configuration.

use crate::observer::ObserverKind;
use std::time::Duration;

/// Immutable configuration for watching a sync root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Quiet period before pending changes are flushed (default: 1000ms)
    pub quiet_period_ms: u64,
    /// How often a blocked observer checks for cancellation (default: 100ms)
    pub poll_interval_ms: u64,
    /// Which observer implementation to run
    pub observer: ObserverKind,
    /// Whether the per-directory walk follows symbolic links (default: false)
    pub follow_symlinks: bool,
}

impl WatcherConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from builder
    pub fn builder() -> WatcherConfigBuilder {
        WatcherConfigBuilder::default()
    }

    /// Get the quiet period
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    /// Get the cancellation poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 1000,
            poll_interval_ms: 100,
            observer: ObserverKind::current(),
            follow_symlinks: false,
        }
    }
}

/// Builder for [`WatcherConfig`]
#[derive(Debug, Default)]
pub struct WatcherConfigBuilder {
    quiet_period_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    observer: Option<ObserverKind>,
    follow_symlinks: Option<bool>,
}

impl WatcherConfigBuilder {
    /// Set the quiet period in milliseconds
    pub fn quiet_period_ms(mut self, ms: u64) -> Self {
        self.quiet_period_ms = Some(ms);
        self
    }

    /// Set the quiet period
    pub fn quiet_period(self, period: Duration) -> Self {
        self.quiet_period_ms(u64::try_from(period.as_millis()).unwrap_or(u64::MAX))
    }

    /// Set the cancellation poll interval in milliseconds
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Force a specific observer implementation
    pub fn observer(mut self, kind: ObserverKind) -> Self {
        self.observer = Some(kind);
        self
    }

    /// Set whether to follow symbolic links
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = Some(follow);
        self
    }

    /// Build the configuration
    pub fn build(self) -> WatcherConfig {
        let default = WatcherConfig::default();
        WatcherConfig {
            quiet_period_ms: self.quiet_period_ms.unwrap_or(default.quiet_period_ms),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(default.poll_interval_ms),
            observer: self.observer.unwrap_or(default.observer),
            follow_symlinks: self.follow_symlinks.unwrap_or(default.follow_symlinks),
        }
    }
}
