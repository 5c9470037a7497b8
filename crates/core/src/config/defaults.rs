//! Default values and functions for configuration

// Default constants
pub(crate) const DEFAULT_KUBECTL_PATH: &str = "kubectl";
pub(crate) const DEFAULT_RSYNC_PATH: &str = "rsync";
pub(crate) const DEFAULT_IGNORE_FILE: &str = ".podsyncignore";
pub(crate) const DEFAULT_REMOTE_ROOT: &str = "/app/";

/// Project-level configuration file, relative to the sync root
pub const PROJECT_CONFIG_FILE: &str = ".podsync.toml";

/// Smallest quiet period accepted from configuration.
///
/// Shorter windows fire transfers while editors are still writing files.
pub const MIN_QUIET_PERIOD_MS: u64 = 300;

pub(crate) fn default_kubectl_path() -> String {
    DEFAULT_KUBECTL_PATH.to_string()
}

pub(crate) fn default_quiet_period_ms() -> u64 {
    1000
}

pub(crate) fn default_tick_interval_ms() -> u64 {
    250
}

pub(crate) fn default_individual_file_threshold() -> usize {
    20
}

pub(crate) fn default_ignore_file() -> String {
    DEFAULT_IGNORE_FILE.to_string()
}

pub(crate) fn default_remote_root() -> String {
    DEFAULT_REMOTE_ROOT.to_string()
}

pub(crate) fn default_initial_sync() -> bool {
    true
}

pub(crate) fn default_rsync_path() -> String {
    DEFAULT_RSYNC_PATH.to_string()
}

pub(crate) fn default_daemon_port() -> u16 {
    8730
}

pub(crate) fn default_local_port() -> u16 {
    8730
}

pub(crate) fn default_daemon_ready_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_daemon_poll_interval_ms() -> u64 {
    250
}
