use std::time::Duration;
use thiserror::Error;

/// Result type for podsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for podsync operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or invalid operator input (environment, service, paths)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Listing instances in the remote environment failed
    #[error("Failed to query the remote environment: {0}")]
    Resolution(String),

    /// Listing succeeded but no instance survived filtering
    #[error(
        "No running instance for service '{service}' in environment '{environment}'. \
         Check that the service is deployed and its pods are ready"
    )]
    NoRunningInstance { service: String, environment: String },

    /// File watching errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// The OS ran out of watch descriptors
    #[error(
        "Watch limit reached while watching {path}. Raise the limit \
         (e.g. `sudo sysctl fs.inotify.max_user_watches=524288`) or add large \
         directories to the ignore file"
    )]
    WatchLimitExceeded { path: String },

    /// The transfer utility failed or could not be started
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Port-forward or remote daemon lifecycle failure
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// The remote transfer daemon never became ready
    #[error(
        "Transfer daemon did not become ready within {}s",
        .timeout.as_secs()
    )]
    DaemonTimeout { timeout: Duration },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Creates a "nothing matched" resolution error
    pub fn no_running_instance(service: impl Into<String>, environment: impl Into<String>) -> Self {
        Self::NoRunningInstance {
            service: service.into(),
            environment: environment.into(),
        }
    }

    /// Creates a watcher error
    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Creates a transfer error
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Creates a tunnel error
    pub fn tunnel(msg: impl Into<String>) -> Self {
        Self::Tunnel(msg.into())
    }

    /// Adds context to any error
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error ends a watch session.
    ///
    /// Configuration, resolution and watch-primitive failures are fatal.
    /// Transfer failures are not: the pending change set is kept and retried
    /// after the next quiet period.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Transfer(_) | Self::Tunnel(_) | Self::DaemonTimeout { .. }
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_context(context, e))
    }
}
