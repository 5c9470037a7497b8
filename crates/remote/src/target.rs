//! Identity of a resolved remote instance

use std::fmt;

/// A single addressable execution context: cluster context, environment
/// (namespace) and instance name.
///
/// The identity may go stale after resolution; using a vanished instance is
/// reported as a failure by whichever operation touches it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTarget {
    /// Cluster context key; `None` means the current context
    pub context: Option<String>,
    pub namespace: String,
    pub instance: String,
}

impl RemoteTarget {
    pub fn new(
        context: Option<String>,
        namespace: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            context,
            namespace: namespace.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{context}/{}/{}", self.namespace, self.instance),
            None => write!(f, "{}/{}", self.namespace, self.instance),
        }
    }
}
