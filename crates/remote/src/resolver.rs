//! Resolution of an environment/service selection to a single instance

use crate::filter::InstanceFilter;
use crate::{Instance, PodLister, RemoteTarget};
use podsync_core::config::RemoteSelection;
use podsync_core::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Picks the instance to synchronize with
#[derive(Clone)]
pub struct TargetResolver {
    lister: Arc<dyn PodLister>,
}

impl TargetResolver {
    pub fn new(lister: Arc<dyn PodLister>) -> Self {
        Self { lister }
    }

    /// Every instance in the selected environment.
    ///
    /// Any failure of the listing itself is a resolution error, kept apart
    /// from the "nothing matched" case.
    pub async fn list(&self, selection: &RemoteSelection) -> Result<Vec<Instance>> {
        self.lister
            .list(selection.context.as_deref(), &selection.environment)
            .await
            .map_err(|e| match e {
                Error::Resolution(_) => e,
                other => Error::resolution(other.to_string()),
            })
    }

    /// First running, ready instance of the selected service
    pub async fn resolve(&self, selection: &RemoteSelection) -> Result<RemoteTarget> {
        let instances = self.list(selection).await?;
        debug!(
            "Filtering {} instances for service '{}'",
            instances.len(),
            selection.service
        );

        let instance = InstanceFilter::running_service(selection.service.as_str())
            .first(&instances)
            .ok_or_else(|| {
                Error::no_running_instance(
                    selection.service.as_str(),
                    selection.environment.as_str(),
                )
            })?;

        let target = RemoteTarget::new(
            selection.context.clone(),
            selection.environment.as_str(),
            instance.name(),
        );
        info!("Resolved {} to {target}", selection.service);
        Ok(target)
    }
}
