//! Predicate pipeline over instance lists

use crate::instance::Instance;

/// Accumulates predicates and applies them in one pass.
///
/// ```
/// use podsync_remote::InstanceFilter;
///
/// let filter = InstanceFilter::new()
///     .service_prefix("web")
///     .status("Running")
///     .status_reason("Running");
/// assert!(filter.first(&[]).is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    service_prefix: Option<String>,
    status: Option<String>,
    status_reason: Option<String>,
}

impl InstanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready instances of a service: name prefix, phase and derived status
    /// all required
    pub fn running_service(service: impl Into<String>) -> Self {
        Self::new()
            .service_prefix(service)
            .status("Running")
            .status_reason("Running")
    }

    /// Keep instances whose name starts with `prefix`
    pub fn service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.service_prefix = Some(prefix.into());
        self
    }

    /// Keep instances in the given lifecycle phase
    pub fn status(mut self, phase: impl Into<String>) -> Self {
        self.status = Some(phase.into());
        self
    }

    /// Keep instances whose derived status reason equals `reason`
    pub fn status_reason(mut self, reason: impl Into<String>) -> Self {
        self.status_reason = Some(reason.into());
        self
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        if let Some(prefix) = &self.service_prefix {
            if !instance.name().starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(phase) = &self.status {
            if instance.phase() != phase {
                return false;
            }
        }
        if let Some(reason) = &self.status_reason {
            if instance.status_reason() != *reason {
                return false;
            }
        }
        true
    }

    /// All matching instances, in input order
    pub fn apply<'a>(&self, instances: &'a [Instance]) -> Vec<&'a Instance> {
        instances.iter().filter(|i| self.matches(i)).collect()
    }

    /// The first matching instance, if any
    pub fn first<'a>(&self, instances: &'a [Instance]) -> Option<&'a Instance> {
        instances.iter().find(|i| self.matches(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::fixtures::{running, waiting};
    use pretty_assertions::assert_eq;

    fn sample() -> Vec<Instance> {
        let mut pending = waiting("web-0", "ContainerCreating");
        pending.status.phase = Some("Pending".to_string());
        vec![
            pending,
            waiting("web-1", "CrashLoopBackOff"),
            running("api-1"),
            running("web-2"),
            running("web-3"),
        ]
    }

    #[test]
    fn test_running_service_picks_first_ready_match() {
        let instances = sample();
        let filter = InstanceFilter::running_service("web");
        let first = filter.first(&instances).expect("a running web instance");
        assert_eq!(first.name(), "web-2");
    }

    #[test]
    fn test_first_is_deterministic() {
        let instances = sample();
        let filter = InstanceFilter::running_service("web");
        let picks: Vec<_> = (0..10)
            .filter_map(|_| filter.first(&instances).map(|i| i.name().to_string()))
            .collect();
        assert!(picks.iter().all(|p| p == "web-2"));
        assert_eq!(picks.len(), 10);
    }

    #[test]
    fn test_each_stage_narrows() {
        let instances = sample();
        let by_prefix = InstanceFilter::new().service_prefix("web").apply(&instances);
        assert_eq!(by_prefix.len(), 4);

        let by_phase = InstanceFilter::new()
            .service_prefix("web")
            .status("Running")
            .apply(&instances);
        assert_eq!(by_phase.len(), 3);

        let by_reason = InstanceFilter::running_service("web").apply(&instances);
        let names: Vec<_> = by_reason.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["web-2", "web-3"]);
    }

    #[test]
    fn test_no_match_is_none() {
        let instances = sample();
        assert!(InstanceFilter::running_service("worker")
            .first(&instances)
            .is_none());
        assert!(InstanceFilter::new().first(&[]).is_none());
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let instances = sample();
        assert_eq!(InstanceFilter::new().apply(&instances).len(), instances.len());
    }
}
