//! Capability Registry
//!
//! Holds the descriptors of every enabled capability and, after
//! [`CapabilityRegistry::discover`], the tool set each server advertised.

use chrono::{DateTime, Utc};
use mcp_sdk::client::{ToolFailure, ToolInvoker};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::CapabilityDescriptor;
use crate::config::SwitchboardConfig;

/// Operations a server advertised that are also allowed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSet {
    /// Increments on every discovery of the same server
    pub version: u64,
    pub operations: BTreeSet<String>,
    pub discovered_at: DateTime<Utc>,
}

impl ToolSet {
    pub fn new(version: u64, operations: BTreeSet<String>) -> Self {
        Self {
            version,
            operations,
            discovered_at: Utc::now(),
        }
    }
}

/// Outcome of probing every capability server
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub entries: Vec<(String, Result<ToolSet, ToolFailure>)>,
}

impl DiscoveryReport {
    /// Number of servers that answered `tools/list`
    pub fn reachable(&self) -> usize {
        self.entries.iter().filter(|(_, result)| result.is_ok()).count()
    }
}

/// Registry of capability descriptors, in registration order
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    descriptors: Vec<Arc<CapabilityDescriptor>>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the built-in descriptors of every enabled capability
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        let mut registry = Self::new();
        for (name, capability) in config.capabilities.iter() {
            if !capability.enabled {
                info!("Capability '{}' disabled by configuration", name);
                continue;
            }
            if let Some(descriptor) = CapabilityDescriptor::builtin(name, capability) {
                registry.register(descriptor);
            }
        }
        registry
    }

    /// Add or replace a descriptor
    pub fn register(&mut self, descriptor: CapabilityDescriptor) {
        let descriptor = Arc::new(descriptor);
        match self.descriptors.iter_mut().find(|d| d.name == descriptor.name) {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
    }

    /// Get a descriptor by name
    pub fn get(&self, name: &str) -> Option<&Arc<CapabilityDescriptor>> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Check if a capability is registered
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All descriptors
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<CapabilityDescriptor>> {
        self.descriptors.iter()
    }

    /// Registered names
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Fetch each server's tool list and record the allowed subset.
    ///
    /// Advertised tools outside a descriptor's allowlist are logged and never
    /// forwarded. A server that cannot be reached keeps its previous tool set
    /// (none at startup) so the allowlist alone applies.
    pub async fn discover(&mut self, invoker: &dyn ToolInvoker) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for slot in self.descriptors.iter_mut() {
            let descriptor = slot.as_ref();
            let listed = invoker
                .list_tools(&descriptor.tool_endpoint, None, descriptor.call_timeout)
                .await;

            match listed {
                Ok(tools) => {
                    let advertised: BTreeSet<String> = tools.into_iter().map(|t| t.name).collect();
                    let ignored: Vec<&String> = advertised
                        .iter()
                        .filter(|name| !descriptor.operations.contains(*name))
                        .collect();
                    if !ignored.is_empty() {
                        warn!(
                            capability = %descriptor.name,
                            ?ignored,
                            "Server advertises tools outside the read-only allowlist"
                        );
                    }

                    let operations: BTreeSet<String> = advertised
                        .intersection(&descriptor.operations)
                        .cloned()
                        .collect();
                    let version = descriptor.tool_set.as_ref().map_or(1, |t| t.version + 1);
                    let tool_set = ToolSet::new(version, operations);

                    info!(
                        capability = %descriptor.name,
                        version,
                        operations = tool_set.operations.len(),
                        "Discovered tool set"
                    );

                    let mut updated = descriptor.clone();
                    updated.tool_set = Some(tool_set.clone());
                    *slot = Arc::new(updated);
                    report.entries.push((slot.name.clone(), Ok(tool_set)));
                }
                Err(failure) => {
                    warn!(
                        capability = %descriptor.name,
                        endpoint = %descriptor.tool_endpoint,
                        error = %failure,
                        "Capability server unreachable during discovery"
                    );
                    report.entries.push((descriptor.name.clone(), Err(failure)));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcp_sdk::client::{Credential, ToolCall, ToolResult};
    use mcp_sdk::protocol::ToolDefinition;
    use std::time::Duration;

    struct ListingInvoker;

    #[async_trait]
    impl ToolInvoker for ListingInvoker {
        async fn invoke(&self, _call: &ToolCall) -> ToolResult {
            ToolResult::failed(mcp_sdk::client::FailureKind::Transport, "unused")
        }

        async fn list_tools(
            &self,
            endpoint: &str,
            _credential: Option<&Credential>,
            _timeout: Duration,
        ) -> Result<Vec<ToolDefinition>, ToolFailure> {
            if endpoint.contains("8001") {
                Ok(["pods_list", "pods_delete", "pods_log"]
                    .iter()
                    .map(|name| ToolDefinition::new(*name))
                    .collect())
            } else {
                Err(ToolFailure::transport("connection refused"))
            }
        }
    }

    #[test]
    fn test_from_config_skips_disabled() {
        let mut config = SwitchboardConfig::default();
        config.capabilities.docs.enabled = false;

        let registry = CapabilityRegistry::from_config(&config);
        assert_eq!(registry.names(), vec!["kubernetes", "metrics", "incidents"]);
        assert!(!registry.contains("docs"));
    }

    #[tokio::test]
    async fn test_discover_intersects_with_allowlist() {
        let mut registry = CapabilityRegistry::from_config(&SwitchboardConfig::default());
        let report = registry.discover(&ListingInvoker).await;

        assert_eq!(report.reachable(), 1);

        let kubernetes = registry.get("kubernetes").unwrap();
        let tool_set = kubernetes.tool_set.as_ref().unwrap();
        assert_eq!(tool_set.version, 1);
        assert!(tool_set.operations.contains("pods_list"));
        assert!(!tool_set.operations.contains("pods_delete"));

        assert!(registry.get("metrics").unwrap().tool_set.is_none());

        registry.discover(&ListingInvoker).await;
        let version = registry.get("kubernetes").unwrap().tool_set.as_ref().unwrap().version;
        assert_eq!(version, 2);
    }
}
