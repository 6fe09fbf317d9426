//! Process wiring
//!
//! Builds the tool client, discovers capability servers and assembles the
//! orchestrator from an explicit [`SwitchboardConfig`].

use anyhow::{bail, Context, Result};
use mcp_sdk::client::{McpToolClient, ToolInvoker};
use mcp_sdk::transport::{HttpTransport, HttpTransportConfig};
use std::sync::Arc;
use tracing::{info, warn};

use crate::capabilities::{CapabilityRegistry, DiscoveryReport};
use crate::config::SwitchboardConfig;
use crate::intelligence::{Classifier, LlmClassifier};
use crate::orchestration::Orchestrator;
use crate::session::SessionStore;
use crate::tools::GraphProxy;

/// Everything a running Switchboard needs
pub struct Runtime {
    pub config: SwitchboardConfig,
    pub orchestrator: Arc<Orchestrator>,
    /// Present when the metrics capability is enabled
    pub graph: Option<GraphProxy>,
    pub discovery: DiscoveryReport,
}

impl Runtime {
    /// Tool client shared by every handler
    pub fn invoker() -> Result<Arc<dyn ToolInvoker>> {
        let transport = HttpTransport::new(HttpTransportConfig::default()).context("Failed to build HTTP transport")?;
        Ok(Arc::new(McpToolClient::new(transport)))
    }

    /// Registry of enabled capabilities with their discovered tool sets
    pub async fn discover(config: &SwitchboardConfig, invoker: &dyn ToolInvoker) -> (CapabilityRegistry, DiscoveryReport) {
        let mut registry = CapabilityRegistry::from_config(config);
        let report = registry.discover(invoker).await;
        (registry, report)
    }

    /// Validate, discover and wire with the configured LLM classifier.
    ///
    /// Fails when no capability server is reachable.
    pub async fn start(config: SwitchboardConfig) -> Result<Self> {
        config.validate()?;
        let classifier = LlmClassifier::new(&config.classifier).context("Failed to build classifier")?;
        let invoker = Self::invoker()?;
        Self::assemble(config, invoker, Arc::new(classifier)).await
    }

    /// Discover and wire with the given invoker and classifier
    pub async fn assemble(
        config: SwitchboardConfig,
        invoker: Arc<dyn ToolInvoker>,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self> {
        let (registry, discovery) = Self::discover(&config, invoker.as_ref()).await;
        if registry.is_empty() {
            bail!("No capability is enabled");
        }

        let reachable = discovery.reachable();
        if reachable == 0 {
            bail!(
                "No capability server is reachable (tried {})",
                registry.names().join(", ")
            );
        }
        if reachable < registry.len() {
            warn!(
                reachable,
                registered = registry.len(),
                "Some capability servers are unreachable; their allowlists apply as-is"
            );
        }

        let registry = Arc::new(registry);
        let graph = registry
            .get("metrics")
            .map(|descriptor| GraphProxy::for_capability(invoker.clone(), descriptor));

        let sessions = Arc::new(SessionStore::from_config(&config.session));
        let orchestrator = Orchestrator::new(registry.clone(), classifier, sessions)
            .with_builtin_handlers(invoker, &config.docs);

        info!(
            capabilities = ?registry.names(),
            reachable,
            model = %config.classifier.model,
            "Switchboard ready"
        );

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            graph,
            discovery,
        })
    }
}
