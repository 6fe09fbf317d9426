//! Built-in capability descriptors
//!
//! Operation names follow the tools advertised by kubernetes-mcp-server,
//! obs-mcp and cluster-health-mcp-server. Mutating tools those servers also
//! expose (`pods_delete`, `pods_exec`, `pods_run`,
//! `resources_create_or_update`, `resources_delete`, `helm_install`,
//! `helm_uninstall`) are deliberately absent.

use mcp_sdk::client::PayloadFormat;
use std::collections::BTreeSet;
use std::time::Duration;

use super::{CapabilityDescriptor, Domain, ScopingRule};
use crate::config::CapabilityConfig;

pub(crate) const KUBERNETES_OPERATIONS: &[&str] = &[
    "configuration_view",
    "events_list",
    "namespaces_list",
    "projects_list",
    "pods_list",
    "pods_list_in_namespace",
    "pods_get",
    "pods_log",
    "pods_top",
    "resources_list",
    "resources_get",
    "helm_list",
    "nodes_top",
];

pub(crate) const METRICS_OPERATIONS: &[&str] = &[
    "list_metrics",
    "get_label_names",
    "get_label_values",
    "execute_instant_query",
    "execute_range_query",
];

const METRICS_QUERIES: &[&str] = &["execute_instant_query", "execute_range_query"];

fn operations(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn base(name: &str, domain: Domain, description: &str, config: &CapabilityConfig) -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: name.to_string(),
        domain,
        description: description.to_string(),
        read_only: true,
        operations: BTreeSet::new(),
        default_operation: String::new(),
        scoping_rules: Vec::new(),
        tool_endpoint: config.endpoint.clone(),
        auth_header: "Authorization".to_string(),
        payload_format: PayloadFormat::Json,
        call_timeout: Duration::from_secs(config.timeout_secs),
        max_calls: config.max_calls,
        tool_set: None,
    }
}

impl CapabilityDescriptor {
    /// Cluster resource inspection
    pub fn kubernetes(config: &CapabilityConfig) -> Self {
        let mut descriptor = base(
            "kubernetes",
            Domain::Kubernetes,
            "Live cluster state: pods, logs, events, namespaces/projects, nodes, \
             Helm releases and any other Kubernetes or OpenShift resource.",
            config,
        );
        descriptor.operations = operations(KUBERNETES_OPERATIONS);
        descriptor.default_operation = "resources_list".to_string();
        descriptor.payload_format = PayloadFormat::Text;
        descriptor.scoping_rules = vec![
            ScopingRule::missing_narrowing(
                &["pods_list", "pods_list_in_namespace", "pods_top"],
                &["namespace", "name"],
                "Which namespace? Or a specific pod name?",
            ),
            ScopingRule::missing_narrowing(
                &["events_list"],
                &["namespace", "name"],
                "For which namespace or resource?",
            ),
            ScopingRule::empty_argument(
                &["resources_list", "resources_get"],
                "kind",
                "Which resource type and namespace?",
            ),
            ScopingRule::missing_narrowing(
                &["resources_list"],
                &["namespace", "name", "labelSelector"],
                "In which namespace? Or which resource name or label selector?",
            ),
            ScopingRule::empty_argument(
                &["pods_get", "pods_log", "resources_get"],
                "name",
                "Which one? Please give me its name (and namespace).",
            ),
        ];
        descriptor
    }

    /// Prometheus/Thanos metrics
    pub fn metrics(config: &CapabilityConfig) -> Self {
        let mut descriptor = base(
            "metrics",
            Domain::Metrics,
            "Prometheus/Thanos time series: resource usage, request rates, firing alerts, \
             trends over time and charts.",
            config,
        );
        descriptor.operations = operations(METRICS_OPERATIONS);
        descriptor.default_operation = "execute_range_query".to_string();
        descriptor.scoping_rules = vec![
            ScopingRule::missing_narrowing(
                METRICS_QUERIES,
                &["metric", "query"],
                "Which metric should I look at? I can list the available metrics if you are not sure.",
            ),
            ScopingRule::missing_label_selector(
                METRICS_QUERIES,
                "labels",
                "query",
                "Which labels should I filter on? For example a namespace, pod or job.",
            ),
        ];
        descriptor
    }

    /// Detected cluster health incidents
    pub fn incidents(config: &CapabilityConfig) -> Self {
        let mut descriptor = base(
            "incidents",
            Domain::Incidents,
            "Cluster health incidents correlated from firing alerts: severity, affected \
             components, symptoms and suggested remediation.",
            config,
        );
        descriptor.operations = operations(&["get_incidents"]);
        descriptor.default_operation = "get_incidents".to_string();
        descriptor.auth_header = "kubernetes-authorization".to_string();
        descriptor
    }

    /// Official product documentation
    pub fn docs(config: &CapabilityConfig) -> Self {
        let mut descriptor = base(
            "docs",
            Domain::Documentation,
            "Official OpenShift 4.20 documentation: concepts, procedures, configuration and \
             best practices.",
            config,
        );
        descriptor.operations = operations(&["search"]);
        descriptor.default_operation = "search".to_string();
        descriptor.payload_format = PayloadFormat::Text;
        descriptor.scoping_rules = vec![ScopingRule::empty_argument(
            &["search"],
            "question",
            "What would you like me to look up in the documentation?",
        )];
        descriptor
    }

    /// Built-in descriptor by name
    pub fn builtin(name: &str, config: &CapabilityConfig) -> Option<Self> {
        match name {
            "kubernetes" => Some(Self::kubernetes(config)),
            "metrics" => Some(Self::metrics(config)),
            "incidents" => Some(Self::incidents(config)),
            "docs" => Some(Self::docs(config)),
            _ => None,
        }
    }
}
