//! Control-plane node inventory
//!
//! Read-only client for the cluster control plane. Two queries matter here:
//!
//! 1. List every node in the external cluster (all statuses; eligibility
//!    filtering is the cycle orchestrator's job)
//! 2. Look up a node configuration to get its desired target groups
//!
//! Responses are validated once at this boundary: nodes missing identifying
//! fields and target-group entries missing `arn` or `port` are dropped with a
//! warning, so everything downstream works with fully-populated types.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Label marking a node as owned by the cluster provisioner
pub const MANAGED_BY_LABEL: &str = "provisioner.cast.ai/managed-by";

/// Expected value of [`MANAGED_BY_LABEL`] for managed nodes
pub const MANAGED_BY_VALUE: &str = "cast.ai";

/// Label carrying the node-configuration id
pub const NODE_CONFIG_LABEL: &str = "provisioner.cast.ai/node-configuration-id";

/// Node phase in which reconciliation is allowed
pub const PHASE_READY: &str = "ready";

/// Request timeout for control-plane calls
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A managed compute node, as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Control-plane node id
    pub id: String,

    /// Cloud instance id (the identifier the load balancer knows)
    pub instance_id: String,

    /// Human-readable node name
    pub name: String,

    /// Lifecycle phase (e.g. "ready", "creating", "deleting")
    pub phase: String,

    /// Whether the node is owned by the cluster provisioner
    pub managed: bool,

    /// Node-configuration id determining the desired target groups
    pub config_id: Option<String>,
}

impl Node {
    /// Whether this node should be reconciled
    ///
    /// Only managed, ready nodes with a known node configuration are touched.
    /// Everything else is left exactly as it is.
    pub fn is_eligible(&self) -> bool {
        self.managed && self.phase == PHASE_READY && self.config_id.is_some()
    }
}

/// A desired target-group binding for a node
///
/// `port` is informational in this design: registration binds by instance id,
/// but the control plane requires both fields and entries missing either are
/// dropped at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupRef {
    /// Target group ARN
    pub arn: String,

    /// Port the node serves traffic on
    pub port: i32,
}

/// Source of node inventory and per-node desired target groups
///
/// The cycle orchestrator works through this interface only, so tests can
/// drive it with an in-memory fake.
#[async_trait]
pub trait NodeSource: Send + Sync {
    /// List every node in the cluster, in all phases
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Desired target groups for a node configuration
    async fn desired_target_groups(&self, config_id: &str) -> Result<Vec<TargetGroupRef>>;
}

// ---------------------------------------------------------------------------
// Raw wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NodeListResponse {
    #[serde(default)]
    items: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: Option<String>,

    #[serde(rename = "instanceId")]
    instance_id: Option<String>,

    name: Option<String>,

    state: Option<RawNodeState>,

    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawNodeState {
    phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodeConfigResponse {
    eks: Option<RawEksConfig>,
}

#[derive(Debug, Deserialize)]
struct RawEksConfig {
    #[serde(rename = "targetGroups", default)]
    target_groups: Vec<RawTargetGroup>,
}

#[derive(Debug, Deserialize)]
struct RawTargetGroup {
    arn: Option<String>,
    port: Option<i32>,
}

/// Parse a raw node row into a [`Node`], or drop it if identity is missing
fn parse_node(raw: RawNode) -> Option<Node> {
    let id = raw.id?;
    let instance_id = raw.instance_id?;
    let name = raw.name?;

    let phase = raw
        .state
        .and_then(|s| s.phase)
        .unwrap_or_else(|| "unknown".to_string());

    let managed = raw
        .labels
        .get(MANAGED_BY_LABEL)
        .is_some_and(|v| v == MANAGED_BY_VALUE);

    let config_id = raw.labels.get(NODE_CONFIG_LABEL).cloned();

    Some(Node {
        id,
        instance_id,
        name,
        phase,
        managed,
        config_id,
    })
}

/// Filter raw target-group entries down to fully-populated refs
///
/// Entries missing `arn` or `port` are dropped here, at the boundary, so the
/// reconciler never sees a partial binding.
fn parse_target_groups(raw: Vec<RawTargetGroup>) -> Vec<TargetGroupRef> {
    raw.into_iter()
        .filter_map(|tg| match (tg.arn, tg.port) {
            (Some(arn), Some(port)) if !arn.is_empty() => Some(TargetGroupRef { arn, port }),
            (arn, port) => {
                warn!(
                    arn = ?arn,
                    port = ?port,
                    "Dropping target-group entry with missing fields"
                );
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Control-plane API client
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    cluster_id: String,
}

impl ControlPlaneClient {
    /// Create a new client
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            cluster_id: cluster_id.into(),
        })
    }

    async fn get_json<T>(&self, url: &str, query: &[(&str, &str)]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(url = %url, "Sending control-plane request");

        let response = self
            .http
            .get(url)
            .query(query)
            .header("X-API-Key", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::control_plane(format!(
                "{} returned {}",
                url, status
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl NodeSource for ControlPlaneClient {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let url = format!(
            "{}/v1/kubernetes/external-clusters/{}/nodes",
            self.base_url, self.cluster_id
        );

        // Ask for every node regardless of status; filtering happens client-side
        let query = [
            ("nodeStatus", "node_status_unspecified"),
            ("lifecycleType", "lifecycle_type_unspecified"),
        ];

        let response: NodeListResponse = self.get_json(&url, &query).await?;
        let total = response.items.len();

        let nodes: Vec<Node> = response
            .items
            .into_iter()
            .filter_map(|raw| match parse_node(raw) {
                Some(node) => Some(node),
                None => {
                    warn!("Dropping node row with missing identity fields");
                    None
                }
            })
            .collect();

        info!(
            cluster = %self.cluster_id,
            total,
            parsed = nodes.len(),
            "Retrieved cluster nodes"
        );

        Ok(nodes)
    }

    async fn desired_target_groups(&self, config_id: &str) -> Result<Vec<TargetGroupRef>> {
        let url = format!(
            "{}/v1/kubernetes/clusters/{}/node-configurations/{}",
            self.base_url, self.cluster_id, config_id
        );

        let response: NodeConfigResponse = self.get_json(&url, &[]).await?;

        let raw_groups = response
            .eks
            .map(|eks| eks.target_groups)
            .unwrap_or_default();

        let groups = parse_target_groups(raw_groups);

        debug!(
            config_id = %config_id,
            count = groups.len(),
            "Resolved desired target groups"
        );

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node_json(labels: serde_json::Value, phase: &str) -> serde_json::Value {
        json!({
            "id": "node-1",
            "instanceId": "i-0abc",
            "name": "worker-1",
            "state": { "phase": phase },
            "labels": labels,
        })
    }

    #[test]
    fn test_parse_managed_ready_node() {
        let raw: RawNode = serde_json::from_value(node_json(
            json!({
                MANAGED_BY_LABEL: MANAGED_BY_VALUE,
                NODE_CONFIG_LABEL: "cfg-1",
            }),
            "ready",
        ))
        .unwrap();

        let node = parse_node(raw).unwrap();
        assert!(node.managed);
        assert_eq!(node.phase, "ready");
        assert_eq!(node.config_id.as_deref(), Some("cfg-1"));
        assert!(node.is_eligible());
    }

    #[test]
    fn test_unmanaged_node_is_ineligible() {
        let raw: RawNode =
            serde_json::from_value(node_json(json!({}), "ready")).unwrap();
        let node = parse_node(raw).unwrap();
        assert!(!node.managed);
        assert!(!node.is_eligible());
    }

    #[test]
    fn test_not_ready_node_is_ineligible() {
        let raw: RawNode = serde_json::from_value(node_json(
            json!({
                MANAGED_BY_LABEL: MANAGED_BY_VALUE,
                NODE_CONFIG_LABEL: "cfg-1",
            }),
            "creating",
        ))
        .unwrap();
        let node = parse_node(raw).unwrap();
        assert!(node.managed);
        assert!(!node.is_eligible());
    }

    #[test]
    fn test_node_missing_instance_id_is_dropped() {
        let raw: RawNode = serde_json::from_value(json!({
            "id": "node-1",
            "name": "worker-1",
            "state": { "phase": "ready" },
        }))
        .unwrap();
        assert!(parse_node(raw).is_none());
    }

    #[test]
    fn test_target_group_entries_missing_fields_are_dropped() {
        let response: NodeConfigResponse = serde_json::from_value(json!({
            "eks": {
                "targetGroups": [
                    { "arn": "arn:tg/a", "port": 80 },
                    { "arn": "arn:tg/b" },
                    { "port": 443 },
                    { "arn": "", "port": 8080 },
                ]
            }
        }))
        .unwrap();

        let groups = parse_target_groups(response.eks.unwrap().target_groups);

        assert_eq!(
            groups,
            vec![TargetGroupRef {
                arn: "arn:tg/a".to_string(),
                port: 80
            }]
        );
    }

    #[test]
    fn test_missing_eks_section_means_no_groups() {
        let response: NodeConfigResponse =
            serde_json::from_value(json!({ "kind": "gke" })).unwrap();
        assert!(response.eks.is_none());
    }

    #[test]
    fn test_empty_node_list_response() {
        let response: NodeListResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.items.is_empty());
    }
}
