//! In-memory fakes for the provider and node-source seams
//!
//! Test-only. Both fakes share their state behind an `Arc` so a test can keep
//! a clone and inspect what the code under test did to it.

use crate::error::{Result, SyncError};
use crate::inventory::{Node, NodeSource, TargetGroupRef};
use crate::provider::TargetGroupProvider;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct ProviderState {
    /// arn -> registered instance ids
    groups: BTreeMap<String, BTreeSet<String>>,
    fail_listing: bool,
    fail_describe: BTreeSet<String>,
    fail_register: BTreeSet<String>,
    fail_deregister: BTreeSet<String>,
    register_calls: usize,
    deregister_calls: usize,
}

/// In-memory [`TargetGroupProvider`] with injectable failures
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target group with the given registered instances
    pub fn add_group(&self, arn: &str, instances: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(
            arn.to_string(),
            instances.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Make the group listing fail entirely
    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    /// Make health queries for one group fail
    pub fn fail_describe(&self, arn: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_describe
            .insert(arn.to_string());
    }

    /// Make registration into one group fail
    pub fn fail_register(&self, arn: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_register
            .insert(arn.to_string());
    }

    /// Make deregistration from one group fail
    pub fn fail_deregister(&self, arn: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_deregister
            .insert(arn.to_string());
    }

    /// Whether the instance is currently registered with the group
    pub fn is_registered(&self, arn: &str, instance_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(arn)
            .is_some_and(|ids| ids.contains(instance_id))
    }

    /// Number of register calls made against this provider
    pub fn register_calls(&self) -> usize {
        self.state.lock().unwrap().register_calls
    }

    /// Number of mutation calls (register + deregister) made
    pub fn mutation_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.register_calls + state.deregister_calls
    }
}

#[async_trait]
impl TargetGroupProvider for MockProvider {
    async fn list_target_group_arns(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(SyncError::Provider("listing unavailable".to_string()));
        }
        Ok(state.groups.keys().cloned().collect())
    }

    async fn list_target_ids(&self, target_group_arn: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.fail_describe.contains(target_group_arn) {
            return Err(SyncError::Provider(format!(
                "describe failed for {target_group_arn}"
            )));
        }
        Ok(state
            .groups
            .get(target_group_arn)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn register_target(&self, target_group_arn: &str, instance_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.register_calls += 1;
        if state.fail_register.contains(target_group_arn) {
            return Err(SyncError::Provider(format!(
                "register failed for {target_group_arn}"
            )));
        }
        state
            .groups
            .entry(target_group_arn.to_string())
            .or_default()
            .insert(instance_id.to_string());
        Ok(())
    }

    async fn deregister_target(&self, target_group_arn: &str, instance_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.deregister_calls += 1;
        if state.fail_deregister.contains(target_group_arn) {
            return Err(SyncError::Provider(format!(
                "deregister failed for {target_group_arn}"
            )));
        }
        if let Some(ids) = state.groups.get_mut(target_group_arn) {
            ids.remove(instance_id);
        }
        Ok(())
    }
}

#[derive(Default)]
struct SourceState {
    nodes: Vec<Node>,
    configs: HashMap<String, Vec<TargetGroupRef>>,
    fail_nodes: bool,
    fail_configs: BTreeSet<String>,
}

/// In-memory [`NodeSource`] with injectable failures
#[derive(Clone, Default)]
pub struct MockNodeSource {
    state: Arc<Mutex<SourceState>>,
}

impl MockNodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: Node) {
        self.state.lock().unwrap().nodes.push(node);
    }

    pub fn set_config(&self, config_id: &str, groups: Vec<TargetGroupRef>) {
        self.state
            .lock()
            .unwrap()
            .configs
            .insert(config_id.to_string(), groups);
    }

    /// Make the node listing fail
    pub fn fail_nodes(&self) {
        self.state.lock().unwrap().fail_nodes = true;
    }

    /// Make one configuration lookup fail
    pub fn fail_config(&self, config_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_configs
            .insert(config_id.to_string());
    }
}

#[async_trait]
impl NodeSource for MockNodeSource {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let state = self.state.lock().unwrap();
        if state.fail_nodes {
            return Err(SyncError::control_plane("node listing unavailable"));
        }
        Ok(state.nodes.clone())
    }

    async fn desired_target_groups(&self, config_id: &str) -> Result<Vec<TargetGroupRef>> {
        let state = self.state.lock().unwrap();
        if state.fail_configs.contains(config_id) {
            return Err(SyncError::control_plane(format!(
                "configuration {config_id} unavailable"
            )));
        }
        Ok(state.configs.get(config_id).cloned().unwrap_or_default())
    }
}

/// Build a test node; managed and ready unless overridden by the caller
pub fn test_node(id: &str, instance_id: &str, config_id: &str) -> Node {
    Node {
        id: id.to_string(),
        instance_id: instance_id.to_string(),
        name: format!("node-{id}"),
        phase: "ready".to_string(),
        managed: true,
        config_id: Some(config_id.to_string()),
    }
}
