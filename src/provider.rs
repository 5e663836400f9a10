//! Load-balancer provider primitives
//!
//! Wraps the ELBv2 API behind [`TargetGroupProvider`] so the reconciler and
//! membership inspector only see four operations: list all target groups,
//! list a group's registered targets, register, deregister. Each call is
//! independently fallible; callers decide how far a failure propagates.
//!
//! ## Prerequisites
//!
//! - IAM permissions for `elasticloadbalancingv2:DescribeTargetGroups`,
//!   `DescribeTargetHealth`, `RegisterTargets`, `DeregisterTargets`

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use aws_sdk_elasticloadbalancingv2::operation::describe_target_groups::DescribeTargetGroupsOutput;
use aws_sdk_elasticloadbalancingv2::types::TargetDescription;
use aws_sdk_elasticloadbalancingv2::Client as ElbClient;
use tracing::{debug, info};

/// Provider primitives for target-group membership
///
/// The reconciler works through this interface only - never concrete SDK
/// clients - so the core algorithm can be exercised against fakes.
#[async_trait]
pub trait TargetGroupProvider: Send + Sync {
    /// List the ARNs of every target group visible to the provider
    ///
    /// Implementations must exhaust pagination; a partial listing would make
    /// the membership diff unsound.
    async fn list_target_group_arns(&self) -> Result<Vec<String>>;

    /// List the target ids currently registered with a group
    async fn list_target_ids(&self, target_group_arn: &str) -> Result<Vec<String>>;

    /// Register an instance with a target group
    async fn register_target(&self, target_group_arn: &str, instance_id: &str) -> Result<()>;

    /// Deregister an instance from a target group
    async fn deregister_target(&self, target_group_arn: &str, instance_id: &str) -> Result<()>;
}

/// AWS ELBv2 implementation of [`TargetGroupProvider`]
pub struct ElbProvider {
    client: ElbClient,
}

impl ElbProvider {
    /// Create a new provider from an ELBv2 client
    pub fn new(client: ElbClient) -> Self {
        Self { client }
    }

    /// Create from AWS config
    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(ElbClient::new(config))
    }
}

#[async_trait]
impl TargetGroupProvider for ElbProvider {
    async fn list_target_group_arns(&self) -> Result<Vec<String>> {
        let mut arns = Vec::new();

        let mut pages = self
            .client
            .describe_target_groups()
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(SyncError::from_aws)?;
            arns.extend(page_arns(&page));
        }

        debug!(count = arns.len(), "Listed target groups");

        Ok(arns)
    }

    async fn list_target_ids(&self, target_group_arn: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_target_health()
            .target_group_arn(target_group_arn)
            .send()
            .await
            .map_err(SyncError::from_aws)?;

        let ids = response
            .target_health_descriptions()
            .iter()
            .filter_map(|desc| desc.target().and_then(|t| t.id().map(|s| s.to_string())))
            .collect();

        Ok(ids)
    }

    async fn register_target(&self, target_group_arn: &str, instance_id: &str) -> Result<()> {
        info!(
            target_group = %target_group_arn,
            instance_id = %instance_id,
            "Registering target with load balancer"
        );

        let target = TargetDescription::builder().id(instance_id).build();

        self.client
            .register_targets()
            .target_group_arn(target_group_arn)
            .targets(target)
            .send()
            .await
            .map_err(SyncError::from_aws)?;

        Ok(())
    }

    async fn deregister_target(&self, target_group_arn: &str, instance_id: &str) -> Result<()> {
        info!(
            target_group = %target_group_arn,
            instance_id = %instance_id,
            "Deregistering target from load balancer"
        );

        let target = TargetDescription::builder().id(instance_id).build();

        self.client
            .deregister_targets()
            .target_group_arn(target_group_arn)
            .targets(target)
            .send()
            .await
            .map_err(SyncError::from_aws)?;

        Ok(())
    }
}

/// Collect the target-group ARNs from one listing page
///
/// Every page the paginator yields goes through here; the caller's loop must
/// append, never replace, so a multi-page listing stays complete.
fn page_arns(page: &DescribeTargetGroupsOutput) -> Vec<String> {
    page.target_groups()
        .iter()
        .filter_map(|tg| tg.target_group_arn().map(str::to_string))
        .collect()
}

/// Load AWS SDK configuration pinned to the given region
pub async fn load_aws_config(region: &str) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_types::region::Region::new(region.to_string()))
        .load()
        .await
}
