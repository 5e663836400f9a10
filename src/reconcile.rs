//! Target-group membership reconciliation
//!
//! The core of the system: given a node's desired target-group set and the
//! provider's current membership for that node, compute and apply the diff.
//!
//! ## Contract
//!
//! - Every ARN from the desired set or the membership snapshot ends up in
//!   exactly one of `registered`, `already_registered`, `deregistered`, or a
//!   failure record. Nothing is silently dropped.
//! - Registering an already-registered node is redundant and never happens.
//! - Deregistrations run before registrations, so a node moving between
//!   groups never transiently occupies extra capacity.
//! - One ARN's failure never blocks the remaining ARNs. Partial-failure
//!   tolerance is the central promise of this module.

use crate::error::SyncError;
use crate::inventory::TargetGroupRef;
use crate::membership::{self, MembershipSnapshot};
use crate::provider::TargetGroupProvider;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{error, info};

/// Provider operation a failure record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Registering the instance with a target group
    Register,
    /// Deregistering the instance from a target group
    Deregister,
    /// Querying one target group's health listing
    DescribeHealth,
    /// Listing all target groups
    DescribeTargetGroups,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Register => "register",
            Self::Deregister => "deregister",
            Self::DescribeHealth => "describe_health",
            Self::DescribeTargetGroups => "describe_target_groups",
        };
        f.write_str(tag)
    }
}

/// A single failed provider operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    /// Target group the failure applies to, if any
    ///
    /// `None` for whole-operation failures such as a target-group listing
    /// that could not be completed.
    pub arn: Option<String>,

    /// Which operation failed
    pub operation: Operation,

    /// Provider error text
    pub error: String,
}

impl OperationFailure {
    /// Failure scoped to a single target group
    pub fn for_group(arn: impl Into<String>, operation: Operation, error: &SyncError) -> Self {
        Self {
            arn: Some(arn.into()),
            operation,
            error: error.to_string(),
        }
    }

    /// Whole-operation failure with no single group to blame
    pub fn whole(operation: Operation, error: &SyncError) -> Self {
        Self {
            arn: None,
            operation,
            error: error.to_string(),
        }
    }
}

/// Outcome of one reconcile call
///
/// Built incrementally during the call and handed back to the caller for
/// logging; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Groups the node was newly registered with
    pub registered: Vec<String>,

    /// Groups the node was already a member of and stays in
    pub already_registered: Vec<String>,

    /// Groups the node was removed from
    pub deregistered: Vec<String>,

    /// Operations that failed, each isolated to its own record
    pub failed: Vec<OperationFailure>,
}

impl ReconcileResult {
    /// Whether every operation succeeded
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Whether the call changed anything at the provider
    pub fn changed(&self) -> bool {
        !self.registered.is_empty() || !self.deregistered.is_empty()
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "registered={} already_registered={} deregistered={} failed={}",
            self.registered.len(),
            self.already_registered.len(),
            self.deregistered.len(),
            self.failed.len()
        )
    }
}

/// Reconciles one node's target-group membership against its desired set
pub struct Reconciler<P> {
    provider: P,
}

impl<P: TargetGroupProvider> Reconciler<P> {
    /// Create a new reconciler over a provider
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Reconcile one node
    ///
    /// All failures are captured inside the returned result; this call never
    /// errors. An empty `desired` set means "remove this node from every
    /// target group it currently belongs to".
    pub async fn reconcile(
        &self,
        instance_id: &str,
        desired: &[TargetGroupRef],
    ) -> ReconcileResult {
        let mut result = ReconcileResult::default();

        // Fresh snapshot every call; membership is never cached across cycles.
        let snapshot = match membership::snapshot(&self.provider, instance_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(
                    instance_id = %instance_id,
                    error = %e,
                    "Failed to list target groups, aborting reconcile"
                );
                result
                    .failed
                    .push(OperationFailure::whole(Operation::DescribeTargetGroups, &e));
                return result;
            }
        };

        // Groups whose health listing failed are unknown, not "not a member":
        // they stay out of the diff entirely and surface only as failures.
        result.failed.extend(snapshot.failures.iter().cloned());

        if desired.is_empty() {
            self.deregister_all(instance_id, &snapshot, &mut result)
                .await;
            return result;
        }

        let desired_arns: BTreeSet<&str> = desired.iter().map(|tg| tg.arn.as_str()).collect();

        // Classify current membership against the desired set
        let mut to_deregister = Vec::new();
        for arn in &snapshot.members {
            if desired_arns.contains(arn.as_str()) {
                result.already_registered.push(arn.clone());
            } else {
                to_deregister.push(arn.clone());
            }
        }

        // Stale memberships go first, so they are cleared even if a later
        // registration fails.
        for arn in to_deregister {
            self.deregister_one(instance_id, &arn, &mut result).await;
        }

        for tg in desired {
            if result.already_registered.iter().any(|a| a == &tg.arn)
                || result.registered.iter().any(|a| a == &tg.arn)
            {
                continue;
            }

            match self.provider.register_target(&tg.arn, instance_id).await {
                Ok(()) => result.registered.push(tg.arn.clone()),
                Err(e) => {
                    error!(
                        instance_id = %instance_id,
                        target_group = %tg.arn,
                        error = %e,
                        "Failed to register target"
                    );
                    result
                        .failed
                        .push(OperationFailure::for_group(&tg.arn, Operation::Register, &e));
                }
            }
        }

        result
    }

    /// Remove the node from every group it is currently a member of
    async fn deregister_all(
        &self,
        instance_id: &str,
        snapshot: &MembershipSnapshot,
        result: &mut ReconcileResult,
    ) {
        if snapshot.members.is_empty() {
            info!(
                instance_id = %instance_id,
                "Desired set is empty and node holds no memberships"
            );
            return;
        }

        info!(
            instance_id = %instance_id,
            memberships = snapshot.members.len(),
            "Desired set is empty, removing node from all target groups"
        );

        for arn in &snapshot.members {
            self.deregister_one(instance_id, arn, result).await;
        }
    }

    async fn deregister_one(&self, instance_id: &str, arn: &str, result: &mut ReconcileResult) {
        match self.provider.deregister_target(arn, instance_id).await {
            Ok(()) => result.deregistered.push(arn.to_string()),
            Err(e) => {
                error!(
                    instance_id = %instance_id,
                    target_group = %arn,
                    error = %e,
                    "Failed to deregister target"
                );
                result
                    .failed
                    .push(OperationFailure::for_group(arn, Operation::Deregister, &e));
            }
        }
    }
}
