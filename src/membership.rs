//! Membership snapshots
//!
//! Answers one question: which target groups does the provider currently
//! report this instance in? The answer is rebuilt from scratch on every call
//! by walking every target group's health listing.
//!
//! A failure to list the groups themselves aborts the whole snapshot, because
//! membership cannot be diffed safely without full visibility. A failure to
//! query one group's health only excludes that group: "unknown" must not be
//! read as "not a member", or a node could be spuriously deregistered.

use crate::error::Result;
use crate::provider::TargetGroupProvider;
use crate::reconcile::{Operation, OperationFailure};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// The provider's current membership truth for one instance
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    /// ARNs of every group the instance is currently registered with
    pub members: BTreeSet<String>,

    /// Groups whose health listing could not be queried
    ///
    /// These are unknown, excluded from `members`, and must be excluded from
    /// any diff computed over this snapshot.
    pub failures: Vec<OperationFailure>,
}

impl MembershipSnapshot {
    /// Whether the instance is a known member of the given group
    pub fn is_member(&self, arn: &str) -> bool {
        self.members.contains(arn)
    }
}

/// Take a membership snapshot for one instance
///
/// Errors only if the target-group listing itself fails; per-group health
/// failures are carried inside the snapshot.
pub async fn snapshot<P>(provider: &P, instance_id: &str) -> Result<MembershipSnapshot>
where
    P: TargetGroupProvider,
{
    let arns = provider.list_target_group_arns().await?;

    debug!(
        instance_id = %instance_id,
        target_groups = arns.len(),
        "Probing target groups for current membership"
    );

    let mut snapshot = MembershipSnapshot::default();

    for arn in arns {
        match provider.list_target_ids(&arn).await {
            Ok(ids) => {
                if ids.iter().any(|id| id == instance_id) {
                    snapshot.members.insert(arn);
                }
            }
            Err(e) => {
                warn!(
                    instance_id = %instance_id,
                    target_group = %arn,
                    error = %e,
                    "Failed to query target health, excluding group from diff"
                );
                snapshot
                    .failures
                    .push(OperationFailure::for_group(arn, Operation::DescribeHealth, &e));
            }
        }
    }

    debug!(
        instance_id = %instance_id,
        memberships = snapshot.members.len(),
        unreachable = snapshot.failures.len(),
        "Membership snapshot complete"
    );

    Ok(snapshot)
}
