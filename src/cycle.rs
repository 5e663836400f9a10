//! Per-cycle node processing
//!
//! One cycle: list every node, filter to the managed + ready ones, and
//! reconcile each against its configured target groups. Nodes are processed
//! strictly one at a time, and each node is its own failure boundary: a bad
//! node is logged and skipped, never allowed to abort the rest of the cycle.
//!
//! Ineligible nodes are left completely untouched. Not reconciling them also
//! means never deregistering them; a node outside our ownership criteria must
//! not have its memberships swept away.

use crate::error::Result;
use crate::inventory::NodeSource;
use crate::provider::TargetGroupProvider;
use crate::reconcile::Reconciler;
use tracing::{error, info, warn};

/// Counters for one cycle's summary log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Nodes reported by the control plane
    pub nodes: usize,

    /// Nodes that were reconciled
    pub reconciled: usize,

    /// Nodes skipped (ineligible or configuration unavailable)
    pub skipped: usize,
}

/// Run one reconciliation cycle
///
/// Errors only if the node inventory itself cannot be fetched; everything
/// past that point is logged and contained per node.
pub async fn run_cycle<S, P>(source: &S, reconciler: &Reconciler<P>) -> Result<CycleStats>
where
    S: NodeSource,
    P: TargetGroupProvider,
{
    let nodes = source.list_nodes().await?;

    let mut stats = CycleStats {
        nodes: nodes.len(),
        ..Default::default()
    };

    if nodes.is_empty() {
        warn!("No nodes found, nothing to reconcile this cycle");
        return Ok(stats);
    }

    for node in &nodes {
        if !node.is_eligible() {
            info!(
                node = %node.name,
                phase = %node.phase,
                managed = node.managed,
                "Skipping ineligible node"
            );
            stats.skipped += 1;
            continue;
        }

        // is_eligible guarantees the configuration id is present
        let Some(config_id) = node.config_id.as_deref() else {
            stats.skipped += 1;
            continue;
        };

        info!(
            node = %node.name,
            instance_id = %node.instance_id,
            config_id = %config_id,
            "Processing node"
        );

        let desired = match source.desired_target_groups(config_id).await {
            Ok(desired) => desired,
            Err(e) => {
                error!(
                    node = %node.name,
                    config_id = %config_id,
                    error = %e,
                    "Failed to fetch desired target groups, skipping node"
                );
                stats.skipped += 1;
                continue;
            }
        };

        let result = reconciler.reconcile(&node.instance_id, &desired).await;

        if result.is_clean() {
            info!(
                node = %node.name,
                instance_id = %node.instance_id,
                changed = result.changed(),
                outcome = %result,
                "Node reconciled"
            );
        } else {
            warn!(
                node = %node.name,
                instance_id = %node.instance_id,
                changed = result.changed(),
                outcome = %result,
                "Node reconciled with failures"
            );
        }

        for failure in &result.failed {
            warn!(
                node = %node.name,
                target_group = failure.arn.as_deref().unwrap_or("-"),
                operation = %failure.operation,
                error = %failure.error,
                "Reconcile operation failed"
            );
        }

        stats.reconciled += 1;
    }

    info!(
        nodes = stats.nodes,
        reconciled = stats.reconciled,
        skipped = stats.skipped,
        "Cycle complete"
    );

    Ok(stats)
}
