//! # tgsync
//!
//! Keeps load-balancer target-group membership for cluster-managed nodes in
//! sync with the configuration the control plane declares for them.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler loop (main)
//! └── run_cycle
//!     ├── inventory: list nodes, per-node desired target groups
//!     └── Reconciler (per eligible node)
//!         ├── membership: snapshot current provider state
//!         └── provider: register / deregister diff
//! ```
//!
//! The reconciler is the core: given a node's desired target-group set and
//! the provider's current membership, it applies the minimal diff with
//! idempotent, partial-failure-tolerant semantics. Everything around it is
//! fan-out and thin API plumbing.
//!
//! The loop is strictly sequential: one cycle at a time, one node at a time,
//! one provider call at a time. Snapshots and results are cycle-local and
//! discarded after logging.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cycle;
pub mod error;
pub mod inventory;
pub mod membership;
pub mod provider;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod testutil;

// Error handling
pub use error::{Result, SyncError};

// Control-plane data access
pub use inventory::{ControlPlaneClient, Node, NodeSource, TargetGroupRef};

// Provider primitives
pub use provider::{load_aws_config, ElbProvider, TargetGroupProvider};

// Membership inspection
pub use membership::{snapshot, MembershipSnapshot};

// Reconciliation core
pub use reconcile::{Operation, OperationFailure, ReconcileResult, Reconciler};

// Cycle orchestration
pub use cycle::{run_cycle, CycleStats};
