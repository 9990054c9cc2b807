// [libs/domain/models/src/lib.rs]

pub mod bot;
pub mod capability;
pub mod command;
pub mod credential;
pub mod deletion;
pub mod ledger;
pub mod meter;
pub mod node;
pub mod recovery;
pub mod routing;
pub mod snapshot;
pub mod spending;

pub use bot::{BillingState, BotInstance, ReleaseChannel, UpdatePolicy};
pub use capability::{capability_for_path, Capability};
pub use command::{
    CommandResult, NodeCommand, NodeCommandKind, NodeEnvelope, NodeHeartbeat,
};
pub use credential::RegistrationToken;
pub use deletion::{DeletionRequest, DeletionStatus};
pub use ledger::{LedgerTransaction, TransactionType};
pub use meter::{BillingPeriodSummary, MeterEvent, UsageMeasure, UsageSummary};
pub use node::{NodeLifecycleEvent, NodeRecord, NodeStatus, NodeTransition};
pub use recovery::{
    RecoveryEvent, RecoveryEventStatus, RecoveryItem, RecoveryItemStatus, RecoveryTrigger,
};
pub use routing::extract_tenant_subdomain;
pub use snapshot::{SnapshotRecord, SnapshotTrigger};
pub use spending::{CapScope, CapThresholds, SpendingLimits};
