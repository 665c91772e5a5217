//! Validation runs and archived-content handling.

pub mod archive;
pub mod orchestrator;
pub mod run;

pub use archive::{
    ArchiveService, ArchivedCounts, ArchivedPage, BulkAction, BulkActionRequest,
    BulkActionResult, BulkOutcome,
};
pub use orchestrator::{PendingRun, RunRequest, RunScope, ValidationService};
pub use run::{RunCounters, RunPhase, RunStatus, TriggerType, TypeCounters, ValidationRun};
