//! One merge run, from acquiring the target working copy to pushing the
//! result or handing a conflict to a human through a pull request.

pub mod errors;
pub mod escalation;
pub mod state;
pub mod workflow;

pub use errors::{EscalationFailure, RelayError};
pub use escalation::{conflict_branch_name, ConflictReport, CONFLICT_BRANCH_PREFIX};
pub use state::{RunOutcome, RunState};
pub use workflow::{MergeOrchestrator, ORIGIN};
