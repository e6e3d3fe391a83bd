//! Project workflow: snapshot, reconciler, poller, generation trigger, and
//! the controller composing them.

mod controller;
mod generation;
mod observation;
mod poller;
mod reconciler;
mod session;
mod snapshot;

pub use controller::WorkflowController;
pub use generation::FormatSelection;
pub use observation::{FetchKind, Observation};
pub use poller::{PollTarget, PollerConfig, StatusPoller};
pub use reconciler::{DiscardReason, FollowUp, Reconciled, reconcile};
pub use session::CheckOutcome;
pub use snapshot::{PendingFetch, StatusSnapshot};
