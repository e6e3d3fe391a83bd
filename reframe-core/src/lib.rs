//! Project workflow controller for Reframe.
//!
//! The backend offers no push channel, so everything the client knows about a
//! project's lifecycle is reconstructed here from repeated request/response
//! calls. [`WorkflowController`] owns one project's [`StatusSnapshot`], runs a
//! [`StatusPoller`](workflow::StatusPoller) against whichever endpoint the
//! current status calls for, and funnels every backend answer through the pure
//! [`reconcile`] function, which is the only place a status may change.
#![allow(missing_docs)]

pub mod error;
pub mod gateway;
pub mod testing;
pub mod workflow;

pub use error::{Result, WorkflowError};
pub use gateway::{
    BackendGateway, DownloadedArchive, GatewayError, GatewayResult,
    HttpGateway, HttpGatewayConfig, UploadFile, normalize_base_url,
};
pub use workflow::{
    CheckOutcome, FetchKind, FollowUp, FormatSelection, Observation,
    PendingFetch, PollTarget, PollerConfig, Reconciled, StatusSnapshot,
    WorkflowController, reconcile,
};
