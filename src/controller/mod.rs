//! Kubernetes controller for DatamoverSession resources.
//!
//! The reconciliation core is split into small, mostly pure pieces:
//!
//! - [`state`]: the pure classifier deriving an abstract state from the
//!   reported progress and the observed child resources
//! - [`SessionController`]: observation plus the per-state transition
//!   engine (create, wait, status update, cleanup, give up)
//! - [`validate_session`]: spec validation run before any create
//! - [`extract_session_data`]: parsing of the sidecar's stdout contract
//!
//! # Usage with kube-runtime
//!
//! The controller runtime requires both a reconcile function and an error
//! policy:
//!
//! ```ignore
//! use datamover_operator::controller::{error_policy, SessionController};
//!
//! Controller::new(sessions, watcher_config)
//!     .owns(pods, watcher_config)
//!     .owns(services, watcher_config)
//!     .run(|session, ctx| async move {
//!         let controller = SessionController::new(ctx.clone());
//!         match controller.reconcile(session).await? {
//!             ReconcileAction::Requeue(duration) => Ok(Action::requeue(duration)),
//!             ReconcileAction::Done => Ok(Action::await_change()),
//!         }
//!     }, error_policy, context)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

mod observer;
mod session;
mod session_data;
pub mod state;
mod validate;

pub use session::{error_policy, SessionController};
pub use session_data::extract_session_data;
pub use state::{classify, ObservedResources, Readiness, SessionState};
pub use validate::validate_session;

pub(crate) use session_data::{DATA_END_MARKER, DATA_START_MARKER};
pub(crate) use validate::validate_session_for_pod;

/// Shared context for the session controller.
pub struct ControllerContext {
    /// Kubernetes client.
    pub client: kube::Client,
}

impl ControllerContext {
    /// Create a new controller context.
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

/// Result of a successful reconcile.
#[derive(Debug)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(std::time::Duration),
    /// Don't requeue; the watch refires on relevant changes.
    Done,
}

impl ReconcileAction {
    /// Requeue after 20 seconds, the safety net while waiting for child
    /// resources to appear or become ready.
    pub fn requeue_wait() -> Self {
        Self::Requeue(std::time::Duration::from_secs(20))
    }
}
