//! Pure state classification for the session state machine.
//!
//! [`classify`] derives an abstract [`SessionState`] from the progress a
//! session last reported and the child resources observed in the current
//! reconcile. It performs no I/O, so the whole transition table is
//! directly testable.

use k8s_openapi::api::core::v1::{Pod, Service};

use crate::crd::{DatamoverSessionStatus, SessionProgress};
use crate::error::{OperatorError, OperatorResult};

/// Child resources observed for one session in a single reconcile.
///
/// Never cached across reconciles; every invocation re-derives state from
/// scratch.
#[derive(Debug, Default)]
pub struct ObservedResources {
    /// The session pod, if exactly one owned pod matched.
    pub pod: Option<Pod>,
    /// Readiness of the pod, computed whenever a pod was observed.
    pub pod_readiness: Option<Readiness>,
    /// The session service, if required and owned by the session.
    pub service: Option<Service>,
    /// Whether the session declares service ports at all.
    pub need_service: bool,
}

/// Readiness of the session pod.
///
/// `ready` is true only when the pod is running, both the main container
/// and the sidecar pass their probes, and the session data markers were
/// found in the sidecar logs. `data` is only meaningful when `ready`.
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    /// All readiness conditions hold.
    pub ready: bool,
    /// Opaque session data extracted from the sidecar logs. May be empty.
    pub data: String,
}

/// Abstract state of a session, derived from progress plus observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing exists yet; validate and create.
    Init,
    /// The spec was rejected. Terminal, no action.
    ValidationFailed,
    /// All children exist; record `ResourcesCreated`.
    CreateResourcesSuccess,
    /// Some children are missing; create the rest.
    CreateResourcesInProgress,
    /// Children exist but the pod is not ready yet; wait.
    ReadinessWait,
    /// The pod is ready and published its session data; record `Ready`.
    ReadinessSuccess,
    /// A required child disappeared while starting up. Give up.
    ReadinessResourcesMissing,
    /// The pod failed while starting up. Give up.
    ReadinessResourcesFailure,
    /// Startup failed and the service still exists; delete it.
    ReadinessFailedDirty,
    /// Startup failed and nothing is left to clean up.
    ReadinessFailedClean,
    /// The session is ready and healthy.
    SessionRunning,
    /// The session broke after being ready. Give up.
    SessionResourcesFailure,
    /// The session failed and the service still exists; delete it.
    SessionFailedDirty,
    /// The session failed and nothing is left to clean up.
    SessionFailedClean,
}

impl ObservedResources {
    /// No child resources at all.
    pub fn empty(&self) -> bool {
        self.pod.is_none() && self.service.is_none()
    }

    /// Every required child exists.
    pub fn all_exist(&self) -> bool {
        let service_ok = !self.need_service || self.service.is_some();
        self.pod.is_some() && service_ok
    }

    /// Every required child exists and the pod is ready.
    pub fn ready(&self) -> bool {
        self.all_exist() && self.pod_readiness.as_ref().is_some_and(|r| r.ready)
    }

    /// The pod entered the Failed phase.
    pub fn failed(&self) -> bool {
        self.pod.as_ref().is_some_and(pod_failed)
    }

    /// Post-failure cleanup is finished: no service left, and the pod, if
    /// any, is no longer alive.
    pub fn cleaned_up(&self) -> bool {
        if self.empty() {
            return true;
        }
        if self.service.is_some() {
            return false;
        }
        match &self.pod {
            Some(pod) => !pod_alive(pod),
            None => true,
        }
    }
}

fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or("")
}

/// Phase is Failed.
pub(crate) fn pod_failed(pod: &Pod) -> bool {
    pod_phase(pod) == "Failed"
}

/// Phase is Running or Pending.
pub(crate) fn pod_alive(pod: &Pod) -> bool {
    matches!(pod_phase(pod), "Running" | "Pending")
}

/// Derive the abstract state for a session.
///
/// Returns an error on invariant breaches: session data set before any
/// progress was recorded, or a ready session whose resources are neither
/// failed nor ready.
pub fn classify(
    name: &str,
    status: &DatamoverSessionStatus,
    observed: &ObservedResources,
) -> OperatorResult<SessionState> {
    match status.progress {
        None => {
            let data_set = status
                .session_info
                .as_ref()
                .is_some_and(|info| !info.session_data.is_empty());
            if data_set {
                return Err(OperatorError::InvariantViolation {
                    name: name.to_string(),
                    reason: "session data should be empty while progress is not set".to_string(),
                });
            }
            if observed.empty() {
                Ok(SessionState::Init)
            } else if observed.all_exist() {
                Ok(SessionState::CreateResourcesSuccess)
            } else {
                Ok(SessionState::CreateResourcesInProgress)
            }
        }
        Some(SessionProgress::ValidationFailed) => Ok(SessionState::ValidationFailed),
        Some(SessionProgress::ResourcesCreated) => {
            if !observed.all_exist() {
                Ok(SessionState::ReadinessResourcesMissing)
            } else if observed.failed() {
                Ok(SessionState::ReadinessResourcesFailure)
            } else if observed.ready() {
                Ok(SessionState::ReadinessSuccess)
            } else {
                Ok(SessionState::ReadinessWait)
            }
        }
        Some(SessionProgress::ReadinessFailure) => {
            if observed.cleaned_up() {
                Ok(SessionState::ReadinessFailedClean)
            } else {
                Ok(SessionState::ReadinessFailedDirty)
            }
        }
        Some(SessionProgress::Ready) => {
            if !observed.all_exist() || observed.failed() {
                Ok(SessionState::SessionResourcesFailure)
            } else if observed.ready() {
                Ok(SessionState::SessionRunning)
            } else {
                Err(OperatorError::InvariantViolation {
                    name: name.to_string(),
                    reason: "resources should be failed or ready once the session is ready"
                        .to_string(),
                })
            }
        }
        Some(SessionProgress::SessionFailure) => {
            if observed.cleaned_up() {
                Ok(SessionState::SessionFailedClean)
            } else {
                Ok(SessionState::SessionFailedDirty)
            }
        }
    }
}
