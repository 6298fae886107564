//! DatamoverSession controller.
//!
//! Each reconcile is level based: observe the child resources, classify the
//! session into an abstract state, apply exactly one action. Status only
//! ever advances; the failure values are terminal and the only cleanup
//! after a failure is deleting the service so clients cannot connect (the
//! pod is preserved for post-mortem).

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Resource, ResourceExt};

use super::state::{classify, ObservedResources, SessionState};
use super::validate::validate_session;
use super::{ControllerContext, ReconcileAction};
use crate::crd::{DatamoverSession, DatamoverSessionStatus, SessionInfo, SessionProgress};
use crate::error::{OperatorError, OperatorResult};
use crate::resources;

/// Controller for DatamoverSession resources.
#[derive(Clone)]
pub struct SessionController {
    pub(crate) ctx: Arc<ControllerContext>,
}

impl SessionController {
    /// Create a new session controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Reconcile a DatamoverSession.
    ///
    /// Sessions without a lifecycle config are skipped entirely. Everything
    /// else goes through observe, classify, and one state transition.
    pub async fn reconcile(
        &self,
        session: Arc<DatamoverSession>,
    ) -> OperatorResult<ReconcileAction> {
        let name = session.name_any();
        let Some(namespace) = session.namespace() else {
            return Err(OperatorError::InvalidSession {
                name,
                reason: "session must be namespaced".to_string(),
            });
        };

        if session.spec.lifecycle_config.is_none() {
            tracing::debug!(name = %name, "Session has no lifecycle config, skipping");
            return Ok(ReconcileAction::Done);
        }

        let observed = self.observe(&session, &namespace).await?;
        let status = session.status.clone().unwrap_or_default();
        let state = classify(&name, &status, &observed)?;

        tracing::info!(
            name = %name,
            namespace = %namespace,
            state = ?state,
            "Processing session state"
        );

        match state {
            SessionState::Init => {
                if let Err(err) = validate_session(&session) {
                    tracing::warn!(name = %name, error = %err, "Session validation failed");
                    self.update_progress(&namespace, &name, SessionProgress::ValidationFailed)
                        .await?;
                    // Terminal state, nothing to requeue for.
                    return Ok(ReconcileAction::Done);
                }
                self.try_create_resources(&session, &namespace, &observed)
                    .await?;
                // Resource creation triggers the next reconcile through the
                // watch; the requeue is a safety net in case it doesn't.
                Ok(ReconcileAction::requeue_wait())
            }

            SessionState::CreateResourcesSuccess => {
                self.update_progress(&namespace, &name, SessionProgress::ResourcesCreated)
                    .await?;
                Ok(ReconcileAction::Done)
            }

            SessionState::CreateResourcesInProgress => {
                self.try_create_resources(&session, &namespace, &observed)
                    .await?;
                Ok(ReconcileAction::Done)
            }

            SessionState::ReadinessWait => {
                tracing::info!(name = %name, "Waiting for session pod readiness");
                Ok(ReconcileAction::requeue_wait())
            }

            SessionState::ReadinessResourcesMissing => {
                self.update_progress(&namespace, &name, SessionProgress::ReadinessFailure)
                    .await?;
                Ok(ReconcileAction::Done)
            }

            SessionState::ReadinessResourcesFailure => {
                self.log_pod_failure(&name, &namespace, &observed).await;
                self.update_progress(&namespace, &name, SessionProgress::ReadinessFailure)
                    .await?;
                Ok(ReconcileAction::Done)
            }

            SessionState::ReadinessSuccess => {
                self.publish_ready(&namespace, &name, &observed).await?;
                Ok(ReconcileAction::Done)
            }

            SessionState::SessionResourcesFailure => {
                self.log_pod_failure(&name, &namespace, &observed).await;
                self.update_progress(&namespace, &name, SessionProgress::SessionFailure)
                    .await?;
                Ok(ReconcileAction::Done)
            }

            SessionState::ReadinessFailedDirty | SessionState::SessionFailedDirty => {
                // The failed pod stays around for diagnosis; only the
                // service goes away so clients cannot connect.
                self.cleanup_service(&namespace, &observed).await?;
                Ok(ReconcileAction::Done)
            }

            SessionState::ValidationFailed
            | SessionState::ReadinessFailedClean
            | SessionState::SessionFailedClean
            | SessionState::SessionRunning => Ok(ReconcileAction::Done),
        }
    }

    /// Create whichever required children are missing. Already-exists
    /// conflicts are successes: list consistency lags behind creates and a
    /// later reconcile converges.
    async fn try_create_resources(
        &self,
        session: &DatamoverSession,
        namespace: &str,
        observed: &ObservedResources,
    ) -> OperatorResult<()> {
        let name = session.name_any();
        let owner = session
            .controller_owner_ref(&())
            .ok_or_else(|| OperatorError::InvalidSession {
                name: name.clone(),
                reason: "session has no uid and cannot own child resources".to_string(),
            })?;

        if observed.pod.is_none() {
            let mut pod = resources::build_pod(session)?;
            pod.metadata.owner_references = Some(vec![owner.clone()]);

            let pods: Api<Pod> = Api::namespaced(self.ctx.client.clone(), namespace);
            match pods.create(&PostParams::default(), &pod).await {
                Ok(created) => {
                    tracing::info!(name = %name, pod = %created.name_any(), "Created session pod");
                }
                Err(kube::Error::Api(err)) if err.code == 409 => {
                    tracing::debug!(name = %name, "Session pod already exists");
                }
                Err(err) => {
                    tracing::error!(name = %name, error = %err, "Failed to create session pod");
                    return Err(err.into());
                }
            }
        }

        if observed.need_service && observed.service.is_none() {
            let mut service = resources::build_service(session);
            service.metadata.owner_references = Some(vec![owner.clone()]);

            let services: Api<Service> = Api::namespaced(self.ctx.client.clone(), namespace);
            match services.create(&PostParams::default(), &service).await {
                Ok(created) => {
                    tracing::info!(name = %name, service = %created.name_any(), "Created session service");
                }
                Err(kube::Error::Api(err)) if err.code == 409 => {
                    tracing::debug!(name = %name, "Session service already exists");
                }
                Err(err) => {
                    tracing::error!(name = %name, error = %err, "Failed to create session service");
                    return Err(err.into());
                }
            }
        }

        if let Some(mut policy) = resources::build_network_policy(session) {
            policy.metadata.owner_references = Some(vec![owner]);

            let policies: Api<NetworkPolicy> =
                Api::namespaced(self.ctx.client.clone(), namespace);
            match policies.create(&PostParams::default(), &policy).await {
                Ok(created) => {
                    tracing::info!(name = %name, policy = %created.name_any(), "Created network policy");
                }
                Err(kube::Error::Api(err)) if err.code == 409 => {
                    tracing::debug!(name = %name, "Network policy already exists");
                }
                Err(err) => {
                    tracing::error!(name = %name, error = %err, "Failed to create network policy");
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }

    /// Delete the session service, if it still exists.
    async fn cleanup_service(
        &self,
        namespace: &str,
        observed: &ObservedResources,
    ) -> OperatorResult<()> {
        let Some(service) = &observed.service else {
            return Ok(());
        };
        let services: Api<Service> = Api::namespaced(self.ctx.client.clone(), namespace);
        services
            .delete(&service.name_any(), &DeleteParams::default())
            .await?;
        tracing::info!(service = %service.name_any(), "Deleted session service");
        Ok(())
    }

    /// Record the progress value. Session info is untouched.
    async fn update_progress(
        &self,
        namespace: &str,
        name: &str,
        progress: SessionProgress,
    ) -> OperatorResult<()> {
        let status = DatamoverSessionStatus {
            progress: Some(progress),
            session_info: None,
        };
        self.patch_status(namespace, name, &status).await?;
        tracing::info!(name = %name, progress = %progress, "Updated session progress");
        Ok(())
    }

    /// Record Ready together with the session info, in one status write.
    /// This is the only place session data is ever written.
    async fn publish_ready(
        &self,
        namespace: &str,
        name: &str,
        observed: &ObservedResources,
    ) -> OperatorResult<()> {
        let pod = observed
            .pod
            .as_ref()
            .ok_or_else(|| OperatorError::InvariantViolation {
                name: name.to_string(),
                reason: "pod cannot be missing when publishing readiness".to_string(),
            })?;
        let readiness =
            observed
                .pod_readiness
                .as_ref()
                .ok_or_else(|| OperatorError::InvariantViolation {
                    name: name.to_string(),
                    reason: "pod readiness cannot be missing when publishing readiness"
                        .to_string(),
                })?;

        let status = DatamoverSessionStatus {
            progress: Some(SessionProgress::Ready),
            session_info: Some(SessionInfo {
                pod_name: pod.name_any(),
                service_name: observed
                    .service
                    .as_ref()
                    .map(|service| service.name_any())
                    .unwrap_or_default(),
                session_data: readiness.data.clone(),
            }),
        };
        self.patch_status(namespace, name, &status).await?;
        tracing::info!(name = %name, "Session is ready");
        Ok(())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DatamoverSessionStatus,
    ) -> OperatorResult<()> {
        let sessions: Api<DatamoverSession> =
            Api::namespaced(self.ctx.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        sessions
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    /// Best-effort failure diagnostics; never masks the status transition.
    async fn log_pod_failure(&self, name: &str, namespace: &str, observed: &ObservedResources) {
        let Some(pod) = &observed.pod else {
            tracing::warn!(name = %name, "Session failed with no pod left to inspect");
            return;
        };
        match self.pod_failure_details(pod, namespace).await {
            Ok(details) if !details.is_empty() => {
                tracing::warn!(name = %name, pod = %pod.name_any(), details = %details, "Session pod failed");
            }
            Ok(_) => {
                tracing::warn!(name = %name, pod = %pod.name_any(), "Session pod failed");
            }
            Err(err) => {
                tracing::debug!(name = %name, error = %err, "Could not collect pod failure details");
            }
        }
    }
}

/// Handle errors during reconciliation: requeue with a delay and let the
/// next reconcile re-derive everything from scratch.
pub fn error_policy(
    _session: Arc<DatamoverSession>,
    error: &OperatorError,
    _ctx: Arc<ControllerContext>,
) -> kube::runtime::controller::Action {
    tracing::error!(error = %error, "Reconciliation error");
    kube::runtime::controller::Action::requeue(std::time::Duration::from_secs(30))
}
