//! Observation of a session's child resources.
//!
//! Collects the pod and service belonging to a session, verifies ownership
//! through controller-owner references (foreign resources are reported,
//! never adopted), and computes pod readiness including the session-data
//! extraction.

use k8s_openapi::api::core::v1::{ContainerStatus, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, LogParams};
use kube::{Resource, ResourceExt};

use super::session::SessionController;
use super::state::{ObservedResources, Readiness};
use crate::crd::{
    DatamoverSession, MAIN_CONTAINER_NAME, SESSION_DATA_CONTAINER_NAME, SESSION_LABEL,
};
use crate::error::{OperatorError, OperatorResult};
use crate::resources::service_name;

impl SessionController {
    /// Collect the session's child resources and compute pod readiness.
    pub(crate) async fn observe(
        &self,
        session: &DatamoverSession,
        namespace: &str,
    ) -> OperatorResult<ObservedResources> {
        let pod = self.get_pod(session, namespace).await?;
        let pod_readiness = match &pod {
            Some(pod) => Some(self.get_readiness(pod, namespace).await?),
            None => None,
        };

        let need_service = session
            .spec
            .lifecycle_config
            .as_ref()
            .is_some_and(|lifecycle| !lifecycle.service_ports.is_empty());
        let service = if need_service {
            self.get_service(session, namespace).await?
        } else {
            None
        };

        Ok(ObservedResources {
            pod,
            pod_readiness,
            service,
            need_service,
        })
    }

    /// Find the session pod by the session label, keeping only pods whose
    /// controller-owner reference matches the session. Zero is fine, more
    /// than one is a hard error.
    async fn get_pod(
        &self,
        session: &DatamoverSession,
        namespace: &str,
    ) -> OperatorResult<Option<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.ctx.client.clone(), namespace);
        let selector = format!("{SESSION_LABEL}={}", session.name_any());
        let list = pods.list(&ListParams::default().labels(&selector)).await?;

        let mut matching = Vec::new();
        for pod in list {
            if is_owned_by(&pod.metadata, session) {
                matching.push(pod);
            } else {
                tracing::info!(
                    pod = %pod.name_any(),
                    namespace = %namespace,
                    "Found pod not matching owner reference of the session"
                );
            }
        }

        match matching.len() {
            0 => Ok(None),
            1 => Ok(matching.pop()),
            _ => Err(OperatorError::MultiplePods(session.name_any())),
        }
    }

    /// Fetch the session service by its deterministic name. A service under
    /// that name owned by someone else is an error, not a candidate.
    async fn get_service(
        &self,
        session: &DatamoverSession,
        namespace: &str,
    ) -> OperatorResult<Option<Service>> {
        let services: Api<Service> = Api::namespaced(self.ctx.client.clone(), namespace);
        let name = service_name(session);
        match services.get(&name).await {
            Ok(service) if is_owned_by(&service.metadata, session) => Ok(Some(service)),
            Ok(_) => Err(OperatorError::ForeignResource {
                kind: "Service".to_string(),
                name,
                session: session.name_any(),
            }),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Compute pod readiness. The pod only counts as ready once the session
    /// data could be extracted from the sidecar logs; probes succeeding
    /// without the marker sequence keep readiness false.
    async fn get_readiness(&self, pod: &Pod, namespace: &str) -> OperatorResult<Readiness> {
        if is_pod_ready(pod) {
            if let Some(data) = self.fetch_session_data(pod, namespace).await? {
                return Ok(Readiness { ready: true, data });
            }
        }
        Ok(Readiness::default())
    }

    /// Best-effort diagnostics for a failed session pod: main container
    /// waiting/terminated state plus any ERROR lines from its logs.
    pub(crate) async fn pod_failure_details(
        &self,
        pod: &Pod,
        namespace: &str,
    ) -> OperatorResult<String> {
        let mut details = Vec::new();

        let statuses = pod
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.as_ref());
        for status in statuses.into_iter().flatten() {
            if status.name != MAIN_CONTAINER_NAME || status.ready {
                continue;
            }
            if let Some(waiting) = status.state.as_ref().and_then(|state| state.waiting.as_ref()) {
                details.push(format!(
                    "Waiting to run main container: {} {}",
                    waiting.reason.as_deref().unwrap_or_default(),
                    waiting.message.as_deref().unwrap_or_default()
                ));
            }
            if let Some(terminated) = status
                .state
                .as_ref()
                .and_then(|state| state.terminated.as_ref())
            {
                details.push(format!(
                    "Main container terminated: {} {}",
                    terminated.reason.as_deref().unwrap_or_default(),
                    terminated.message.as_deref().unwrap_or_default()
                ));
            }
        }

        let pods: Api<Pod> = Api::namespaced(self.ctx.client.clone(), namespace);
        let params = LogParams {
            container: Some(MAIN_CONTAINER_NAME.to_string()),
            ..LogParams::default()
        };
        let logs = pods.logs(&pod.name_any(), &params).await?;
        details.extend(
            logs.lines()
                .filter(|line| line.contains("ERROR"))
                .map(str::to_string),
        );

        Ok(details.join("\n"))
    }
}

/// Whether the controller-owner reference of a resource matches the session
/// by group, version, kind, name and uid.
fn is_owned_by(meta: &ObjectMeta, session: &DatamoverSession) -> bool {
    let Some(owner) = meta
        .owner_references
        .as_deref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
    else {
        return false;
    };

    let (group, version) = owner
        .api_version
        .split_once('/')
        .unwrap_or(("", owner.api_version.as_str()));

    group == DatamoverSession::group(&()).as_ref()
        && version == DatamoverSession::version(&()).as_ref()
        && owner.kind == DatamoverSession::kind(&()).as_ref()
        && owner.name == session.name_any()
        && session.uid().as_deref() == Some(owner.uid.as_str())
}

/// Whether the pod is running and both the main container and the sidecar
/// have started and pass their probes.
fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    container_ready(status.container_statuses.as_deref(), MAIN_CONTAINER_NAME)
        && container_ready(
            status.init_container_statuses.as_deref(),
            SESSION_DATA_CONTAINER_NAME,
        )
}

fn container_ready(statuses: Option<&[ContainerStatus]>, name: &str) -> bool {
    statuses
        .into_iter()
        .flatten()
        .find(|status| status.name == name)
        .is_some_and(|status| status.started == Some(true) && status.ready)
}
