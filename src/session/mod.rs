//! Client-side helpers for consuming datamover sessions.
//!
//! Client workloads connect to a ready session through its published
//! endpoint: the deterministic service DNS name plus the declared service
//! ports. These helpers build that endpoint map and wait for a session to
//! become ready (or fail terminally).

use std::collections::BTreeMap;
use std::time::Duration;

use kube::api::Api;
use kube::ResourceExt;

use crate::crd::{DatamoverSession, SessionProgress};
use crate::error::{OperatorError, OperatorResult};

const CLUSTER_LOCAL_DOMAIN: &str = "svc.cluster.local";

/// Default timeout for [`wait_for_ready`].
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default polling interval for [`wait_for_ready`].
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// Cluster-internal DNS name of a session's service.
pub fn service_dns_name(service_name: &str, namespace: &str) -> String {
    format!("{service_name}.{namespace}.{CLUSTER_LOCAL_DOMAIN}")
}

/// Endpoint address per named service port of a ready session.
///
/// Fails when the session is not namespaced or never published a service.
pub fn service_endpoints(session: &DatamoverSession) -> OperatorResult<BTreeMap<String, String>> {
    let name = session.name_any();
    let Some(namespace) = session.namespace() else {
        return Err(OperatorError::InvalidSession {
            name,
            reason: "session must be namespaced".to_string(),
        });
    };

    let info = session
        .status
        .as_ref()
        .and_then(|status| status.session_info.as_ref())
        .filter(|info| !info.service_name.is_empty())
        .ok_or_else(|| OperatorError::InvalidSession {
            name: name.clone(),
            reason: "session does not expose a service".to_string(),
        })?;

    let host = service_dns_name(&info.service_name, &namespace);
    let ports = session
        .spec
        .lifecycle_config
        .as_ref()
        .map(|lifecycle| lifecycle.service_ports.as_slice())
        .unwrap_or_default();

    Ok(ports
        .iter()
        .map(|port| {
            (
                port.name.clone().unwrap_or_default(),
                format!("{host}:{}", port.port),
            )
        })
        .collect())
}

/// Whether the session reached Ready.
pub fn is_ready(session: &DatamoverSession) -> bool {
    progress(session) == Some(SessionProgress::Ready)
}

/// Whether the session reached a terminal failure.
pub fn is_terminated(session: &DatamoverSession) -> bool {
    progress(session).is_some_and(SessionProgress::is_terminal)
}

fn progress(session: &DatamoverSession) -> Option<SessionProgress> {
    session.status.as_ref().and_then(|status| status.progress)
}

/// Poll a session until it is ready, using the default timeout and interval.
pub async fn wait_for_ready(
    api: &Api<DatamoverSession>,
    name: &str,
) -> OperatorResult<DatamoverSession> {
    wait_for_ready_with_timeout(api, name, DEFAULT_WAIT_TIMEOUT, DEFAULT_WAIT_INTERVAL).await
}

/// Poll a session until it is ready, a terminal failure is reached, or the
/// timeout expires.
pub async fn wait_for_ready_with_timeout(
    api: &Api<DatamoverSession>,
    name: &str,
    timeout: Duration,
    interval: Duration,
) -> OperatorResult<DatamoverSession> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let session = api.get(name).await?;
        if is_ready(&session) {
            return Ok(session);
        }
        if is_terminated(&session) {
            return Err(OperatorError::SessionTerminated(name.to_string()));
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(OperatorError::WaitTimeout(name.to_string()));
        }
        tokio::time::sleep(interval).await;
    }
}
