//! Extraction of session data from the sidecar's log stream.
//!
//! The session-data sidecar publishes an opaque payload over its stdout.
//! The contract is load bearing for both sides: the sidecar prints the
//! start marker, waits for the ready marker file, prints the base64 payload
//! and the end marker, then stays alive. The operator reads the logs and
//! takes the trimmed substring between the *last* start marker and the
//! *last* end marker, so a restarted sidecar overrides its earlier output.

use kube::api::{Api, LogParams};
use kube::ResourceExt;

use super::session::SessionController;
use crate::crd::SESSION_DATA_CONTAINER_NAME;
use crate::error::OperatorResult;
use k8s_openapi::api::core::v1::Pod;

/// Marker line opening the session data block on the sidecar's stdout.
pub(crate) const DATA_START_MARKER: &str = "---";
/// Marker line closing the session data block on the sidecar's stdout.
pub(crate) const DATA_END_MARKER: &str = "___";

/// Extract the session data payload from the sidecar logs.
///
/// Returns `None` when the markers are missing or malformed, meaning the
/// data is not known yet; an empty payload between valid markers is
/// acceptable and returns `Some("")`.
pub fn extract_session_data(logs: &str) -> Option<String> {
    let start = logs.rfind(DATA_START_MARKER)?;
    let end = logs.rfind(DATA_END_MARKER)?;
    let payload = logs.get(start + DATA_START_MARKER.len()..end)?;
    Some(payload.trim().to_string())
}

impl SessionController {
    /// Read the sidecar logs of a session pod and extract the session data.
    ///
    /// `None` means the logs were read but did not contain the marker
    /// sequence yet (or the pod has no sidecar status at all); log-stream
    /// errors surface as errors and are retried on the next reconcile.
    pub(crate) async fn fetch_session_data(
        &self,
        pod: &Pod,
        namespace: &str,
    ) -> OperatorResult<Option<String>> {
        let has_sidecar = pod
            .status
            .as_ref()
            .and_then(|status| status.init_container_statuses.as_ref())
            .into_iter()
            .flatten()
            .any(|status| status.name == SESSION_DATA_CONTAINER_NAME);
        if !has_sidecar {
            return Ok(None);
        }

        let pods: Api<Pod> = Api::namespaced(self.ctx.client.clone(), namespace);
        let params = LogParams {
            container: Some(SESSION_DATA_CONTAINER_NAME.to_string()),
            ..LogParams::default()
        };
        let logs = pods.logs(&pod.name_any(), &params).await?;

        Ok(extract_session_data(&logs))
    }
}
