//! Session spec validation.
//!
//! Runs at the Init transition, before any child resource is created. A
//! failure here is terminal: progress moves to `ValidationFailed` and the
//! user must delete and recreate the session.

use crate::crd::{
    DatamoverSession, LifecycleConfig, MAIN_CONTAINER_NAME, PROTOCOLS_ENV_VAR,
    SESSION_DATA_CONTAINER_NAME, SESSION_LABEL, SESSION_SELECTOR_LABEL,
};
use crate::error::{OperatorError, OperatorResult};
use crate::podoverride;
use crate::resources::{CLIENT_CREDS_VOLUME_NAME, CONFIG_VOLUME_NAME, SESSION_DATA_VOLUME_NAME};

/// Validate a session spec. Sessions without a lifecycle config always pass
/// since the operator ignores them entirely.
pub fn validate_session(session: &DatamoverSession) -> OperatorResult<()> {
    if let Some(lifecycle) = &session.spec.lifecycle_config {
        validate_env(session)?;
        validate_pod_labels(session)?;
        validate_session_for_pod(session)?;
        validate_reserved_names(session)?;
        validate_network_policy_config(session)?;
        podoverride::validate_override(&lifecycle.pod_options.pod_override)?;
    }
    Ok(())
}

fn validate_pod_labels(session: &DatamoverSession) -> OperatorResult<()> {
    let Some(lifecycle) = &session.spec.lifecycle_config else {
        return Ok(());
    };
    for reserved in [SESSION_SELECTOR_LABEL, SESSION_LABEL] {
        if lifecycle.pod_options.labels.contains_key(reserved) {
            return Err(OperatorError::Validation(format!(
                "label {reserved} not allowed"
            )));
        }
    }
    Ok(())
}

fn validate_env(session: &DatamoverSession) -> OperatorResult<()> {
    if session.spec.env.contains_key(PROTOCOLS_ENV_VAR) {
        return Err(OperatorError::Validation(format!(
            "env {PROTOCOLS_ENV_VAR} not allowed"
        )));
    }
    Ok(())
}

/// The subset of validation required to build a pod at all. Also used by
/// the pod builder, which returns the lifecycle config on success.
pub(crate) fn validate_session_for_pod(
    session: &DatamoverSession,
) -> OperatorResult<&LifecycleConfig> {
    let Some(lifecycle) = &session.spec.lifecycle_config else {
        return Err(OperatorError::Validation(
            "can only create pods for lifecycle sessions".to_string(),
        ));
    };
    if session.spec.implementation.is_empty() {
        return Err(OperatorError::Validation(
            "session must have implementation set".to_string(),
        ));
    }
    if lifecycle.image.is_empty() {
        return Err(OperatorError::Validation(
            "session must have lifecycle.image set".to_string(),
        ));
    }
    Ok(lifecycle)
}

/// Names reserved for operator managed containers and volumes may not
/// collide with user supplied extras; the pod must end up with exactly one
/// main container and one session-data sidecar.
fn validate_reserved_names(session: &DatamoverSession) -> OperatorResult<()> {
    let Some(lifecycle) = &session.spec.lifecycle_config else {
        return Ok(());
    };
    for container in &lifecycle.pod_options.extra_containers {
        if container.name == MAIN_CONTAINER_NAME || container.name == SESSION_DATA_CONTAINER_NAME {
            return Err(OperatorError::Validation(format!(
                "extra container name {} is reserved",
                container.name
            )));
        }
    }
    for volume in &lifecycle.pod_options.extra_volumes {
        if [
            SESSION_DATA_VOLUME_NAME,
            CONFIG_VOLUME_NAME,
            CLIENT_CREDS_VOLUME_NAME,
        ]
        .contains(&volume.name.as_str())
        {
            return Err(OperatorError::Validation(format!(
                "extra volume name {} is reserved",
                volume.name
            )));
        }
    }
    Ok(())
}

fn validate_network_policy_config(session: &DatamoverSession) -> OperatorResult<()> {
    let Some(lifecycle) = &session.spec.lifecycle_config else {
        return Ok(());
    };
    if lifecycle.network_policy.enabled && lifecycle.service_ports.is_empty() {
        return Err(OperatorError::Validation(
            "servicePorts should be set to create a network policy".to_string(),
        ));
    }
    Ok(())
}
