//! DatamoverSession Custom Resource Definition.
//!
//! Defines a datamover session: one long-lived server pod paired with an
//! optional service. The spec is treated as immutable after creation; the
//! status carries the monotonic [`SessionProgress`] and, once ready, the
//! [`SessionInfo`] clients use to connect.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, PodSecurityContext, Probe, ResourceRequirements,
    SecretVolumeSource, SecurityContext, ServicePort, Volume,
};
use k8s_openapi::api::networking::v1::NetworkPolicyPeer;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment variable carrying `spec.implementation` into the main container.
pub const IMPLEMENTATION_ENV_VAR: &str = "DATAMOVER_NAME";
/// Environment variable carrying the serialized service ports into the main container.
pub const PROTOCOLS_ENV_VAR: &str = "PROTOCOLS";
/// Name of the session pod's main container.
pub const MAIN_CONTAINER_NAME: &str = "main";
/// Name of the session-data sidecar init container.
pub const SESSION_DATA_CONTAINER_NAME: &str = "session-data-read";
/// Label targeting the session pod for service selection and network policy.
pub const SESSION_SELECTOR_LABEL: &str = "datamover.io/selector";
/// Label identifying the owning session on child resources.
pub const SESSION_LABEL: &str = "datamover.io/session";

/// Mount path of the implementation configuration config map.
pub const CONFIG_MOUNT_PATH: &str = "/etc/config";
/// Root under which configuration secrets are mounted, one directory per name.
pub const SECRETS_MOUNT_ROOT: &str = "/etc/secrets";
/// Mount path of the client credentials secret.
pub const CLIENT_CREDENTIALS_MOUNT_PATH: &str = "/etc/client_credentials";
/// Mount path of the in-memory session-data volume, shared with the sidecar.
pub const SESSION_MOUNT_PATH: &str = "/etc/session";
/// Root under which extra volumes are mounted, one directory per volume name.
pub const EXTRA_VOLUMES_MOUNT_ROOT: &str = "/mnt/volumes";

/// DatamoverSession is the Schema for the datamoversessions API.
///
/// A session declares a data-mover endpoint. Sessions with a `lifecycle`
/// config get a pod (and a service when ports are declared) managed by the
/// operator; sessions without one are ignored entirely.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "datamover.io",
    version = "v1alpha1",
    kind = "DatamoverSession",
    plural = "datamoversessions",
    shortname = "dms",
    namespaced,
    status = "DatamoverSessionStatus",
    printcolumn = r#"{"name":"Implementation", "type":"string", "jsonPath":".spec.implementation"}"#,
    printcolumn = r#"{"name":"Progress", "type":"string", "jsonPath":".status.progress"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatamoverSessionSpec {
    /// Identifier of the datamover implementation, exposed to the session
    /// pod through the `DATAMOVER_NAME` environment variable.
    pub implementation: String,

    /// Config map with implementation specific configuration, mounted at
    /// `/etc/config`.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "config")]
    pub configuration: Option<ConfigMapVolumeSource>,

    /// Secrets extending the implementation configuration, each mounted at
    /// `/etc/secrets/<name>`.
    #[serde(
        default,
        skip_serializing_if = "std::collections::BTreeMap::is_empty",
        rename = "secrets"
    )]
    pub configuration_secrets: BTreeMap<String, SecretVolumeSource>,

    /// Client credentials secret, mounted at `/etc/client_credentials`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_ref: Option<SecretVolumeSource>,

    /// Implementation specific environment passed to the session pod.
    /// The reserved `PROTOCOLS` key may not be set here.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Opts the session into operator managed pod lifecycle. Sessions
    /// without it are skipped by the reconciler.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "lifecycle")]
    pub lifecycle_config: Option<LifecycleConfig>,
}

/// Lifecycle configuration of an operator managed session pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleConfig {
    /// Image of the session's main container.
    pub image: String,

    /// Ports to expose via a service. No service is created when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_ports: Vec<ServicePort>,

    /// Controls whether an ingress network policy is created for the pod.
    #[serde(default)]
    pub network_policy: NetworkPolicyConfig,

    /// Extra configuration for the session pod.
    #[serde(default)]
    pub pod_options: PodOptions,

    /// Startup probe for the main container.
    /// More info: <https://kubernetes.io/docs/concepts/workloads/pods/pod-lifecycle#container-probes>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_probe: Option<Probe>,

    /// Liveness probe for the main container.
    /// More info: <https://kubernetes.io/docs/concepts/workloads/pods/pod-lifecycle#container-probes>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Probe>,
}

/// Ingress network-policy configuration for the session pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyConfig {
    /// Whether the network policy should be created. Requires service ports.
    #[serde(default)]
    pub enabled: bool,

    /// Peers allowed to reach the session's service ports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<NetworkPolicyPeer>,
}

/// Strategic-merge override document applied to the generated pod spec.
pub type PodOverride = serde_json::Map<String, serde_json::Value>;

/// Extra configuration passed through to the session pod.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodOptions {
    /// Resource requirements of the main container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Additional volumes, mounted at `/mnt/volumes/<name>`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_volumes: Vec<Volume>,

    /// Labels to add to the session pod. The operator managed labels are
    /// forbidden here.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Annotations to add to the session pod.
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Additional containers to run in the pod.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_containers: Vec<Container>,

    /// Pod priorityClassName.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Pod security context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,

    /// Security context of the main container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_security_context: Option<SecurityContext>,

    /// Share a single process namespace between all containers in the pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_process_namespace: Option<bool>,

    /// Service account of the session pod. Setting it also turns on
    /// service-account token automounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Image pull policy of the main container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Strategic-merge override applied to the generated pod spec.
    /// `metadata` and `initContainers` may not be overridden.
    #[serde(default, skip_serializing_if = "PodOverride::is_empty")]
    pub pod_override: PodOverride,
}

/// Observed state of a DatamoverSession.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatamoverSessionStatus {
    /// Connection information, populated once when the session becomes
    /// ready and never rewritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,

    /// High-level progress of the session. Advances monotonically; the
    /// failure values are terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<SessionProgress>,
}

/// Information clients need to build the endpoint URL of a ready session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Name of the session pod.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod_name: String,

    /// Name of the session service; empty when no ports were declared.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_name: String,

    /// Opaque payload published by the session through the session-data
    /// sidecar. May legitimately be empty.
    #[serde(default, skip_serializing_if = "String::is_empty", rename = "data")]
    pub session_data: String,
}

/// Progress of a DatamoverSession. Absent progress means reconciliation has
/// not advanced past validation yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum SessionProgress {
    /// The session spec was rejected. Terminal.
    ValidationFailed,
    /// The session pod (and service, when needed) exist.
    ResourcesCreated,
    /// The session failed before becoming ready. Terminal.
    ReadinessFailure,
    /// The session is ready and its endpoint is published.
    Ready,
    /// The session failed after being ready. Terminal.
    SessionFailure,
}

impl SessionProgress {
    /// Terminal progress values never transition again; the session must be
    /// deleted and recreated.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionProgress::ValidationFailed
                | SessionProgress::ReadinessFailure
                | SessionProgress::SessionFailure
        )
    }
}

impl fmt::Display for SessionProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionProgress::ValidationFailed => "ValidationFailed",
            SessionProgress::ResourcesCreated => "ResourcesCreated",
            SessionProgress::ReadinessFailure => "ReadinessFailure",
            SessionProgress::Ready => "Ready",
            SessionProgress::SessionFailure => "SessionFailure",
        };
        f.write_str(name)
    }
}
