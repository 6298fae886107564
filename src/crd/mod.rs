//! Custom Resource Definitions for the datamover operator.
//!
//! A single CRD is managed here:
//!
//! - [`DatamoverSession`]: a long-lived data-mover server pod plus an
//!   optional service, acting as a remote endpoint for backup/restore
//!   client workloads.

mod session;

pub use session::{
    DatamoverSession, DatamoverSessionSpec, DatamoverSessionStatus, LifecycleConfig,
    NetworkPolicyConfig, PodOptions, PodOverride, SessionInfo, SessionProgress,
    CLIENT_CREDENTIALS_MOUNT_PATH, CONFIG_MOUNT_PATH, EXTRA_VOLUMES_MOUNT_ROOT,
    IMPLEMENTATION_ENV_VAR, MAIN_CONTAINER_NAME, PROTOCOLS_ENV_VAR, SECRETS_MOUNT_ROOT,
    SESSION_DATA_CONTAINER_NAME, SESSION_LABEL, SESSION_MOUNT_PATH, SESSION_SELECTOR_LABEL,
};
