//! Builders for the session's child resources.
//!
//! All builders are pure functions of the session spec: the same session
//! always produces the same pod, service, and network policy. Owner
//! references are attached by the controller at create time so the
//! builders stay deterministic and table-testable.

mod network_policy;
mod pod;
mod service;

pub use network_policy::build_network_policy;
pub use pod::build_pod;
pub use service::{build_service, service_name};

pub(crate) use pod::{CLIENT_CREDS_VOLUME_NAME, CONFIG_VOLUME_NAME, SESSION_DATA_VOLUME_NAME};
