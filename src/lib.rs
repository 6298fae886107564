//! Kubernetes operator managing datamover sessions.
//!
//! A [`DatamoverSession`] declares a long-lived data-mover server pod plus
//! an optional service. The operator drives the cluster toward a running,
//! ready session, captures the opaque session data the pod publishes
//! through its sidecar, and exposes the endpoint in the session status for
//! client workloads.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: datamover.io/v1alpha1
//! kind: DatamoverSession
//! metadata:
//!   name: restore-target
//! spec:
//!   implementation: kopia
//!   lifecycle:
//!     image: ghcr.io/example/kopia-session:latest
//!     servicePorts:
//!       - name: grpc
//!         port: 51000
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod podoverride;
pub mod resources;
pub mod session;

pub use crd::{DatamoverSession, DatamoverSessionSpec, DatamoverSessionStatus, SessionProgress};
pub use error::{OperatorError, OperatorResult};
