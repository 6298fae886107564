//! Session service construction.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{DatamoverSession, SESSION_LABEL, SESSION_SELECTOR_LABEL};

/// Deterministic name of a session's service. No collision retry: the name
/// is derived from the session name and ownership is verified on reads.
pub fn service_name(session: &DatamoverSession) -> String {
    format!("{}-service", session.name_any())
}

/// Build the service exposing the session pod. Ports are passed through
/// verbatim; the selector targets the operator managed pod label.
pub fn build_service(session: &DatamoverSession) -> Service {
    let name = service_name(session);
    let ports = session
        .spec
        .lifecycle_config
        .as_ref()
        .map(|lifecycle| lifecycle.service_ports.clone())
        .unwrap_or_default();

    let labels = BTreeMap::from([
        ("name".to_string(), name.clone()),
        (SESSION_LABEL.to_string(), session.name_any()),
    ]);
    let selector = BTreeMap::from([(SESSION_SELECTOR_LABEL.to_string(), session.name_any())]);

    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: session.namespace(),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(selector),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DatamoverSessionSpec, LifecycleConfig};
    use k8s_openapi::api::core::v1::ServicePort;

    fn session_with_ports(ports: Vec<ServicePort>) -> DatamoverSession {
        let mut session = DatamoverSession::new(
            "foo-datamover",
            DatamoverSessionSpec {
                implementation: "foo_impl".to_string(),
                configuration: None,
                configuration_secrets: Default::default(),
                client_secret_ref: None,
                env: Default::default(),
                lifecycle_config: Some(LifecycleConfig {
                    image: "foo_image".to_string(),
                    service_ports: ports,
                    ..LifecycleConfig::default()
                }),
            },
        );
        session.metadata.namespace = Some("backups".to_string());
        session
    }

    #[test]
    fn name_is_deterministic() {
        let session = session_with_ports(Vec::new());
        assert_eq!(service_name(&session), "foo-datamover-service");
    }

    #[test]
    fn service_shape() {
        let ports = vec![ServicePort {
            name: Some("something".to_string()),
            port: 2000,
            ..ServicePort::default()
        }];
        let service = build_service(&session_with_ports(ports.clone()));

        assert_eq!(service.metadata.name.as_deref(), Some("foo-datamover-service"));
        assert_eq!(service.metadata.namespace.as_deref(), Some("backups"));

        let labels = service.metadata.labels.as_ref().unwrap();
        assert_eq!(labels["name"], "foo-datamover-service");
        assert_eq!(labels[SESSION_LABEL], "foo-datamover");

        let spec = service.spec.as_ref().unwrap();
        assert_eq!(spec.ports.as_ref(), Some(&ports));
        let selector = spec.selector.as_ref().unwrap();
        assert_eq!(selector[SESSION_SELECTOR_LABEL], "foo-datamover");
    }
}
