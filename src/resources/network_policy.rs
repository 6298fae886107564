//! Ingress network-policy construction for the session pod.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::service::service_name;
use crate::crd::{DatamoverSession, SESSION_LABEL, SESSION_SELECTOR_LABEL};

/// Build the ingress policy allowing the configured peers to reach the
/// session's service ports. `None` unless the policy is enabled and ports
/// are declared.
pub fn build_network_policy(session: &DatamoverSession) -> Option<NetworkPolicy> {
    let lifecycle = session.spec.lifecycle_config.as_ref()?;
    if !lifecycle.network_policy.enabled || lifecycle.service_ports.is_empty() {
        return None;
    }

    let name = session.name_any();
    let labels = BTreeMap::from([
        ("name".to_string(), name.clone()),
        (SESSION_LABEL.to_string(), name.clone()),
        (SESSION_SELECTOR_LABEL.to_string(), service_name(session)),
    ]);
    let pod_selector = BTreeMap::from([
        (SESSION_SELECTOR_LABEL.to_string(), name.clone()),
        (SESSION_LABEL.to_string(), name.clone()),
    ]);

    Some(NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: session.namespace(),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector {
                match_labels: Some(pod_selector),
                match_expressions: None,
            },
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(lifecycle.network_policy.from.clone()),
                ports: Some(network_policy_ports(&lifecycle.service_ports)),
            }]),
            ..NetworkPolicySpec::default()
        }),
    })
}

fn network_policy_ports(ports: &[ServicePort]) -> Vec<NetworkPolicyPort> {
    ports
        .iter()
        .map(|port| NetworkPolicyPort {
            protocol: port.protocol.clone(),
            port: Some(IntOrString::Int(port.port)),
            end_port: None,
        })
        .collect()
}
