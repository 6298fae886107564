//! Session pod construction.
//!
//! Builds the pod for a lifecycle session: the user's extra containers plus
//! the `main` container, the session-data sidecar as a restart-always init
//! container, and the volume set in a fixed order (extra volumes, config
//! map, client credentials, session-data tmpfs, configuration secrets).
//! The user's pod override document is applied last, to the pod spec only.

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, ExecAction, Pod, PodSpec, Probe, SecretVolumeSource,
    ServicePort, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::controller::{validate_session_for_pod, DATA_END_MARKER, DATA_START_MARKER};
use crate::crd::{
    DatamoverSession, CLIENT_CREDENTIALS_MOUNT_PATH, CONFIG_MOUNT_PATH, EXTRA_VOLUMES_MOUNT_ROOT,
    IMPLEMENTATION_ENV_VAR, MAIN_CONTAINER_NAME, PROTOCOLS_ENV_VAR, SECRETS_MOUNT_ROOT,
    SESSION_DATA_CONTAINER_NAME, SESSION_LABEL, SESSION_MOUNT_PATH, SESSION_SELECTOR_LABEL,
};
use crate::error::OperatorResult;
use crate::podoverride;

const SESSION_DATA_CONTAINER_IMAGE: &str = "busybox:latest";

pub(crate) const SESSION_DATA_VOLUME_NAME: &str = "session-data";
pub(crate) const CONFIG_VOLUME_NAME: &str = "config";
pub(crate) const CLIENT_CREDS_VOLUME_NAME: &str = "client-creds";

const READINESS_TIMEOUT_SECONDS: i32 = 600;
const READINESS_PERIOD_SECONDS: i32 = 1;

/// Build the session pod. Deterministic in the session spec.
pub fn build_pod(session: &DatamoverSession) -> OperatorResult<Pod> {
    let lifecycle = validate_session_for_pod(session)?;
    let name = session.name_any();

    let (volumes, mounts) = make_pod_volumes(session);

    let mut labels = lifecycle.pod_options.labels.clone();
    labels.insert(SESSION_SELECTOR_LABEL.to_string(), name.clone());
    labels.insert(SESSION_LABEL.to_string(), name.clone());

    let mut env = session.spec.env.clone();
    env.insert(
        IMPLEMENTATION_ENV_VAR.to_string(),
        session.spec.implementation.clone(),
    );
    env.insert(
        PROTOCOLS_ENV_VAR.to_string(),
        format_protocols_var(&lifecycle.service_ports),
    );
    let env_vars: Vec<EnvVar> = env
        .into_iter()
        .map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            value_from: None,
        })
        .collect();

    let main_container = Container {
        name: MAIN_CONTAINER_NAME.to_string(),
        image: Some(lifecycle.image.clone()),
        image_pull_policy: lifecycle.pod_options.image_pull_policy.clone(),
        volume_mounts: Some(mounts),
        readiness_probe: Some(readiness_probe()),
        startup_probe: lifecycle.startup_probe.clone(),
        liveness_probe: lifecycle.liveness_probe.clone(),
        env: Some(env_vars),
        resources: lifecycle.pod_options.resources.clone(),
        security_context: lifecycle.pod_options.container_security_context.clone(),
        ..Container::default()
    };

    let mut containers = lifecycle.pod_options.extra_containers.clone();
    containers.push(main_container);

    let generate_name = match session.metadata.generate_name.as_deref() {
        Some(generate_name) if !generate_name.is_empty() => generate_name.to_string(),
        _ => name,
    };

    let service_account_name = lifecycle.pod_options.service_account.clone();
    let automount = service_account_name
        .as_deref()
        .is_some_and(|account| !account.is_empty());

    let pod_spec = PodSpec {
        volumes: Some(volumes),
        priority_class_name: lifecycle.pod_options.priority_class_name.clone(),
        security_context: lifecycle.pod_options.pod_security_context.clone(),
        share_process_namespace: lifecycle.pod_options.share_process_namespace,
        containers,
        init_containers: Some(vec![session_data_container()]),
        restart_policy: Some("Never".to_string()),
        service_account_name,
        automount_service_account_token: Some(automount),
        ..PodSpec::default()
    };

    let pod_spec = podoverride::override_pod_spec(pod_spec, &lifecycle.pod_options.pod_override)?;

    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(generate_name),
            namespace: session.namespace(),
            labels: Some(labels),
            annotations: if lifecycle.pod_options.annotations.is_empty() {
                None
            } else {
                Some(lifecycle.pod_options.annotations.clone())
            },
            ..ObjectMeta::default()
        },
        spec: Some(pod_spec),
        status: None,
    })
}

/// Serialize the service ports for the `PROTOCOLS` variable as
/// `name:port[;name:port]...`, preferring `targetPort` when it resolves to
/// a non-zero integer.
fn format_protocols_var(ports: &[ServicePort]) -> String {
    let configs: Vec<String> = ports
        .iter()
        .map(|port| {
            let target = match &port.target_port {
                Some(IntOrString::Int(value)) => *value,
                Some(IntOrString::String(value)) => value.parse().unwrap_or(0),
                None => 0,
            };
            let number = if target == 0 { port.port } else { target };
            format!("{}:{}", port.name.as_deref().unwrap_or_default(), number)
        })
        .collect();
    configs.join(";")
}

/// Volumes and the main container's mounts, in a fixed order: extra
/// volumes, config map, client credentials, session-data, configuration
/// secrets.
fn make_pod_volumes(session: &DatamoverSession) -> (Vec<Volume>, Vec<VolumeMount>) {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    if let Some(lifecycle) = &session.spec.lifecycle_config {
        for volume in &lifecycle.pod_options.extra_volumes {
            mounts.push(VolumeMount {
                name: volume.name.clone(),
                mount_path: format!("{EXTRA_VOLUMES_MOUNT_ROOT}/{}", volume.name),
                ..VolumeMount::default()
            });
            volumes.push(volume.clone());
        }
    }

    if let Some(config) = &session.spec.configuration {
        volumes.push(Volume {
            name: CONFIG_VOLUME_NAME.to_string(),
            config_map: Some(config.clone()),
            ..Volume::default()
        });
        mounts.push(VolumeMount {
            name: CONFIG_VOLUME_NAME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        });
    }

    if let Some(secret) = &session.spec.client_secret_ref {
        volumes.push(secret_volume(CLIENT_CREDS_VOLUME_NAME, secret.clone()));
        mounts.push(VolumeMount {
            name: CLIENT_CREDS_VOLUME_NAME.to_string(),
            mount_path: CLIENT_CREDENTIALS_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        });
    }

    volumes.push(session_data_volume());
    mounts.push(session_data_volume_mount());

    for (name, secret) in &session.spec.configuration_secrets {
        mounts.push(VolumeMount {
            name: name.clone(),
            mount_path: format!("{SECRETS_MOUNT_ROOT}/{name}"),
            ..VolumeMount::default()
        });
        volumes.push(secret_volume(name, secret.clone()));
    }

    (volumes, mounts)
}

fn secret_volume(name: &str, secret: SecretVolumeSource) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(secret),
        ..Volume::default()
    }
}

/// The in-memory volume shared between the main container and the sidecar.
fn session_data_volume() -> Volume {
    Volume {
        name: SESSION_DATA_VOLUME_NAME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            size_limit: None,
        }),
        ..Volume::default()
    }
}

fn session_data_volume_mount() -> VolumeMount {
    VolumeMount {
        name: SESSION_DATA_VOLUME_NAME.to_string(),
        mount_path: SESSION_MOUNT_PATH.to_string(),
        ..VolumeMount::default()
    }
}

/// The restart-always init container publishing readiness and session data
/// over its stdout (see `controller::session_data` for the wire contract).
fn session_data_container() -> Container {
    Container {
        name: SESSION_DATA_CONTAINER_NAME.to_string(),
        image: Some(SESSION_DATA_CONTAINER_IMAGE.to_string()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            session_data_script(),
        ]),
        volume_mounts: Some(vec![session_data_volume_mount()]),
        restart_policy: Some("Always".to_string()),
        readiness_probe: Some(readiness_probe()),
        ..Container::default()
    }
}

fn session_data_script() -> String {
    format!(
        "echo '{start}'; \
         while [ ! -f {session}/ready ]; do sleep 1; done; \
         if [ -f {session}/data ]; then cat {session}/data | base64 -w0; fi; \
         echo '{end}'; \
         tail -f /dev/null",
        start = DATA_START_MARKER,
        end = DATA_END_MARKER,
        session = SESSION_MOUNT_PATH,
    )
}

/// Probe passing once the ready marker file exists on the shared session
/// volume. Used by the main container and the sidecar alike.
fn readiness_probe() -> Probe {
    Probe {
        timeout_seconds: Some(READINESS_TIMEOUT_SECONDS),
        period_seconds: Some(READINESS_PERIOD_SECONDS),
        exec: Some(ExecAction {
            command: Some(vec![
                "cat".to_string(),
                format!("{SESSION_MOUNT_PATH}/ready"),
            ]),
        }),
        ..Probe::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DatamoverSessionSpec, LifecycleConfig, PodOptions};
    use k8s_openapi::api::core::v1::{
        ConfigMapVolumeSource, PodSecurityContext, ResourceRequirements, SecurityContext,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn session(implementation: &str, image: &str) -> DatamoverSession {
        DatamoverSession::new(
            "foo-datamover",
            DatamoverSessionSpec {
                implementation: implementation.to_string(),
                configuration: None,
                configuration_secrets: BTreeMap::new(),
                client_secret_ref: None,
                env: BTreeMap::new(),
                lifecycle_config: Some(LifecycleConfig {
                    image: image.to_string(),
                    ..LifecycleConfig::default()
                }),
            },
        )
    }

    fn main_container(pod: &Pod) -> &Container {
        pod.spec
            .as_ref()
            .unwrap()
            .containers
            .iter()
            .find(|container| container.name == MAIN_CONTAINER_NAME)
            .expect("main container present")
    }

    fn env_of(container: &Container) -> BTreeMap<String, String> {
        container
            .env
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|var| (var.name.clone(), var.value.clone().unwrap_or_default()))
            .collect()
    }

    fn mount_path(container: &Container, volume: &str) -> Option<String> {
        container
            .volume_mounts
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|mount| mount.name == volume)
            .map(|mount| mount.mount_path.clone())
    }

    fn assert_base_pod(pod: &Pod, image: &str, implementation: &str) {
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[SESSION_SELECTOR_LABEL], "foo-datamover");
        assert_eq!(labels[SESSION_LABEL], "foo-datamover");

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));

        let main = main_container(pod);
        assert_eq!(main.image.as_deref(), Some(image));
        assert_eq!(main.readiness_probe, Some(readiness_probe()));
        let env = env_of(main);
        assert_eq!(env[IMPLEMENTATION_ENV_VAR], implementation);

        let init = spec.init_containers.as_ref().unwrap();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].name, SESSION_DATA_CONTAINER_NAME);
        assert_eq!(init[0].image.as_deref(), Some(SESSION_DATA_CONTAINER_IMAGE));
        assert_eq!(init[0].restart_policy.as_deref(), Some("Always"));
        assert_eq!(init[0].readiness_probe, Some(readiness_probe()));
    }

    #[test]
    fn no_lifecycle_fails() {
        let mut session = session("foo_impl", "foo_image");
        session.spec.lifecycle_config = None;
        assert!(build_pod(&session).is_err());
    }

    #[test]
    fn missing_implementation_fails() {
        assert!(build_pod(&session("", "foo_image")).is_err());
    }

    #[test]
    fn missing_image_fails() {
        assert!(build_pod(&session("foo_impl", "")).is_err());
    }

    #[test]
    fn image_and_implementation_are_sufficient() {
        let pod = build_pod(&session("foo_impl", "foo_image")).unwrap();
        assert_base_pod(&pod, "foo_image", "foo_impl");

        let main = main_container(&pod);
        let env = env_of(main);
        assert_eq!(env.len(), 2);
        assert_eq!(env[PROTOCOLS_ENV_VAR], "");

        // Only the session-data volume is mounted.
        assert_eq!(main.volume_mounts.as_deref().unwrap().len(), 1);
        assert_eq!(
            mount_path(main, SESSION_DATA_VOLUME_NAME).as_deref(),
            Some(SESSION_MOUNT_PATH)
        );

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.containers.len(), 1);
        assert_eq!(spec.automount_service_account_token, Some(false));
        assert!(main.liveness_probe.is_none());
        assert!(main.startup_probe.is_none());
        assert!(main.command.is_none());
        assert!(main.image_pull_policy.is_none());

        assert_eq!(pod.metadata.generate_name.as_deref(), Some("foo-datamover"));
        // The owner reference is attached at create time, not by the builder.
        assert!(pod.metadata.owner_references.is_none());
    }

    #[test]
    fn volumes_and_mounts_for_full_spec() {
        let mut session = session("foo_impl", "foo_image");
        session.spec.configuration = Some(ConfigMapVolumeSource {
            name: Some("config-map".to_string()),
            ..ConfigMapVolumeSource::default()
        });
        session.spec.client_secret_ref = Some(SecretVolumeSource {
            secret_name: Some("client-secret-name".to_string()),
            ..SecretVolumeSource::default()
        });
        session.spec.configuration_secrets = BTreeMap::from([
            (
                "foo".to_string(),
                SecretVolumeSource {
                    secret_name: Some("secret-foo".to_string()),
                    ..SecretVolumeSource::default()
                },
            ),
            (
                "bar".to_string(),
                SecretVolumeSource {
                    secret_name: Some("secret-bar".to_string()),
                    ..SecretVolumeSource::default()
                },
            ),
        ]);
        session
            .spec
            .env
            .insert("FOO".to_string(), "bar".to_string());

        let pod = build_pod(&session).unwrap();
        assert_base_pod(&pod, "foo_image", "foo_impl");

        let volumes = pod.spec.as_ref().unwrap().volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 5);

        let by_name = |name: &str| volumes.iter().find(|v| v.name == name).unwrap();
        assert_eq!(
            by_name(CONFIG_VOLUME_NAME)
                .config_map
                .as_ref()
                .unwrap()
                .name
                .as_deref(),
            Some("config-map")
        );
        assert_eq!(
            by_name(CLIENT_CREDS_VOLUME_NAME)
                .secret
                .as_ref()
                .unwrap()
                .secret_name
                .as_deref(),
            Some("client-secret-name")
        );
        assert_eq!(
            by_name("foo").secret.as_ref().unwrap().secret_name.as_deref(),
            Some("secret-foo")
        );
        assert_eq!(
            by_name("bar").secret.as_ref().unwrap().secret_name.as_deref(),
            Some("secret-bar")
        );
        let session_data = by_name(SESSION_DATA_VOLUME_NAME).empty_dir.as_ref().unwrap();
        assert_eq!(session_data.medium.as_deref(), Some("Memory"));

        let main = main_container(&pod);
        let env = env_of(main);
        assert_eq!(env.len(), 3);
        assert_eq!(env["FOO"], "bar");

        assert_eq!(main.volume_mounts.as_deref().unwrap().len(), 5);
        assert_eq!(
            mount_path(main, CONFIG_VOLUME_NAME).as_deref(),
            Some(CONFIG_MOUNT_PATH)
        );
        assert_eq!(
            mount_path(main, CLIENT_CREDS_VOLUME_NAME).as_deref(),
            Some(CLIENT_CREDENTIALS_MOUNT_PATH)
        );
        assert_eq!(mount_path(main, "foo").as_deref(), Some("/etc/secrets/foo"));
        assert_eq!(mount_path(main, "bar").as_deref(), Some("/etc/secrets/bar"));
        assert_eq!(
            mount_path(main, SESSION_DATA_VOLUME_NAME).as_deref(),
            Some(SESSION_MOUNT_PATH)
        );

        // The sidecar mounts only the session-data volume.
        let init = &pod.spec.as_ref().unwrap().init_containers.as_ref().unwrap()[0];
        assert_eq!(init.volume_mounts.as_deref().unwrap().len(), 1);
        assert_eq!(
            mount_path(init, SESSION_DATA_VOLUME_NAME).as_deref(),
            Some(SESSION_MOUNT_PATH)
        );
    }

    #[test]
    fn protocols_and_probes() {
        let startup = Probe {
            exec: Some(ExecAction {
                command: Some(vec!["startup".to_string()]),
            }),
            ..Probe::default()
        };
        let liveness = Probe {
            exec: Some(ExecAction {
                command: Some(vec!["liveness".to_string()]),
            }),
            ..Probe::default()
        };

        let mut session = session("foo_impl", "foo_image");
        let lifecycle = session.spec.lifecycle_config.as_mut().unwrap();
        lifecycle.service_ports = vec![
            ServicePort {
                name: Some("foo".to_string()),
                port: 1,
                ..ServicePort::default()
            },
            ServicePort {
                name: Some("bar".to_string()),
                port: 2,
                ..ServicePort::default()
            },
        ];
        lifecycle.startup_probe = Some(startup.clone());
        lifecycle.liveness_probe = Some(liveness.clone());

        let pod = build_pod(&session).unwrap();
        assert_base_pod(&pod, "foo_image", "foo_impl");

        let main = main_container(&pod);
        assert_eq!(env_of(main)[PROTOCOLS_ENV_VAR], "foo:1;bar:2");
        assert_eq!(main.startup_probe, Some(startup));
        assert_eq!(main.liveness_probe, Some(liveness));
    }

    #[test]
    fn protocols_prefer_target_port() {
        let ports = vec![
            ServicePort {
                name: Some("a".to_string()),
                port: 80,
                target_port: Some(IntOrString::Int(8080)),
                ..ServicePort::default()
            },
            ServicePort {
                name: Some("b".to_string()),
                port: 90,
                target_port: Some(IntOrString::String("9090".to_string())),
                ..ServicePort::default()
            },
            ServicePort {
                name: Some("c".to_string()),
                port: 100,
                target_port: Some(IntOrString::String("named-port".to_string())),
                ..ServicePort::default()
            },
        ];
        assert_eq!(format_protocols_var(&ports), "a:8080;b:9090;c:100");
        assert_eq!(format_protocols_var(&[]), "");
    }

    #[test]
    fn pod_options_pass_through() {
        let resources = ResourceRequirements {
            requests: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity("100".to_string()),
            )])),
            ..ResourceRequirements::default()
        };
        let pod_security = PodSecurityContext {
            run_as_non_root: Some(true),
            ..PodSecurityContext::default()
        };
        let container_security = SecurityContext {
            run_as_user: Some(1),
            ..SecurityContext::default()
        };

        let mut session = session("foo_impl", "foo_image");
        let lifecycle = session.spec.lifecycle_config.as_mut().unwrap();
        lifecycle.pod_options = PodOptions {
            resources: Some(resources.clone()),
            labels: BTreeMap::from([("label_name".to_string(), "label_val".to_string())]),
            annotations: BTreeMap::from([("ann_name".to_string(), "ann_val".to_string())]),
            priority_class_name: Some("class".to_string()),
            pod_security_context: Some(pod_security.clone()),
            container_security_context: Some(container_security.clone()),
            share_process_namespace: Some(true),
            service_account: Some("foo_acct".to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            ..PodOptions::default()
        };

        let pod = build_pod(&session).unwrap();
        assert_base_pod(&pod, "foo_image", "foo_impl");

        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels["label_name"], "label_val");
        let annotations = pod.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations["ann_name"], "ann_val");

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.priority_class_name.as_deref(), Some("class"));
        assert_eq!(spec.share_process_namespace, Some(true));
        assert_eq!(spec.service_account_name.as_deref(), Some("foo_acct"));
        assert_eq!(spec.automount_service_account_token, Some(true));
        assert_eq!(spec.security_context, Some(pod_security));

        let main = main_container(&pod);
        assert_eq!(main.resources, Some(resources));
        assert_eq!(main.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert_eq!(main.security_context, Some(container_security));
    }

    #[test]
    fn extra_containers_and_volumes() {
        let extra_container = Container {
            name: "sidecar".to_string(),
            image: Some("foo".to_string()),
            ..Container::default()
        };
        let extra_volume = Volume {
            name: "extra_tmp".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Volume::default()
        };

        let mut session = session("foo_impl", "foo_image");
        let lifecycle = session.spec.lifecycle_config.as_mut().unwrap();
        lifecycle.pod_options = PodOptions {
            extra_volumes: vec![extra_volume.clone()],
            extra_containers: vec![extra_container.clone()],
            ..PodOptions::default()
        };

        let pod = build_pod(&session).unwrap();
        assert_base_pod(&pod, "foo_image", "foo_impl");

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.containers.len(), 2);
        assert_eq!(
            spec.containers
                .iter()
                .find(|container| container.name == "sidecar"),
            Some(&extra_container)
        );

        let volumes = spec.volumes.as_ref().unwrap();
        assert_eq!(volumes.len(), 2);
        assert!(volumes.contains(&extra_volume));

        let main = main_container(&pod);
        assert_eq!(main.volume_mounts.as_deref().unwrap().len(), 2);
        assert_eq!(
            mount_path(main, "extra_tmp").as_deref(),
            Some("/mnt/volumes/extra_tmp")
        );
    }

    #[test]
    fn pod_override_applies_to_spec_only() {
        let mut session = session("foo_impl", "foo_image");
        let lifecycle = session.spec.lifecycle_config.as_mut().unwrap();
        lifecycle.pod_options.pod_override = json!({
            "containers": [
                {"name": "extra_container", "image": "foo"},
                {"name": MAIN_CONTAINER_NAME, "image": "image_override"}
            ],
            "serviceAccountName": "override_sa",
            "imagePullSecrets": [{"name": "image_pull_secret"}]
        })
        .as_object()
        .unwrap()
        .clone();

        let pod = build_pod(&session).unwrap();

        // Labels and restart policy are unchanged.
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels[SESSION_SELECTOR_LABEL], "foo-datamover");
        assert_eq!(labels[SESSION_LABEL], "foo-datamover");
        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));

        // The sidecar is untouched.
        let init = spec.init_containers.as_ref().unwrap();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].name, SESSION_DATA_CONTAINER_NAME);

        // The main container merged field by field, the extra one appended.
        assert_eq!(spec.containers.len(), 2);
        let main = main_container(&pod);
        assert_eq!(main.image.as_deref(), Some("image_override"));
        assert_eq!(main.readiness_probe, Some(readiness_probe()));
        assert!(spec
            .containers
            .iter()
            .any(|container| container.name == "extra_container"
                && container.image.as_deref() == Some("foo")));

        assert_eq!(spec.service_account_name.as_deref(), Some("override_sa"));
        let pull_secrets = spec.image_pull_secrets.as_ref().unwrap();
        assert_eq!(pull_secrets[0].name.as_deref(), Some("image_pull_secret"));
    }

    #[test]
    fn generate_name_prefers_session_generate_name() {
        let mut session = session("foo_impl", "foo_image");
        session.metadata.generate_name = Some("custom-prefix-".to_string());
        let pod = build_pod(&session).unwrap();
        assert_eq!(pod.metadata.generate_name.as_deref(), Some("custom-prefix-"));
    }

    #[test]
    fn sidecar_script_carries_the_wire_contract() {
        let pod = build_pod(&session("foo_impl", "foo_image")).unwrap();
        let init = &pod.spec.as_ref().unwrap().init_containers.as_ref().unwrap()[0];
        let command = init.command.as_ref().unwrap();
        assert_eq!(command[0], "sh");
        assert_eq!(command[1], "-c");
        let script = &command[2];
        assert!(script.contains("echo '---'"));
        assert!(script.contains("/etc/session/ready"));
        assert!(script.contains("base64 -w0"));
        assert!(script.contains("echo '___'"));
    }
}
