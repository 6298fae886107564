//! Datamover operator binary.
//!
//! Runs the DatamoverSession controller against the current cluster, or
//! prints the CRD manifest with `--generate-crds`.

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use std::sync::Arc;

use datamover_operator::controller::{
    error_policy, ControllerContext, ReconcileAction, SessionController,
};
use datamover_operator::crd::DatamoverSession;
use k8s_openapi::api::core::v1::{Pod, Service};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("datamover_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    if std::env::args().any(|arg| arg == "--generate-crds") {
        println!("---");
        println!("{}", serde_yaml::to_string(&DatamoverSession::crd())?);
        return Ok(());
    }

    tracing::info!("Starting datamover session operator");

    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(ControllerContext::new(client.clone()));
    let controller = SessionController::new(ctx.clone());

    let sessions: Api<DatamoverSession> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client.clone());
    let services: Api<Service> = Api::all(client);

    Controller::new(sessions, WatcherConfig::default())
        .owns(pods, WatcherConfig::default())
        .owns(services, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            move |session, _ctx| {
                let controller = controller.clone();
                async move {
                    match controller.reconcile(session).await? {
                        ReconcileAction::Requeue(duration) => Ok(Action::requeue(duration)),
                        ReconcileAction::Done => Ok(Action::await_change()),
                    }
                }
            },
            error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(session = %obj.name, ?action, "Reconciled session");
                }
                Err(err) => {
                    tracing::error!(error = %err, "Session controller stream error");
                }
            }
        })
        .await;

    Ok(())
}
