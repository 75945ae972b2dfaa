/*!

Mock implementations of the [`ClusterClient`], [`CommandRunner`], [`HttpFetcher`] and [`HttpClient`]
collaborators so deployments can be exercised without a cluster, external binaries or network access.

Every mock writes what it was asked to do into a shared [`Journal`] so tests can assert on ordering
across collaborators.

!*/
#![allow(dead_code)]

pub(crate) mod cluster_client;
pub(crate) mod command_runner;
pub(crate) mod http_client;
pub(crate) mod http_fetcher;

use k8s_openapi::api::core::v1::{ContainerState, ContainerStateWaiting, ContainerStatus, Pod, PodCondition, PodStatus};
use kube::core::ObjectMeta;
use rhdh_deployer::{context_data::ContextData, settings::Settings};
use std::sync::{Arc, Mutex};

pub(crate) use cluster_client::MockClusterClient;
pub(crate) use command_runner::MockCommandRunner;
pub(crate) use http_client::MockHttpClient;
pub(crate) use http_fetcher::MockHttpFetcher;

/// Ordered record of collaborator calls
#[derive(Clone, Default)]
pub(crate) struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Index of the first entry starting with `prefix`
    pub(crate) fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry.starts_with(prefix))
    }
}

pub(crate) fn context(cluster: &Arc<MockClusterClient>, runner: &Arc<MockCommandRunner>, http: &Arc<MockHttpFetcher>, settings: Settings) -> Arc<ContextData> {
    Arc::new(ContextData::new(cluster.clone(), runner.clone(), http.clone(), settings))
}

/// Context whose administrative HTTP traffic goes to `http_client`
pub(crate) fn keycloak_context(
    cluster: &Arc<MockClusterClient>,
    runner: &Arc<MockCommandRunner>,
    http_client: &Arc<MockHttpClient>,
    settings: Settings,
) -> Arc<ContextData> {
    let context_data = ContextData::new(cluster.clone(), runner.clone(), Arc::new(MockHttpFetcher::default()), settings);
    Arc::new(context_data.with_http_client(http_client.clone()))
}

fn pod(name: &str, status: PodStatus) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            ..ObjectMeta::default()
        },
        status: Some(status),
        ..Pod::default()
    }
}

pub(crate) fn ready_pod(name: &str) -> Pod {
    pod(
        name,
        PodStatus {
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_owned(),
                status: "True".to_owned(),
                ..PodCondition::default()
            }]),
            ..PodStatus::default()
        },
    )
}

pub(crate) fn pending_pod(name: &str) -> Pod {
    pod(
        name,
        PodStatus {
            phase: Some("Pending".to_owned()),
            ..PodStatus::default()
        },
    )
}

pub(crate) fn waiting_pod(name: &str, container: &str, reason: &str) -> Pod {
    pod(
        name,
        PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: container.to_owned(),
                state: Some(ContainerState {
                    waiting: Some(ContainerStateWaiting {
                        reason: Some(reason.to_owned()),
                        ..ContainerStateWaiting::default()
                    }),
                    ..ContainerState::default()
                }),
                ..ContainerStatus::default()
            }]),
            ..PodStatus::default()
        },
    )
}
