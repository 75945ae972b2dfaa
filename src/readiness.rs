use k8s_openapi::api::{
    apps::v1::StatefulSet,
    core::v1::{ContainerStatus, Pod},
};
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::{
    cluster::ClusterClient,
    command::{CommandRunner, CommandSpec},
    constants,
    model::Error,
};

/// A container stuck in a state that will not resolve on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodFailure {
    pub pod: String,
    pub container: Option<String>,
    pub reason: String,
}

/// Polls the pods behind a label selector until they are all ready, one of them fails, or time runs out
pub struct ReadinessMonitor {
    cluster: Arc<dyn ClusterClient>,
    runner: Arc<dyn CommandRunner>,
    poll_interval: Duration,
}

impl ReadinessMonitor {
    pub fn new(cluster: Arc<dyn ClusterClient>, runner: Arc<dyn CommandRunner>, poll_interval: Duration) -> Self {
        ReadinessMonitor { cluster, runner, poll_interval }
    }

    /// Waits for every pod matching `label_selector` in `namespace` to report `Ready=True`
    ///
    /// # Arguments
    /// - `namespace` - Namespace to watch
    /// - `label_selector` - Selector identifying the workload pods
    /// - `timeout` - Upper bound for the whole wait
    ///
    /// Failures listing pods, as well as an empty pod list, are retried until the bound is reached.
    /// A container in one of the non-recoverable states fails the wait at the poll that observes it.
    pub async fn wait_for_ready(&self, namespace: &str, label_selector: &str, timeout: Duration) -> Result<(), Error> {
        let deadline = Instant::now() + timeout;
        info!("Waiting up to {}s for pods '{label_selector}' in namespace {namespace}", timeout.as_secs());
        loop {
            match self.cluster.list_pods(namespace, label_selector).await {
                Ok(pods) if pods.is_empty() => info!("No pods matching '{label_selector}' in namespace {namespace} yet"),
                Ok(pods) => {
                    if let Some(failure) = pods.iter().find_map(detect_failure) {
                        error!("Pod {} in namespace {namespace} failed: {}", failure.pod, failure.reason);
                        return Err(self.deployment_failure(namespace, failure).await);
                    }
                    let ready = pods.iter().filter(|pod| is_pod_ready(pod)).count();
                    if ready == pods.len() {
                        info!("All {ready} pods in namespace {namespace} are ready");
                        return Ok(());
                    }
                    info!("{ready}/{} pods in namespace {namespace} are ready", pods.len());
                }
                Err(error) => warn!("Could not list pods in namespace {namespace}: {error}"),
            }
            if Instant::now() >= deadline {
                return Err(Error::TimeoutError(format!(
                    "pods matching '{label_selector}' in namespace {namespace} not ready after {}s",
                    timeout.as_secs()
                )));
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn deployment_failure(&self, namespace: &str, failure: PodFailure) -> Error {
        let logs = self.fetch_logs(namespace, &failure).await;
        Error::DeploymentFailure {
            pod: failure.pod,
            container: failure.container,
            reason: failure.reason,
            logs,
        }
    }

    /// Best effort, errors only end up in the log
    async fn fetch_logs(&self, namespace: &str, failure: &PodFailure) -> Option<String> {
        let mut command = CommandSpec::new("oc").args(["logs", failure.pod.as_str(), "-n", namespace]);
        if let Some(container) = &failure.container {
            command = command.args(["-c", container.as_str()]);
        }
        command = command.arg(format!("--tail={}", constants::LOG_TAIL_LINES));
        match self.runner.run(&command).await {
            Ok(logs) => Some(logs),
            Err(error) => {
                warn!("Could not fetch logs of pod {}: {error}", failure.pod);
                None
            }
        }
    }
}

fn is_failure_reason(reason: &str) -> bool {
    constants::POD_FAILURE_REASONS.contains(&reason)
}

/// Inspects init containers first, then the main containers
pub fn detect_failure(pod: &Pod) -> Option<PodFailure> {
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let status = pod.status.as_ref()?;
    let failure = |container: &ContainerStatus, reason: String| PodFailure {
        pod: pod_name.clone(),
        container: Some(container.name.clone()),
        reason,
    };

    for container in status.init_container_statuses.iter().flatten() {
        let Some(state) = &container.state else { continue };
        if let Some(reason) = state.waiting.as_ref().and_then(|waiting| waiting.reason.as_deref()) {
            if is_failure_reason(reason) {
                return Some(failure(container, format!("Init:{reason}")));
            }
        }
        if let Some(terminated) = &state.terminated {
            if let Some(reason) = terminated.reason.as_deref() {
                if terminated.exit_code != 0 && is_failure_reason(reason) {
                    return Some(failure(container, format!("Init:{reason} (exit {})", terminated.exit_code)));
                }
            }
        }
    }

    for container in status.container_statuses.iter().flatten() {
        let Some(state) = &container.state else { continue };
        if let Some(reason) = state.waiting.as_ref().and_then(|waiting| waiting.reason.as_deref()) {
            if is_failure_reason(reason) {
                return Some(failure(container, reason.to_owned()));
            }
        }
        if let Some(terminated) = &state.terminated {
            if let Some(reason) = terminated.reason.as_deref() {
                if terminated.exit_code != 0 && is_failure_reason(reason) {
                    return Some(failure(container, format!("{reason} (exit {})", terminated.exit_code)));
                }
            }
        }
    }
    None
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| conditions.iter().any(|condition| condition.type_ == "Ready" && condition.status == "True"))
        .unwrap_or(false)
}

/// Ready once the ready replicas reach the declared count, which defaults to one
pub fn is_stateful_set_ready(stateful_set: &StatefulSet) -> bool {
    let ready = stateful_set.status.as_ref().and_then(|status| status.ready_replicas).unwrap_or(0);
    let desired = stateful_set.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
    ready >= desired
}

/// Polls the StatefulSet `name` until [`is_stateful_set_ready`] holds. Lookup errors count as not ready.
pub async fn wait_for_stateful_set_ready(
    cluster: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<(), Error> {
    let deadline = Instant::now() + timeout;
    loop {
        match cluster.get_stateful_set(namespace, name).await {
            Ok(Some(stateful_set)) if is_stateful_set_ready(&stateful_set) => {
                info!("StatefulSet {name} in namespace {namespace} is ready");
                return Ok(());
            }
            Ok(_) => info!("Waiting for StatefulSet {name} in namespace {namespace}..."),
            Err(error) => warn!("Could not read StatefulSet {name} in namespace {namespace}: {error}"),
        }
        if Instant::now() >= deadline {
            return Err(Error::TimeoutError(format!(
                "StatefulSet {name} in namespace {namespace} not ready after {}s",
                timeout.as_secs()
            )));
        }
        sleep(interval).await;
    }
}
