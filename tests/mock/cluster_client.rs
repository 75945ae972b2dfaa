use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec, StatefulSetStatus},
    core::v1::{ConfigMap, Namespace, Pod, Secret},
};
use rhdh_deployer::cluster::{ClusterClient, CustomObjectRef};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use super::Journal;

fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_owned(),
        message: format!("mock {reason}"),
        reason: reason.to_owned(),
        code,
    })
}

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    config_maps: BTreeMap<(String, String), ConfigMap>,
    secrets: BTreeMap<(String, String), Secret>,
    /// `None` makes the listing fail
    pod_responses: VecDeque<Option<Vec<Pod>>>,
    custom_objects: BTreeMap<String, serde_json::Value>,
    deployments: Vec<Deployment>,
    /// Created routes get `{name}-{namespace}.{domain}` as admitted host
    route_domain: Option<String>,
    /// Scripted per name, the last one repeats
    stateful_sets: BTreeMap<String, VecDeque<StatefulSet>>,
}

/// In memory cluster. Pod listings replay the scripted responses, the last one repeats.
#[derive(Default)]
pub(crate) struct MockClusterClient {
    journal: Journal,
    calls: AtomicUsize,
    state: Mutex<State>,
}

impl MockClusterClient {
    pub(crate) fn new(journal: &Journal) -> Self {
        MockClusterClient {
            journal: journal.clone(),
            ..MockClusterClient::default()
        }
    }

    pub(crate) fn with_namespace(self, namespace: &str) -> Self {
        self.state.lock().unwrap().namespaces.insert(namespace.to_owned());
        self
    }

    pub(crate) fn with_pods(self, pods: Vec<Pod>) -> Self {
        self.state.lock().unwrap().pod_responses.push_back(Some(pods));
        self
    }

    pub(crate) fn with_failing_pod_listing(self) -> Self {
        self.state.lock().unwrap().pod_responses.push_back(None);
        self
    }

    pub(crate) fn with_custom_object(self, name: &str, object: serde_json::Value) -> Self {
        self.state.lock().unwrap().custom_objects.insert(name.to_owned(), object);
        self
    }

    pub(crate) fn with_deployment_replicas(self, replicas: i32) -> Self {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        };
        self.state.lock().unwrap().deployments.push(deployment);
        self
    }

    /// Queues one observation of the StatefulSet `name`
    pub(crate) fn with_stateful_set(self, name: &str, ready_replicas: Option<i32>, replicas: Option<i32>) -> Self {
        let stateful_set = StatefulSet {
            spec: Some(StatefulSetSpec {
                replicas,
                ..StatefulSetSpec::default()
            }),
            status: Some(StatefulSetStatus {
                ready_replicas,
                ..StatefulSetStatus::default()
            }),
            ..StatefulSet::default()
        };
        self.state.lock().unwrap().stateful_sets.entry(name.to_owned()).or_default().push_back(stateful_set);
        self
    }

    pub(crate) fn with_route_admission(self, domain: &str) -> Self {
        self.state.lock().unwrap().route_domain = Some(domain.to_owned());
        self
    }

    pub(crate) fn custom_object(&self, name: &str) -> Option<serde_json::Value> {
        self.state.lock().unwrap().custom_objects.get(name).cloned()
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().unwrap().namespaces.contains(namespace)
    }

    pub(crate) fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state.lock().unwrap().config_maps.get(&(namespace.to_owned(), name.to_owned())).cloned()
    }

    pub(crate) fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state.lock().unwrap().secrets.get(&(namespace.to_owned(), name.to_owned())).cloned()
    }

    fn track(&self, entry: String) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.record(entry);
    }
}

fn key(namespace: &str, name: &Option<String>) -> (String, String) {
    (namespace.to_owned(), name.clone().unwrap_or_default())
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, kube::Error> {
        self.track(format!("get_namespace {name}"));
        let exists = self.state.lock().unwrap().namespaces.contains(name);
        Ok(exists.then(Namespace::default))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, kube::Error> {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        self.track(format!("create_namespace {name}"));
        if !self.state.lock().unwrap().namespaces.insert(name) {
            return Err(api_error(409, "AlreadyExists"));
        }
        Ok(namespace.clone())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), kube::Error> {
        self.track(format!("delete_namespace {name}"));
        if !self.state.lock().unwrap().namespaces.remove(name) {
            return Err(api_error(404, "NotFound"));
        }
        Ok(())
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, kube::Error> {
        let key = key(namespace, &config_map.metadata.name);
        self.track(format!("create_config_map {}", key.1));
        let mut state = self.state.lock().unwrap();
        if state.config_maps.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.config_maps.insert(key, config_map.clone());
        Ok(config_map.clone())
    }

    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, kube::Error> {
        let key = key(namespace, &config_map.metadata.name);
        self.track(format!("replace_config_map {}", key.1));
        let mut state = self.state.lock().unwrap();
        match state.config_maps.get_mut(&key) {
            Some(existing) => {
                *existing = config_map.clone();
                Ok(config_map.clone())
            }
            None => Err(api_error(404, "NotFound")),
        }
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        let key = key(namespace, &secret.metadata.name);
        self.track(format!("create_secret {}", key.1));
        let mut state = self.state.lock().unwrap();
        if state.secrets.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        state.secrets.insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        let key = key(namespace, &secret.metadata.name);
        self.track(format!("replace_secret {}", key.1));
        let mut state = self.state.lock().unwrap();
        match state.secrets.get_mut(&key) {
            Some(existing) => {
                *existing = secret.clone();
                Ok(secret.clone())
            }
            None => Err(api_error(404, "NotFound")),
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, kube::Error> {
        self.track(format!("list_pods {namespace} {label_selector}"));
        let mut state = self.state.lock().unwrap();
        let response = if state.pod_responses.len() > 1 {
            state.pod_responses.pop_front().flatten()
        } else {
            state.pod_responses.front().cloned().unwrap_or(Some(Vec::new()))
        };
        response.ok_or_else(|| api_error(500, "InternalError"))
    }

    async fn get_custom_object(&self, object: &CustomObjectRef) -> Result<serde_json::Value, kube::Error> {
        self.track(format!("get_custom_object {}/{}", object.plural, object.name));
        self.state
            .lock()
            .unwrap()
            .custom_objects
            .get(&object.name)
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn create_custom_object(&self, object: &CustomObjectRef, body: &serde_json::Value) -> Result<serde_json::Value, kube::Error> {
        self.track(format!("create_custom_object {}/{}", object.plural, object.name));
        let mut state = self.state.lock().unwrap();
        if state.custom_objects.contains_key(&object.name) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut created = body.clone();
        if let (Some(domain), "routes") = (&state.route_domain, object.plural.as_str()) {
            let namespace = object.namespace.clone().unwrap_or_default();
            created["status"] = serde_json::json!({ "ingress": [{ "host": format!("{}-{namespace}.{domain}", object.name) }] });
        }
        state.custom_objects.insert(object.name.clone(), created.clone());
        Ok(created)
    }

    async fn list_deployments(&self, namespace: &str, label_selector: &str) -> Result<Vec<Deployment>, kube::Error> {
        self.track(format!("list_deployments {namespace} {label_selector}"));
        Ok(self.state.lock().unwrap().deployments.clone())
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, kube::Error> {
        self.track(format!("get_stateful_set {namespace}/{name}"));
        let mut state = self.state.lock().unwrap();
        let Some(responses) = state.stateful_sets.get_mut(name) else {
            return Ok(None);
        };
        if responses.len() > 1 {
            Ok(responses.pop_front())
        } else {
            Ok(responses.front().cloned())
        }
    }
}
