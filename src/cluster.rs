use async_trait::async_trait;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::{ConfigMap, Namespace, Pod, Secret},
};
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams},
    core::ObjectMeta,
    Api, Client,
};
use serde_yaml::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::{
    model::{api_status_code, Error},
    utils,
};

/// Coordinates of a resource read through the dynamic API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomObjectRef {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl CustomObjectRef {
    pub fn crd(name: &str) -> Self {
        CustomObjectRef {
            group: "apiextensions.k8s.io".to_owned(),
            version: "v1".to_owned(),
            kind: "CustomResourceDefinition".to_owned(),
            plural: "customresourcedefinitions".to_owned(),
            namespace: None,
            name: name.to_owned(),
        }
    }

    pub fn cluster_ingress() -> Self {
        CustomObjectRef {
            group: "config.openshift.io".to_owned(),
            version: "v1".to_owned(),
            kind: "Ingress".to_owned(),
            plural: "ingresses".to_owned(),
            namespace: None,
            name: "cluster".to_owned(),
        }
    }

    pub fn route(namespace: &str, name: &str) -> Self {
        CustomObjectRef {
            group: "route.openshift.io".to_owned(),
            version: "v1".to_owned(),
            kind: "Route".to_owned(),
            plural: "routes".to_owned(),
            namespace: Some(namespace.to_owned()),
            name: name.to_owned(),
        }
    }
}

/// The Kubernetes API surface a deployment needs
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, kube::Error>;

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, kube::Error>;

    async fn delete_namespace(&self, name: &str) -> Result<(), kube::Error>;

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, kube::Error>;

    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, kube::Error>;

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error>;

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, kube::Error>;

    async fn list_deployments(&self, namespace: &str, label_selector: &str) -> Result<Vec<Deployment>, kube::Error>;

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, kube::Error>;

    async fn get_custom_object(&self, object: &CustomObjectRef) -> Result<serde_json::Value, kube::Error>;

    /// Creates the object described by `object` with the full manifest `body`
    async fn create_custom_object(&self, object: &CustomObjectRef, body: &serde_json::Value) -> Result<serde_json::Value, kube::Error>;
}

/// [`ClusterClient`] backed by a `kube` client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        KubeClusterClient { client }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.get_opt(name).await
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.create(&PostParams::default(), namespace).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await.map(|_| ())
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), config_map).await
    }

    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap, kube::Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map.metadata.name.clone().unwrap_or_default();
        api.replace(&name, &PostParams::default(), config_map).await
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), secret).await
    }

    async fn replace_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret, kube::Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = secret.metadata.name.clone().unwrap_or_default();
        api.replace(&name, &PostParams::default(), secret).await
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(pods.items)
    }

    async fn list_deployments(&self, namespace: &str, label_selector: &str) -> Result<Vec<Deployment>, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployments = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(deployments.items)
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, kube::Error> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }

    async fn get_custom_object(&self, object: &CustomObjectRef) -> Result<serde_json::Value, kube::Error> {
        let found = self.dynamic_api(object).get(&object.name).await?;
        serde_json::to_value(found).map_err(kube::Error::SerdeError)
    }

    async fn create_custom_object(&self, object: &CustomObjectRef, body: &serde_json::Value) -> Result<serde_json::Value, kube::Error> {
        let resource: DynamicObject = serde_json::from_value(body.clone()).map_err(kube::Error::SerdeError)?;
        let created = self.dynamic_api(object).create(&PostParams::default(), &resource).await?;
        serde_json::to_value(created).map_err(kube::Error::SerdeError)
    }
}

impl KubeClusterClient {
    fn dynamic_api(&self, object: &CustomObjectRef) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(&object.group, &object.version, &object.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &object.plural);
        match &object.namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

/// Creates the namespace unless it already exists. Concurrent creation is tolerated.
pub async fn create_namespace_if_not_exists(cluster: &dyn ClusterClient, namespace: &str) -> Result<(), Error> {
    if namespace.trim().is_empty() {
        return Err(Error::ConfigurationError("namespace must not be empty".to_owned()));
    }
    if cluster.get_namespace(namespace).await?.is_some() {
        info!("Namespace {namespace} already exists");
        return Ok(());
    }
    let resource = Namespace {
        metadata: ObjectMeta {
            name: Some(namespace.to_owned()),
            labels: Some(utils::common_lables(namespace.to_owned(), None)),
            ..ObjectMeta::default()
        },
        ..Namespace::default()
    };
    match cluster.create_namespace(&resource).await {
        Ok(_) => {
            info!("Namespace {namespace} created");
            Ok(())
        }
        Err(error) if api_status_code(&error) == Some(409) => {
            info!("Namespace {namespace} was created concurrently");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Deletes the namespace. A namespace that is already gone is not an error.
pub async fn delete_namespace(cluster: &dyn ClusterClient, namespace: &str) -> Result<(), Error> {
    match cluster.delete_namespace(namespace).await {
        Ok(()) => {
            info!("Namespace {namespace} deleted");
            Ok(())
        }
        Err(error) if api_status_code(&error) == Some(404) => {
            info!("Namespace {namespace} already deleted");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Stores `data` as a single `{name}.yaml` entry of the ConfigMap `name`, replacing any existing content
///
/// # Arguments
/// - `cluster` - Cluster access
/// - `name` - Name of the ConfigMap
/// - `namespace` - Namespace holding the ConfigMap
/// - `data` - Document serialized as the only data entry
pub async fn apply_config_map_from_value(cluster: &dyn ClusterClient, name: &str, namespace: &str, data: &Value) -> Result<(), Error> {
    let content = serde_yaml::to_string(data)?;
    let config_map = ConfigMap {
        metadata: resource_metadata(name, namespace),
        data: Some(BTreeMap::from([(format!("{name}.yaml"), content)])),
        ..ConfigMap::default()
    };
    let replaced = cluster.replace_config_map(namespace, &config_map).await;
    match replaced {
        Ok(_) => {
            info!("ConfigMap {name} replaced in namespace {namespace}");
            Ok(())
        }
        Err(error) => {
            debug!("ConfigMap {name} could not be replaced, creating it: {error}");
            match cluster.create_config_map(namespace, &config_map).await {
                Ok(_) => {
                    info!("ConfigMap {name} created in namespace {namespace}");
                    Ok(())
                }
                Err(error) if api_status_code(&error) == Some(409) => {
                    warn!("ConfigMap {name} already exists in namespace {namespace}");
                    Ok(())
                }
                Err(error) => Err(error.into()),
            }
        }
    }
}

/// Stores the `stringData` entries of `data` in the Secret `name`, replacing any existing content
pub async fn apply_secret_from_value(cluster: &dyn ClusterClient, name: &str, namespace: &str, data: &Value) -> Result<(), Error> {
    let secret = Secret {
        metadata: resource_metadata(name, namespace),
        string_data: Some(string_data(data)?),
        ..Secret::default()
    };
    match cluster.replace_secret(namespace, &secret).await {
        Ok(_) => {
            info!("Secret {name} replaced in namespace {namespace}");
            Ok(())
        }
        Err(error) => {
            debug!("Secret {name} could not be replaced, creating it: {error}");
            match cluster.create_secret(namespace, &secret).await {
                Ok(_) => {
                    info!("Secret {name} created in namespace {namespace}");
                    Ok(())
                }
                Err(error) if api_status_code(&error) == Some(409) => {
                    warn!("Secret {name} already exists in namespace {namespace}");
                    Ok(())
                }
                Err(error) => Err(error.into()),
            }
        }
    }
}

fn resource_metadata(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(namespace.to_owned()),
        labels: Some(utils::common_lables(name.to_owned(), None)),
        ..ObjectMeta::default()
    }
}

fn string_data(data: &Value) -> Result<BTreeMap<String, String>, Error> {
    let Some(entries) = data.get("stringData").and_then(Value::as_mapping) else {
        warn!("Secrets document has no stringData mapping");
        return Ok(BTreeMap::new());
    };
    let mut result = BTreeMap::new();
    for (key, value) in entries {
        let Some(key) = key.as_str() else {
            return Err(Error::ConfigurationError(format!("secret key {key:?} is not a string")));
        };
        let value = match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            Value::Bool(flag) => flag.to_string(),
            Value::Number(number) => number.to_string(),
            other => serde_yaml::to_string(other)?.trim_end().to_owned(),
        };
        result.insert(key.to_owned(), value);
    }
    Ok(result)
}

/// Wildcard domain of the cluster's default ingress controller
pub async fn cluster_ingress_domain(cluster: &dyn ClusterClient) -> Result<String, Error> {
    let ingress = cluster.get_custom_object(&CustomObjectRef::cluster_ingress()).await?;
    ingress
        .pointer("/spec/domain")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::NotFoundError("spec.domain of the cluster ingress configuration".to_owned()))
}

/// External URL of a route. The scheme follows the route's TLS settings.
pub async fn route_location(cluster: &dyn ClusterClient, namespace: &str, name: &str) -> Result<String, Error> {
    let route = cluster.get_custom_object(&CustomObjectRef::route(namespace, name)).await?;
    let host = route
        .pointer("/spec/host")
        .and_then(serde_json::Value::as_str)
        .or_else(|| route.pointer("/status/ingress/0/host").and_then(serde_json::Value::as_str))
        .ok_or_else(|| Error::NotFoundError(format!("host of route {name} in namespace {namespace}")))?;
    let scheme = match route.pointer("/spec/tls") {
        Some(tls) if !tls.is_null() => "https",
        _ => "http",
    };
    Ok(format!("{scheme}://{host}"))
}

/// Creates the object unless one with the same name already exists
pub async fn create_custom_object_if_not_exists(cluster: &dyn ClusterClient, object: &CustomObjectRef, body: &serde_json::Value) -> Result<(), Error> {
    match cluster.create_custom_object(object, body).await {
        Ok(_) => {
            info!("{} {} created", object.kind, object.name);
            Ok(())
        }
        Err(error) if api_status_code(&error) == Some(409) => {
            info!("{} {} already exists", object.kind, object.name);
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Highest replica count declared by the deployments behind `label_selector`. Unset counts as one.
pub async fn declared_replicas(cluster: &dyn ClusterClient, namespace: &str, label_selector: &str) -> Result<Option<i32>, Error> {
    let deployments = cluster.list_deployments(namespace, label_selector).await?;
    Ok(deployments
        .iter()
        .map(|deployment| deployment.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1))
        .max())
}

/// Whether the named CustomResourceDefinition is registered
pub async fn crd_exists(cluster: &dyn ClusterClient, name: &str) -> Result<bool, Error> {
    match cluster.get_custom_object(&CustomObjectRef::crd(name)).await {
        Ok(_) => Ok(true),
        Err(error) if api_status_code(&error) == Some(404) => Ok(false),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_data_stringifies_scalars() {
        let data: Value = serde_yaml::from_str("stringData:\n  TOKEN: abc\n  PORT: 8080\n  ENABLED: true\n").unwrap();
        let result = string_data(&data).unwrap();
        assert_eq!(result.get("TOKEN").map(String::as_str), Some("abc"));
        assert_eq!(result.get("PORT").map(String::as_str), Some("8080"));
        assert_eq!(result.get("ENABLED").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_string_data_without_mapping() {
        let data: Value = serde_yaml::from_str("kind: Secret").unwrap();
        assert!(string_data(&data).unwrap().is_empty());
    }

    #[test]
    fn test_custom_object_refs() {
        let crd = CustomObjectRef::crd("backstages.rhdh.redhat.com");
        assert_eq!(crd.plural, "customresourcedefinitions");
        assert_eq!(crd.namespace, None);
        let route = CustomObjectRef::route("showcase", "backstage-developer-hub");
        assert_eq!(route.namespace.as_deref(), Some("showcase"));
    }
}
