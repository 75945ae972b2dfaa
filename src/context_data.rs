use kube::Client;
use std::sync::Arc;

use crate::{
    cluster::{ClusterClient, KubeClusterClient},
    command::{CommandRunner, ProcessRunner},
    http::{HttpClient, HttpFetcher, ReqwestFetcher},
    model::Error,
    settings::Settings,
};

/// Collaborators and settings shared by every deployment created in a process
#[derive(Clone)]
pub struct ContextData {
    /// Kubernetes API access. Required for namespaces, ConfigMaps, Secrets and pod inspection.
    pub cluster: Arc<dyn ClusterClient>,
    /// Runs `helm`, `oc` and shell scripts
    pub runner: Arc<dyn CommandRunner>,
    /// Remote JSON endpoints
    pub http: Arc<dyn HttpFetcher>,
    /// Administrative APIs, e.g. Keycloak
    pub http_client: Arc<dyn HttpClient>,

    pub settings: Settings,
}

impl ContextData {
    pub fn new(cluster: Arc<dyn ClusterClient>, runner: Arc<dyn CommandRunner>, http: Arc<dyn HttpFetcher>, settings: Settings) -> Self {
        ContextData {
            cluster,
            runner,
            http,
            http_client: Arc::new(ReqwestFetcher::default()),
            settings,
        }
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = http_client;
        self
    }

    /// Wires the production collaborators using the ambient kubeconfig
    pub async fn from_environment(settings: Settings) -> Result<Self, Error> {
        let client = Client::try_default().await?;
        let http = ReqwestFetcher::default();
        Ok(ContextData {
            cluster: Arc::new(KubeClusterClient::new(client)),
            runner: Arc::new(ProcessRunner),
            http: Arc::new(http.clone()),
            http_client: Arc::new(http),
            settings,
        })
    }
}
