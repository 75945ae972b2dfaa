use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    sync::Arc,
    time::Duration,
};
use tracing::{error, info};

use crate::{
    cluster,
    command::CommandSpec,
    config_synthesizer::{ConfigKind, ConfigSynthesizer},
    constants,
    context_data::ContextData,
    http::HttpFetcher,
    model::Error,
    readiness::ReadinessMonitor,
    rhdh::{
        rhdh_config::{derive_base_url, DeploymentConfig, DeploymentOptions, MethodConfig},
        rhdh_helm, rhdh_operator,
    },
    settings::Settings,
};

/// Progress of a deployment through `deploy()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentPhase {
    Constructed,
    NamespaceEnsured,
    ConfigApplied,
    SecretsApplied,
    HelmDeployed,
    OperatorDeployed,
    RestartedForHelm,
    Ready,
}

impl Display for DeploymentPhase {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DeploymentPhase::Constructed => write!(f, "Constructed"),
            DeploymentPhase::NamespaceEnsured => write!(f, "NamespaceEnsured"),
            DeploymentPhase::ConfigApplied => write!(f, "ConfigApplied"),
            DeploymentPhase::SecretsApplied => write!(f, "SecretsApplied"),
            DeploymentPhase::HelmDeployed => write!(f, "HelmDeployed"),
            DeploymentPhase::OperatorDeployed => write!(f, "OperatorDeployed"),
            DeploymentPhase::RestartedForHelm => write!(f, "RestartedForHelm"),
            DeploymentPhase::Ready => write!(f, "Ready"),
        }
    }
}

/// Rolls out one Developer Hub instance into one namespace
pub struct RhdhDeployment {
    context_data: Arc<ContextData>,
    synthesizer: ConfigSynthesizer,
    config: DeploymentConfig,
    base_url: Option<String>,
    /// Extra secret substitutions, e.g. the Keycloak connection values
    variables: BTreeMap<String, String>,
    phase: DeploymentPhase,
}

impl RhdhDeployment {
    /// Validates the options. No filesystem, network or cluster access happens here.
    pub fn new(options: &DeploymentOptions, context_data: Arc<ContextData>) -> Result<Self, Error> {
        let config = DeploymentConfig::build(options, &context_data.settings)?;
        let base_url = Self::base_url_for(&config, &context_data.settings);
        info!("RHDH deployment initialized (namespace: {}, method: {})", config.namespace, config.method());
        Ok(RhdhDeployment {
            synthesizer: Self::synthesizer_for(&config, &context_data.settings, context_data.http.clone()),
            context_data,
            config,
            base_url,
            variables: BTreeMap::new(),
            phase: DeploymentPhase::Constructed,
        })
    }

    /// Public URL of a deployment, derived from the cluster router base when it is known
    pub fn base_url_for(config: &DeploymentConfig, settings: &Settings) -> Option<String> {
        settings
            .cluster_router_base
            .as_deref()
            .map(|router_base| derive_base_url(config.method(), &config.namespace, router_base))
    }

    /// The synthesizer a deployment of `config` uses. The base URL is exposed to secrets as `$RHDH_BASE_URL`.
    pub fn synthesizer_for(config: &DeploymentConfig, settings: &Settings, http: Arc<dyn HttpFetcher>) -> ConfigSynthesizer {
        let synthesizer = ConfigSynthesizer::new(settings, http);
        match Self::base_url_for(config, settings) {
            Some(base_url) => synthesizer.with_variable(constants::ENV_RHDH_BASE_URL, &base_url),
            None => synthesizer,
        }
    }

    /// Adds secret substitutions that take precedence over the process environment
    pub fn with_variables<I>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.variables.extend(variables);
        self.synthesizer = self.build_synthesizer();
        self
    }

    fn build_synthesizer(&self) -> ConfigSynthesizer {
        self.variables.iter().fold(
            Self::synthesizer_for(&self.config, &self.context_data.settings, self.context_data.http.clone()),
            |synthesizer, (name, value)| synthesizer.with_variable(name, value),
        )
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Public URL of the application. `None` while the cluster router base is unknown.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn phase(&self) -> DeploymentPhase {
        self.phase
    }

    fn advance(&mut self, phase: DeploymentPhase) {
        info!("Deployment in namespace {}: {} -> {}", self.config.namespace, self.phase, phase);
        self.phase = phase;
    }

    /// Runs the whole rollout: namespace, app config, secrets, the method specific install, then readiness
    pub async fn deploy(&mut self) -> Result<(), Error> {
        info!("Starting RHDH deployment in namespace {}", self.config.namespace);
        let cluster = self.context_data.cluster.clone();
        let namespace = self.config.namespace.clone();

        cluster::create_namespace_if_not_exists(cluster.as_ref(), &namespace).await?;
        self.advance(DeploymentPhase::NamespaceEnsured);

        let app_config = self.synthesizer.synthesize(ConfigKind::AppConfig, &self.config).await?;
        cluster::apply_config_map_from_value(cluster.as_ref(), constants::APP_CONFIG_MAP_NAME, &namespace, &app_config).await?;
        self.advance(DeploymentPhase::ConfigApplied);

        let secrets = self.synthesizer.synthesize(ConfigKind::Secrets, &self.config).await?;
        cluster::apply_secret_from_value(cluster.as_ref(), constants::SECRETS_NAME, &namespace, &secrets).await?;
        self.advance(DeploymentPhase::SecretsApplied);

        match self.config.method.clone() {
            MethodConfig::Helm { value_file } => {
                let router_base = self.context_data.settings.cluster_router_base.clone();
                rhdh_helm::deploy_with_helm(&self.context_data, &self.synthesizer, &self.config, &value_file, router_base.as_deref()).await?;
                self.advance(DeploymentPhase::HelmDeployed);
                rhdh_helm::scale_restart(&self.context_data, &namespace).await?;
                self.advance(DeploymentPhase::RestartedForHelm);
            }
            MethodConfig::Operator { subscription_file } => {
                rhdh_operator::deploy_with_operator(&self.context_data, &self.synthesizer, &self.config, &subscription_file).await?;
                self.advance(DeploymentPhase::OperatorDeployed);
            }
        }

        let timeout = self.default_timeout();
        self.wait_until_ready(timeout).await
    }

    /// Triggers a rolling restart of the workload and waits for it to become ready again
    pub async fn rollout_restart(&mut self) -> Result<(), Error> {
        let namespace = self.config.namespace.clone();
        info!("Restarting RHDH deployment in namespace {namespace}...");
        let restart = CommandSpec::new("oc").args(["rollout", "restart", "deployment", "-l", constants::RHDH_INSTANCE_SELECTOR, "-n", namespace.as_str()]);
        self.context_data.runner.run(&restart).await?;
        info!("RHDH deployment restarted in namespace {namespace}");
        let timeout = self.default_timeout();
        self.wait_until_ready(timeout).await
    }

    /// Waits for every workload pod to be ready. Failures are reported as [`Error::NotReady`].
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), Error> {
        let namespace = self.config.namespace.clone();
        info!("Waiting for RHDH deployment to be ready in namespace {namespace}...");
        let monitor = ReadinessMonitor::new(
            self.context_data.cluster.clone(),
            self.context_data.runner.clone(),
            Duration::from_secs(self.context_data.settings.timings.poll_interval),
        );
        match monitor.wait_for_ready(&namespace, constants::RHDH_INSTANCE_SELECTOR, timeout).await {
            Ok(()) => {
                self.advance(DeploymentPhase::Ready);
                info!("RHDH deployment is ready in namespace {namespace}");
                Ok(())
            }
            Err(error) => {
                error!("RHDH deployment in namespace {namespace} is not ready within {}s: {error}", timeout.as_secs());
                Err(Error::NotReady {
                    namespace,
                    source: Box::new(error),
                })
            }
        }
    }

    /// Removes the namespace. Succeeds when it is already gone.
    pub async fn teardown(&self) -> Result<(), Error> {
        cluster::delete_namespace(self.context_data.cluster.as_ref(), &self.config.namespace).await
    }

    /// Replaces the configuration. Nothing is applied until `deploy()` runs again.
    /// On invalid options the current configuration is kept.
    pub fn reconfigure(&mut self, options: &DeploymentOptions) -> Result<(), Error> {
        let config = DeploymentConfig::build(options, &self.context_data.settings)?;
        self.base_url = Self::base_url_for(&config, &self.context_data.settings);
        self.config = config;
        self.synthesizer = self.build_synthesizer();
        self.phase = DeploymentPhase::Constructed;
        info!("RHDH deployment reconfigured (namespace: {}, method: {})", self.config.namespace, self.config.method());
        Ok(())
    }

    /// URL of the route the cluster actually assigned to the application
    pub async fn route_url(&self) -> Result<String, Error> {
        cluster::route_location(self.context_data.cluster.as_ref(), &self.config.namespace, self.config.method().url_prefix()).await
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.context_data.settings.timings.readiness_timeout)
    }
}
