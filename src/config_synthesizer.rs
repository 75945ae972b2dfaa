use serde_yaml::Value;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tracing::info;

use crate::{
    constants,
    context_data::ContextData,
    http::HttpFetcher,
    merge_yaml::{self, MergeOptions},
    model::Error,
    plugin::{DynamicPluginsConfig, PluginMetadataResolver},
    rhdh::DeploymentConfig,
    settings::{DefaultConfigPaths, Settings},
    utils,
};

/// Payloads produced from the configuration layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    AppConfig,
    Secrets,
    DynamicPlugins,
}

impl Display for ConfigKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ConfigKind::AppConfig => write!(f, "app-config"),
            ConfigKind::Secrets => write!(f, "secrets"),
            ConfigKind::DynamicPlugins => write!(f, "dynamic-plugins"),
        }
    }
}

impl FromStr for ConfigKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "app-config" => Ok(ConfigKind::AppConfig),
            "secrets" => Ok(ConfigKind::Secrets),
            "dynamic-plugins" => Ok(ConfigKind::DynamicPlugins),
            other => Err(Error::ConfigurationError(format!("unknown config kind '{other}'"))),
        }
    }
}

/// Layers package defaults, the auth provider overlay and the user's files into cluster payloads
#[derive(Clone)]
pub struct ConfigSynthesizer {
    defaults: DefaultConfigPaths,
    metadata: PluginMetadataResolver,
    /// Substitution values for secrets that take precedence over the process environment
    variables: BTreeMap<String, String>,
}

impl ConfigSynthesizer {
    pub fn new(settings: &Settings, http: Arc<dyn HttpFetcher>) -> Self {
        ConfigSynthesizer {
            defaults: settings.default_config_paths(),
            metadata: PluginMetadataResolver::new(settings.plugin_metadata.clone(), http),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn from_context(context: &ContextData) -> Self {
        Self::new(&context.settings, context.http.clone())
    }

    pub fn defaults(&self) -> &DefaultConfigPaths {
        &self.defaults
    }

    /// Produces the payload of `kind` for the given deployment. Nothing is cached between calls.
    pub async fn synthesize(&self, kind: ConfigKind, config: &DeploymentConfig) -> Result<Value, Error> {
        self.defaults.materialize().await?;
        let auth = self.defaults.auth_layers(config.auth_provider);
        match kind {
            ConfigKind::AppConfig => {
                let layers = layer_paths(self.defaults.app_config(), auth.app_config, &config.app_config);
                let app_config = merge_yaml::merge_yaml_files_if_exists(&layers, &MergeOptions::default()).await?;
                info!("App Config:\n{}", serde_yaml::to_string(&app_config)?);
                Ok(app_config)
            }
            ConfigKind::Secrets => {
                let layers = layer_paths(self.defaults.secrets(), auth.secrets, &config.secrets);
                let secrets = merge_yaml::merge_yaml_files_if_exists(&layers, &MergeOptions::default()).await?;
                let lookup = |name: &str| self.variables.get(name).cloned().or_else(|| std::env::var(name).ok());
                Ok(utils::envsubst_value(secrets, &lookup))
            }
            ConfigKind::DynamicPlugins => {
                let dynamic_plugins = self.synthesize_dynamic_plugins(auth.dynamic_plugins, &config.dynamic_plugins).await?;
                info!("Dynamic Plugins:\n{}", serde_yaml::to_string(&dynamic_plugins)?);
                Ok(dynamic_plugins)
            }
        }
    }

    async fn synthesize_dynamic_plugins(&self, auth_layer: Option<PathBuf>, user_file: &Path) -> Result<Value, Error> {
        let by_package = MergeOptions::by_key(constants::PLUGIN_PACKAGE_KEY);
        if !tokio::fs::try_exists(user_file).await.unwrap_or(false) {
            info!("{} not found, generating dynamic plugins from metadata", user_file.display());
            let generated = self.metadata.generate_from_metadata_only().await?.to_value()?;
            let auth_overlay = match auth_layer {
                Some(path) => merge_yaml::merge_yaml_files_if_exists(&[path], &by_package).await?,
                None => merge_yaml::empty_document(),
            };
            return Ok(merge_yaml::merge_documents([generated, auth_overlay], &by_package));
        }

        let layers = layer_paths(self.defaults.dynamic_plugins(), auth_layer, user_file);
        let merged = merge_yaml::merge_yaml_files_if_exists(&layers, &by_package).await?;
        let injected = self.metadata.load_and_inject(DynamicPluginsConfig::from_value(merged)?).await?;
        injected.to_value()
    }
}

fn layer_paths(default: PathBuf, auth: Option<PathBuf>, user: &Path) -> Vec<PathBuf> {
    let mut layers = vec![default];
    layers.extend(auth);
    layers.push(user.to_path_buf());
    layers
}
