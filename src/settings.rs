use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{constants, model::Error, plugin::PluginMetadataSettings, rhdh::rhdh_config::AuthProvider, utils};

/// Explicit configuration of a deployer process
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Fallback for the deployment version when not given per deployment
    pub version: Option<String>,
    /// Fallback for the installation method (`helm` or `operator`)
    pub installation_method: Option<String>,
    /// Fallback for the auth provider (`guest` or `keycloak`)
    pub auth_provider: Option<String>,
    pub cluster_router_base: Option<String>,
    pub chart_url: String,
    pub chart_tags_url: String,
    /// Directory holding the default configuration layers. The layers built into the binary are used when unset.
    pub defaults_dir: Option<PathBuf>,
    /// Where composed values and subscription files are written before being handed to CLIs
    pub scratch_dir: PathBuf,
    pub plugin_metadata: PluginMetadataSettings,
    pub timings: Timings,
}

/// Poll intervals and bounds, in seconds
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
    pub readiness_timeout: u64,
    pub poll_interval: u64,
    pub crd_wait_timeout: u64,
    pub crd_poll_interval: u64,
    pub scale_down_timeout: u64,
    pub keycloak_timeout: u64,
    pub keycloak_poll_interval: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            readiness_timeout: constants::READINESS_TIMEOUT,
            poll_interval: constants::READINESS_POLL_INTERVAL,
            crd_wait_timeout: constants::CRD_WAIT_TIMEOUT,
            crd_poll_interval: constants::CRD_POLL_INTERVAL,
            scale_down_timeout: constants::SCALE_DOWN_TIMEOUT,
            keycloak_timeout: constants::KEYCLOAK_WAIT_TIMEOUT,
            keycloak_poll_interval: constants::KEYCLOAK_POLL_INTERVAL,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            version: None,
            installation_method: None,
            auth_provider: None,
            cluster_router_base: None,
            chart_url: constants::DEFAULT_CHART_URL.to_owned(),
            chart_tags_url: constants::DEFAULT_CHART_TAGS_URL.to_owned(),
            defaults_dir: None,
            scratch_dir: std::env::temp_dir(),
            plugin_metadata: PluginMetadataSettings::default(),
            timings: Timings::default(),
        }
    }
}

impl Settings {
    /// Reads settings from an optional YAML file, then applies the process environment on top
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let settings = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Settings::default(),
        };
        Ok(settings.apply_env())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, Error> {
        let config_file = std::fs::File::open(path)?;
        let settings: Option<Settings> = serde_yaml::from_reader(config_file)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings.unwrap_or_default())
    }

    pub fn apply_env(self) -> Self {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Overlays every recognized variable that is set and non-empty
    pub fn apply_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(version) = read(constants::ENV_RHDH_VERSION) {
            self.version = Some(version);
        }
        if let Some(method) = read(constants::ENV_INSTALLATION_METHOD) {
            self.installation_method = Some(method);
        }
        if let Some(auth_provider) = read(constants::ENV_AUTH_PROVIDER) {
            self.auth_provider = Some(auth_provider);
        }
        if let Some(router_base) = read(constants::ENV_CLUSTER_ROUTER_BASE) {
            self.cluster_router_base = Some(router_base);
        }
        if let Some(chart_url) = read(constants::ENV_CHART_URL) {
            self.chart_url = chart_url;
        }
        if let Some(tags_url) = read(constants::ENV_CHART_TAGS_URL) {
            self.chart_tags_url = tags_url;
        }
        if let Some(defaults_dir) = read(constants::ENV_DEFAULT_CONFIG_DIR) {
            self.defaults_dir = Some(PathBuf::from(defaults_dir));
        }
        if let Some(metadata_path) = read(constants::ENV_METADATA_PATH) {
            self.plugin_metadata.metadata_path = PathBuf::from(metadata_path);
        }
        if let Some(pr_number) = read(constants::ENV_GIT_PR_NUMBER) {
            self.plugin_metadata.pr_number = Some(pr_number);
        }
        if read(constants::ENV_SKIP_PLUGIN_METADATA_INJECTION).is_some() {
            self.plugin_metadata.skip_injection = true;
        }
        if let Some(job_name) = read(constants::ENV_JOB_NAME) {
            self.plugin_metadata.job_name = Some(job_name);
        }
        self
    }

    pub fn default_config_paths(&self) -> DefaultConfigPaths {
        match &self.defaults_dir {
            Some(defaults_dir) => DefaultConfigPaths::new(defaults_dir.clone()),
            None => DefaultConfigPaths::embedded(self.scratch_dir.join(format!("rhdh-deployer-defaults-{}", env!("CARGO_PKG_VERSION")))),
        }
    }
}

/// Default layers compiled into the binary, keyed by their path below the defaults root
const EMBEDDED_LAYERS: [(&str, &str); 10] = [
    ("common/app-config-rhdh.yaml", include_str!("../config/common/app-config-rhdh.yaml")),
    ("common/rhdh-secrets.yaml", include_str!("../config/common/rhdh-secrets.yaml")),
    ("common/dynamic-plugins.yaml", include_str!("../config/common/dynamic-plugins.yaml")),
    ("auth/guest/app-config.yaml", include_str!("../config/auth/guest/app-config.yaml")),
    ("auth/keycloak/app-config.yaml", include_str!("../config/auth/keycloak/app-config.yaml")),
    ("auth/keycloak/secrets.yaml", include_str!("../config/auth/keycloak/secrets.yaml")),
    ("auth/keycloak/dynamic-plugins.yaml", include_str!("../config/auth/keycloak/dynamic-plugins.yaml")),
    ("helm/value_file.yaml", include_str!("../config/helm/value_file.yaml")),
    ("operator/subscription.yaml", include_str!("../config/operator/subscription.yaml")),
    ("keycloak/values.yaml", include_str!("../config/keycloak/values.yaml")),
];

/// Optional layers contributed by an auth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthLayers {
    pub app_config: Option<PathBuf>,
    pub secrets: Option<PathBuf>,
    pub dynamic_plugins: Option<PathBuf>,
}

/// Locations of the default layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultConfigPaths {
    root: PathBuf,
    /// The layers come from the binary and are written below `root` by [`DefaultConfigPaths::materialize`]
    embedded: bool,
}

impl DefaultConfigPaths {
    /// Layers read from an existing directory
    pub fn new(root: PathBuf) -> Self {
        DefaultConfigPaths { root, embedded: false }
    }

    pub fn embedded(root: PathBuf) -> Self {
        DefaultConfigPaths { root, embedded: true }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the built-in layers below the root. A directory given explicitly is left as it is.
    pub async fn materialize(&self) -> Result<(), Error> {
        if !self.embedded {
            return Ok(());
        }
        for (relative, content) in EMBEDDED_LAYERS {
            utils::write_atomically(&self.root.join(relative), content).await?;
        }
        info!("Default configuration layers written to {}", self.root.display());
        Ok(())
    }

    pub fn app_config(&self) -> PathBuf {
        self.root.join("common/app-config-rhdh.yaml")
    }

    pub fn secrets(&self) -> PathBuf {
        self.root.join("common/rhdh-secrets.yaml")
    }

    pub fn dynamic_plugins(&self) -> PathBuf {
        self.root.join("common/dynamic-plugins.yaml")
    }

    pub fn helm_value_file(&self) -> PathBuf {
        self.root.join("helm/value_file.yaml")
    }

    pub fn operator_subscription(&self) -> PathBuf {
        self.root.join("operator/subscription.yaml")
    }

    pub fn keycloak_values(&self) -> PathBuf {
        self.root.join("keycloak/values.yaml")
    }

    pub fn auth_layers(&self, provider: AuthProvider) -> AuthLayers {
        match provider {
            AuthProvider::Guest => AuthLayers {
                app_config: Some(self.root.join("auth/guest/app-config.yaml")),
                secrets: None,
                dynamic_plugins: None,
            },
            AuthProvider::Keycloak => AuthLayers {
                app_config: Some(self.root.join("auth/keycloak/app-config.yaml")),
                secrets: Some(self.root.join("auth/keycloak/secrets.yaml")),
                dynamic_plugins: Some(self.root.join("auth/keycloak/dynamic-plugins.yaml")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = HashMap::from([
            (constants::ENV_RHDH_VERSION, "1.5"),
            (constants::ENV_INSTALLATION_METHOD, "helm"),
            (constants::ENV_GIT_PR_NUMBER, "42"),
            (constants::ENV_SKIP_PLUGIN_METADATA_INJECTION, "true"),
            (constants::ENV_CLUSTER_ROUTER_BASE, ""),
        ]);
        let settings = Settings::default().apply_env_with(|name| env.get(name).map(|value| value.to_string()));
        assert_eq!(settings.version.as_deref(), Some("1.5"));
        assert_eq!(settings.installation_method.as_deref(), Some("helm"));
        assert_eq!(settings.plugin_metadata.pr_number.as_deref(), Some("42"));
        assert!(settings.plugin_metadata.skip_injection);
        assert_eq!(settings.cluster_router_base, None);
        assert_eq!(settings.chart_url, constants::DEFAULT_CHART_URL);
    }

    #[test]
    fn test_from_yaml_file_with_partial_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "version: '1.4'\ntimings:\n  pollInterval: 1\npluginMetadata:\n  metadataPath: /tmp/metadata\n").unwrap();
        let settings = Settings::from_yaml_file(&path).unwrap();
        assert_eq!(settings.version.as_deref(), Some("1.4"));
        assert_eq!(settings.timings.poll_interval, 1);
        assert_eq!(settings.timings.readiness_timeout, constants::READINESS_TIMEOUT);
        assert_eq!(settings.plugin_metadata.metadata_path, PathBuf::from("/tmp/metadata"));
    }

    #[test]
    fn test_auth_layers() {
        let paths = DefaultConfigPaths::new(PathBuf::from("/defaults"));
        let guest = paths.auth_layers(AuthProvider::Guest);
        assert_eq!(guest.app_config, Some(PathBuf::from("/defaults/auth/guest/app-config.yaml")));
        assert_eq!(guest.dynamic_plugins, None);
        let keycloak = paths.auth_layers(AuthProvider::Keycloak);
        assert_eq!(keycloak.secrets, Some(PathBuf::from("/defaults/auth/keycloak/secrets.yaml")));
    }

    #[test]
    fn test_defaults_dir_override() {
        let settings = Settings {
            scratch_dir: PathBuf::from("/scratch"),
            ..Settings::default()
        };
        let embedded = settings.default_config_paths();
        assert!(embedded.root().starts_with("/scratch"));
        assert_ne!(embedded, DefaultConfigPaths::new(embedded.root().to_path_buf()));

        let env: HashMap<&str, &str> = HashMap::from([(constants::ENV_DEFAULT_CONFIG_DIR, "/opt/rhdh/config")]);
        let settings = settings.apply_env_with(|name| env.get(name).map(|value| value.to_string()));
        assert_eq!(settings.default_config_paths(), DefaultConfigPaths::new(PathBuf::from("/opt/rhdh/config")));
    }

    #[tokio::test]
    async fn test_materialize_writes_every_built_in_layer() {
        let scratch = tempfile::tempdir().unwrap();
        let settings = Settings {
            scratch_dir: scratch.path().to_path_buf(),
            ..Settings::default()
        };
        let paths = settings.default_config_paths();
        paths.materialize().await.unwrap();
        paths.materialize().await.unwrap();

        for (relative, content) in EMBEDDED_LAYERS {
            assert_eq!(std::fs::read_to_string(paths.root().join(relative)).unwrap(), content);
        }
        assert!(paths.app_config().is_file());
        assert!(paths.keycloak_values().is_file());
        let keycloak = paths.auth_layers(AuthProvider::Keycloak);
        assert!(keycloak.secrets.unwrap().is_file());
    }

    #[tokio::test]
    async fn test_materialize_leaves_explicit_directory_alone() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DefaultConfigPaths::new(dir.path().to_path_buf());
        paths.materialize().await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
