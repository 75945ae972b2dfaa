use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
    str::FromStr,
};

use crate::{constants, model::Error, rhdh::rhdh_chart::ChartVersion, settings::Settings};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMethod {
    Helm,
    Operator,
}

impl Display for DeploymentMethod {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DeploymentMethod::Helm => write!(f, "helm"),
            DeploymentMethod::Operator => write!(f, "operator"),
        }
    }
}

impl FromStr for DeploymentMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "helm" => Ok(DeploymentMethod::Helm),
            "operator" => Ok(DeploymentMethod::Operator),
            other => Err(Error::ConfigurationError(format!("invalid installation method '{other}', expected helm or operator"))),
        }
    }
}

impl DeploymentMethod {
    /// Host prefix of the route the method exposes the application under
    pub fn url_prefix(&self) -> &'static str {
        match self {
            DeploymentMethod::Helm => constants::HELM_URL_PREFIX,
            DeploymentMethod::Operator => constants::OPERATOR_URL_PREFIX,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Guest,
    Keycloak,
}

impl Display for AuthProvider {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AuthProvider::Guest => write!(f, "guest"),
            AuthProvider::Keycloak => write!(f, "keycloak"),
        }
    }
}

impl FromStr for AuthProvider {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(AuthProvider::Guest),
            "keycloak" => Ok(AuthProvider::Keycloak),
            other => Err(Error::ConfigurationError(format!("invalid auth provider '{other}', expected guest or keycloak"))),
        }
    }
}

/// Caller supplied input. Anything left out falls back to [`Settings`] and then to the built-in defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentOptions {
    pub namespace: String,
    pub version: Option<String>,
    pub method: Option<String>,
    pub auth_provider: Option<String>,
    pub app_config: Option<PathBuf>,
    pub secrets: Option<PathBuf>,
    pub dynamic_plugins: Option<PathBuf>,
    pub value_file: Option<PathBuf>,
    pub subscription_file: Option<PathBuf>,
}

impl DeploymentOptions {
    pub fn new(namespace: &str) -> Self {
        DeploymentOptions {
            namespace: namespace.to_owned(),
            ..DeploymentOptions::default()
        }
    }
}

/// Extra input only one deployment method needs
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum MethodConfig {
    Helm {
        #[serde(rename = "valueFile")]
        value_file: PathBuf,
    },
    Operator {
        #[serde(rename = "subscriptionFile")]
        subscription_file: PathBuf,
    },
}

/// Validated description of one deployment. Immutable once built.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub version: String,
    pub namespace: String,
    pub auth_provider: AuthProvider,
    pub app_config: PathBuf,
    pub secrets: PathBuf,
    pub dynamic_plugins: PathBuf,
    #[serde(flatten)]
    pub method: MethodConfig,
}

impl DeploymentConfig {
    /// Validates the options without touching the filesystem, the network or the cluster
    ///
    /// # Arguments
    /// - `options` - Per deployment input
    /// - `settings` - Process wide fallbacks for version, method and auth provider
    pub fn build(options: &DeploymentOptions, settings: &Settings) -> Result<Self, Error> {
        let namespace = options.namespace.trim();
        if namespace.is_empty() {
            return Err(Error::ConfigurationError("namespace is required".to_owned()));
        }
        let version = options
            .version
            .as_deref()
            .or(settings.version.as_deref())
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .ok_or_else(|| Error::ConfigurationError("RHDH version is required".to_owned()))?;
        ChartVersion::parse(version)?;

        let method: DeploymentMethod = options
            .method
            .as_deref()
            .or(settings.installation_method.as_deref())
            .filter(|method| !method.trim().is_empty())
            .ok_or_else(|| Error::ConfigurationError("installation method (helm/operator) is required".to_owned()))?
            .parse()?;

        let auth_provider = match options.auth_provider.as_deref().or(settings.auth_provider.as_deref()) {
            Some(provider) if !provider.trim().is_empty() => provider.parse()?,
            _ => AuthProvider::default(),
        };

        let user_file = |given: &Option<PathBuf>, default: &str| given.clone().unwrap_or_else(|| PathBuf::from(default));
        let method = match method {
            DeploymentMethod::Helm => MethodConfig::Helm {
                value_file: user_file(&options.value_file, "config/value_file.yaml"),
            },
            DeploymentMethod::Operator => MethodConfig::Operator {
                subscription_file: user_file(&options.subscription_file, "config/subscription.yaml"),
            },
        };

        Ok(DeploymentConfig {
            version: version.to_owned(),
            namespace: namespace.to_owned(),
            auth_provider,
            app_config: user_file(&options.app_config, "config/app-config-rhdh.yaml"),
            secrets: user_file(&options.secrets, "config/rhdh-secrets.yaml"),
            dynamic_plugins: user_file(&options.dynamic_plugins, "config/dynamic-plugins.yaml"),
            method,
        })
    }

    pub fn method(&self) -> DeploymentMethod {
        match self.method {
            MethodConfig::Helm { .. } => DeploymentMethod::Helm,
            MethodConfig::Operator { .. } => DeploymentMethod::Operator,
        }
    }

    pub fn chart_version(&self) -> Result<ChartVersion, Error> {
        ChartVersion::parse(&self.version)
    }
}

/// `https://{prefix}-{namespace}.{router_base}`
pub fn derive_base_url(method: DeploymentMethod, namespace: &str, router_base: &str) -> String {
    format!("https://{}-{namespace}.{router_base}", method.url_prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helm_options() -> DeploymentOptions {
        DeploymentOptions {
            version: Some("1.5".to_owned()),
            method: Some("helm".to_owned()),
            ..DeploymentOptions::new("showcase")
        }
    }

    #[test]
    fn test_build_helm_with_defaults() {
        let config = DeploymentConfig::build(&helm_options(), &Settings::default()).unwrap();
        assert_eq!(config.method(), DeploymentMethod::Helm);
        assert_eq!(config.auth_provider, AuthProvider::Guest);
        assert_eq!(config.app_config, PathBuf::from("config/app-config-rhdh.yaml"));
        assert_eq!(
            config.method,
            MethodConfig::Helm {
                value_file: PathBuf::from("config/value_file.yaml")
            }
        );
    }

    #[test]
    fn test_build_uses_settings_fallbacks() {
        let settings = Settings {
            version: Some("1.6-200-CI".to_owned()),
            installation_method: Some("Operator".to_owned()),
            auth_provider: Some("keycloak".to_owned()),
            ..Settings::default()
        };
        let config = DeploymentConfig::build(&DeploymentOptions::new("operator-ns"), &settings).unwrap();
        assert_eq!(config.version, "1.6-200-CI");
        assert_eq!(config.auth_provider, AuthProvider::Keycloak);
        assert!(matches!(config.method, MethodConfig::Operator { .. }));
    }

    #[test]
    fn test_build_rejects_incomplete_input() {
        let settings = Settings::default();
        let missing_version = DeploymentOptions {
            version: None,
            ..helm_options()
        };
        assert!(matches!(DeploymentConfig::build(&missing_version, &settings), Err(Error::ConfigurationError(_))));

        let missing_method = DeploymentOptions {
            method: None,
            ..helm_options()
        };
        assert!(matches!(DeploymentConfig::build(&missing_method, &settings), Err(Error::ConfigurationError(_))));

        let bad_method = DeploymentOptions {
            method: Some("kustomize".to_owned()),
            ..helm_options()
        };
        assert!(matches!(DeploymentConfig::build(&bad_method, &settings), Err(Error::ConfigurationError(_))));

        let bad_version = DeploymentOptions {
            version: Some("latest".to_owned()),
            ..helm_options()
        };
        assert!(matches!(DeploymentConfig::build(&bad_version, &settings), Err(Error::ConfigurationError(_))));

        let empty_namespace = DeploymentOptions {
            namespace: " ".to_owned(),
            ..helm_options()
        };
        assert!(matches!(DeploymentConfig::build(&empty_namespace, &settings), Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_derive_base_url() {
        assert_eq!(
            derive_base_url(DeploymentMethod::Helm, "showcase", "apps.example.com"),
            "https://redhat-developer-hub-showcase.apps.example.com"
        );
        assert_eq!(
            derive_base_url(DeploymentMethod::Operator, "showcase", "apps.example.com"),
            "https://backstage-developer-hub-showcase.apps.example.com"
        );
    }
}
