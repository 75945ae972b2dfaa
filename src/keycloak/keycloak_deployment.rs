use serde_json::json;
use serde_yaml::{Mapping, Value};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::{
    cluster::{self, CustomObjectRef},
    command::CommandSpec,
    constants,
    context_data::ContextData,
    keycloak::{
        keycloak_admin::{self, KeycloakAdmin},
        keycloak_config::{default_groups, default_users, KeycloakConnectionConfig, KeycloakDeploymentConfig, KeycloakRealmConfig, RealmInfo, RhdhRealmOptions},
    },
    merge_yaml::{self, MergeOptions},
    model::Error,
    readiness, utils,
};

/// Where the composed chart values for `namespace` are written
pub fn keycloak_values_path(scratch_dir: &Path, namespace: &str) -> PathBuf {
    scratch_dir.join(format!("{namespace}-keycloak-values.yaml"))
}

/// Puts the admin credentials under `auth`, keeping every other key
pub fn compose_keycloak_values(values: Value, config: &KeycloakDeploymentConfig) -> Value {
    let mut values = match values {
        Value::Mapping(values) => values,
        _ => Mapping::new(),
    };
    let auth_key = Value::String("auth".to_owned());
    let mut auth = match values.get(&auth_key) {
        Some(Value::Mapping(auth)) => auth.clone(),
        _ => Mapping::new(),
    };
    auth.insert(Value::String("adminUser".to_owned()), Value::String(config.admin_user.clone()));
    auth.insert(Value::String("adminPassword".to_owned()), Value::String(config.admin_password.clone()));
    values.insert(auth_key, Value::Mapping(auth));
    Value::Mapping(values)
}

/// Edge terminated route that also serves plain HTTP
pub fn route_manifest(config: &KeycloakDeploymentConfig) -> serde_json::Value {
    let release = config.release_name.as_str();
    json!({
        "apiVersion": "route.openshift.io/v1",
        "kind": "Route",
        "metadata": {
            "name": release,
            "namespace": config.namespace,
            "labels": utils::common_lables(constants::KEYCLOAK_APP_NAME.to_owned(), Some(release.to_owned())),
        },
        "spec": {
            "to": { "kind": "Service", "name": release, "weight": 100 },
            "port": { "targetPort": "http" },
            "tls": { "termination": "edge", "insecureEdgeTerminationPolicy": "Allow" },
            "wildcardPolicy": "None",
        }
    })
}

/// A Keycloak instance installed from the Bitnami chart, prepared as RHDH's identity provider
pub struct KeycloakDeployment {
    context_data: Arc<ContextData>,
    config: KeycloakDeploymentConfig,
    url: Option<String>,
    admin: Option<KeycloakAdmin>,
    realm: Option<RealmInfo>,
}

impl KeycloakDeployment {
    pub fn new(config: KeycloakDeploymentConfig, context_data: Arc<ContextData>) -> Self {
        KeycloakDeployment {
            context_data,
            config,
            url: None,
            admin: None,
            realm: None,
        }
    }

    pub fn config(&self) -> &KeycloakDeploymentConfig {
        &self.config
    }

    /// External URL, known once the route was resolved
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Realm and client prepared by the last `configure_for_rhdh`
    pub fn realm_info(&self) -> Option<&RealmInfo> {
        self.realm.as_ref()
    }

    pub fn admin(&self) -> Result<&KeycloakAdmin, Error> {
        self.admin
            .as_ref()
            .ok_or_else(|| Error::ConfigurationError("Keycloak admin client not initialized, deploy or connect first".to_owned()))
    }

    /// Installs the chart, exposes it through a route and logs in as the admin user
    pub async fn deploy(&mut self) -> Result<(), Error> {
        info!("Starting Keycloak deployment in namespace {}", self.config.namespace);
        cluster::create_namespace_if_not_exists(self.context_data.cluster.as_ref(), &self.config.namespace).await?;
        self.install_chart().await?;
        self.wait_until_ready(Duration::from_secs(self.context_data.settings.timings.keycloak_timeout)).await?;
        self.create_route().await?;
        self.wait_for_api().await?;

        let url = self.url.clone().unwrap_or_default();
        let admin = KeycloakAdmin::connect(
            self.context_data.http_client.clone(),
            &KeycloakConnectionConfig {
                base_url: url,
                username: Some(self.config.admin_user.clone()),
                password: Some(self.config.admin_password.clone()),
                ..KeycloakConnectionConfig::default()
            },
        )
        .await?;
        self.admin = Some(admin);
        info!("Keycloak deployed in namespace {}", self.config.namespace);
        Ok(())
    }

    async fn install_chart(&self) -> Result<(), Error> {
        let runner = &self.context_data.runner;
        let add_repo = CommandSpec::new("helm").args(["repo", "add", "bitnami", constants::BITNAMI_CHART_REPO]);
        if let Err(error) = runner.run(&add_repo).await {
            warn!("Could not add the bitnami chart repository, assuming it is present: {error}");
        }
        runner.run(&CommandSpec::new("helm").args(["repo", "update"])).await?;

        let settings = &self.context_data.settings;
        let defaults = settings.default_config_paths();
        defaults.materialize().await?;
        let mut layers = vec![defaults.keycloak_values()];
        layers.extend(self.config.values_file.clone());
        let values = merge_yaml::merge_yaml_files_if_exists(&layers, &MergeOptions::default()).await?;
        let values_path = keycloak_values_path(&settings.scratch_dir, &self.config.namespace);
        utils::write_yaml_file(&values_path, &compose_keycloak_values(values, &self.config)).await?;

        let install = CommandSpec::new("helm").args([
            "upgrade".to_owned(),
            "--install".to_owned(),
            self.config.release_name.clone(),
            constants::BITNAMI_CHART_NAME.to_owned(),
            "--namespace".to_owned(),
            self.config.namespace.clone(),
            "--values".to_owned(),
            values_path.display().to_string(),
        ]);
        runner.run(&install).await?;
        Ok(())
    }

    async fn create_route(&self) -> Result<(), Error> {
        let route = CustomObjectRef::route(&self.config.namespace, &self.config.release_name);
        cluster::create_custom_object_if_not_exists(self.context_data.cluster.as_ref(), &route, &route_manifest(&self.config)).await
    }

    async fn wait_for_api(&mut self) -> Result<(), Error> {
        let timings = self.context_data.settings.timings;
        let timeout = Duration::from_secs(timings.keycloak_timeout);
        let deadline = Instant::now() + timeout;
        info!("Waiting for the Keycloak API to be ready...");
        loop {
            if self.is_running().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::TimeoutError(format!("Keycloak API not ready after {}s", timeout.as_secs())));
            }
            sleep(Duration::from_secs(timings.keycloak_poll_interval)).await;
        }
    }

    /// Resolves the route and checks that the master realm answers
    pub async fn is_running(&mut self) -> bool {
        match self.route_url().await {
            Ok(url) => {
                let available = keycloak_admin::is_available(self.context_data.http_client.as_ref(), &url).await;
                self.url = Some(url);
                available
            }
            Err(error) => {
                info!("Keycloak route not available yet: {error}");
                false
            }
        }
    }

    /// Attaches to a Keycloak that is already running
    pub async fn connect(&mut self, connection: &KeycloakConnectionConfig) -> Result<(), Error> {
        let admin = KeycloakAdmin::connect(self.context_data.http_client.clone(), connection).await?;
        self.url = Some(admin.base_url().to_owned());
        self.admin = Some(admin);
        Ok(())
    }

    /// Creates the realm, the RHDH client with its service account roles, the groups and the users
    pub async fn configure_for_rhdh(&mut self, options: &RhdhRealmOptions) -> Result<RealmInfo, Error> {
        info!("Configuring Keycloak for RHDH...");
        let admin = self.admin()?;
        let realm = options.realm.clone().unwrap_or_else(|| constants::KEYCLOAK_REALM.to_owned());
        let client = options.client.clone().unwrap_or_default();

        admin.create_realm(&KeycloakRealmConfig::new(&realm)).await?;
        admin.create_client(&realm, &client).await?;
        admin.assign_service_account_roles(&realm, &client.client_id).await?;
        for group in options.groups.clone().unwrap_or_else(default_groups) {
            admin.create_group(&realm, &group).await?;
        }
        for user in options.users.clone().unwrap_or_else(default_users) {
            admin.create_user(&realm, &user).await?;
        }

        let info = RealmInfo {
            base_url: admin.base_url().to_owned(),
            realm,
            client_id: client.client_id,
            client_secret: client.client_secret,
        };
        self.realm = Some(info.clone());
        Ok(info)
    }

    /// Waits for the chart's StatefulSet to report every replica ready
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), Error> {
        info!("Waiting for Keycloak to be ready...");
        readiness::wait_for_stateful_set_ready(
            self.context_data.cluster.as_ref(),
            &self.config.namespace,
            &self.config.release_name,
            timeout,
            Duration::from_secs(self.context_data.settings.timings.keycloak_poll_interval),
        )
        .await
    }

    pub async fn route_url(&self) -> Result<String, Error> {
        cluster::route_location(self.context_data.cluster.as_ref(), &self.config.namespace, &self.config.release_name).await
    }

    /// Removes the namespace. Succeeds when it is already gone.
    pub async fn teardown(&self) -> Result<(), Error> {
        cluster::delete_namespace(self.context_data.cluster.as_ref(), &self.config.namespace).await?;
        info!("Keycloak deployment torn down");
        Ok(())
    }
}
