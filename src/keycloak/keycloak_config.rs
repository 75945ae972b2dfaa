use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, path::PathBuf};

use crate::constants;

/// Where and how the Keycloak chart is installed
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct KeycloakDeploymentConfig {
    pub namespace: String,
    pub release_name: String,
    /// Chart values layered over the package default
    pub values_file: Option<PathBuf>,
    pub admin_user: String,
    pub admin_password: String,
}

impl Default for KeycloakDeploymentConfig {
    fn default() -> Self {
        KeycloakDeploymentConfig {
            namespace: constants::KEYCLOAK_NAMESPACE.to_owned(),
            release_name: constants::KEYCLOAK_RELEASE_NAME.to_owned(),
            values_file: None,
            admin_user: constants::KEYCLOAK_ADMIN_USER.to_owned(),
            admin_password: constants::KEYCLOAK_ADMIN_PASSWORD.to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,
    pub standard_flow_enabled: bool,
    pub implicit_flow_enabled: bool,
    pub direct_access_grants_enabled: bool,
    pub service_accounts_enabled: bool,
    pub authorization_services_enabled: bool,
    pub public_client: bool,
    pub attributes: BTreeMap<String, String>,
    pub default_client_scopes: Vec<String>,
    pub optional_client_scopes: Vec<String>,
}

impl Default for KeycloakClientConfig {
    fn default() -> Self {
        KeycloakClientConfig {
            client_id: "rhdh-client".to_owned(),
            client_secret: "rhdh-client-secret".to_owned(),
            name: Some("RHDH Client".to_owned()),
            description: None,
            redirect_uris: vec!["*".to_owned()],
            web_origins: vec!["*".to_owned()],
            standard_flow_enabled: true,
            implicit_flow_enabled: true,
            direct_access_grants_enabled: true,
            service_accounts_enabled: true,
            authorization_services_enabled: true,
            public_client: false,
            attributes: BTreeMap::new(),
            default_client_scopes: ["service_account", "web-origins", "roles", "profile", "basic", "email"].map(str::to_owned).to_vec(),
            optional_client_scopes: ["address", "phone", "offline_access", "microprofile-jwt"].map(str::to_owned).to_vec(),
        }
    }
}

impl KeycloakClientConfig {
    /// Client representation accepted by the admin API
    pub fn representation(&self) -> Value {
        json!({
            "clientId": self.client_id,
            "secret": self.client_secret,
            "name": self.name.clone().unwrap_or_else(|| self.client_id.clone()),
            "description": self.description.clone().unwrap_or_default(),
            "redirectUris": self.redirect_uris,
            "webOrigins": self.web_origins,
            "standardFlowEnabled": self.standard_flow_enabled,
            "implicitFlowEnabled": self.implicit_flow_enabled,
            "directAccessGrantsEnabled": self.direct_access_grants_enabled,
            "serviceAccountsEnabled": self.service_accounts_enabled,
            "authorizationServicesEnabled": self.authorization_services_enabled,
            "publicClient": self.public_client,
            "enabled": true,
            "protocol": "openid-connect",
            "fullScopeAllowed": true,
            "attributes": self.attributes,
            "defaultClientScopes": self.default_client_scopes,
            "optionalClientScopes": self.optional_client_scopes,
        })
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUserConfig {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default = "enabled")]
    pub email_verified: bool,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub groups: Vec<String>,
}

fn enabled() -> bool {
    true
}

impl KeycloakUserConfig {
    pub fn representation(&self) -> Value {
        json!({
            "username": self.username,
            "email": self.email,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "enabled": self.enabled,
            "emailVerified": self.email_verified,
        })
    }

    /// Reads a user as listed by the admin API. Credentials and memberships are not part of the listing.
    pub fn from_representation(user: &Value) -> Option<Self> {
        let text = |key: &str| user.get(key).and_then(Value::as_str).map(str::to_owned);
        let flag = |key: &str| user.get(key).and_then(Value::as_bool).unwrap_or(false);
        Some(KeycloakUserConfig {
            username: text("username")?,
            email: text("email"),
            first_name: text("firstName"),
            last_name: text("lastName"),
            enabled: flag("enabled"),
            email_verified: flag("emailVerified"),
            password: None,
            temporary: false,
            groups: Vec::new(),
        })
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct KeycloakGroupConfig {
    pub name: String,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakRealmConfig {
    pub realm: String,
    pub display_name: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

impl KeycloakRealmConfig {
    pub fn new(realm: &str) -> Self {
        KeycloakRealmConfig {
            realm: realm.to_owned(),
            display_name: None,
            enabled: true,
        }
    }

    pub fn representation(&self) -> Value {
        json!({
            "realm": self.realm,
            "displayName": self.display_name.clone().unwrap_or_else(|| self.realm.clone()),
            "enabled": self.enabled,
        })
    }
}

/// How to reach and authenticate against an existing Keycloak
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct KeycloakConnectionConfig {
    pub base_url: String,
    /// Realm the credentials belong to, `master` when unset
    pub realm: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Everything `configure_for_rhdh` sets up. Fields left unset fall back to the packaged defaults.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RhdhRealmOptions {
    pub realm: Option<String>,
    pub client: Option<KeycloakClientConfig>,
    pub groups: Option<Vec<KeycloakGroupConfig>>,
    pub users: Option<Vec<KeycloakUserConfig>>,
}

pub fn default_groups() -> Vec<KeycloakGroupConfig> {
    ["developers", "admins", "viewers"]
        .into_iter()
        .map(|name| KeycloakGroupConfig { name: name.to_owned() })
        .collect()
}

pub fn default_users() -> Vec<KeycloakUserConfig> {
    [("test1", "User1"), ("test2", "User2")]
        .into_iter()
        .map(|(username, last_name)| KeycloakUserConfig {
            username: username.to_owned(),
            email: Some(format!("{username}@example.com")),
            first_name: Some("Test".to_owned()),
            last_name: Some(last_name.to_owned()),
            enabled: true,
            email_verified: true,
            password: Some(format!("{username}@123")),
            temporary: false,
            groups: vec!["developers".to_owned()],
        })
        .collect()
}

/// Connection values RHDH needs to authenticate against a configured realm
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct RealmInfo {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
}

impl RealmInfo {
    pub fn metadata_url(&self) -> String {
        format!("{}/realms/{}/.well-known/openid-configuration", self.base_url, self.realm)
    }

    /// Substitutions consumed by the keycloak auth layer
    pub fn secret_variables(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (constants::ENV_KEYCLOAK_BASE_URL.to_owned(), self.base_url.clone()),
            (constants::ENV_KEYCLOAK_METADATA_URL.to_owned(), self.metadata_url()),
            (constants::ENV_KEYCLOAK_LOGIN_REALM.to_owned(), self.realm.clone()),
            (constants::ENV_KEYCLOAK_REALM.to_owned(), self.realm.clone()),
            (constants::ENV_KEYCLOAK_CLIENT_ID.to_owned(), self.client_id.clone()),
            (constants::ENV_KEYCLOAK_CLIENT_SECRET.to_owned(), self.client_secret.clone()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_representation_falls_back_to_client_id() {
        let client = KeycloakClientConfig {
            name: None,
            ..KeycloakClientConfig::default()
        };
        let representation = client.representation();
        assert_eq!(representation["name"], "rhdh-client");
        assert_eq!(representation["secret"], "rhdh-client-secret");
        assert_eq!(representation["publicClient"], false);
        assert_eq!(representation["defaultClientScopes"].as_array().map(Vec::len), Some(6));
    }

    #[test]
    fn test_default_users_join_developers() {
        let users = default_users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].email.as_deref(), Some("test2@example.com"));
        assert_eq!(users[1].password.as_deref(), Some("test2@123"));
        assert!(users.iter().all(|user| user.groups == vec!["developers".to_owned()]));
        assert!(users[0].representation().get("password").is_none());
    }

    #[test]
    fn test_user_from_representation() {
        let user = KeycloakUserConfig::from_representation(&json!({ "id": "u-1", "username": "test1", "enabled": true })).unwrap();
        assert_eq!(user.username, "test1");
        assert!(user.enabled);
        assert!(!user.email_verified);
        assert_eq!(KeycloakUserConfig::from_representation(&json!({ "id": "u-2" })), None);
    }

    #[test]
    fn test_secret_variables() {
        let info = RealmInfo {
            base_url: "https://keycloak-rhdh-keycloak.apps.example.com".to_owned(),
            realm: "rhdh".to_owned(),
            client_id: "rhdh-client".to_owned(),
            client_secret: "s3cret".to_owned(),
        };
        let variables = info.secret_variables();
        assert_eq!(
            variables.get("KEYCLOAK_METADATA_URL").map(String::as_str),
            Some("https://keycloak-rhdh-keycloak.apps.example.com/realms/rhdh/.well-known/openid-configuration")
        );
        assert_eq!(variables.get("KEYCLOAK_LOGIN_REALM").map(String::as_str), Some("rhdh"));
        assert_eq!(variables.get("KEYCLOAK_CLIENT_SECRET").map(String::as_str), Some("s3cret"));
        assert_eq!(variables.len(), 6);
    }
}
