use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    constants,
    http::{HttpClient, HttpRequest, HttpResponse},
    keycloak::keycloak_config::{KeycloakClientConfig, KeycloakConnectionConfig, KeycloakGroupConfig, KeycloakRealmConfig, KeycloakUserConfig},
    model::Error,
};

/// Joins `segments` onto `base_url` with percent encoding and appends the query pairs
pub fn endpoint(base_url: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<String, Error> {
    let mut url = reqwest::Url::parse(base_url).map_err(|error| Error::ConfigurationError(format!("invalid Keycloak URL '{base_url}': {error}")))?;
    url.path_segments_mut()
        .map_err(|_| Error::ConfigurationError(format!("Keycloak URL '{base_url}' cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url.to_string())
}

fn id_of(representation: &Value) -> Option<&str> {
    representation.get("id").and_then(Value::as_str)
}

fn name_of(representation: &Value) -> Option<&str> {
    representation.get("name").and_then(Value::as_str)
}

/// Whether the master realm answers, i.e. the server accepts requests
pub async fn is_available(http: &dyn HttpClient, base_url: &str) -> bool {
    let Ok(url) = endpoint(base_url, &["realms", constants::KEYCLOAK_MASTER_REALM], &[]) else {
        return false;
    };
    match http.send(&HttpRequest::get(url)).await {
        Ok(response) => response.is_success(),
        Err(_) => false,
    }
}

/// An authenticated session against the Keycloak admin REST API
#[derive(Clone)]
pub struct KeycloakAdmin {
    http: Arc<dyn HttpClient>,
    base_url: String,
    token: String,
}

impl KeycloakAdmin {
    /// Logs in with a password grant, or with client credentials when no user is given
    pub async fn connect(http: Arc<dyn HttpClient>, connection: &KeycloakConnectionConfig) -> Result<Self, Error> {
        let realm = connection.realm.as_deref().unwrap_or(constants::KEYCLOAK_MASTER_REALM);
        let form: Vec<(&str, &str)> = match connection {
            KeycloakConnectionConfig {
                username: Some(username),
                password: Some(password),
                client_id,
                ..
            } => vec![
                ("grant_type", "password"),
                ("client_id", client_id.as_deref().unwrap_or(constants::KEYCLOAK_ADMIN_CLIENT_ID)),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ],
            KeycloakConnectionConfig {
                client_id: Some(client_id),
                client_secret: Some(client_secret),
                ..
            } => vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ],
            _ => {
                return Err(Error::ConfigurationError(
                    "Keycloak connection needs a username and password or a client id and secret".to_owned(),
                ))
            }
        };

        let url = endpoint(&connection.base_url, &["realms", realm, "protocol", "openid-connect", "token"], &[])?;
        let response = http.send(&HttpRequest::post(url.as_str()).form(form)).await?.error_for_status(&url)?;
        let token = response
            .body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::NetworkError {
                url: url.clone(),
                message: "token response carries no access_token".to_owned(),
            })?
            .to_owned();
        info!("Authenticated against Keycloak at {}", connection.base_url);
        Ok(KeycloakAdmin {
            http,
            base_url: connection.base_url.trim_end_matches('/').to_owned(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn admin_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<String, Error> {
        let mut path = vec!["admin", "realms"];
        path.extend_from_slice(segments);
        endpoint(&self.base_url, &path, query)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.http.send(&request.bearer(&self.token)).await
    }

    async fn list(&self, url: String) -> Result<Vec<Value>, Error> {
        let response = self.send(HttpRequest::get(url.as_str())).await?.error_for_status(&url)?;
        match response.body {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(Error::NetworkError {
                url,
                message: format!("expected a JSON list, got {other}"),
            }),
        }
    }

    async fn get(&self, url: String) -> Result<Value, Error> {
        Ok(self.send(HttpRequest::get(url.as_str())).await?.error_for_status(&url)?.body)
    }

    /// POSTs `body`. Returns `false` when the server reports the object as already existing.
    async fn create(&self, url: String, body: Value, description: &str) -> Result<bool, Error> {
        let response = self.send(HttpRequest::post(url.as_str()).json(body)).await?;
        if response.is_conflict() {
            info!("{description} already exists");
            return Ok(false);
        }
        response.error_for_status(&url)?;
        info!("Created {description}");
        Ok(true)
    }

    pub async fn create_realm(&self, realm: &KeycloakRealmConfig) -> Result<(), Error> {
        let url = self.admin_url(&[], &[])?;
        self.create(url, realm.representation(), &format!("realm {}", realm.realm)).await?;
        Ok(())
    }

    pub async fn create_client(&self, realm: &str, client: &KeycloakClientConfig) -> Result<(), Error> {
        let url = self.admin_url(&[realm, "clients"], &[])?;
        self.create(url, client.representation(), &format!("client {}", client.client_id)).await?;
        Ok(())
    }

    pub async fn create_group(&self, realm: &str, group: &KeycloakGroupConfig) -> Result<(), Error> {
        let url = self.admin_url(&[realm, "groups"], &[])?;
        self.create(url, json!({ "name": group.name }), &format!("group {}", group.name)).await?;
        Ok(())
    }

    /// Creates the user, sets its password and adds it to its groups. An existing user is left untouched.
    pub async fn create_user(&self, realm: &str, user: &KeycloakUserConfig) -> Result<(), Error> {
        let url = self.admin_url(&[realm, "users"], &[])?;
        if !self.create(url, user.representation(), &format!("user {}", user.username)).await? {
            return Ok(());
        }
        let user_id = self
            .find_user_id(realm, &user.username)
            .await?
            .ok_or_else(|| Error::NotFoundError(format!("user {} in realm {realm} after creating it", user.username)))?;

        if let Some(password) = &user.password {
            let url = self.admin_url(&[realm, "users", user_id.as_str(), "reset-password"], &[])?;
            let credential = json!({ "type": "password", "value": password, "temporary": user.temporary });
            self.send(HttpRequest::put(url.as_str()).json(credential)).await?.error_for_status(&url)?;
        }
        for group in &user.groups {
            self.add_user_to_group(realm, &user_id, group).await?;
        }
        Ok(())
    }

    async fn find_user_id(&self, realm: &str, username: &str) -> Result<Option<String>, Error> {
        let url = self.admin_url(&[realm, "users"], &[("username", username), ("exact", "true")])?;
        let users = self.list(url).await?;
        Ok(users.iter().find_map(id_of).map(str::to_owned))
    }

    async fn find_group_id(&self, realm: &str, name: &str) -> Result<Option<String>, Error> {
        let url = self.admin_url(&[realm, "groups"], &[("search", name)])?;
        let groups = self.list(url).await?;
        Ok(groups
            .iter()
            .find(|group| name_of(group) == Some(name))
            .and_then(id_of)
            .map(str::to_owned))
    }

    async fn find_client_uuid(&self, realm: &str, client_id: &str) -> Result<String, Error> {
        let url = self.admin_url(&[realm, "clients"], &[("clientId", client_id)])?;
        let clients = self.list(url).await?;
        clients
            .iter()
            .find_map(id_of)
            .map(str::to_owned)
            .ok_or_else(|| Error::NotFoundError(format!("client {client_id} in realm {realm}")))
    }

    async fn add_user_to_group(&self, realm: &str, user_id: &str, group: &str) -> Result<(), Error> {
        let Some(group_id) = self.find_group_id(realm, group).await? else {
            warn!("Group {group} not found in realm {realm}");
            return Ok(());
        };
        let url = self.admin_url(&[realm, "users", user_id, "groups", group_id.as_str()], &[])?;
        self.send(HttpRequest::put(url.as_str())).await?.error_for_status(&url)?;
        info!("Added user to group {group}");
        Ok(())
    }

    pub async fn users(&self, realm: &str) -> Result<Vec<KeycloakUserConfig>, Error> {
        let url = self.admin_url(&[realm, "users"], &[])?;
        Ok(self.list(url).await?.iter().filter_map(KeycloakUserConfig::from_representation).collect())
    }

    pub async fn groups(&self, realm: &str) -> Result<Vec<KeycloakGroupConfig>, Error> {
        let url = self.admin_url(&[realm, "groups"], &[])?;
        Ok(self
            .list(url)
            .await?
            .iter()
            .filter_map(name_of)
            .map(|name| KeycloakGroupConfig { name: name.to_owned() })
            .collect())
    }

    /// Deletes the user. A user that does not exist is not an error.
    pub async fn delete_user(&self, realm: &str, username: &str) -> Result<(), Error> {
        let Some(user_id) = self.find_user_id(realm, username).await? else {
            return Ok(());
        };
        let url = self.admin_url(&[realm, "users", user_id.as_str()], &[])?;
        self.send(HttpRequest::delete(url.as_str())).await?.error_for_status(&url)?;
        info!("Deleted user {username}");
        Ok(())
    }

    /// Deletes the group. A group that does not exist is not an error.
    pub async fn delete_group(&self, realm: &str, name: &str) -> Result<(), Error> {
        let Some(group_id) = self.find_group_id(realm, name).await? else {
            return Ok(());
        };
        let url = self.admin_url(&[realm, "groups", group_id.as_str()], &[])?;
        self.send(HttpRequest::delete(url.as_str())).await?.error_for_status(&url)?;
        info!("Deleted group {name}");
        Ok(())
    }

    /// Best effort, failures only end up in the log
    pub async fn delete_realm(&self, realm: &str) {
        let result = match self.admin_url(&[realm], &[]) {
            Ok(url) => match self.send(HttpRequest::delete(url.as_str())).await {
                Ok(response) => response.error_for_status(&url).map(|_| ()),
                Err(error) => Err(error),
            },
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => info!("Deleted realm {realm}"),
            Err(error) => warn!("Failed to delete realm {realm}: {error}"),
        }
    }

    /// Grants the client's service account the realm-management roles RHDH's catalog sync needs
    pub async fn assign_service_account_roles(&self, realm: &str, client_id: &str) -> Result<(), Error> {
        let client_uuid = self.find_client_uuid(realm, client_id).await?;
        let url = self.admin_url(&[realm, "clients", client_uuid.as_str(), "service-account-user"], &[])?;
        let service_account = self.get(url).await?;
        let service_account_id = id_of(&service_account)
            .ok_or_else(|| Error::NotFoundError(format!("service account user of client {client_id}")))?
            .to_owned();

        let management_uuid = self.find_client_uuid(realm, constants::REALM_MANAGEMENT_CLIENT_ID).await?;
        let url = self.admin_url(&[realm, "clients", management_uuid.as_str(), "roles"], &[])?;
        let roles: Vec<Value> = self
            .list(url)
            .await?
            .into_iter()
            .filter(|role| name_of(role).is_some_and(|name| constants::SERVICE_ACCOUNT_ROLES.contains(&name)))
            .map(|role| json!({ "id": id_of(&role), "name": name_of(&role) }))
            .collect();
        if roles.is_empty() {
            warn!("None of the service account roles exist in realm {realm}");
            return Ok(());
        }

        let names: Vec<&str> = roles.iter().filter_map(name_of).collect();
        info!("Assigning service account roles: {}", names.join(", "));
        let url = self.admin_url(&[realm, "users", service_account_id.as_str(), "role-mappings", "clients", management_uuid.as_str()], &[])?;
        self.send(HttpRequest::post(url.as_str()).json(Value::Array(roles))).await?.error_for_status(&url)?;
        Ok(())
    }
}
