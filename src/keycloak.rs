pub mod keycloak_admin;
pub mod keycloak_config;
pub mod keycloak_deployment;

pub use keycloak_admin::KeycloakAdmin;
pub use keycloak_config::{
    KeycloakClientConfig, KeycloakConnectionConfig, KeycloakDeploymentConfig, KeycloakGroupConfig, KeycloakRealmConfig, KeycloakUserConfig, RealmInfo,
    RhdhRealmOptions,
};
pub use keycloak_deployment::KeycloakDeployment;
