// Environment variables
pub const ENV_RHDH_VERSION: &str = "RHDH_VERSION";
pub const ENV_INSTALLATION_METHOD: &str = "INSTALLATION_METHOD";
pub const ENV_AUTH_PROVIDER: &str = "RHDH_AUTH_PROVIDER";
pub const ENV_CLUSTER_ROUTER_BASE: &str = "K8S_CLUSTER_ROUTER_BASE";
pub const ENV_CHART_URL: &str = "CHART_URL";
pub const ENV_CHART_TAGS_URL: &str = "RHDH_CHART_TAGS_URL";
pub const ENV_DEFAULT_CONFIG_DIR: &str = "RHDH_DEFAULT_CONFIG_DIR";
pub const ENV_METADATA_PATH: &str = "RHDH_METADATA_PATH";
pub const ENV_GIT_PR_NUMBER: &str = "GIT_PR_NUMBER";
pub const ENV_SKIP_PLUGIN_METADATA_INJECTION: &str = "RHDH_SKIP_PLUGIN_METADATA_INJECTION";
pub const ENV_JOB_NAME: &str = "JOB_NAME";
pub const ENV_RHDH_BASE_URL: &str = "RHDH_BASE_URL";
pub const ENV_KEYCLOAK_BASE_URL: &str = "KEYCLOAK_BASE_URL";
pub const ENV_KEYCLOAK_METADATA_URL: &str = "KEYCLOAK_METADATA_URL";
pub const ENV_KEYCLOAK_LOGIN_REALM: &str = "KEYCLOAK_LOGIN_REALM";
pub const ENV_KEYCLOAK_REALM: &str = "KEYCLOAK_REALM";
pub const ENV_KEYCLOAK_CLIENT_ID: &str = "KEYCLOAK_CLIENT_ID";
pub const ENV_KEYCLOAK_CLIENT_SECRET: &str = "KEYCLOAK_CLIENT_SECRET";
pub const PERIODIC_JOB_MARKER: &str = "periodic-";

// Labels
pub const LABEL_KUBERNETES_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_KUBERNETES_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_KUBERNETES_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "rhdh-deployer";
pub const RHDH_INSTANCE_SELECTOR: &str = "app.kubernetes.io/instance in (redhat-developer-hub,developer-hub)";

// Cluster resources
pub const APP_CONFIG_MAP_NAME: &str = "app-config-rhdh";
pub const SECRETS_NAME: &str = "rhdh-secrets";
pub const DYNAMIC_PLUGINS_CONFIG_MAP_NAME: &str = "dynamic-plugins";
pub const HELM_RELEASE_NAME: &str = "redhat-developer-hub";
pub const HELM_URL_PREFIX: &str = "redhat-developer-hub";
pub const OPERATOR_URL_PREFIX: &str = "backstage-developer-hub";
pub const BACKSTAGE_CRD_NAME: &str = "backstages.rhdh.redhat.com";

// Remote endpoints
pub const DEFAULT_CHART_URL: &str = "oci://quay.io/rhdh/chart";
pub const DEFAULT_CHART_TAGS_URL: &str = "https://quay.io/api/v1/repository/rhdh/chart/tag/?onlyActiveTags=true&limit=600";
pub const OPERATOR_SCRIPTS_BASE_URL: &str = "https://raw.githubusercontent.com/redhat-developer/rhdh-operator/refs/heads";
pub const RAW_CONTENT_BASE_URL: &str = "https://raw.githubusercontent.com";
pub const OCI_REGISTRY_PREFIX: &str = "oci://ghcr.io/redhat-developer/rhdh-plugin-export-overlays";

// Plugin metadata
pub const DEFAULT_METADATA_PATH: &str = "../metadata";
pub const SOURCE_JSON_FILE: &str = "source.json";
pub const PLUGINS_LIST_FILE: &str = "plugins-list.yaml";
pub const PLUGIN_PACKAGE_KEY: &str = "package";

// Keycloak
pub const KEYCLOAK_NAMESPACE: &str = "rhdh-keycloak";
pub const KEYCLOAK_RELEASE_NAME: &str = "keycloak";
pub const KEYCLOAK_ADMIN_USER: &str = "admin";
pub const KEYCLOAK_ADMIN_PASSWORD: &str = "admin123";
pub const KEYCLOAK_REALM: &str = "rhdh";
pub const KEYCLOAK_MASTER_REALM: &str = "master";
pub const KEYCLOAK_ADMIN_CLIENT_ID: &str = "admin-cli";
pub const KEYCLOAK_APP_NAME: &str = "keycloak";
pub const BITNAMI_CHART_REPO: &str = "https://charts.bitnami.com/bitnami";
pub const BITNAMI_CHART_NAME: &str = "bitnami/keycloak";
pub const REALM_MANAGEMENT_CLIENT_ID: &str = "realm-management";
pub const SERVICE_ACCOUNT_ROLES: [&str; 3] = ["view-authorization", "manage-authorization", "view-users"];

// Timings, in seconds
pub const READINESS_TIMEOUT: u64 = 300;
pub const READINESS_POLL_INTERVAL: u64 = 5;
pub const CRD_WAIT_TIMEOUT: u64 = 300;
pub const CRD_POLL_INTERVAL: u64 = 20;
pub const SCALE_DOWN_TIMEOUT: u64 = 120;
pub const LOG_TAIL_LINES: u32 = 100;
pub const KEYCLOAK_WAIT_TIMEOUT: u64 = 300;
pub const KEYCLOAK_POLL_INTERVAL: u64 = 5;

// Pod states that never recover on their own
pub const POD_FAILURE_REASONS: [&str; 7] = [
    "CrashLoopBackOff",
    "Error",
    "ImagePullBackOff",
    "ErrImagePull",
    "InvalidImageName",
    "CreateContainerConfigError",
    "CreateContainerError",
];
