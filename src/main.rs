use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rhdh_deployer::{
    cluster,
    config_synthesizer::ConfigKind,
    constants,
    context_data::ContextData,
    http::ReqwestFetcher,
    keycloak::{KeycloakDeployment, KeycloakDeploymentConfig, RealmInfo, RhdhRealmOptions},
    merge_yaml::{self, MergeOptions},
    model::Error,
    rhdh::{DeploymentConfig, DeploymentOptions, RhdhDeployment},
    settings::Settings,
    utils,
};

/// Deploys Red Hat Developer Hub into a cluster from layered configuration
#[derive(Parser)]
#[command(name = "rhdh-deployer")]
#[command(version)]
struct Cli {
    /// Settings file
    #[arg(short, long, env = "RHDH_DEPLOYER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the namespace, apply configuration and roll out the application
    Deploy {
        #[command(flatten)]
        deployment: DeploymentArgs,

        /// Deploy Keycloak first and use it as the auth provider
        #[arg(long)]
        with_keycloak: bool,
    },

    /// Manage the Keycloak identity provider
    Keycloak {
        #[command(subcommand)]
        action: KeycloakAction,
    },

    /// Delete the namespace
    Teardown {
        #[arg(short, long)]
        namespace: String,
    },

    /// Restart the workload and wait for it to become ready
    Restart(DeploymentArgs),

    /// Wait for the workload to become ready
    Wait {
        #[command(flatten)]
        deployment: DeploymentArgs,

        /// Seconds to wait, defaults to the configured readiness timeout
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print or write a synthesized payload (app-config, secrets or dynamic-plugins)
    Synthesize {
        #[command(flatten)]
        deployment: DeploymentArgs,

        kind: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Deep merge YAML files, later files override earlier ones
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        /// replace, concat or merge-by-key
        #[arg(long, default_value = "replace")]
        strategy: String,

        /// Field identifying sequence items for merge-by-key
        #[arg(long, default_value = "package")]
        key: String,

        /// Skip missing inputs instead of failing
        #[arg(long)]
        allow_missing: bool,
    },
}

#[derive(Subcommand)]
enum KeycloakAction {
    /// Install Keycloak, prepare the RHDH realm and print the connection variables
    Deploy(KeycloakArgs),

    /// Delete the Keycloak namespace
    Teardown(KeycloakArgs),
}

#[derive(Args)]
struct KeycloakArgs {
    #[arg(long, default_value = "rhdh-keycloak")]
    namespace: String,

    #[arg(long, default_value = "keycloak")]
    release_name: String,

    /// Chart values layered over the built-in defaults
    #[arg(long)]
    values_file: Option<PathBuf>,

    #[arg(long, env = "KEYCLOAK_ADMIN_USER", default_value = "admin")]
    admin_user: String,

    #[arg(long, env = "KEYCLOAK_ADMIN_PASSWORD", default_value = "admin123", hide_env_values = true)]
    admin_password: String,

    #[arg(long, default_value = "rhdh")]
    realm: String,
}

impl From<&KeycloakArgs> for KeycloakDeploymentConfig {
    fn from(args: &KeycloakArgs) -> Self {
        KeycloakDeploymentConfig {
            namespace: args.namespace.clone(),
            release_name: args.release_name.clone(),
            values_file: args.values_file.clone(),
            admin_user: args.admin_user.clone(),
            admin_password: args.admin_password.clone(),
        }
    }
}

#[derive(Args)]
struct DeploymentArgs {
    #[arg(short, long)]
    namespace: String,

    #[arg(long, env = "RHDH_VERSION")]
    version: Option<String>,

    /// helm or operator
    #[arg(long, env = "INSTALLATION_METHOD")]
    method: Option<String>,

    /// guest or keycloak
    #[arg(long, env = "RHDH_AUTH_PROVIDER")]
    auth_provider: Option<String>,

    #[arg(long)]
    app_config: Option<PathBuf>,

    #[arg(long)]
    secrets: Option<PathBuf>,

    #[arg(long)]
    dynamic_plugins: Option<PathBuf>,

    #[arg(long)]
    value_file: Option<PathBuf>,

    #[arg(long)]
    subscription_file: Option<PathBuf>,
}

impl From<DeploymentArgs> for DeploymentOptions {
    fn from(args: DeploymentArgs) -> Self {
        DeploymentOptions {
            namespace: args.namespace,
            version: args.version,
            method: args.method,
            auth_provider: args.auth_provider,
            app_config: args.app_config,
            secrets: args.secrets,
            dynamic_plugins: args.dynamic_plugins,
            value_file: args.value_file,
            subscription_file: args.subscription_file,
        }
    }
}

fn merge_options(strategy: &str, key: &str) -> Result<MergeOptions, Error> {
    match strategy {
        "replace" => Ok(MergeOptions::default()),
        "concat" => Ok(MergeOptions::concat()),
        "merge-by-key" => Ok(MergeOptions::by_key(key)),
        other => Err(Error::ConfigurationError(format!("unknown array merge strategy '{other}'"))),
    }
}

async fn context(settings: Settings) -> Result<Arc<ContextData>, Error> {
    let mut context_data = ContextData::from_environment(settings).await?;
    if context_data.settings.cluster_router_base.is_none() {
        match cluster::cluster_ingress_domain(context_data.cluster.as_ref()).await {
            Ok(domain) => {
                info!("Using cluster ingress domain {domain} as router base");
                context_data.settings.cluster_router_base = Some(domain);
            }
            Err(error) => warn!("Could not determine the cluster router base: {error}"),
        }
    }
    Ok(Arc::new(context_data))
}

/// Deploys Keycloak and prepares the RHDH realm with the packaged defaults
async fn deploy_keycloak(config: KeycloakDeploymentConfig, realm: &str, context_data: Arc<ContextData>) -> Result<RealmInfo, Error> {
    let mut keycloak = KeycloakDeployment::new(config, context_data);
    keycloak.deploy().await?;
    keycloak
        .configure_for_rhdh(&RhdhRealmOptions {
            realm: Some(realm.to_owned()),
            ..RhdhRealmOptions::default()
        })
        .await
}

async fn run(cli: Cli) -> Result<(), Error> {
    let settings = Settings::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Deploy { deployment, with_keycloak } => {
            let context_data = context(settings).await?;
            let mut options: DeploymentOptions = deployment.into();
            let mut variables = Vec::new();
            if with_keycloak {
                let info = deploy_keycloak(KeycloakDeploymentConfig::default(), constants::KEYCLOAK_REALM, context_data.clone()).await?;
                options.auth_provider = Some("keycloak".to_owned());
                variables.extend(info.secret_variables());
            }
            let mut deployment = RhdhDeployment::new(&options, context_data)?.with_variables(variables);
            deployment.deploy().await?;
            match deployment.base_url() {
                Some(base_url) => info!("RHDH is available at {base_url}"),
                None => info!("RHDH deployed in namespace {}", deployment.namespace()),
            }
        }
        Commands::Keycloak { action } => match action {
            KeycloakAction::Deploy(args) => {
                let info = deploy_keycloak((&args).into(), &args.realm, context(settings).await?).await?;
                info!("Keycloak is available at {}", info.base_url);
                for (name, value) in info.secret_variables() {
                    println!("export {name}='{value}'");
                }
            }
            KeycloakAction::Teardown(args) => {
                let keycloak = KeycloakDeployment::new((&args).into(), Arc::new(ContextData::from_environment(settings).await?));
                keycloak.teardown().await?;
            }
        },
        Commands::Teardown { namespace } => {
            let context_data = ContextData::from_environment(settings).await?;
            cluster::delete_namespace(context_data.cluster.as_ref(), &namespace).await?;
        }
        Commands::Restart(args) => {
            let mut deployment = RhdhDeployment::new(&args.into(), context(settings).await?)?;
            deployment.rollout_restart().await?;
        }
        Commands::Wait { deployment, timeout } => {
            let timeout = Duration::from_secs(timeout.unwrap_or(settings.timings.readiness_timeout));
            let mut deployment = RhdhDeployment::new(&deployment.into(), context(settings).await?)?;
            deployment.wait_until_ready(timeout).await?;
        }
        Commands::Synthesize { deployment, kind, output } => {
            let kind: ConfigKind = kind.parse()?;
            let config = DeploymentConfig::build(&deployment.into(), &settings)?;
            let synthesizer = RhdhDeployment::synthesizer_for(&config, &settings, Arc::new(ReqwestFetcher::default()));
            let payload = synthesizer.synthesize(kind, &config).await?;
            match output {
                Some(path) => utils::write_yaml_file(&path, &payload).await?,
                None => print!("{}", serde_yaml::to_string(&payload)?),
            }
        }
        Commands::Merge {
            inputs,
            output,
            strategy,
            key,
            allow_missing,
        } => {
            let options = merge_options(&strategy, &key)?;
            if allow_missing {
                let merged = merge_yaml::merge_yaml_files_if_exists(&inputs, &options).await?;
                utils::write_yaml_file(&output, &merged).await?;
                info!("Merged available files into {}", output.display());
            } else {
                merge_yaml::merge_yaml_files_to_file(&inputs, &output, &options).await?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let version: &str = env!("CARGO_PKG_VERSION");
    info!("Starting rhdh-deployer {}", version);
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}
