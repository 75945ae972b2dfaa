use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::{
    cluster::{self, ClusterClient},
    command::CommandSpec,
    config_synthesizer::{ConfigKind, ConfigSynthesizer},
    constants,
    context_data::ContextData,
    merge_yaml::{self, MergeOptions},
    model::Error,
    rhdh::DeploymentConfig,
    utils,
};

/// Where the composed subscription manifest for `namespace` is written
pub fn subscription_file_path(scratch_dir: &Path, namespace: &str) -> PathBuf {
    scratch_dir.join(format!("{namespace}-subscription.yaml"))
}

/// Fetches the catalog source installer for the release branch of `version` and pipes it to bash
///
/// The version reaches the script as the positional parameter `$1`, never as script text.
pub fn catalog_source_command(version: &str) -> CommandSpec {
    let script = format!(
        "set -euo pipefail; curl -fsSL \"{}/release-$1/.rhdh/scripts/install-rhdh-catalog-source.sh\" | bash -s -- -v \"$1\" --install-operator rhdh",
        constants::OPERATOR_SCRIPTS_BASE_URL
    );
    CommandSpec::shell(&script).args(["install-rhdh-catalog-source", version])
}

/// Polls until the CustomResourceDefinition `name` is registered
///
/// # Arguments
/// - `cluster` - Cluster access
/// - `name` - Full CRD name, e.g. `backstages.rhdh.redhat.com`
/// - `timeout` - Upper bound for the wait
/// - `interval` - Pause between two lookups
pub async fn wait_for_crd(cluster: &dyn ClusterClient, name: &str, timeout: Duration, interval: Duration) -> Result<(), Error> {
    let deadline = Instant::now() + timeout;
    loop {
        match cluster::crd_exists(cluster, name).await {
            Ok(true) => {
                info!("CRD {name} is created");
                return Ok(());
            }
            Ok(false) => info!("Waiting for CRD {name} to be created..."),
            Err(error) => warn!("Could not look up CRD {name}: {error}"),
        }
        if Instant::now() >= deadline {
            return Err(Error::TimeoutError(format!("CRD {name} not created after {}s", timeout.as_secs())));
        }
        sleep(interval).await;
    }
}

/// Rolls the deployment out through the operator's catalog subscription
///
/// The dynamic plugins ConfigMap is applied first since the Backstage resource in the subscription references it.
/// A CRD that never shows up is only logged; applying the subscription reports the real problem.
pub async fn deploy_with_operator(
    context_data: &ContextData,
    synthesizer: &ConfigSynthesizer,
    config: &DeploymentConfig,
    subscription_file: &Path,
) -> Result<(), Error> {
    let settings = &context_data.settings;
    let namespace = config.namespace.as_str();

    let dynamic_plugins = synthesizer.synthesize(ConfigKind::DynamicPlugins, config).await?;
    cluster::apply_config_map_from_value(context_data.cluster.as_ref(), constants::DYNAMIC_PLUGINS_CONFIG_MAP_NAME, namespace, &dynamic_plugins).await?;

    synthesizer.defaults().materialize().await?;
    let subscription = merge_yaml::merge_yaml_files_if_exists(
        &[synthesizer.defaults().operator_subscription(), subscription_file.to_path_buf()],
        &MergeOptions::default(),
    )
    .await?;
    info!("Subscription:\n{}", serde_yaml::to_string(&subscription)?);
    let subscription_path = subscription_file_path(&settings.scratch_dir, namespace);
    utils::write_yaml_file(&subscription_path, &subscription).await?;

    context_data.runner.run(&catalog_source_command(&config.version)).await?;

    let timings = settings.timings;
    if let Err(error) = wait_for_crd(
        context_data.cluster.as_ref(),
        constants::BACKSTAGE_CRD_NAME,
        Duration::from_secs(timings.crd_wait_timeout),
        Duration::from_secs(timings.crd_poll_interval),
    )
    .await
    {
        warn!("Error: {error}. Applying the subscription anyway");
    }

    let apply = CommandSpec::new("oc").args(["apply".to_owned(), "-f".to_owned(), subscription_path.display().to_string(), "-n".to_owned(), namespace.to_owned()]);
    context_data.runner.run(&apply).await?;
    info!("Operator deployment executed successfully in namespace {namespace}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_source_command() {
        let command = catalog_source_command("1.5");
        assert_eq!(command.program, "bash");
        assert_eq!(command.args.len(), 4);
        assert!(command.args[1].starts_with("set -euo pipefail; curl -fsSL "));
        assert!(command.args[1].contains("/release-$1/.rhdh/scripts/install-rhdh-catalog-source.sh"));
        assert!(command.args[1].ends_with("-v \"$1\" --install-operator rhdh"));
        assert!(!command.args[1].contains("1.5"));
        assert_eq!(command.args[2], "install-rhdh-catalog-source");
        assert_eq!(command.args[3], "1.5");
    }

    #[test]
    fn test_subscription_file_path() {
        assert_eq!(subscription_file_path(Path::new("/tmp"), "showcase"), PathBuf::from("/tmp/showcase-subscription.yaml"));
    }
}
