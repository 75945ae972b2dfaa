use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{
    cluster,
    command::CommandSpec,
    config_synthesizer::{ConfigKind, ConfigSynthesizer},
    constants,
    context_data::ContextData,
    merge_yaml::{self, MergeOptions},
    model::Error,
    rhdh::{rhdh_chart, DeploymentConfig},
    utils,
};

/// Where the composed values file for `namespace` is written
pub fn values_file_path(scratch_dir: &Path, namespace: &str) -> PathBuf {
    scratch_dir.join(format!("{namespace}-value-file.yaml"))
}

/// Places the dynamic plugins payload under `global.dynamic`
pub fn compose_values(values: Value, dynamic_plugins: Value) -> Value {
    let mut values = match values {
        Value::Mapping(values) => values,
        _ => Mapping::new(),
    };
    let global_key = Value::String("global".to_owned());
    let mut global = match values.get(&global_key) {
        Some(Value::Mapping(global)) => global.clone(),
        _ => Mapping::new(),
    };
    global.insert(Value::String("dynamic".to_owned()), dynamic_plugins);
    values.insert(global_key, Value::Mapping(global));
    Value::Mapping(values)
}

pub fn helm_upgrade_command(chart_url: &str, chart_version: &str, values_file: &Path, router_base: Option<&str>, namespace: &str) -> CommandSpec {
    let mut command = CommandSpec::new("helm").args([
        "upgrade",
        constants::HELM_RELEASE_NAME,
        "-i",
        chart_url,
        "--version",
        chart_version,
        "-f",
    ]);
    command = command.arg(values_file.display().to_string());
    if let Some(router_base) = router_base {
        command = command.args(["--set".to_owned(), format!("global.clusterRouterBase={router_base}")]);
    }
    command.arg(format!("--namespace={namespace}"))
}

/// Installs or upgrades the chart release for the deployment
///
/// # Arguments
/// - `context_data` - Collaborators and settings
/// - `synthesizer` - Produces the dynamic plugins payload folded into the values
/// - `config` - The deployment being rolled out
/// - `value_file` - The user's values layer
/// - `router_base` - Cluster router base passed to the chart, when known
///
/// Returns the chart version that was installed.
pub async fn deploy_with_helm(
    context_data: &ContextData,
    synthesizer: &ConfigSynthesizer,
    config: &DeploymentConfig,
    value_file: &Path,
    router_base: Option<&str>,
) -> Result<String, Error> {
    let settings = &context_data.settings;
    let chart_version = rhdh_chart::resolve_chart_version(context_data.http.as_ref(), &settings.chart_tags_url, &config.chart_version()?).await?;
    info!("Helm chart version resolved to: {chart_version}");

    synthesizer.defaults().materialize().await?;
    let values = merge_yaml::merge_yaml_files_if_exists(&[synthesizer.defaults().helm_value_file(), value_file.to_path_buf()], &MergeOptions::default()).await?;
    let dynamic_plugins = synthesizer.synthesize(ConfigKind::DynamicPlugins, config).await?;
    let values = compose_values(values, dynamic_plugins);
    info!("Value File:\n{}", serde_yaml::to_string(&values)?);

    let values_path = values_file_path(&settings.scratch_dir, &config.namespace);
    utils::write_yaml_file(&values_path, &values).await?;

    let command = helm_upgrade_command(&settings.chart_url, &chart_version, &values_path, router_base, &config.namespace);
    context_data.runner.run(&command).await?;
    info!("Helm deployment completed successfully in namespace {}", config.namespace);
    Ok(chart_version)
}

/// Scales the workload to zero, waits for its pods to go away and scales it back to the replica count it had.
/// The chart does not restart pods when only ConfigMaps or Secrets change.
pub async fn scale_restart(context_data: &ContextData, namespace: &str) -> Result<(), Error> {
    let runner = &context_data.runner;
    let selector = constants::RHDH_INSTANCE_SELECTOR;
    let replicas = restore_replicas(context_data, namespace).await;
    info!("Scaling down deployment in namespace {namespace}");
    runner.run(&scale_command(namespace, 0)).await?;

    let wait = CommandSpec::new("oc").args([
        "wait".to_owned(),
        "--for=delete".to_owned(),
        "pod".to_owned(),
        "-l".to_owned(),
        selector.to_owned(),
        "-n".to_owned(),
        namespace.to_owned(),
        format!("--timeout={}s", context_data.settings.timings.scale_down_timeout),
    ]);
    if let Err(error) = runner.run(&wait).await {
        warn!("Pods in namespace {namespace} did not terminate in time, scaling up anyway: {error}");
    }

    info!("Scaling up deployment in namespace {namespace} to {replicas} replicas");
    runner.run(&scale_command(namespace, replicas)).await?;
    Ok(())
}

/// Replica count to scale back up to. A workload already at zero, or one that cannot be read, comes back with one.
async fn restore_replicas(context_data: &ContextData, namespace: &str) -> u32 {
    match cluster::declared_replicas(context_data.cluster.as_ref(), namespace, constants::RHDH_INSTANCE_SELECTOR).await {
        Ok(Some(replicas)) if replicas > 0 => replicas.unsigned_abs(),
        Ok(_) => 1,
        Err(error) => {
            warn!("Could not read the replica count in namespace {namespace}, restoring 1: {error}");
            1
        }
    }
}

fn scale_command(namespace: &str, replicas: u32) -> CommandSpec {
    CommandSpec::new("oc").args([
        "scale".to_owned(),
        "deployment".to_owned(),
        "-l".to_owned(),
        constants::RHDH_INSTANCE_SELECTOR.to_owned(),
        format!("--replicas={replicas}"),
        "-n".to_owned(),
        namespace.to_owned(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_values_keeps_existing_global_keys() {
        let values: Value = serde_yaml::from_str("global:\n  host: example\nupstream:\n  replicas: 1\n").unwrap();
        let dynamic: Value = serde_yaml::from_str("plugins:\n  - package: ./a\n").unwrap();
        let composed = compose_values(values, dynamic.clone());
        assert_eq!(composed["global"]["host"], Value::String("example".to_owned()));
        assert_eq!(composed["global"]["dynamic"], dynamic);
        assert_eq!(composed["upstream"]["replicas"], Value::Number(1.into()));
    }

    #[test]
    fn test_compose_values_replaces_scalar_global() {
        let values: Value = serde_yaml::from_str("global: none\n").unwrap();
        let composed = compose_values(values, Value::Null);
        assert!(composed["global"].is_mapping());
    }

    #[test]
    fn test_helm_upgrade_command() {
        let command = helm_upgrade_command(
            "oci://quay.io/rhdh/chart",
            "1.5-10-CI",
            Path::new("/tmp/showcase-value-file.yaml"),
            Some("apps.example.com"),
            "showcase",
        );
        assert_eq!(
            command.to_string(),
            "helm upgrade redhat-developer-hub -i oci://quay.io/rhdh/chart --version 1.5-10-CI -f /tmp/showcase-value-file.yaml --set global.clusterRouterBase=apps.example.com --namespace=showcase"
        );
        let without_router = helm_upgrade_command("chart", "1", Path::new("v.yaml"), None, "ns");
        assert!(!without_router.args.contains(&"--set".to_owned()));
    }

    #[test]
    fn test_scale_command() {
        assert_eq!(
            scale_command("showcase", 0).args,
            vec![
                "scale",
                "deployment",
                "-l",
                constants::RHDH_INSTANCE_SELECTOR,
                "--replicas=0",
                "-n",
                "showcase"
            ]
        );
    }
}
