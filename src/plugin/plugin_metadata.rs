use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

use crate::{
    constants,
    http::HttpFetcher,
    merge_yaml::{self, MergeOptions},
    model::Error,
    plugin::plugin_reference::{display_name, extract_plugin_name},
};

/// Controls discovery and injection of plugin descriptors
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginMetadataSettings {
    /// Directory holding the descriptor files. Relative paths resolve against the working directory.
    pub metadata_path: PathBuf,
    /// Pull request number. Enables rewriting of package references to registry locations.
    pub pr_number: Option<String>,
    /// Explicit opt-out of every metadata operation
    pub skip_injection: bool,
    /// Name of the invoking CI job
    pub job_name: Option<String>,
}

impl Default for PluginMetadataSettings {
    fn default() -> Self {
        PluginMetadataSettings {
            metadata_path: PathBuf::from(constants::DEFAULT_METADATA_PATH),
            pr_number: None,
            skip_injection: false,
            job_name: None,
        }
    }
}

impl PluginMetadataSettings {
    /// Metadata handling is on unless explicitly skipped or running in a periodic job
    pub fn is_enabled(&self) -> bool {
        if self.skip_injection {
            info!("Plugin metadata handling disabled ({} is set)", constants::ENV_SKIP_PLUGIN_METADATA_INJECTION);
            return false;
        }
        if self.job_name.as_deref().is_some_and(|job| job.contains(constants::PERIODIC_JOB_MARKER)) {
            info!("Plugin metadata handling disabled (periodic job detected)");
            return false;
        }
        true
    }

    pub fn pr_number(&self) -> Option<&str> {
        self.pr_number.as_deref().map(str::trim).filter(|pr| !pr.is_empty())
    }
}

/// Plugin metadata parsed from a descriptor file
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    /// `spec.dynamicArtifact`, e.g. `./dynamic-plugins/dist/plugin-name`
    pub package_path: String,
    /// `spec.packageName`, e.g. `@backstage-community/plugin-tech-radar`. Empty when absent.
    pub package_name: String,
    /// `spec.appConfigExamples[0].content`, an empty mapping when absent
    pub plugin_config: Value,
    pub source_file: PathBuf,
}

/// Descriptors keyed by the plugin name derived from their artifact reference
pub type DescriptorMap = BTreeMap<String, PluginDescriptor>;

#[derive(Deserialize, Default)]
struct DescriptorFile {
    spec: Option<DescriptorSpec>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DescriptorSpec {
    package_name: Option<String>,
    dynamic_artifact: Option<String>,
    #[serde(default)]
    app_config_examples: Option<Vec<AppConfigExample>>,
}

#[derive(Deserialize)]
struct AppConfigExample {
    content: Option<Value>,
}

/// One entry of `dynamic-plugins.yaml`
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginEntry {
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_config: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Contents of `dynamic-plugins.yaml`
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct DynamicPluginsConfig {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub plugins: Vec<PluginEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<PluginEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<PluginEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

impl DynamicPluginsConfig {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        Ok(serde_yaml::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value, Error> {
        Ok(serde_yaml::to_value(self)?)
    }
}

#[derive(Deserialize)]
struct SourceDescriptor {
    repo: Option<String>,
    #[serde(rename = "repo-ref")]
    repo_ref: Option<String>,
    #[serde(rename = "repo-flat")]
    repo_flat: Option<serde_json::Value>,
}

impl SourceDescriptor {
    fn is_flat(&self) -> bool {
        match &self.repo_flat {
            Some(serde_json::Value::Bool(flat)) => *flat,
            Some(serde_json::Value::String(flat)) => !flat.is_empty() && flat != "false",
            Some(serde_json::Value::Number(flat)) => flat.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }
}

/// Merges `plugin_config` from descriptors into the entries that reference them.
/// The descriptor provides the base, the entry's own `pluginConfig` overrides it.
pub fn inject_metadata_config(config: DynamicPluginsConfig, descriptors: &DescriptorMap) -> DynamicPluginsConfig {
    let plugins = config
        .plugins
        .into_iter()
        .map(|mut plugin| {
            let plugin_name = extract_plugin_name(&plugin.package);
            let Some(descriptor) = descriptors.get(&plugin_name) else {
                info!("No metadata found for: {} (from {})", plugin_name, plugin.package);
                return plugin;
            };
            info!("Injecting config for: {} (from {})", plugin_name, plugin.package);
            let user_config = plugin.plugin_config.take().unwrap_or_else(merge_yaml::empty_document);
            plugin.plugin_config = Some(merge_yaml::deep_merge(descriptor.plugin_config.clone(), user_config, &MergeOptions::default()));
            plugin
        })
        .collect();
    DynamicPluginsConfig { plugins, ..config }
}

async fn read_descriptor_file(path: &Path) -> Result<DescriptorFile, Error> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_yaml::from_str::<Option<DescriptorFile>>(&content)?.unwrap_or_default())
}

/// Lexically resolves `path` against the working directory, collapsing `.` and `..`
fn resolve_path(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map(|dir| dir.join(path)).unwrap_or_else(|_| path.to_path_buf())
    };
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

fn github_repo_pattern() -> Regex {
    Regex::new(r"github\.com[/:](.+?)(?:\.git)?/?$").expect("valid repository pattern")
}

/// Discovers plugin descriptor files and reconciles them with the dynamic plugins configuration
#[derive(Clone)]
pub struct PluginMetadataResolver {
    settings: PluginMetadataSettings,
    http: Arc<dyn HttpFetcher>,
}

impl PluginMetadataResolver {
    pub fn new(settings: PluginMetadataSettings, http: Arc<dyn HttpFetcher>) -> Self {
        PluginMetadataResolver { settings, http }
    }

    pub fn settings(&self) -> &PluginMetadataSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.is_enabled()
    }

    /// Absolute path of the metadata directory
    pub fn metadata_path(&self) -> PathBuf {
        resolve_path(&self.settings.metadata_path)
    }

    /// Returns the metadata directory, or `None` when it does not exist
    pub async fn metadata_directory(&self) -> Option<PathBuf> {
        let path = self.metadata_path();
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => {
                info!("Using metadata directory: {}", path.display());
                Some(path)
            }
            _ => {
                info!("Metadata directory not found: {}", path.display());
                None
            }
        }
    }

    /// Parses one descriptor file. Unreadable files and files without `spec.dynamicArtifact` yield `None`.
    pub async fn parse_metadata_file(path: &Path) -> Option<PluginDescriptor> {
        let descriptor = match read_descriptor_file(path).await {
            Ok(descriptor) => descriptor,
            Err(error) => {
                warn!("Error parsing {}: {}", path.display(), error);
                return None;
            }
        };
        let spec = descriptor.spec.unwrap_or_default();
        let Some(package_path) = spec.dynamic_artifact.filter(|artifact| !artifact.is_empty()) else {
            info!("Skipping {}: no spec.dynamicArtifact", path.display());
            return None;
        };
        let plugin_config = spec
            .app_config_examples
            .and_then(|examples| examples.into_iter().next())
            .and_then(|example| example.content)
            .filter(|content| !content.is_null())
            .unwrap_or_else(merge_yaml::empty_document);
        info!("Loaded metadata for: {}", package_path);
        Some(PluginDescriptor {
            package_path,
            package_name: spec.package_name.unwrap_or_default(),
            plugin_config,
            source_file: path.to_path_buf(),
        })
    }

    /// Parses every `*.yaml` file of `metadata_dir`. A later file wins when two derive the same plugin name.
    pub async fn load_descriptors(&self, metadata_dir: &Path) -> Result<DescriptorMap, Error> {
        let mut files: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(metadata_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|extension| extension == "yaml") && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        info!("Found {} metadata files in {}", files.len(), metadata_dir.display());

        let mut descriptors = DescriptorMap::new();
        for file in files {
            if let Some(descriptor) = Self::parse_metadata_file(&file).await {
                let plugin_name = extract_plugin_name(&descriptor.package_path);
                info!("Mapped plugin: {} <- {}", plugin_name, descriptor.package_path);
                descriptors.insert(plugin_name, descriptor);
            }
        }
        info!("Successfully parsed {} plugin metadata entries", descriptors.len());
        Ok(descriptors)
    }

    /// Fetches the version of every plugin built by a pull request and builds its registry reference.
    /// Returns references keyed by display name.
    pub async fn resolve_oci_references_for_pr(&self, workspace: &Path, pr_number: &str) -> Result<BTreeMap<String, String>, Error> {
        let source_json_path = workspace.join(constants::SOURCE_JSON_FILE);
        let plugins_list_path = workspace.join(constants::PLUGINS_LIST_FILE);
        if !tokio::fs::try_exists(&source_json_path).await.unwrap_or(false) {
            return Err(Error::NotFoundError(format!(
                "PR build requires {} but not found at: {}",
                constants::SOURCE_JSON_FILE,
                source_json_path.display()
            )));
        }
        if !tokio::fs::try_exists(&plugins_list_path).await.unwrap_or(false) {
            return Err(Error::NotFoundError(format!(
                "PR build requires {} but not found at: {}",
                constants::PLUGINS_LIST_FILE,
                plugins_list_path.display()
            )));
        }

        let source: SourceDescriptor = serde_json::from_str(&tokio::fs::read_to_string(&source_json_path).await?)?;
        let repo = source.repo.as_deref().filter(|repo| !repo.is_empty()).ok_or_else(|| {
            Error::ConfigurationError(format!("{} is missing required 'repo' field: {}", constants::SOURCE_JSON_FILE, source_json_path.display()))
        })?;
        let repo_ref = source.repo_ref.as_deref().filter(|repo_ref| !repo_ref.is_empty()).ok_or_else(|| {
            Error::ConfigurationError(format!("{} is missing required 'repo-ref' field: {}", constants::SOURCE_JSON_FILE, source_json_path.display()))
        })?;
        let owner_repo = github_repo_pattern()
            .captures(repo)
            .and_then(|captures| captures.get(1))
            .map(|owner_repo| owner_repo.as_str().to_owned())
            .ok_or_else(|| Error::ConfigurationError(format!("Failed to parse GitHub repo from {}: {}", constants::SOURCE_JSON_FILE, repo)))?;

        let plugins_list = tokio::fs::read_to_string(&plugins_list_path).await?;
        let plugin_paths: Vec<&str> = plugins_list
            .lines()
            .map(|line| line.trim().trim_end_matches(':').trim())
            .filter(|line| !line.is_empty())
            .collect();
        let workspace_name = workspace.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
        info!("Fetching versions for {} plugins from source...", plugin_paths.len());

        let mut references = BTreeMap::new();
        for plugin_path in plugin_paths {
            let manifest_path = if source.is_flat() {
                format!("{plugin_path}/package.json")
            } else {
                format!("workspaces/{workspace_name}/{plugin_path}/package.json")
            };
            let url = format!("{}/{}/{}/{}", constants::RAW_CONTENT_BASE_URL, owner_repo, repo_ref, manifest_path);
            let manifest = self.http.get_json(&url).await?;
            let name = manifest.get("name").and_then(|name| name.as_str()).filter(|name| !name.is_empty()).ok_or_else(|| {
                Error::NotFoundError(format!("package.json is missing 'name' field for {plugin_path}\n  URL: {url}"))
            })?;
            let version = manifest.get("version").and_then(|version| version.as_str()).filter(|version| !version.is_empty()).ok_or_else(|| {
                Error::NotFoundError(format!("package.json is missing 'version' field for {plugin_path}\n  URL: {url}"))
            })?;

            let display_name = display_name(name);
            let reference = format!("{}/{display_name}:pr_{pr_number}__{version}!{display_name}", constants::OCI_REGISTRY_PREFIX);
            info!("{} -> {}", display_name, reference);
            references.insert(display_name, reference);
        }
        Ok(references)
    }

    /// Builds a complete dynamic plugins configuration with one enabled entry per descriptor
    pub async fn generate_from_metadata_only(&self) -> Result<DynamicPluginsConfig, Error> {
        if !self.is_enabled() {
            info!("Returning empty dynamic plugins config (metadata handling disabled)");
            return Ok(DynamicPluginsConfig::default());
        }
        info!("No dynamic-plugins config provided, generating from metadata...");

        let metadata_dir = self.metadata_directory().await.ok_or_else(|| {
            Error::NotFoundError(format!(
                "Cannot generate dynamic-plugins config: metadata directory not found at: {}",
                self.metadata_path().display()
            ))
        })?;
        let descriptors = self.load_descriptors(&metadata_dir).await?;
        if descriptors.is_empty() {
            return Err(Error::NotFoundError(format!(
                "Cannot generate dynamic-plugins config: no valid metadata files found in {}",
                metadata_dir.display()
            )));
        }

        let references = match self.settings.pr_number() {
            Some(pr_number) => {
                info!("PR build detected (PR #{}), fetching OCI URLs...", pr_number);
                let workspace = metadata_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| metadata_dir.clone());
                Some(self.resolve_oci_references_for_pr(&workspace, pr_number).await?)
            }
            None => None,
        };

        let mut plugins = Vec::with_capacity(descriptors.len());
        for (plugin_name, descriptor) in descriptors {
            let package = match &references {
                Some(references) => registry_reference_for(&plugin_name, &descriptor, references)?,
                None => descriptor.package_path.clone(),
            };
            info!("Adding plugin: {} ({})", plugin_name, package);
            plugins.push(PluginEntry {
                package,
                disabled: Some(false),
                plugin_config: Some(descriptor.plugin_config),
                extra: BTreeMap::new(),
            });
        }
        info!("Generated dynamic-plugins config with {} plugins", plugins.len());
        Ok(DynamicPluginsConfig { plugins, extra: BTreeMap::new() })
    }

    /// Injects descriptor configuration into a user supplied configuration.
    /// Without a usable metadata directory this is fatal in PR mode and a no-op otherwise.
    pub async fn load_and_inject(&self, config: DynamicPluginsConfig) -> Result<DynamicPluginsConfig, Error> {
        if !self.is_enabled() {
            return Ok(config);
        }
        info!("Loading plugin metadata...");
        let pr_mode = self.settings.pr_number().is_some();

        let Some(metadata_dir) = self.metadata_directory().await else {
            if pr_mode {
                return Err(Error::NotFoundError(format!(
                    "PR build requires metadata directory but not found at: {}",
                    self.metadata_path().display()
                )));
            }
            info!("Skipping plugin metadata injection");
            return Ok(config);
        };
        let descriptors = self.load_descriptors(&metadata_dir).await?;
        if descriptors.is_empty() {
            if pr_mode {
                return Err(Error::NotFoundError(format!(
                    "PR build requires plugin metadata but no valid metadata files found in {}",
                    metadata_dir.display()
                )));
            }
            info!("Skipping plugin metadata injection");
            return Ok(config);
        }
        Ok(inject_metadata_config(config, &descriptors))
    }
}

fn registry_reference_for(plugin_name: &str, descriptor: &PluginDescriptor, references: &BTreeMap<String, String>) -> Result<String, Error> {
    if descriptor.package_name.is_empty() {
        return Err(Error::NotFoundError(format!(
            "PR build requires packageName in metadata but not found for: {}\n  Source file: {}",
            plugin_name,
            descriptor.source_file.display()
        )));
    }
    let display_name = display_name(&descriptor.package_name);
    let reference = references.get(&display_name).ok_or_else(|| {
        Error::NotFoundError(format!(
            "PR build requires OCI URL but not found for: {}\n  Package name: {}\n  Source file: {}",
            display_name,
            descriptor.package_name,
            descriptor.source_file.display()
        ))
    })?;
    info!("Replacing {} with {}", descriptor.package_path, reference);
    Ok(reference.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    fn descriptor(package_path: &str, config: &str) -> PluginDescriptor {
        PluginDescriptor {
            package_path: package_path.to_owned(),
            package_name: String::new(),
            plugin_config: yaml(config),
            source_file: PathBuf::from("metadata/test.yaml"),
        }
    }

    #[test]
    fn test_is_enabled() {
        let mut settings = PluginMetadataSettings::default();
        assert!(settings.is_enabled());
        settings.job_name = Some("periodic-ci-e2e-nightly".to_owned());
        assert!(!settings.is_enabled());
        settings.job_name = Some("pull-ci-e2e".to_owned());
        assert!(settings.is_enabled());
        settings.skip_injection = true;
        assert!(!settings.is_enabled());
    }

    #[test]
    fn test_blank_pr_number_is_ignored() {
        let settings = PluginMetadataSettings {
            pr_number: Some("  ".to_owned()),
            ..PluginMetadataSettings::default()
        };
        assert_eq!(settings.pr_number(), None);
    }

    #[test]
    fn test_inject_metadata_config() {
        let mut descriptors = DescriptorMap::new();
        descriptors.insert(
            "tech-radar".to_owned(),
            descriptor("./dynamic-plugins/dist/tech-radar", "dynamicPlugins: {frontend: {tech-radar: {mountPoints: [a]}}}\ntitle: Default"),
        );
        let config = DynamicPluginsConfig::from_value(yaml(
            "includes: [dynamic-plugins.default.yaml]\nplugins:\n  - package: oci://quay.io/rhdh/tech-radar:next\n    disabled: false\n    pluginConfig: {title: Mine}\n  - package: ./dynamic-plugins/dist/unknown\n    disabled: true\n",
        ))
        .unwrap();
        let injected = inject_metadata_config(config, &descriptors);
        assert_eq!(injected.plugins.len(), 2);
        assert_eq!(
            injected.plugins[0].plugin_config,
            Some(yaml("dynamicPlugins: {frontend: {tech-radar: {mountPoints: [a]}}}\ntitle: Mine"))
        );
        assert_eq!(injected.plugins[1].plugin_config, None);
        assert_eq!(injected.plugins[1].disabled, Some(true));
        assert_eq!(injected.extra.get("includes"), Some(&yaml("[dynamic-plugins.default.yaml]")));
    }

    #[test]
    fn test_dynamic_plugins_config_null_plugins() {
        let config = DynamicPluginsConfig::from_value(yaml("plugins:\n")).unwrap();
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_registry_reference_requires_package_name() {
        let references = BTreeMap::new();
        let result = registry_reference_for("x", &descriptor("./dist/x", "{}"), &references);
        assert!(matches!(result, Err(Error::NotFoundError(_))));
    }

    #[test]
    fn test_resolve_path_collapses_parent() {
        let resolved = resolve_path(Path::new("/work/e2e-tests/../metadata"));
        assert_eq!(resolved, PathBuf::from("/work/metadata"));
        assert_eq!(resolved.parent().unwrap().file_name().unwrap(), "work");
    }

    #[test]
    fn test_github_repo_pattern() {
        let captures = github_repo_pattern().captures("https://github.com/backstage/community-plugins.git").unwrap();
        assert_eq!(&captures[1], "backstage/community-plugins");
    }

    #[tokio::test]
    async fn test_parse_metadata_file() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir.path().join("full.yaml");
        tokio::fs::write(
            &full,
            "apiVersion: extensions.backstage.io/v1alpha1\nkind: Package\nspec:\n  packageName: '@acme/plugin-x'\n  dynamicArtifact: ./dynamic-plugins/dist/acme-plugin-x\n  appConfigExamples:\n    - title: Default\n      content:\n        acme: {enabled: true}\n",
        )
        .await
        .unwrap();
        let parsed = PluginMetadataResolver::parse_metadata_file(&full).await.unwrap();
        assert_eq!(parsed.package_path, "./dynamic-plugins/dist/acme-plugin-x");
        assert_eq!(parsed.package_name, "@acme/plugin-x");
        assert_eq!(parsed.plugin_config, yaml("acme: {enabled: true}"));

        let minimal = dir.path().join("minimal.yaml");
        tokio::fs::write(&minimal, "spec:\n  dynamicArtifact: ./dist/y\n").await.unwrap();
        let parsed = PluginMetadataResolver::parse_metadata_file(&minimal).await.unwrap();
        assert_eq!(parsed.plugin_config, merge_yaml::empty_document());
        assert_eq!(parsed.package_name, "");

        let invalid = dir.path().join("invalid.yaml");
        tokio::fs::write(&invalid, "spec:\n  packageName: nothing-else\n").await.unwrap();
        assert!(PluginMetadataResolver::parse_metadata_file(&invalid).await.is_none());

        let broken = dir.path().join("broken.yaml");
        tokio::fs::write(&broken, "spec: [unterminated\n").await.unwrap();
        assert!(PluginMetadataResolver::parse_metadata_file(&broken).await.is_none());
    }
}
