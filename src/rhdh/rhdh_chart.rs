use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

use crate::{http::HttpFetcher, model::Error, utils};

/// The two version shapes a deployment accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartVersion {
    /// `1` or `1.2`, resolved against the registry tag listing
    Semantic(String),
    /// A CI tag such as `1.5-123-CI`, used verbatim
    CiBuild(String),
}

fn semantic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid version pattern"))
}

fn ci_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+(-\d+)?-CI$").expect("valid CI version pattern"))
}

impl ChartVersion {
    pub fn parse(version: &str) -> Result<Self, Error> {
        if semantic_pattern().is_match(version) {
            Ok(ChartVersion::Semantic(version.to_owned()))
        } else if ci_pattern().is_match(version) {
            Ok(ChartVersion::CiBuild(version.to_owned()))
        } else {
            Err(Error::ConfigurationError(format!("invalid Helm chart version format: \"{version}\"")))
        }
    }
}

/// Highest tag starting with `{prefix}-` under numeric-aware ordering
pub fn select_chart_version<'a, I>(tags: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let marker = format!("{prefix}-");
    tags.into_iter()
        .filter(|tag| tag.starts_with(&marker))
        .max_by(|left, right| utils::compare_numeric_aware(left, right))
        .map(str::to_owned)
}

/// Turns a deployment version into a concrete chart version
///
/// # Arguments
/// - `http` - Fetcher for the registry tag listing
/// - `tags_url` - Endpoint returning `{"tags": [{"name": ...}]}`
/// - `version` - Parsed deployment version
pub async fn resolve_chart_version(http: &dyn HttpFetcher, tags_url: &str, version: &ChartVersion) -> Result<String, Error> {
    let prefix = match version {
        ChartVersion::CiBuild(tag) => return Ok(tag.clone()),
        ChartVersion::Semantic(prefix) => prefix,
    };
    let listing = http.get_json(tags_url).await?;
    let tags = listing
        .get("tags")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| Error::NetworkError {
            url: tags_url.to_owned(),
            message: "response carries no tags list".to_owned(),
        })?;
    let names = tags.iter().filter_map(|tag| tag.get("name").and_then(serde_json::Value::as_str));
    let resolved = select_chart_version(names, prefix).ok_or_else(|| Error::NotFoundError(format!("no chart version found for {prefix}")))?;
    info!("Chart version {prefix} resolved to {resolved}");
    Ok(resolved)
}
