use crate::{constants, model::Error};
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        OnceLock,
    },
};
use tracing::debug;

pub fn common_lables(name: String, instance: Option<String>) -> BTreeMap<String, String> {
    let mut labels: BTreeMap<String, String> = BTreeMap::new();
    labels.insert(constants::LABEL_KUBERNETES_NAME.to_owned(), name);
    labels.insert(constants::LABEL_KUBERNETES_MANAGED_BY.to_owned(), constants::MANAGED_BY.to_owned());
    if let Some(instance) = instance {
        labels.insert(constants::LABEL_KUBERNETES_INSTANCE.to_owned(), instance);
    }
    labels
}

fn envsubst_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").expect("valid envsubst pattern"))
}

/// Replaces `$VAR` and `${VAR}` references in `input`. Unset variables expand to an empty string.
pub fn envsubst_with<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    envsubst_pattern()
        .replace_all(input, |captures: &Captures| {
            let name = captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str()).unwrap_or_default();
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

/// Applies `envsubst_with` to every string scalar of a YAML document. Keys are left untouched.
pub fn envsubst_value<F>(value: Value, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(text) => Value::String(envsubst_with(&text, lookup)),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(|item| envsubst_value(item, lookup)).collect()),
        Value::Mapping(mapping) => Value::Mapping(mapping.into_iter().map(|(key, item)| (key, envsubst_value(item, lookup))).collect()),
        Value::Tagged(mut tagged) => {
            tagged.value = envsubst_value(tagged.value, lookup);
            Value::Tagged(tagged)
        }
        other => other,
    }
}

/// Compares two strings treating runs of ASCII digits as numbers, so `1.10-2` sorts after `1.9-2`
pub fn compare_numeric_aware(left: &str, right: &str) -> Ordering {
    let left_chunks = split_digit_runs(left);
    let right_chunks = split_digit_runs(right);
    for (l, r) in left_chunks.iter().zip(right_chunks.iter()) {
        let l_numeric = l.bytes().all(|b| b.is_ascii_digit());
        let r_numeric = r.bytes().all(|b| b.is_ascii_digit());
        let ordering = if l_numeric && r_numeric {
            let l_trimmed = l.trim_start_matches('0');
            let r_trimmed = r.trim_start_matches('0');
            l_trimmed.len().cmp(&r_trimmed.len()).then_with(|| l_trimmed.cmp(r_trimmed))
        } else {
            l.cmp(r)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left_chunks.len().cmp(&right_chunks.len())
}

fn split_digit_runs(input: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut previous_digit: Option<bool> = None;
    for (index, character) in input.char_indices() {
        let is_digit = character.is_ascii_digit();
        if let Some(previous) = previous_digit {
            if previous != is_digit {
                chunks.push(&input[start..index]);
                start = index;
            }
        }
        previous_digit = Some(is_digit);
    }
    if start < input.len() {
        chunks.push(&input[start..]);
    }
    chunks
}

/// Serializes `value` as YAML and writes it to `path`, creating parent directories
pub async fn write_yaml_file(path: &Path, value: &Value) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, serde_yaml::to_string(value)?).await?;
    debug!("Wrote YAML document to {}", path.display());
    Ok(())
}

/// Writes `content` through a temporary sibling that is renamed over `path`, so readers never see a partial file
pub async fn write_atomically(path: &Path, content: &str) -> Result<(), Error> {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
    let temporary = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
    ));
    tokio::fs::write(&temporary, content).await?;
    if let Err(error) = tokio::fs::rename(&temporary, path).await {
        let _ = tokio::fs::remove_file(&temporary).await;
        return Err(error.into());
    }
    Ok(())
}
