use crate::config::{Config, ConfigError};
use crate::metrics::MetricDefinition;
use camino::{Utf8Path, Utf8PathBuf};
use globset::GlobBuilder;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use walkdir::WalkDir;

const LOG_TARGET: &str = "   metrics";

/// Finds the definition files matching `pattern`, sorted by path.
///
/// When `only` is not empty, just the files whose file name appears in it are kept. A pattern whose
/// leading directory does not exist matches nothing.
pub fn discover(pattern: &str, only: &[String]) -> Result<Vec<Utf8PathBuf>, ConfigError> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let root = walk_root(pattern);
    let walk_from = if root.as_str().is_empty() { Utf8Path::new(".") } else { root.as_path() };

    let mut files = Vec::new();

    if walk_from.exists() {
        for entry_result in WalkDir::new(walk_from).follow_links(false) {
            let entry = entry_result.map_err(|e| ConfigError::Io {
                path: e.path().map_or_else(|| walk_from.to_path_buf(), |p| Utf8PathBuf::from(p.to_string_lossy().into_owned())),
                source: e.into(),
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            let Some(path) = Utf8Path::from_path(entry.path()) else {
                log::warn!(target: LOG_TARGET, "Skipping '{}': path is not valid UTF-8", entry.path().display());
                continue;
            };

            let candidate = if root.as_str().is_empty() { path.strip_prefix(".").unwrap_or(path) } else { path };
            if !matcher.is_match(candidate) {
                continue;
            }

            if !only.is_empty() && !candidate.file_name().is_some_and(|name| only.iter().any(|o| o == name)) {
                continue;
            }

            files.push(candidate.to_path_buf());
        }
    }

    files.sort();

    log::debug!(target: LOG_TARGET, "Pattern '{pattern}' matched {} definition file(s)", files.len());

    Ok(files)
}

/// The leading components of `pattern` that hold no glob syntax.
fn walk_root(pattern: &str) -> Utf8PathBuf {
    let mut root = Utf8PathBuf::new();

    for component in Utf8Path::new(pattern).components() {
        if component.as_str().contains(['*', '?', '[', '{']) {
            break;
        }
        root.push(component);
    }

    root
}

/// Discovers, parses and validates every definition matching `pattern`.
pub fn load_definitions(pattern: &str, only: &[String], config: &Config) -> Result<Vec<MetricDefinition>, ConfigError> {
    let files = discover(pattern, only)?;
    load_files(&files, config)
}

/// Parses and validates the given definition files.
///
/// Metric names must be unique across all of them.
pub fn load_files(files: &[impl AsRef<Utf8Path>], config: &Config) -> Result<Vec<MetricDefinition>, ConfigError> {
    let mut seen: HashMap<Arc<str>, Utf8PathBuf> = HashMap::with_capacity(files.len());
    let mut definitions = Vec::with_capacity(files.len());

    for file in files {
        let file = file.as_ref();
        let text = fs::read_to_string(file).map_err(|source| ConfigError::Io {
            path: file.to_path_buf(),
            source,
        })?;

        let definition = MetricDefinition::from_yaml(&text, file)?;
        definition.validate_against(config)?;

        if let Some(first) = seen.get(&definition.name) {
            return Err(ConfigError::DuplicateMetric {
                name: definition.name.to_string(),
                first: first.clone(),
                second: file.to_path_buf(),
            });
        }

        let _ = seen.insert(Arc::clone(&definition.name), file.to_path_buf());

        log::debug!(
            target: LOG_TARGET,
            "Loaded '{}' ({}, {} sub-metric(s)) from '{file}'",
            definition.name,
            definition.metric_type,
            definition.sub_metrics.len()
        );

        definitions.push(definition);
    }

    log::info!(target: LOG_TARGET, "Loaded {} metric definition(s)", definitions.len());

    Ok(definitions)
}
