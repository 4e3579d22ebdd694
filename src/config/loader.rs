// src/config/loader.rs

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::config::model::BuildConfiguration;
use crate::errors::{OperatorError, Result};

/// Load the build configuration, apply the optional override document, and
/// validate the result.
///
/// The base document is read from `config_path` if given, otherwise from
/// the `CONFIG_SPEC` environment variable. The override comes from
/// `override_path` or `OVERRIDE_SPEC`; if present it is merged on top of
/// the base at field granularity (objects merge recursively, everything
/// else is replaced).
pub fn load_configuration(
    config_path: Option<&str>,
    override_path: Option<&str>,
) -> Result<BuildConfiguration> {
    let raw = read_source(config_path, "CONFIG_SPEC")?.ok_or_else(|| {
        OperatorError::ConfigurationInvalid(
            "CONFIG_SPEC environment variable is not set or empty and no --config file was given"
                .to_string(),
        )
    })?;

    let mut doc: Value = serde_json::from_str(&raw)
        .map_err(|err| OperatorError::ConfigurationInvalid(format!("unparseable config: {err}")))?;

    if let Some(override_raw) = read_source(override_path, "OVERRIDE_SPEC")? {
        let override_doc: Value = serde_json::from_str(&override_raw).map_err(|err| {
            OperatorError::ConfigurationInvalid(format!("unparseable override: {err}"))
        })?;
        debug!("applying configuration override");
        merge_documents(&mut doc, override_doc);
    }

    let config: BuildConfiguration = serde_json::from_value(doc)
        .map_err(|err| OperatorError::ConfigurationInvalid(err.to_string()))?;

    validate(&config)?;
    Ok(config)
}

/// Read a document from a path, or fall back to an environment variable.
/// Returns `None` when neither yields content.
fn read_source(path: Option<&str>, env_var: &str) -> Result<Option<String>> {
    if let Some(path) = path {
        let contents = fs::read_to_string(Path::new(path))?;
        return Ok(Some(contents));
    }
    match std::env::var(env_var) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        _ => Ok(None),
    }
}

/// Merge `overlay` into `base`. Objects merge key-by-key, recursively;
/// arrays and scalars are replaced wholesale, last writer wins.
fn merge_documents(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_documents(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay) => *base_slot = overlay,
    }
}

fn validate(config: &BuildConfiguration) -> Result<()> {
    ensure_unique_names(
        config.images.iter().map(|image| image.name.as_str()),
        "images",
    )?;
    ensure_unique_names(config.tests.iter().map(|test| test.name.as_str()), "tests")?;

    for image in &config.images {
        if image.name.is_empty() {
            return Err(OperatorError::ConfigurationInvalid(
                "images entries must have a non-empty name".to_string(),
            ));
        }
    }
    for test in &config.tests {
        if test.name.is_empty() {
            return Err(OperatorError::ConfigurationInvalid(
                "tests entries must have a non-empty name".to_string(),
            ));
        }
        if test.commands.is_empty() {
            return Err(OperatorError::ConfigurationInvalid(format!(
                "test '{}' must define commands",
                test.name
            )));
        }
    }
    Ok(())
}

fn ensure_unique_names<'a>(names: impl Iterator<Item = &'a str>, section: &str) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(OperatorError::ConfigurationInvalid(format!(
                "duplicate name '{name}' in {section}"
            )));
        }
    }
    Ok(())
}
