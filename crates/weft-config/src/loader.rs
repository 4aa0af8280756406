//! Config file loading and merging.
//!
//! Implements the `FabricConfig::load()` algorithm:
//! 1. Parse embedded `defaults.toml` → base
//! 2. Deep-merge the operator's config file, if given
//! 3. Apply `WEFT_*` env var overrides
//! 4. Deserialize the merged tree
//! 5. Sort `node.node_list`
//! 6. Validate

use std::path::Path;

use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::types::FabricConfig;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Load the node configuration.
///
/// `path` is the operator's config file; `None` runs on defaults plus env
/// overrides, which is the single-node dev deployment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is unreadable or malformed, or if
/// the merged configuration fails validation. Validation failures are
/// startup-fatal by design.
pub fn load(path: Option<&Path>) -> ConfigResult<FabricConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::Parse {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    if let Some(path) = path {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let overlay: toml::Value = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        deep_merge(&mut merged, overlay);
        info!(path = %path.display(), "loaded config file");
    }

    apply_env_overrides(&mut merged);

    let mut config: FabricConfig = merged.try_into()?;

    // The partitioner indexes into the sorted list; sorting here keeps
    // every node's view identical regardless of file order.
    config.node.node_list.sort();
    config.node.node_list.dedup();

    validate::validate(&config)?;
    Ok(config)
}

/// Recursively merge `overlay` into `base`. Tables merge key-by-key;
/// everything else is replaced wholesale.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_table.insert(key, value);
                    },
                }
            }
        },
        (base_slot, value) => *base_slot = value,
    }
}

/// Env overrides for the handful of values that differ per instance in a
/// fleet deployment. Everything else belongs in the config file.
fn apply_env_overrides(merged: &mut toml::Value) {
    let overrides: [(&str, &str, &str); 4] = [
        ("WEFT_NODE_ID", "node", "node_id"),
        ("WEFT_BIND", "server", "bind"),
        ("WEFT_DATABASE_URL", "database", "url"),
        ("WEFT_LOG_LEVEL", "logging", "level"),
    ];

    for (var, section, key) in overrides {
        if let Ok(value) = std::env::var(var) {
            let Some(table) = merged
                .get_mut(section)
                .and_then(|section| section.as_table_mut())
            else {
                warn!(var, section, "cannot apply env override");
                continue;
            };
            table.insert(key.to_owned(), toml::Value::String(value));
            info!(var, "applied env override");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_load_and_validate() {
        let config = load(None).unwrap();
        assert_eq!(config.node.rooms, 20);
        assert_eq!(config.consumer.threads, 40);
        assert_eq!(config.consumer.max_messages, 10);
        assert_eq!(config.batch_writer.size, 1000);
        assert_eq!(config.batch_writer.buffer_capacity, 10_000);
        assert_eq!(config.session.write_queue_capacity, 1000);
        assert_eq!(config.write_serializer.worker_threads, 50);
        assert!(!config.producer_batch.enabled);
        assert!(config.dlq.enabled);
    }

    #[test]
    fn test_file_overlay_merges_partially() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[node]\nnode_id = \"b\"\nnode_list = [\"c\", \"a\", \"b\"]\n\n[batch_writer]\nsize = 50"
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.node.node_id, "b");
        assert_eq!(config.node.node_list, vec!["a", "b", "c"], "sorted on load");
        assert_eq!(config.batch_writer.size, 50);
        // Untouched sections keep their defaults.
        assert_eq!(config.batch_writer.buffer_capacity, 10_000);
        assert_eq!(config.node.rooms, 20);
    }

    #[test]
    fn test_batch_size_over_capacity_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[batch_writer]\nsize = 20000").unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [").unwrap();

        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
