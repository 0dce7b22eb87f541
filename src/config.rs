use crate::condition::SearchMode;
use crate::decode::DEFAULT_DECODE_DEPTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Free-form label for the loaded profile.
    pub profile_name: String,
    pub url: UrlRules,
    pub defaults: DefaultRules,
    pub query: QueryRules,
    pub storage: StorageRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile_name: "base".to_string(),
            url: UrlRules::default(),
            defaults: DefaultRules::default(),
            query: QueryRules::default(),
            storage: StorageRules::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlRules {
    /// Decode-and-retry rounds when a JSON value fails to parse.
    pub json_decode_depth: usize,
}

impl Default for UrlRules {
    fn default() -> Self {
        Self {
            json_decode_depth: DEFAULT_DECODE_DEPTH,
        }
    }
}

/// Hard defaults used when neither the URL nor persisted storage say otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultRules {
    pub start_time: String,
    pub end_time: String,
    pub search_mode: SearchMode,
    pub page_size: u32,
}

impl Default for DefaultRules {
    fn default() -> Self {
        Self {
            start_time: "now-15m".to_string(),
            end_time: "now".to_string(),
            search_mode: SearchMode::Ui,
            page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRules {
    /// Synthetic host-selector condition that never reaches the backend.
    pub ip_selector_field: String,
    /// Field types whose values are lower-cased for wildcard operators when
    /// the field is not case sensitive.
    pub case_folding_field_types: Vec<String>,
}

impl Default for QueryRules {
    fn default() -> Self {
        Self {
            ip_selector_field: "_ip-select_".to_string(),
            case_folding_field_types: vec!["text".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageRules {
    /// Key of the JSON blob holding persisted search defaults.
    pub global_key: String,
    /// Key of the common-filter history list.
    pub history_key: String,
    pub history_limit: usize,
    /// Old blob key -> current blob key, applied once at load.
    pub legacy_keys: BTreeMap<String, String>,
}

impl Default for StorageRules {
    fn default() -> Self {
        let legacy_keys = [
            ("SEARCH_TYPE", "search_mode"),
            ("searchMode", "search_mode"),
            ("pageSize", "page_size"),
            ("startTime", "start_time"),
            ("endTime", "end_time"),
        ]
        .into_iter()
        .map(|(old, new)| (old.to_string(), new.to_string()))
        .collect();

        Self {
            global_key: "bk_log_global_storage".to_string(),
            history_key: "bk_log_common_filter_history".to_string(),
            history_limit: 5,
            legacy_keys,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    if let Some(path) = path {
        load_config_from_path(path)
    } else {
        Ok(default_config().clone())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<EngineConfig, ConfigError> {
    let path_display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_display.clone(),
        source,
    })?;

    toml::from_str::<EngineConfig>(&raw).map_err(|source| ConfigError::Parse {
        path: path_display,
        source,
    })
}

pub fn default_config() -> &'static EngineConfig {
    static DEFAULT_CONFIG: LazyLock<EngineConfig> = LazyLock::new(EngineConfig::default);
    &DEFAULT_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "profile_name = \"team\"\n[defaults]\nstart_time = \"now-1h\"\n[storage]\nhistory_limit = 3"
        )
        .unwrap();

        let config = load_config_from_path(file.path()).unwrap();
        assert_eq!(config.profile_name, "team");
        assert_eq!(config.defaults.start_time, "now-1h");
        assert_eq!(config.defaults.end_time, "now");
        assert_eq!(config.storage.history_limit, 3);
        assert_eq!(config.url.json_decode_depth, DEFAULT_DECODE_DEPTH);
        assert_eq!(config.query.ip_selector_field, "_ip-select_");
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = load_config_from_path(Path::new("/nonexistent/query-link.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[defaults\npage_size = ").unwrap();
        let err = load_config_from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_search_mode_in_config_accepts_legacy_digit() {
        let config: EngineConfig = toml::from_str("[defaults]\nsearch_mode = \"1\"").unwrap();
        assert_eq!(config.defaults.search_mode, SearchMode::Sql);
    }
}
