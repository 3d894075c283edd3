use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::mode::Credential;
use crate::paths;
use crate::transcript::DEFAULT_GREETING;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http_proxy: String,
    #[serde(default)]
    pub https_proxy: String,
    /// Base URL of the chat backend.
    pub api_base: Option<String>,
    /// Bearer token enabling persistent conversations.
    pub token: Option<String>,
    /// How many stored messages to load when switching conversations.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    pub greeting: Option<String>,
    /// Where the session identity and active chat id are kept.
    pub storage_dir: Option<PathBuf>,
}

const CONFIG_FILE_PATH: &str = "config.toml";

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_proxy: String::new(),
            https_proxy: String::new(),
            api_base: None,
            token: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            greeting: None,
            storage_dir: None,
        }
    }
}

impl Config {
    /// Load from `~/.calmbuddy/config.json`, else `./config.toml`, then
    /// apply environment overrides.
    pub fn new() -> Self {
        let mut config = Config::default();

        let mut loaded = false;
        let json_path = paths::config_json_path();
        if json_path.exists() {
            match paths::load_config_json::<Config>(&json_path) {
                Ok(file_config) => {
                    config = file_config;
                    loaded = true;
                }
                Err(e) => log::warn!("Ignoring {}: {}", json_path.display(), e),
            }
        }

        if !loaded && std::path::Path::new(CONFIG_FILE_PATH).exists() {
            if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_PATH) {
                match toml::from_str::<Config>(&content) {
                    Ok(file_config) => config = file_config,
                    Err(e) => log::warn!("Ignoring {}: {}", CONFIG_FILE_PATH, e),
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(http_proxy) = lookup("HTTP_PROXY") {
            self.http_proxy = http_proxy;
        }
        if let Some(https_proxy) = lookup("HTTPS_PROXY") {
            self.https_proxy = https_proxy;
        }
        if let Some(api_base) = lookup("CALMBUDDY_API_BASE") {
            self.api_base = Some(api_base);
        }
        if let Some(token) = lookup("CALMBUDDY_TOKEN") {
            self.token = Some(token);
        }
        if let Some(limit) = lookup("CALMBUDDY_HISTORY_LIMIT") {
            match limit.trim().parse() {
                Ok(limit) => self.history_limit = limit,
                Err(_) => log::warn!("Ignoring invalid CALMBUDDY_HISTORY_LIMIT: {limit:?}"),
            }
        }
        if let Some(greeting) = lookup("CALMBUDDY_GREETING") {
            self.greeting = Some(greeting);
        }
        if let Some(storage_dir) = lookup("CALMBUDDY_STORAGE_DIR") {
            self.storage_dir = Some(PathBuf::from(storage_dir));
        }
        if lookup("CALMBUDDY_GUEST").is_some_and(|v| parse_bool_env(&v)) {
            self.token = None;
        }
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    pub fn credential(&self) -> Option<Credential> {
        self.token.as_deref().and_then(Credential::parse)
    }

    pub fn greeting(&self) -> &str {
        self.greeting.as_deref().unwrap_or(DEFAULT_GREETING)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(paths::session_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parse_bool_env_true_values() {
        for value in ["1", "true", "TRUE", " yes ", "Y", "on"] {
            assert!(parse_bool_env(value), "value {value:?} should be true");
        }
    }

    #[test]
    fn parse_bool_env_false_values() {
        for value in ["0", "false", "no", "off", "", "  "] {
            assert!(!parse_bool_env(value), "value {value:?} should be false");
        }
    }

    #[test]
    fn defaults_without_overrides() {
        let config = Config::default();
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.greeting(), DEFAULT_GREETING);
        assert!(config.credential().is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config.apply_env(lookup_from(&[
            ("CALMBUDDY_API_BASE", "http://example.test/"),
            ("CALMBUDDY_TOKEN", "abc"),
            ("CALMBUDDY_HISTORY_LIMIT", "20"),
            ("CALMBUDDY_GREETING", "hey"),
        ]));

        assert_eq!(config.api_base(), "http://example.test");
        assert_eq!(config.credential().unwrap().expose(), "abc");
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.greeting(), "hey");
    }

    #[test]
    fn invalid_history_limit_is_ignored() {
        let mut config = Config::default();
        config.apply_env(lookup_from(&[("CALMBUDDY_HISTORY_LIMIT", "lots")]));
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
    }

    #[test]
    fn guest_flag_drops_token() {
        let mut config = Config::default();
        config.apply_env(lookup_from(&[
            ("CALMBUDDY_TOKEN", "abc"),
            ("CALMBUDDY_GUEST", "yes"),
        ]));
        assert!(config.credential().is_none());
    }

    #[test]
    fn toml_config_parses_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            api_base = "http://localhost:9000"
            token = "t"
            "#,
        )
        .unwrap();
        assert_eq!(config.api_base(), "http://localhost:9000");
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert!(config.http_proxy.is_empty());
    }
}
