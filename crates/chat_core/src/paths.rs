use std::path::{Path, PathBuf};

/// CalmBuddy data directory (~/.calmbuddy)
pub fn calmbuddy_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".calmbuddy")
}

/// config.json path
pub fn config_json_path() -> PathBuf {
    calmbuddy_dir().join("config.json")
}

/// Directory holding locally persisted session keys
pub fn session_dir() -> PathBuf {
    calmbuddy_dir().join("session")
}

/// Load a JSON config file
pub fn load_config_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read config: {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dir_lives_under_data_dir() {
        assert!(session_dir().starts_with(calmbuddy_dir()));
        assert!(config_json_path().ends_with("config.json"));
    }

    #[test]
    fn load_config_json_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_json::<serde_json::Value>(&dir.path().join("nope.json"))
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn load_config_json_parses_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"a": 1}"#).unwrap();
        let value: serde_json::Value = load_config_json(&path).unwrap();
        assert_eq!(value["a"], 1);
    }
}
