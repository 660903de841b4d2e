use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;

pub const CONFIG_FILE: &str = "dispenser.toml";

/// Runtime configuration of the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Directory backing the settings file store.
    pub store_dir: PathBuf,
    /// `tracing_subscriber` filter directive.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./data"),
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `dispenser.toml` in the working directory, then env vars.
pub fn load_config() -> AppConfig {
    let mut config = AppConfig::default();
    if let Ok(raw) = fs::read_to_string(CONFIG_FILE) {
        if let Ok(file_cfg) = parse_file(&raw) {
            apply_file(&mut config, &file_cfg);
        }
    }
    apply_env(&mut config, |name| std::env::var(name).ok());
    config
}

/// Load from an explicit config file instead of the working directory.
/// Unlike the implicit file, an unreadable or malformed one is an error.
pub fn load_config_from(path: &Path) -> anyhow::Result<AppConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = config_from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(config)
}

fn config_from_str(raw: &str) -> anyhow::Result<AppConfig> {
    let file_cfg = parse_file(raw)?;
    let mut config = AppConfig::default();
    apply_file(&mut config, &file_cfg);
    apply_env(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

fn parse_file(raw: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    toml::from_str::<HashMap<String, String>>(raw)
}

fn apply_file(config: &mut AppConfig, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("store_dir") {
        config.store_dir = PathBuf::from(v);
    }
    if let Some(v) = file_cfg.get("log_filter") {
        config.log_filter = v.clone();
    }
}

fn apply_env(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DISPENSER_STORE_DIR") {
        config.store_dir = PathBuf::from(v);
    }
    if let Some(v) = var("APP__STORE_DIR") {
        config.store_dir = PathBuf::from(v);
    }

    if let Some(v) = var("RUST_LOG") {
        config.log_filter = v;
    }
    if let Some(v) = var("DISPENSER_LOG") {
        config.log_filter = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn temp_config(contents: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let path = env::temp_dir().join(format!("water_dispenser_config_{suffix}.toml"));
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn file_values_override_defaults() {
        let mut config = AppConfig::default();
        let file_cfg =
            parse_file("store_dir = \"/var/lib/dispenser\"\nlog_filter = \"debug\"\n").unwrap();
        apply_file(&mut config, &file_cfg);
        apply_env(&mut config, no_env);
        assert_eq!(config.store_dir, PathBuf::from("/var/lib/dispenser"));
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn malformed_file_fails_to_parse() {
        assert!(parse_file("store_dir = [1, 2").is_err());
    }

    #[test]
    fn explicit_malformed_file_is_an_error() {
        let path = temp_config("store_dir = [1, 2");
        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config"));
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let path = env::temp_dir().join("water_dispenser_config_missing.toml");
        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("reading config"));
    }

    #[test]
    fn env_wins_over_file() {
        let mut config = AppConfig::default();
        apply_file(&mut config, &parse_file("store_dir = \"from-file\"").unwrap());
        apply_env(&mut config, |name| match name {
            "APP__STORE_DIR" => Some("from-env".into()),
            "DISPENSER_LOG" => Some("trace".into()),
            "RUST_LOG" => Some("warn".into()),
            _ => None,
        });
        assert_eq!(config.store_dir, PathBuf::from("from-env"));
        assert_eq!(config.log_filter, "trace");
    }
}
