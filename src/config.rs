use crate::services::target_registry::normalize_keyword;
use crate::services::TargetRegistry;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// Keyword → label.
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherConfig {
    pub dry_run_interval_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            dry_run_interval_ms: 3000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            watcher: WatcherConfig::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then `ACTIVEWATCH_*` variables.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("ACTIVEWATCH_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "pretty" => {}
            _ => anyhow::bail!("Invalid log format: {}", self.logging.format),
        }

        if self.watcher.dry_run_interval_ms < 100 {
            anyhow::bail!("dry_run_interval_ms must be at least 100");
        }

        let mut seen: HashMap<String, &str> = HashMap::new();
        for keyword in self.targets.keys() {
            let normalized = normalize_keyword(keyword)
                .with_context(|| format!("Invalid target keyword {:?}", keyword))?;
            if let Some(previous) = seen.insert(normalized.clone(), keyword) {
                anyhow::bail!(
                    "Target keywords {:?} and {:?} collide as {:?}",
                    previous,
                    keyword,
                    normalized
                );
            }
        }

        Ok(())
    }

    pub fn dry_run_interval(&self) -> Duration {
        Duration::from_millis(self.watcher.dry_run_interval_ms)
    }

    pub fn registry(&self) -> Result<TargetRegistry> {
        let mut registry = TargetRegistry::new();
        for (keyword, label) in &self.targets {
            registry.insert(keyword, label.clone())?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.registry().unwrap().is_empty());
    }

    #[test]
    fn loads_targets_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "activewatch.toml",
                r#"
                [logging]
                level = "debug"
                format = "pretty"

                [targets]
                Chrome = "Browser"
                code = "Editor"
                "#,
            )?;

            let config = Config::load("activewatch.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.watcher.dry_run_interval_ms, 3000);

            let registry = config.registry().map_err(|e| e.to_string())?;
            assert_eq!(registry.label("chrome"), Some("Browser"));
            assert_eq!(registry.label("code"), Some("Editor"));
            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_defaults() {
        Jail::expect_with(|_| {
            let config = Config::load("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, "info");
            assert!(config.targets.is_empty());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("activewatch.toml", "[logging]\nlevel = \"warn\"\n")?;
            jail.set_env("ACTIVEWATCH_LOGGING__LEVEL", "trace");
            jail.set_env("ACTIVEWATCH_WATCHER__DRY_RUN_INTERVAL_MS", "500");

            let config = Config::load("activewatch.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, "trace");
            assert_eq!(config.dry_run_interval(), Duration::from_millis(500));
            Ok(())
        });
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.watcher.dry_run_interval_ms = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.targets.insert(" ".to_string(), "Blank".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_colliding_keywords() {
        let mut config = Config::default();
        config.targets.insert("Code".to_string(), "Editor".to_string());
        config.targets.insert("code".to_string(), "IDE".to_string());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("collide"));
    }
}
