use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Catalog DSN (PostgreSQL or SQLite).
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/janitor.db"),
        }
    }
}

impl DatabaseConfig {
    /// In-memory catalog, used by tests and throwaway runs.
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store DSN: `memory://`, `file:///path`, or
    /// `s3://[access_key:secret_key@]host[:port]/bucket`.
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file://.data/objects"),
        }
    }
}

/// Settings for the orphaned-object reconciliation job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Arm the reconciliation job on startup.
    ///
    /// Env: JANITOR__RECONCILER__ENABLED
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cron expression controlling the cadence (seconds-resolution grammar).
    /// The default fires once daily at 03:00.
    ///
    /// Env: JANITOR__RECONCILER__SCHEDULE
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Identify and count orphans without deleting them.
    ///
    /// Env: JANITOR__RECONCILER__DRY_RUN
    #[serde(default)]
    pub dry_run: bool,

    /// Keys requested per listing page.
    ///
    /// Env: JANITOR__RECONCILER__PAGE_SIZE
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Abort a run that exceeds this wall-clock limit. Unset means no limit.
    ///
    /// Env: JANITOR__RECONCILER__RUN_TIMEOUT
    #[serde(default, with = "humantime_serde")]
    pub run_timeout: Option<Duration>,
}

fn default_enabled() -> bool {
    true
}

fn default_schedule() -> String {
    String::from("0 0 3 * * *")
}

fn default_page_size() -> usize {
    1000
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            schedule: default_schedule(),
            dry_run: false,
            page_size: default_page_size(),
            run_timeout: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Catalog database configuration.
    pub database: DatabaseConfig,
    /// Object storage configuration.
    pub storage: StorageConfig,
    /// Reconciliation job configuration.
    pub reconciler: ReconcilerConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file("janitor.toml"))
            .merge(Env::prefixed("JANITOR__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("JANITOR__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();

        assert_eq!(config.database.dsn, "sqlite://.data/janitor.db");
        assert_eq!(config.storage.dsn, "file://.data/objects");
        assert!(config.reconciler.enabled);
        assert_eq!(config.reconciler.schedule, "0 0 3 * * *");
        assert!(!config.reconciler.dry_run);
        assert_eq!(config.reconciler.page_size, 1000);
        assert!(config.reconciler.run_timeout.is_none());
    }

    #[test]
    fn test_configless_operation() {
        // Defaults alone must extract into a working configuration
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .extract::<Configuration>()
            .unwrap();

        assert_eq!(config.database.dsn, "sqlite://.data/janitor.db");
        assert!(config.reconciler.enabled);
    }

    #[test]
    fn test_env_var_override() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("JANITOR__STORAGE__DSN", "memory://");
            jail.set_env("JANITOR__RECONCILER__SCHEDULE", "0 0 */6 * * *");
            jail.set_env("JANITOR__RECONCILER__DRY_RUN", "true");

            let config: Configuration =
                Figment::from(Serialized::defaults(Configuration::default()))
                    .merge(Env::prefixed("JANITOR__").split("__"))
                    .extract()?;

            assert_eq!(config.storage.dsn, "memory://");
            assert_eq!(config.reconciler.schedule, "0 0 */6 * * *");
            assert!(config.reconciler.dry_run);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_with_run_timeout() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "janitor.toml",
                r#"
                [database]
                dsn = "sqlite::memory:"

                [reconciler]
                schedule = "0 30 2 * * *"
                run_timeout = "15m"
                "#,
            )?;

            let config: Configuration =
                Figment::from(Serialized::defaults(Configuration::default()))
                    .merge(Toml::file("janitor.toml"))
                    .extract()?;

            assert_eq!(config.database.dsn, "sqlite::memory:");
            assert_eq!(config.reconciler.schedule, "0 30 2 * * *");
            assert_eq!(
                config.reconciler.run_timeout,
                Some(Duration::from_secs(900))
            );
            Ok(())
        });
    }
}
