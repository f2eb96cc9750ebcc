use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::store::{DatabaseConfig, DatabaseType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_task_deadline_secs")]
    pub task_deadline_secs: u64,
}

impl EngineConfig {
    pub fn task_deadline(&self) -> Duration {
        Duration::from_secs(self.task_deadline_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_deadline_secs: default_task_deadline_secs(),
        }
    }
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_task_deadline_secs() -> u64 {
    300
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Config {
            server: ServerConfig {
                addr: std::env::var("SERVER_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            },
            database: DatabaseConfig {
                db_type: match std::env::var("DATABASE_TYPE")
                    .unwrap_or_else(|_| "sqlite".to_string())
                    .to_lowercase()
                    .as_str()
                {
                    "postgres" => DatabaseType::Postgres,
                    _ => DatabaseType::Sqlite,
                },
                sqlite_path: std::env::var("SQLITE_PATH")
                    .map(PathBuf::from)
                    .ok()
                    .or_else(|| Some(PathBuf::from("data/agentops.db"))),
                connection_string: std::env::var("DATABASE_URL").ok(),
            },
            scheduler: SchedulerConfig {
                check_interval_secs: std::env::var("CHECK_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_check_interval_secs),
                probe_timeout_secs: std::env::var("PROBE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_probe_timeout_secs),
            },
            engine: EngineConfig {
                task_deadline_secs: std::env::var("TASK_DEADLINE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_task_deadline_secs),
            },
        };

        // Validate database configuration
        match config.database.db_type {
            DatabaseType::Postgres => {
                if config.database.connection_string.is_none() {
                    return Err(crate::Error::Config(
                        "DATABASE_URL must be set when using PostgreSQL".to_string(),
                    ));
                }
            }
            DatabaseType::Sqlite => {
                if config.database.sqlite_path.is_none() {
                    return Err(crate::Error::Config(
                        "SQLITE_PATH must be set when using SQLite".to_string(),
                    ));
                }
            }
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}
