use serde::{Deserialize, Serialize};
use sqlquiz::query::{CountPolicy, PageSize};
use sqlquiz::service::ServiceSettings;
use sqlquiz::store::StoreOptions;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    /// Loads `explicit` when given (it must exist), otherwise the default
    /// location when a file is present there.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data = match explicit.as_ref() {
            Some(path) if !path.exists() => {
                return Err(ConfigError::Missing { path: path.clone() })
            }
            Some(path) => read_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    let data = read_file(&path)?;
                    return Self::checked(Some(path), data);
                }
                _ => RawConfig::default(),
            },
        };
        Self::checked(explicit, data)
    }

    fn checked(path: Option<PathBuf>, data: RawConfig) -> Result<Self, ConfigError> {
        validate(&data)?;
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn database_path(&self) -> Option<&PathBuf> {
        self.data.database.path.as_ref()
    }

    pub fn host(&self) -> Option<IpAddr> {
        self.data.server.host
    }

    pub fn port(&self) -> Option<u16> {
        self.data.server.port
    }

    pub fn allow_origins(&self) -> &[String] {
        &self.data.server.allow_origins
    }

    pub fn store_options(&self) -> StoreOptions {
        let mut opts = StoreOptions::default();
        if let Some(secs) = self.data.query.timeout_secs {
            opts.timeout = Duration::from_secs(secs);
        }
        if let Some(pool_size) = self.data.query.pool_size {
            opts.pool_size = pool_size;
        }
        opts
    }

    pub fn service_settings(&self) -> ServiceSettings {
        let mut settings = ServiceSettings::default();
        if let Some(size) = self.data.query.default_page_size.and_then(PageSize::new) {
            settings.default_page_size = size;
        }
        if let Some(policy) = self.data.query.count_policy {
            settings.count_policy = policy;
        }
        settings
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn validate(data: &RawConfig) -> Result<(), ConfigError> {
    if let Some(size) = data.query.default_page_size {
        if PageSize::new(size).is_none() {
            return Err(ConfigError::InvalidPageSize { value: size });
        }
    }
    if data.query.timeout_secs == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "query.timeout_secs",
            reason: "must be greater than zero",
        });
    }
    if data.query.pool_size == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "query.pool_size",
            reason: "must be at least 1",
        });
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    query: QuerySection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct DatabaseSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ServerSection {
    host: Option<IpAddr>,
    port: Option<u16>,
    #[serde(default)]
    allow_origins: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct QuerySection {
    timeout_secs: Option<u64>,
    default_page_size: Option<u32>,
    pool_size: Option<usize>,
    count_policy: Option<CountPolicy>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config file {path} does not exist")]
    Missing { path: PathBuf },
    #[error("query.default_page_size {value} must be one of 100, 250, 500, 1000")]
    InvalidPageSize { value: u32 },
    #[error("{key} {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sqlquiz").join("config.toml"))
}
