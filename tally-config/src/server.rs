use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_log::LogConfig;

use crate::types::{load_file, non_empty, parse_bool};
use crate::{ConfigError, ConfigErrorKind, ListenAddress, StorageKind, TrustedSubnet};

/// HTTP listener settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Http {
    /// The address to listen on.
    pub address: ListenAddress,
    /// Seconds to wait for in-flight requests on shutdown.
    pub shutdown_timeout: u64,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            address: ListenAddress::default(),
            shutdown_timeout: 10,
        }
    }
}

/// Storage backend settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Storage {
    /// Seconds between two snapshots, `0` snapshots after every update.
    pub store_interval: u64,
    /// Snapshot file, an empty path disables file storage.
    pub file_storage_path: PathBuf,
    /// Load the snapshot file on startup.
    pub restore: bool,
    /// PostgreSQL connection string, takes precedence over file storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_dsn: Option<String>,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            store_interval: 300,
            file_storage_path: PathBuf::from("/tmp/metrics-db.json"),
            restore: true,
            database_dsn: None,
        }
    }
}

/// Request authentication settings.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Auth {
    /// Shared secret for verifying request signatures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Only requests with an `X-Real-IP` inside this network are accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_subnet: Option<TrustedSubnet>,
    /// Reject unsigned requests when a key is configured.
    pub require_signature: bool,
}

/// The raw server configuration file.
#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ServerConfigValues {
    /// HTTP listener settings.
    pub http: Http,
    /// Storage backend settings.
    pub storage: Storage,
    /// Request authentication settings.
    pub auth: Auth,
    /// Logging configuration.
    pub logging: LogConfig,
}

/// Overrides for the server configuration from environment variables or CLI parameters.
#[derive(Debug, Default)]
pub struct ServerOverrides {
    /// The listen address.
    pub address: Option<String>,
    /// Snapshot interval in seconds.
    pub store_interval: Option<String>,
    /// Snapshot file path, empty to disable.
    pub file_storage_path: Option<String>,
    /// Whether to restore the snapshot on startup.
    pub restore: Option<String>,
    /// Database connection string, empty to disable.
    pub database_dsn: Option<String>,
    /// Signing secret, empty to disable.
    pub key: Option<String>,
    /// Trusted network in CIDR notation, empty to disable.
    pub trusted_subnet: Option<String>,
    /// Whether unsigned requests are rejected.
    pub require_signature: Option<String>,
    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout: Option<String>,
}

/// Configuration of the ingestion server.
#[derive(Clone, Default)]
pub struct ServerConfig {
    values: ServerConfigValues,
    path: Option<PathBuf>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("path", &self.path)
            .field("address", &self.values.http.address)
            .field("storage", &self.storage())
            .field("trusted_subnet", &self.values.auth.trusted_subnet)
            .finish()
    }
}

impl ServerConfig {
    /// Loads the configuration from a YAML or JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        Ok(Self {
            values: load_file(path)?,
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(Self {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: None,
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: ServerOverrides,
    ) -> Result<&mut Self, ConfigError> {
        let http = &mut self.values.http;

        if let Some(address) = overrides.address {
            http.address = address
                .parse()
                .map_err(|err| ConfigError::for_field(err, "address"))?;
        }

        if let Some(shutdown_timeout) = overrides.shutdown_timeout {
            http.shutdown_timeout = shutdown_timeout
                .trim()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "shutdown_timeout"))?;
        }

        let storage = &mut self.values.storage;

        if let Some(store_interval) = overrides.store_interval {
            storage.store_interval = store_interval
                .trim()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "store_interval"))?;
        }

        if let Some(path) = overrides.file_storage_path {
            storage.file_storage_path = PathBuf::from(path.trim());
        }

        if let Some(restore) = overrides.restore {
            storage.restore =
                parse_bool(&restore).map_err(|err| ConfigError::for_field(err, "restore"))?;
        }

        if let Some(dsn) = overrides.database_dsn {
            storage.database_dsn = non_empty(dsn);
        }

        let auth = &mut self.values.auth;

        if let Some(key) = overrides.key {
            auth.key = non_empty(key);
        }

        if let Some(subnet) = overrides.trusted_subnet {
            auth.trusted_subnet = match non_empty(subnet) {
                Some(subnet) => Some(
                    subnet
                        .parse()
                        .map_err(|err| ConfigError::for_field(err, "trusted_subnet"))?,
                ),
                None => None,
            };
        }

        if let Some(require_signature) = overrides.require_signature {
            auth.require_signature = parse_bool(&require_signature)
                .map_err(|err| ConfigError::for_field(err, "require_signature"))?;
        }

        Ok(self)
    }

    /// Serializes the effective configuration to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the path of the loaded configuration file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the address to listen on.
    pub fn listen_addr(&self) -> &ListenAddress {
        &self.values.http.address
    }

    /// Returns the time to wait for in-flight requests on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.shutdown_timeout)
    }

    /// Returns the selected storage backend.
    ///
    /// A database connection string takes precedence over a snapshot file. Without either,
    /// metrics are only kept in memory.
    pub fn storage(&self) -> StorageKind {
        let storage = &self.values.storage;

        if let Some(dsn) = storage.database_dsn.as_deref().filter(|d| !d.trim().is_empty()) {
            return StorageKind::Database {
                dsn: dsn.to_owned(),
            };
        }

        if !storage.file_storage_path.as_os_str().is_empty() {
            return StorageKind::File {
                path: storage.file_storage_path.clone(),
                store_interval: Duration::from_secs(storage.store_interval),
                restore: storage.restore,
            };
        }

        StorageKind::Memory
    }

    /// Returns the shared signing secret, if configured.
    pub fn secret_key(&self) -> Option<&[u8]> {
        self.values.auth.key.as_deref().map(str::as_bytes)
    }

    /// Returns `true` if unsigned requests are rejected while a key is configured.
    pub fn require_signature(&self) -> bool {
        self.values.auth.require_signature
    }

    /// Returns the trusted network for incoming requests, if configured.
    pub fn trusted_subnet(&self) -> Option<&TrustedSubnet> {
        self.values.auth.trusted_subnet.as_ref()
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr().to_string().as_str(), "localhost:8080");
        assert_eq!(
            config.storage(),
            StorageKind::File {
                path: PathBuf::from("/tmp/metrics-db.json"),
                store_interval: Duration::from_secs(300),
                restore: true,
            }
        );
        assert_eq!(config.secret_key(), None);
        assert!(config.trusted_subnet().is_none());
        assert!(!config.require_signature());
    }

    #[test]
    fn test_database_takes_precedence() {
        let config = ServerConfig::from_json_value(serde_json::json!({
            "storage": {"database_dsn": "postgres://localhost/metrics"},
        }))
        .unwrap();

        assert_eq!(
            config.storage(),
            StorageKind::Database {
                dsn: "postgres://localhost/metrics".to_owned()
            }
        );
    }

    #[test]
    fn test_empty_path_selects_memory() {
        let mut config = ServerConfig::default();
        config
            .apply_override(ServerOverrides {
                file_storage_path: Some(String::new()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.storage(), StorageKind::Memory);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "http:\n  address: \":9090\"\nstorage:\n  store_interval: 0\n  restore: false\nauth:\n  trusted_subnet: 10.0.0.0/8"
        )
        .unwrap();

        let config = ServerConfig::from_path(file.path()).unwrap();
        assert_eq!(config.listen_addr().port(), 9090);
        assert_eq!(config.listen_addr().host(), "0.0.0.0");
        assert_eq!(
            config.storage(),
            StorageKind::File {
                path: PathBuf::from("/tmp/metrics-db.json"),
                store_interval: Duration::ZERO,
                restore: false,
            }
        );
        assert!(
            config
                .trusted_subnet()
                .unwrap()
                .contains("10.1.2.3".parse().unwrap())
        );
    }

    #[test]
    fn test_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_override(ServerOverrides {
                address: Some(":8081".to_owned()),
                store_interval: Some("5".to_owned()),
                restore: Some("f".to_owned()),
                key: Some("secret".to_owned()),
                trusted_subnet: Some("192.168.0.0/16".to_owned()),
                require_signature: Some("true".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.listen_addr().port(), 8081);
        assert_eq!(config.secret_key(), Some(&b"secret"[..]));
        assert!(config.require_signature());
        assert!(
            config
                .trusted_subnet()
                .unwrap()
                .contains("192.168.4.4".parse().unwrap())
        );
        assert_eq!(
            config.storage(),
            StorageKind::File {
                path: PathBuf::from("/tmp/metrics-db.json"),
                store_interval: Duration::from_secs(5),
                restore: false,
            }
        );
    }

    #[test]
    fn test_invalid_subnet_names_field() {
        let mut config = ServerConfig::default();
        let error = config
            .apply_override(ServerOverrides {
                trusted_subnet: Some("not a network".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.to_string().as_str(), "invalid config value (field trusted_subnet)");
    }

    #[test]
    fn test_invalid_address_names_field() {
        let mut config = ServerConfig::default();
        let error = config
            .apply_override(ServerOverrides {
                address: Some("localhost".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.to_string().as_str(), "invalid config value (field address)");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = ServerConfig::default();
        let yaml = config.to_yaml_string().unwrap();
        assert!(yaml.contains("address: localhost:8080"), "{yaml}");
        assert!(yaml.contains("store_interval: 300"), "{yaml}");
    }
}
