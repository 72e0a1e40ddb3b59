use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ipnetwork::IpNetwork;
use serde::de::{DeserializeOwned, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::{ConfigError, ConfigErrorKind};

/// Implements `Serialize` and `Deserialize` through `Display` and `FromStr`.
macro_rules! impl_str_serde {
    ($type:ty, $expectation:expr) => {
        impl Serialize for $type {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = Cow::<str>::deserialize(deserializer)?;
                value.parse().map_err(|_| {
                    serde::de::Error::invalid_value(Unexpected::Str(&value), &$expectation)
                })
            }
        }
    };
}

/// An error parsing an address or a network.
#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum AddressError {
    /// The address is an empty string.
    #[error("empty address")]
    Empty,
    /// The address is not of the form `host:port`.
    #[error("invalid address {0:?}")]
    Invalid(String),
    /// The port is not a number in the valid range.
    #[error("invalid port in address {0:?}")]
    InvalidPort(String),
    /// The URL could not be parsed.
    #[error("invalid url")]
    Url(#[from] url::ParseError),
    /// The network is not in CIDR notation.
    #[error("invalid network {0:?}")]
    Network(String),
}

/// The base URL of the ingestion server.
///
/// Accepts `host[:port]` with an optional `http://` scheme. Other schemes are rejected, since the
/// agent only speaks plain HTTP.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpstreamAddress {
    host: String,
    port: Option<u16>,
}

impl FromStr for UpstreamAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let with_scheme = if s.starts_with("http://") {
            Cow::Borrowed(s)
        } else if s.contains("://") {
            return Err(AddressError::Invalid(s.to_owned()));
        } else {
            Cow::Owned(format!("http://{s}"))
        };

        let url = Url::parse(&with_scheme)?;
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(AddressError::Invalid(s.to_owned())),
        };

        if url.path() != "/"
            || url.query().is_some()
            || url.fragment().is_some()
            || !url.username().is_empty()
        {
            return Err(AddressError::Invalid(s.to_owned()));
        }

        Ok(Self {
            host: host.to_owned(),
            port: url.port(),
        })
    }
}

impl fmt::Display for UpstreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

impl Default for UpstreamAddress {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: Some(8080),
        }
    }
}

impl_str_serde!(UpstreamAddress, "an upstream address such as http://localhost:8080");

/// The address the HTTP server listens on.
///
/// Accepts `host:port` or `:port`. An empty host listens on all interfaces.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListenAddress {
    host: String,
    port: u16,
}

impl ListenAddress {
    /// Returns the host to bind to, `0.0.0.0` when none was given.
    pub fn host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            self.host.trim_start_matches('[').trim_end_matches(']')
        }
    }

    /// Returns the port to bind to.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ListenAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::Invalid(s.to_owned()))?;

        let bracketed = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .is_some_and(|h| h.parse::<IpAddr>().is_ok());

        let valid_host = bracketed
            || host
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-'));
        if !valid_host {
            return Err(AddressError::Invalid(s.to_owned()));
        }

        let port = port
            .parse()
            .map_err(|_| AddressError::InvalidPort(s.to_owned()))?;

        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for ListenAddress {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 8080,
        }
    }
}

impl_str_serde!(ListenAddress, "a listen address such as localhost:8080");

/// A network in CIDR notation whose members are trusted to submit metrics.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrustedSubnet(IpNetwork);

impl TrustedSubnet {
    /// Returns `true` if the address is inside this network.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(ip)
    }
}

impl FromStr for TrustedSubnet {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| AddressError::Network(s.to_owned()))
    }
}

impl fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl_str_serde!(TrustedSubnet, "a network in CIDR notation");

/// An error returned when parsing an unknown [`SendMode`].
#[derive(Debug, thiserror::Error)]
#[error("unknown send mode {0:?}, expected url, json or bulk")]
pub struct ParseSendModeError(String);

/// How the agent delivers metrics to the server.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// One request per metric, encoded in the URL path.
    Url,
    /// One request per metric, encoded as a JSON body.
    Json,
    /// All metrics in one compressed JSON request.
    #[default]
    Bulk,
}

impl SendMode {
    /// Returns the name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            SendMode::Url => "url",
            SendMode::Json => "json",
            SendMode::Bulk => "bulk",
        }
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SendMode {
    type Err = ParseSendModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(SendMode::Url),
            "json" => Ok(SendMode::Json),
            "bulk" => Ok(SendMode::Bulk),
            _ => Err(ParseSendModeError(s.to_owned())),
        }
    }
}

/// The storage backend selected by the server configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StorageKind {
    /// Metrics only live in memory.
    Memory,
    /// Metrics live in memory and are snapshotted to a file.
    File {
        /// The snapshot file.
        path: PathBuf,
        /// The interval between snapshots, zero for a snapshot after every update.
        store_interval: Duration,
        /// Whether an existing snapshot is loaded on startup.
        restore: bool,
    },
    /// Metrics live in a PostgreSQL database.
    Database {
        /// The connection string.
        dsn: String,
    },
}

/// An error parsing a boolean flag.
#[derive(Debug, thiserror::Error)]
#[error("invalid boolean {0:?}")]
pub struct ParseBoolError(String);

/// Parses a boolean in any of the common spellings, such as `1`, `t` or `TRUE`.
pub(crate) fn parse_bool(value: &str) -> Result<bool, ParseBoolError> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(ParseBoolError(other.to_owned())),
    }
}

/// Returns `None` for empty strings.
pub(crate) fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Loads configuration values from a YAML or JSON file.
///
/// An empty file yields the defaults.
pub(crate) fn load_file<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(path))?;

    if contents.trim().is_empty() {
        return Ok(T::default());
    }

    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&contents)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadJson).file(path))
    } else {
        serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(path))
    }
}
