use std::fmt;
use thiserror::Error;
use url::Url;

pub const DEFAULT_WS_URL: &str = "ws://localhost:7860/ws";
pub const WS_URL_ENV: &str = "VOXLINK_WS_URL";
const DEFAULT_PATH: &str = "/ws";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported endpoint scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),

    #[error("endpoint url '{0}' has no host")]
    MissingHost(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

/// Where the transport opens its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Path plus optional query, always starting with `/`.
    pub path: String,
}

impl EndpointConfig {
    /// Parses a ws/wss URL. A bare base URL gets the `/ws` path appended.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;

        let scheme = match url.scheme() {
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::MissingHost(raw.to_string()))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(match scheme {
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        });

        let mut path = match url.path() {
            "" | "/" => DEFAULT_PATH.to_string(),
            p => p.to_string(),
        };
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self { scheme, host, port, path })
    }

    /// `VOXLINK_WS_URL` if set and non-empty, else the local default.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(WS_URL_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::parse(&value),
            _ => Ok(Self::default()),
        }
    }

    /// Explicit value wins over the environment, which wins over the default.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, ConfigError> {
        match explicit {
            Some(value) if !value.trim().is_empty() => Self::parse(value),
            _ => Self::from_env(),
        }
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme.as_str(), self.host, self.port, self.path)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Ws,
            host: "localhost".to_string(),
            port: 7860,
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
