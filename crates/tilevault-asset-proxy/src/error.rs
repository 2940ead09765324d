//! Error types for the tilevault asset proxy

use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    Cache(String),
    /// A live network fetch failed at the transport level.
    Network(String),
    /// A network fetch failed and no cached alternative existed.
    NetworkUnavailable(String),
    Config(String),
    Io(Box<std::io::Error>),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Cache(msg) => write!(f, "Cache error: {}", msg),
            ProxyError::Network(msg) => write!(f, "Network error: {}", msg),
            ProxyError::NetworkUnavailable(url) => {
                write!(f, "Network unavailable and no cached copy of {}", url)
            }
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Network(err.to_string())
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Cache(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
