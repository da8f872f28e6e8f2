use thiserror::Error;

/// Failures while retrieving one record from the upstream provider.
///
/// None of these are retried; the driver drops the event and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The response arrived but the field or line item we need is not in it.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("http {status} from {url}")]
    Transport { status: u16, url: String },

    /// Connection, timeout or body read failure before a status was usable.
    #[error("request failed for {url}: {reason}")]
    Request { url: String, reason: String },
}

impl FetchError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        FetchError::DataUnavailable(msg.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. } | FetchError::Request { .. })
    }
}

/// Cache failures. Logged by callers, never propagated past the market data client.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache init failed: {0}")]
    Init(String),

    #[error("cache persist failed for {key}: {reason}")]
    Persist { key: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}, expected {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: String,
    },
}

impl ConfigError {
    pub fn invalid(key: &str, value: &str, expected: &str) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, FetchError};

    #[test]
    fn transport_and_request_both_count_as_transport() {
        let status = FetchError::Transport {
            status: 404,
            url: "u".to_string(),
        };
        let request = FetchError::Request {
            url: "u".to_string(),
            reason: "timeout".to_string(),
        };
        assert!(status.is_transport());
        assert!(request.is_transport());
        assert!(!FetchError::unavailable("x").is_transport());
    }

    #[test]
    fn config_error_names_the_key() {
        let err = ConfigError::invalid("league", "epl", "nba, nfl, mlb or nhl");
        assert!(err.to_string().contains("league"));
        assert!(err.to_string().contains("epl"));
    }
}
