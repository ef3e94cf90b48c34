use thiserror::Error;

/// Errors produced by the relay core.
///
/// Only `Config` is ever fatal, and only at startup. Everything else is
/// contained to the command, endpoint or chat it happened in.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Bad user input, reported back to the command caller.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Chat or index not present in the registry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or status failure while fetching an endpoint.
    #[error("fetch of {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    /// Unrecognized or malformed response body.
    #[error("could not parse response: {0}")]
    Parse(String),

    /// The messaging gateway rejected a message.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        RelayError::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_display() {
        let err = RelayError::fetch("http://example.com", "status 503");
        assert_eq!(
            err.to_string(),
            "fetch of http://example.com failed: status 503"
        );
    }
}
