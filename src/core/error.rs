use serde::Serialize;
use std::fmt::Display;

/// Machine-readable failure categories surfaced to users and API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingSymbol,
    MethodNotAllowed,
    ProviderFailed,
    NetworkError,
    ConfigUnavailable,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingSymbol => "missing_symbol",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::ProviderFailed => "provider_failed",
            ErrorCode::NetworkError => "network_error",
            ErrorCode::ConfigUnavailable => "config_unavailable",
        }
    }

    /// Categorizes a provider error. Transport failures that never reached
    /// the upstream are network errors; everything else is a provider failure.
    pub fn classify(err: &anyhow::Error) -> Self {
        let transport = err.chain().any(|cause| {
            cause
                .downcast_ref::<reqwest::Error>()
                .is_some_and(|e| e.is_connect() || e.is_timeout())
        });
        if transport {
            ErrorCode::NetworkError
        } else {
            ErrorCode::ProviderFailed
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_value(ErrorCode::ConfigUnavailable).unwrap(),
            "config_unavailable"
        );
        assert_eq!(ErrorCode::MissingSymbol.to_string(), "missing_symbol");
    }

    #[test]
    fn test_classify_plain_error() {
        let err = anyhow::anyhow!("No metrics found for symbol: X");
        assert_eq!(ErrorCode::classify(&err), ErrorCode::ProviderFailed);
    }

    #[tokio::test]
    async fn test_classify_connection_error() {
        // Nothing listens on port 9 of localhost.
        let err = reqwest::get("http://127.0.0.1:9/").await.unwrap_err();
        let err = anyhow::Error::from(err).context("Request failed");
        assert_eq!(ErrorCode::classify(&err), ErrorCode::NetworkError);
    }
}
