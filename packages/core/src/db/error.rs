//! Document Store Error Types
//!
//! Failures of the batch call itself: the request never reached the store, the
//! store answered with a non-success status, the answer could not be decoded, or
//! the store reported `success: false`. All of them leave the ledger untouched;
//! the user retries by saving again.

use thiserror::Error;

/// Document store operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Request could not be sent or no response arrived
    #[error("Document store unreachable: {message}")]
    Transport { message: String },

    /// Store rejected the credentials
    #[error("Document store rejected the credentials")]
    Unauthorized,

    /// Non-success HTTP status
    #[error("Document store request failed ({status}): {body}")]
    Http { status: u16, body: String },

    /// Response body was not the expected shape
    #[error("Failed to decode document store response: {message}")]
    Decode { message: String },

    /// Store answered `success: false`; nothing is assumed to have been applied
    #[error("Document store rejected the batch: {}", format_errors(errors))]
    Rejected { errors: Vec<String> },

    /// Store client could not be configured
    #[error("Invalid document store configuration: {message}")]
    Config { message: String },
}

fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        "no details given".to_string()
    } else {
        errors.join("; ")
    }
}

impl StoreError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn rejected(errors: Vec<String>) -> Self {
        Self::Rejected { errors }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::decode(err.to_string())
        } else if err.is_builder() {
            Self::config(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_lists_server_errors() {
        let err = StoreError::rejected(vec!["bad parent".into(), "quota".into()]);
        assert_eq!(
            err.to_string(),
            "Document store rejected the batch: bad parent; quota"
        );
    }

    #[test]
    fn test_rejected_without_details() {
        assert_eq!(
            StoreError::rejected(vec![]).to_string(),
            "Document store rejected the batch: no details given"
        );
    }

    #[test]
    fn test_http_error_carries_status() {
        let err = StoreError::http(503, "maintenance");
        assert!(matches!(err, StoreError::Http { status: 503, .. }));
        assert_eq!(
            err.to_string(),
            "Document store request failed (503): maintenance"
        );
    }
}
