//! Fetch outcomes and the closed failure taxonomy
//!
//! Every fetch ends in exactly one `FetchOutcome`. Failures carry an
//! `ErrorKind` whose string form is what lands in the batch artifacts and what
//! the summary report groups on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::product::{ItemId, ProductRecord};

/// Failure categories driving the retry policy and the summary breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    HttpError,
    InvalidContentType,
    Timeout,
    ServerDisconnected,
    ConnectionError,
    ClientError,
    RateLimited,
    MaxAttemptsExceeded,
    UnknownError,
}

impl ErrorKind {
    pub const ALL: [Self; 9] = [
        Self::HttpError,
        Self::InvalidContentType,
        Self::Timeout,
        Self::ServerDisconnected,
        Self::ConnectionError,
        Self::ClientError,
        Self::RateLimited,
        Self::MaxAttemptsExceeded,
        Self::UnknownError,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HttpError => "http_error",
            Self::InvalidContentType => "invalid_content_type",
            Self::Timeout => "timeout",
            Self::ServerDisconnected => "server_disconnected",
            Self::ConnectionError => "connection_error",
            Self::ClientError => "client_error",
            Self::RateLimited => "rate_limited",
            Self::MaxAttemptsExceeded => "max_attempts_exceeded",
            Self::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown error kind: {s}"))
    }
}

/// Classified failure for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub id: ItemId,
    pub error_kind: ErrorKind,
    /// Only set for HTTP-level failures
    pub http_status: Option<u16>,
    pub message: Option<String>,
    /// Only set for content-type mismatches, already capped
    pub raw_snippet: Option<String>,
}

impl FetchFailure {
    pub fn new(id: ItemId, error_kind: ErrorKind) -> Self {
        Self {
            id,
            error_kind,
            http_status: None,
            message: None,
            raw_snippet: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_raw_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.raw_snippet = Some(snippet.into());
        self
    }
}

/// Terminal result of one item fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success { id: ItemId, product: ProductRecord },
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub const fn id(&self) -> ItemId {
        match self {
            Self::Success { id, .. } => *id,
            Self::Failure(failure) => failure.id,
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.error_kind),
        }
    }
}

impl From<FetchFailure> for FetchOutcome {
    fn from(failure: FetchFailure) -> Self {
        Self::Failure(failure)
    }
}

/// On-disk shape of one outcome inside a batch artifact.
///
/// `error_type` stays a plain string on the read side so artifacts written by
/// older runs with other labels still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub product_id: ItemId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ProductRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl From<&FetchOutcome> for OutcomeRecord {
    fn from(outcome: &FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Success { id, product } => Self {
                product_id: *id,
                success: true,
                data: Some(product.clone()),
                error_type: None,
                http_status: None,
                error_message: None,
                raw_response: None,
            },
            FetchOutcome::Failure(failure) => Self {
                product_id: failure.id,
                success: false,
                data: None,
                error_type: Some(failure.error_kind.as_str().to_string()),
                http_status: failure.http_status,
                error_message: failure.message.clone(),
                raw_response: failure.raw_snippet.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_kind_string_forms_are_stable() {
        for kind in ErrorKind::ALL {
            let serialized = serde_json::to_value(kind).unwrap();
            assert_eq!(serialized, json!(kind.as_str()));
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
        assert!("Max attempts exceeded".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn failure_record_shape() {
        let outcome: FetchOutcome = FetchFailure::new(ItemId(7), ErrorKind::HttpError)
            .with_status(404)
            .with_message("Not Found")
            .into();

        let value = serde_json::to_value(OutcomeRecord::from(&outcome)).unwrap();
        assert_eq!(
            value,
            json!({
                "product_id": 7,
                "success": false,
                "error_type": "http_error",
                "http_status": 404,
                "error_message": "Not Found"
            })
        );
    }

    #[test]
    fn success_record_shape() {
        let outcome = FetchOutcome::Success {
            id: ItemId(1),
            product: ProductRecord {
                id: Some(1),
                name: Some("Kettle".into()),
                url_key: Some("kettle".into()),
                price: Some(serde_json::Number::from(100)),
                description: "Boils water".into(),
                images: vec!["https://img/a.jpg".into()],
            },
        };

        let value = serde_json::to_value(OutcomeRecord::from(&outcome)).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"]["url_key"], json!("kettle"));
        assert_eq!(value["data"]["images"], json!(["https://img/a.jpg"]));
        assert!(value.get("error_type").is_none());
    }

    #[test]
    fn outcome_accessors() {
        let failure: FetchOutcome = FetchFailure::new(ItemId(3), ErrorKind::Timeout).into();
        assert_eq!(failure.id(), ItemId(3));
        assert!(!failure.is_success());
        assert_eq!(failure.error_kind(), Some(ErrorKind::Timeout));
    }
}
