//! API errors and their retry classification

use stratus_core::retry::{Classified, RetryTable};
use thiserror::Error;

/// Error family parsed from the first segment of a dotted vendor code
/// (`ResourceInUse.DiskAttached` -> `ResourceInUse`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    RequestLimitExceeded,
    ResourceInUse,
    ResourceBusy,
    ResourceUnavailable,
    ResourceInsufficient,
    ResourceNotFound,
    InvalidParameter,
    InvalidParameterValue,
    MissingParameter,
    AuthFailure,
    UnauthorizedOperation,
    LimitExceeded,
    FailedOperation,
    UnsupportedOperation,
    /// Transport failure before a response arrived
    Network,
    /// Non-2xx HTTP response without a vendor envelope
    HttpStatus,
    Other,
}

impl ErrorCode {
    pub fn parse(code: &str) -> Self {
        match code.split('.').next().unwrap_or_default() {
            "InternalError" => ErrorCode::InternalError,
            "RequestLimitExceeded" => ErrorCode::RequestLimitExceeded,
            "ResourceInUse" => ErrorCode::ResourceInUse,
            "ResourceBusy" => ErrorCode::ResourceBusy,
            "ResourceUnavailable" => ErrorCode::ResourceUnavailable,
            "ResourceInsufficient" => ErrorCode::ResourceInsufficient,
            "ResourceNotFound" => ErrorCode::ResourceNotFound,
            "InvalidParameter" => ErrorCode::InvalidParameter,
            "InvalidParameterValue" => ErrorCode::InvalidParameterValue,
            "MissingParameter" => ErrorCode::MissingParameter,
            "AuthFailure" => ErrorCode::AuthFailure,
            "UnauthorizedOperation" => ErrorCode::UnauthorizedOperation,
            "LimitExceeded" => ErrorCode::LimitExceeded,
            "FailedOperation" => ErrorCode::FailedOperation,
            "UnsupportedOperation" => ErrorCode::UnsupportedOperation,
            _ => ErrorCode::Other,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("[{raw_code}] {message} (RequestId: {request_id})")]
    Service {
        code: ErrorCode,
        raw_code: String,
        message: String,
        request_id: String,
    },

    #[error("network error calling {action}: {source}")]
    Network {
        action: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{action} returned HTTP {status}: {body}")]
    HttpStatus {
        action: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode {action} response: {message}")]
    Decode { action: String, message: String },
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Service { code, .. } => *code,
            ApiError::Network { .. } => ErrorCode::Network,
            ApiError::HttpStatus { .. } => ErrorCode::HttpStatus,
            ApiError::Decode { .. } => ErrorCode::Other,
        }
    }

    /// The vendor reports the resource as missing.
    ///
    /// Most products use `ResourceNotFound.*`; some use a product-specific
    /// family such as `InvalidInstanceId.NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Service { code, raw_code, .. } => {
                *code == ErrorCode::ResourceNotFound || raw_code.ends_with(".NotFound")
            }
            _ => false,
        }
    }
}

impl Classified for ApiError {
    type Kind = ErrorCode;

    fn kind(&self) -> ErrorCode {
        self.code()
    }
}

/// Transient failures retried by every call
pub fn default_retry_table() -> RetryTable<ErrorCode> {
    [
        ErrorCode::Network,
        ErrorCode::HttpStatus,
        ErrorCode::RequestLimitExceeded,
        ErrorCode::ResourceInUse,
        ErrorCode::ResourceBusy,
        ErrorCode::ResourceUnavailable,
        ErrorCode::ResourceInsufficient,
    ]
    .into_iter()
    .collect()
}

/// Default table plus `InternalError`, which mutating calls treat as transient
pub fn write_retry_table() -> RetryTable<ErrorCode> {
    default_retry_table().retry_on(ErrorCode::InternalError)
}
