//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so that degraded verdicts can be
//! traced back to the stage that produced them.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - RPC_xxx: fullnode errors
//! - SOURCE_xxx: evidence source errors
//! - CIRCUIT_xxx: circuit breaker rejections
//! - STORE_xxx: key-value store errors
//! - API_xxx: HTTP surface errors
//! - CFG_xxx: configuration errors
//! - REQ_xxx: malformed requests / contract violations

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct GuardianError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GuardianError {
    /// Create a new GuardianError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create GuardianError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for GuardianError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for GuardianError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Fullnode / RPC Errors
    // ============================================
    /// Connection to the fullnode failed
    RpcConnectionFailed,
    /// Fullnode request timed out
    RpcTimeout,
    /// Fullnode rate limited (HTTP 429)
    RpcRateLimited,
    /// Fullnode returned a non-2xx status other than 404
    RpcError,
    /// Fullnode response could not be decoded
    RpcInvalidResponse,

    // ============================================
    // Evidence Source Errors
    // ============================================
    /// A source exceeded the pipeline deadline
    SourceTimeout,
    /// A source failed for any other reason
    SourceFailed,
    /// A source is not configured (no endpoint)
    SourceUnavailable,

    // ============================================
    // Circuit Breaker
    // ============================================
    /// Call rejected because the breaker is open
    CircuitOpen,

    // ============================================
    // Store Errors
    // ============================================
    /// Stored value could not be (de)serialized
    StoreCorrupt,
    /// Compare-and-set kept losing races
    StoreContention,

    // ============================================
    // API Errors
    // ============================================
    /// Invalid request format
    ApiBadRequest,
    /// Rate limit exceeded
    ApiRateLimited,
    /// Resource not found
    ApiNotFound,
    /// Internal server error
    ApiInternalError,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Unsupported network name
    ConfigUnsupportedNetwork,

    // ============================================
    // Request / Contract Errors
    // ============================================
    /// Function path is not `address::module::function`
    RequestInvalidFunctionPath,
    /// Confidence outside [0, 1]
    RequestInvalidConfidence,
    /// Unknown severity or category label
    RequestInvalidEnum,

    // ============================================
    // Generic
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpcConnectionFailed => "RPC_CONNECTION_FAILED",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcError => "RPC_ERROR",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            Self::SourceTimeout => "SOURCE_TIMEOUT",
            Self::SourceFailed => "SOURCE_FAILED",
            Self::SourceUnavailable => "SOURCE_UNAVAILABLE",

            Self::CircuitOpen => "CIRCUIT_OPEN",

            Self::StoreCorrupt => "STORE_CORRUPT",
            Self::StoreContention => "STORE_CONTENTION",

            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiInternalError => "API_INTERNAL_ERROR",

            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigUnsupportedNetwork => "CFG_UNSUPPORTED_NETWORK",

            Self::RequestInvalidFunctionPath => "REQ_INVALID_FUNCTION_PATH",
            Self::RequestInvalidConfidence => "REQ_INVALID_CONFIDENCE",
            Self::RequestInvalidEnum => "REQ_INVALID_ENUM",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest
            | Self::ConfigInvalidValue
            | Self::ConfigUnsupportedNetwork
            | Self::RequestInvalidFunctionPath
            | Self::RequestInvalidConfidence
            | Self::RequestInvalidEnum => 400,
            Self::ApiNotFound => 404,
            Self::ApiRateLimited | Self::RpcRateLimited => 429,
            Self::CircuitOpen => 503,
            _ => 500,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTimeout
                | Self::RpcRateLimited
                | Self::RpcConnectionFailed
                | Self::SourceTimeout
                | Self::CircuitOpen
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl GuardianError {
    /// Fullnode connection failed
    pub fn rpc_connection_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcConnectionFailed, msg)
    }

    /// Fullnode returned an unexpected status
    pub fn rpc_status(status: u16, url: &str) -> Self {
        let code = if status == 429 {
            ErrorCode::RpcRateLimited
        } else {
            ErrorCode::RpcError
        };
        Self::new(code, format!("HTTP {} from {}", status, url))
    }

    /// Source exceeded its deadline
    pub fn source_timeout(source: &str) -> Self {
        Self::new(
            ErrorCode::SourceTimeout,
            format!("{} exceeded the analysis deadline", source),
        )
    }

    /// Generic source failure
    pub fn source_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SourceFailed, msg)
    }

    /// Source not configured
    pub fn source_unavailable(source: &str) -> Self {
        Self::new(
            ErrorCode::SourceUnavailable,
            format!("{} is not configured", source),
        )
    }

    /// Store value corrupt
    pub fn store_corrupt(key: &str, err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorCode::StoreCorrupt,
            format!("Corrupt value under {}", key),
            err,
        )
    }

    /// Malformed function path
    pub fn invalid_function_path(path: &str) -> Self {
        Self::new(
            ErrorCode::RequestInvalidFunctionPath,
            format!("Expected <address>::<module>::<function>, got '{}'", path),
        )
    }

    /// Unsupported network
    pub fn unsupported_network(name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigUnsupportedNetwork,
            format!("Unsupported network: {}", name),
        )
    }

    /// API bad request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    /// API not found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiNotFound, msg)
    }

    /// API internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type GuardianResult<T> = Result<T, GuardianError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for GuardianError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for GuardianError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for GuardianError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::RpcConnectionFailed, "Connection failed")
        } else if err.is_decode() {
            Self::with_source(ErrorCode::RpcInvalidResponse, "Undecodable response", err)
        } else {
            Self::new(ErrorCode::Unknown, err.to_string())
        }
    }
}

impl From<serde_json::Error> for GuardianError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}
