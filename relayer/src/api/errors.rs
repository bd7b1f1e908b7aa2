use std::fmt;

/// JSON-RPC error codes used on the wire.
pub const DEFAULT_ERROR_CODE: i32 = -32000;
#[allow(dead_code)]
pub const INVALID_REQUEST_ERROR_CODE: i32 = -32600;
pub const NOT_FOUND_ERROR_CODE: i32 = -32601;
pub const INVALID_PARAMS_ERROR_CODE: i32 = -32602;
pub const PARSER_ERROR_CODE: i32 = -32700;

/// Error returned by a JSON-RPC endpoint, carrying its wire error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    code: i32,
    message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS_ERROR_CODE, message)
    }

    pub fn parser(message: impl Into<String>) -> Self {
        Self::new(PARSER_ERROR_CODE, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            NOT_FOUND_ERROR_CODE,
            format!("the method {method} does not exist or is not available"),
        )
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RpcError {}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
