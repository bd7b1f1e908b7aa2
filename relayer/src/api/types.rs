use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::errors::RpcError;

/// A JSON-RPC request object.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
}

/// A JSON-RPC success/error response object.
#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl Response {
    /// Builds the response for a request, echoing its version and id.
    pub fn new(request: &Request, result: Result<serde_json::Value, RpcError>) -> Self {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(e) => (
                None,
                Some(ErrorObject {
                    code: e.code(),
                    message: e.message().to_string(),
                }),
            ),
        };

        Self {
            jsonrpc: request.jsonrpc.clone(),
            id: request.id.clone(),
            result,
            error,
        }
    }
}
