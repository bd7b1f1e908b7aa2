use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use serde_json::value::RawValue;
use tracing::debug;

use super::{
    endpoints::{Endpoints, TransactionSubmitter},
    errors::{RpcError, RpcResult},
    types::{Request, Response},
};

/// Connection details handed to the endpoints.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// First `X-Forwarded-For` token, or the peer address, or empty.
    pub ip: String,
}

type MethodAdapter = Box<
    dyn Fn(ClientInfo, Option<Box<RawValue>>) -> BoxFuture<'static, RpcResult<serde_json::Value>>
        + Send
        + Sync,
>;

/// Dispatches JSON-RPC requests through an explicit registry of typed
/// adapters, one per endpoint method. Each adapter owns its own parameter
/// decoding.
pub struct Handler {
    methods: HashMap<&'static str, MethodAdapter>,
}

impl Handler {
    pub fn new<Db, S>(endpoints: Arc<Endpoints<Db, S>>) -> Self
    where
        Db: services::ports::storage::Storage + 'static,
        S: TransactionSubmitter + 'static,
    {
        let mut methods: HashMap<&'static str, MethodAdapter> = HashMap::new();

        methods.insert(
            "sendRawTransaction",
            Box::new(move |client, params| {
                let endpoints = Arc::clone(&endpoints);
                Box::pin(async move {
                    let input: String = single_param(params)?;
                    let hash = endpoints.send_raw_transaction(client, input).await?;
                    Ok(serde_json::Value::String(hash))
                })
            }),
        );

        Self { methods }
    }

    pub async fn handle(&self, request: Request, client: ClientInfo) -> Response {
        debug!(
            "request method: {}, id: {}, params: {:?}",
            request.method,
            request.id,
            request.params.as_ref().map(|params| params.get())
        );

        let result = match self.adapter_for(&request.method) {
            Ok(adapter) => adapter(client, request.params.clone()).await,
            Err(e) => {
                debug!("method '{}' not found", request.method);
                Err(e)
            }
        };

        Response::new(&request, result)
    }

    // Methods arrive as `<prefix>_<name>`; the prefix is dropped and the
    // remainder matched with its first character lowercased.
    fn adapter_for(&self, method: &str) -> RpcResult<&MethodAdapter> {
        let Some((_, name)) = method.split_once('_') else {
            return Err(RpcError::method_not_found(method));
        };

        let name = lowercase_first(name);
        self.methods
            .get(name.as_str())
            .ok_or_else(|| RpcError::method_not_found(method))
    }
}

fn lowercase_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// Decodes a single-parameter JSON array; a missing parameter decodes to the
// type's default, matching upstream node behavior.
fn single_param<T>(params: Option<Box<RawValue>>) -> RpcResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    let Some(params) = params else {
        return Ok(T::default());
    };

    let values: Vec<serde_json::Value> = serde_json::from_str(params.get())
        .map_err(|_| RpcError::invalid_params("Invalid Params"))?;

    if values.len() > 1 {
        return Err(RpcError::invalid_params("too many arguments, want at most 1"));
    }

    match values.into_iter().next() {
        Some(value) => {
            serde_json::from_value(value).map_err(|_| RpcError::invalid_params("Invalid Params"))
        }
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use services::ports::storage::MockStorage;

    use super::*;
    use crate::api::{
        endpoints::MockTransactionSubmitter,
        errors::{INVALID_PARAMS_ERROR_CODE, NOT_FOUND_ERROR_CODE},
    };

    fn handler_with_idle_mocks() -> Handler {
        Handler::new(Arc::new(Endpoints::new(
            MockStorage::new(),
            Arc::new(MockTransactionSubmitter::new()),
        )))
    }

    fn request(method: &str, params: Option<&str>) -> Request {
        let params = params.map(|p| RawValue::from_string(p.to_string()).unwrap());
        Request {
            jsonrpc: "2.0".to_string(),
            id: serde_json::Value::from(1),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn unknown_methods_get_the_not_found_code() {
        // given
        let handler = handler_with_idle_mocks();

        // when
        let response = handler
            .handle(request("eth_call", Some("[]")), ClientInfo::default())
            .await;

        // then
        let error = response.error.unwrap();
        assert_eq!(error.code, NOT_FOUND_ERROR_CODE);
        assert!(error.message.contains("eth_call"));
    }

    #[tokio::test]
    async fn methods_without_a_prefix_get_the_not_found_code() {
        // given
        let handler = handler_with_idle_mocks();

        // when
        let response = handler
            .handle(request("sendRawTransaction", Some("[]")), ClientInfo::default())
            .await;

        // then
        assert_eq!(response.error.unwrap().code, NOT_FOUND_ERROR_CODE);
    }

    #[tokio::test]
    async fn the_prefix_is_ignored_and_the_first_character_is_case_insensitive() {
        // given
        let handler = handler_with_idle_mocks();

        // when: dispatch happens, so param decoding is what fails
        let response = handler
            .handle(
                request("zkevm_SendRawTransaction", Some("[\"a\", \"b\"]")),
                ClientInfo::default(),
            )
            .await;

        // then
        let error = response.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS_ERROR_CODE);
        assert_eq!(error.message, "too many arguments, want at most 1");
    }

    #[tokio::test]
    async fn responses_echo_the_request_version_and_id() {
        // given
        let handler = handler_with_idle_mocks();

        // when
        let response = handler
            .handle(request("eth_unknown", None), ClientInfo::default())
            .await;

        // then
        assert_eq!(response.jsonrpc, "2.0");
        assert_eq!(response.id, serde_json::Value::from(1));
        assert!(response.result.is_none());
    }

    #[test]
    fn missing_params_decode_to_the_default_value() {
        let decoded: String = single_param(None).unwrap();
        assert_eq!(decoded, "");

        let decoded: String =
            single_param(Some(RawValue::from_string("[]".to_string()).unwrap())).unwrap();
        assert_eq!(decoded, "");
    }

    #[test]
    fn malformed_params_are_invalid() {
        let result: RpcResult<String> =
            single_param(Some(RawValue::from_string("{}".to_string()).unwrap()));
        assert_eq!(
            result.unwrap_err().code(),
            INVALID_PARAMS_ERROR_CODE
        );
    }
}
