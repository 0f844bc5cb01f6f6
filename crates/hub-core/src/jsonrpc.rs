//! JSON-RPC 2.0 types and the method dispatcher.
//!
//! All three ingresses (unix socket, HTTP, SSE) and the in-process caller
//! route through the same [`Dispatcher`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error codes: the standard space plus hub extensions.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub const TASK_NOT_FOUND: i64 = -32001;
    pub const TASK_NOT_CANCELABLE: i64 = -32002;
    pub const AGENT_NOT_FOUND: i64 = -32003;
    pub const AGENT_UNAVAILABLE: i64 = -32004;
    pub const UNSUPPORTED: i64 = -32005;
    pub const AUTH_ERROR: i64 = -32006;
    pub const TIMEOUT: i64 = -32007;
    pub const CONTEXT_NOT_FOUND: i64 = -32008;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value) -> Request {
        Request {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(Value::String("internal".to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Response {
    pub fn result(result: Value, id: Option<Value>) -> Response {
        Response {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: RpcError, id: Option<Value>) -> Response {
        Response {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> RpcError {
        RpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> RpcError {
        RpcError::new(codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> RpcError {
        RpcError::new(codes::INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> RpcError {
        RpcError::new(codes::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params(message: impl Into<String>) -> RpcError {
        RpcError::new(codes::INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> RpcError {
        RpcError::new(codes::INTERNAL_ERROR, message)
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, RpcError>> + Send>>;
type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Method registry mapping `name -> async handler(params)`.
///
/// Handlers run on the caller's task; unrelated requests are never
/// serialized against each other.
#[derive(Default)]
pub struct Dispatcher {
    methods: RwLock<HashMap<String, Handler>>,
}

impl Dispatcher {
    pub fn new() -> Dispatcher {
        Dispatcher::default()
    }

    /// Register a handler for `method`, replacing any previous one.
    pub fn register<F, Fut>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, RpcError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| Box::pin(handler(params)));
        self.methods
            .write()
            .expect("dispatcher lock poisoned")
            .insert(method.to_string(), handler);
    }

    /// Dispatch one request and produce its response, echoing the id.
    pub async fn handle(&self, request: Request) -> Response {
        if request.jsonrpc != "2.0" || request.method.is_empty() {
            return Response::error(RpcError::invalid_request(), request.id);
        }
        let handler = {
            let methods = self.methods.read().expect("dispatcher lock poisoned");
            methods.get(&request.method).cloned()
        };
        let Some(handler) = handler else {
            return Response::error(RpcError::method_not_found(), request.id);
        };
        let params = request.params.unwrap_or(Value::Null);
        match handler(params).await {
            Ok(result) => Response::result(result, request.id),
            Err(error) => Response::error(error, request.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: &str) -> Request {
        Request {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: None,
            id: Some(json!(7)),
        }
    }

    #[tokio::test]
    async fn rejects_wrong_version() {
        let dispatcher = Dispatcher::new();
        let mut req = request("hub/status");
        req.jsonrpc = "1.0".to_string();
        let resp = dispatcher.handle(req).await;
        assert_eq!(resp.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn rejects_empty_method() {
        let dispatcher = Dispatcher::new();
        let resp = dispatcher.handle(request("")).await;
        assert_eq!(resp.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_not_found() {
        let dispatcher = Dispatcher::new();
        let resp = dispatcher.handle(request("nope")).await;
        assert_eq!(resp.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn echoes_request_id() {
        let dispatcher = Dispatcher::new();
        dispatcher.register("echo", |params| async move { Ok(params) });
        let mut req = request("echo");
        req.params = Some(json!({"value": 42}));
        let resp = dispatcher.handle(req).await;
        assert_eq!(resp.id, Some(json!(7)));
        assert_eq!(resp.result.unwrap()["value"], 42);
    }

    #[tokio::test]
    async fn handler_error_is_serialized() {
        let dispatcher = Dispatcher::new();
        dispatcher.register("fail", |_| async move {
            Err(RpcError::invalid_params("missing field"))
        });
        let resp = dispatcher.handle(request("fail")).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, codes::INVALID_PARAMS);
        assert_eq!(error.message, "missing field");
    }
}
