//! In-process RPC caller.
//!
//! Orchestrators depend on the [`RpcCaller`] capability instead of the
//! hub itself; this binding dispatches without crossing a transport.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use hub_core::agent::RpcCaller;
use hub_core::error::Result;
use hub_core::jsonrpc::{Dispatcher, Request, Response};

pub struct LocalCaller {
    dispatcher: Arc<Dispatcher>,
}

impl LocalCaller {
    pub fn new(dispatcher: Arc<Dispatcher>) -> LocalCaller {
        LocalCaller { dispatcher }
    }
}

#[async_trait]
impl RpcCaller for LocalCaller {
    async fn call(&self, method: &str, params: Value) -> Result<Response> {
        let request = Request::new(method, params);
        Ok(self.dispatcher.handle(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatches_in_process() {
        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.register("ping", |_| async move { Ok(json!("pong")) });
        let caller = LocalCaller::new(dispatcher);
        let response = caller.call("ping", Value::Null).await.unwrap();
        assert_eq!(response.result.unwrap(), json!("pong"));
    }
}
