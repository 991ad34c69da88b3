//! Methods exposed by `rpcbridge serve`.

use crate::core::listener_fn;
use crate::error::RpcResult;
use crate::rpc::{Dispatcher, RpcCall, RpcMethod};
use anyhow::Context;
use serde_json::{json, Value};
use std::time::Duration;

pub struct SayHello;

impl RpcMethod for SayHello {
    const SHORT_NAME: &'static str = "SayHello";
}

pub struct Echo;

impl RpcMethod for Echo {
    const SHORT_NAME: &'static str = "System$Echo";
}

pub struct Ping;

impl RpcMethod for Ping {
    const SHORT_NAME: &'static str = "System$Ping";
}

/// Replies after `{"ms": N}` milliseconds.
pub struct Sleep;

impl RpcMethod for Sleep {
    const SHORT_NAME: &'static str = "System$Sleep";
}

/// Register the demo methods on `dispatcher`.
pub fn register(dispatcher: &Dispatcher) -> RpcResult<()> {
    dispatcher.add_method::<SayHello>(listener_fn(|call: RpcCall| async move {
        let params = call.params().unwrap_or(Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .context("missing string parameter 'name'")?;
        call.reply(json!({ "msg": format!("Hello, {}!", name) }));
        Ok(())
    }))?;

    dispatcher.add_method::<Echo>(listener_fn(|call: RpcCall| async move {
        call.reply(call.params().unwrap_or(Value::Null));
        Ok(())
    }))?;

    dispatcher.add_method::<Ping>(listener_fn(|call: RpcCall| async move {
        call.reply(json!("pong"));
        Ok(())
    }))?;

    dispatcher.add_method::<Sleep>(listener_fn(|call: RpcCall| async move {
        let ms = call
            .params()
            .and_then(|params| params.get("ms").and_then(Value::as_u64))
            .unwrap_or(100);
        call.defer();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            call.reply(json!({ "slept": ms }));
        });
        Ok(())
    }))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::jsonrpc::types::ErrorCode;
    use tokio::sync::mpsc;

    fn dispatcher() -> Dispatcher {
        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        let dispatcher = Dispatcher::new(tx, DispatcherConfig::default());
        register(&dispatcher).unwrap();
        dispatcher
    }

    #[tokio::test]
    async fn test_say_hello() {
        let response = dispatcher()
            .request(SayHello::call(None, json!({"name": "John"})))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({"msg": "Hello, John!"})));
    }

    #[tokio::test]
    async fn test_say_hello_without_name_faults() {
        let response = dispatcher()
            .request(SayHello::call(None, json!({})))
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::InternalError.code());
        assert!(error.message.contains("name"));
    }

    #[tokio::test]
    async fn test_sleep_is_deferred() {
        let response = dispatcher()
            .request(Sleep::call(None, json!({"ms": 5})))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({"slept": 5})));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Echo::identity().method_name(), "system.echo");
        assert_eq!(Sleep::identity().method_name(), "system.sleep");
    }
}
