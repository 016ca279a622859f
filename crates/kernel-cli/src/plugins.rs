//! Two demo plugins exercising the kernel end to end: `math` publishes an
//! `add` method, `logger` proxies it with a `before`/`after` transform and
//! logs every call through its own store.

use kernel_core::error::KernelError;
use kernel_core::plugin::api::{async_method, sync_method};
use kernel_core::plugin::{plugin, PluginApi, PluginDescriptor};
use kernel_core::proxy::{AfterHook, BeforeHook, ProxyConfig, ProxyTarget};
use serde_json::{json, Value};
use std::sync::Arc;

fn as_f64(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

pub fn math_plugin() -> PluginDescriptor {
    plugin("math", "1.0.0")
        .expect("valid semver")
        .setup(|_ctx| async {
            let api = PluginApi::new().with_method(
                "add",
                sync_method(|args| {
                    let sum = args.iter().map(as_f64).sum::<f64>();
                    Ok(json!(sum))
                }),
            );
            Ok(api)
        })
        .build()
        .expect("valid descriptor")
}

pub fn logger_plugin() -> PluginDescriptor {
    let mut config = ProxyConfig::default();
    config.include = vec!["add".to_string()];
    let before: BeforeHook = Arc::new(|mut ctx| {
        Box::pin(async move {
            let doubled: Vec<Value> = ctx.args.iter().map(|v| json!(as_f64(v) * 2.0)).collect();
            tracing::info!(plugin = %ctx.plugin_name, method = %ctx.method, "doubling args before call");
            ctx.modify_args(doubled);
            Ok(ctx)
        })
    });
    let after: AfterHook = Arc::new(|ctx, result| {
        Box::pin(async move {
            let incremented = json!(as_f64(&result) + 1.0);
            tracing::info!(plugin = %ctx.plugin_name, method = %ctx.method, result = %incremented, "incrementing result after call");
            Ok(incremented)
        })
    });
    config.before = Some(before);
    config.after = Some(after);

    plugin("logger", "1.0.0")
        .expect("valid semver")
        .depends_optional("math", "^1.0.0")
        .expect("valid range")
        .proxy(ProxyTarget::Plugin("math".to_string()), config)
        .setup(|_ctx| async {
            let api = PluginApi::new().with_method(
                "log",
                async_method(|args| async move {
                    let message = args.first().cloned().unwrap_or(Value::Null);
                    tracing::info!(%message, "logger.log");
                    Ok::<Value, KernelError>(Value::Null)
                }),
            );
            Ok(api)
        })
        .build()
        .expect("valid descriptor")
}
