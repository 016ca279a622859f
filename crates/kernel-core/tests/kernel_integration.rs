//! End-to-end reproductions of SPEC_FULL.md §8 scenarios 1, 2, 5, 6.

use kernel_core::error::{KernelError, KernelErrorKind};
use kernel_core::plugin::PluginApi;
use kernel_core::store::watcher::sync_change_watcher;
use kernel_core::store::{Store, StoreOptions};
use kernel_core::{plugin, Kernel, KernelBuilder, KernelConfig, PluginState};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn missing_dep_error(name: &str) -> KernelError {
    KernelError::new(KernelErrorKind::Other(format!("missing dependency api for '{name}'")))
}

async fn build_and_start(kernel_builder: KernelBuilder) -> Result<Kernel, KernelError> {
    let mut kernel = kernel_builder.build().await?;
    kernel.start().await?;
    Ok(kernel)
}

#[tokio::test]
async fn scenario_1_linear_init_places_dependencies_first() {
    let a = plugin("a", "1.0.0").unwrap().setup(|_ctx| async { Ok(PluginApi::new()) }).build().unwrap();

    let b = plugin("b", "1.0.0")
        .unwrap()
        .depends("a", "^1.0.0")
        .unwrap()
        .setup(|ctx| async move {
            ctx.get("a").ok_or_else(|| missing_dep_error("a"))?;
            Ok(PluginApi::new())
        })
        .build()
        .unwrap();

    let c = plugin("c", "1.0.0")
        .unwrap()
        .depends("b", "^1.0.0")
        .unwrap()
        .setup(|ctx| async move {
            ctx.get("b").ok_or_else(|| missing_dep_error("b"))?;
            Ok(PluginApi::new())
        })
        .build()
        .unwrap();

    let kernel = build_and_start(KernelBuilder::new().plugin(a).plugin(b).plugin(c)).await.unwrap();

    assert_eq!(kernel.state("a").await, Some(PluginState::Loaded));
    assert_eq!(kernel.state("b").await, Some(PluginState::Loaded));
    assert_eq!(kernel.state("c").await, Some(PluginState::Loaded));
    assert!(kernel.get("c").await.is_some());
}

#[tokio::test]
async fn scenario_2_version_conflict_fails_resolution() {
    let a = plugin("a", "1.2.0").unwrap().setup(|_ctx| async { Ok(PluginApi::new()) }).build().unwrap();
    let b = plugin("b", "1.0.0")
        .unwrap()
        .depends("a", "^2.0.0")
        .unwrap()
        .setup(|_ctx| async { Ok(PluginApi::new()) })
        .build()
        .unwrap();

    let err = build_and_start(KernelBuilder::new().plugin(a).plugin(b)).await.unwrap_err();
    assert_eq!(err.code, "VERSION_CONFLICT");
    assert!(err.context.as_deref().unwrap_or_default().contains("required by b"));
}

#[tokio::test]
async fn scenario_5_transaction_rollback_restores_pre_state_and_fires_no_watcher() {
    let store = Store::new(vec![("x".to_string(), json!(1)), ("y".to_string(), json!(2))], StoreOptions::default());

    let fire_count = Arc::new(AtomicUsize::new(0));
    let counter = fire_count.clone();
    store
        .watch_all(sync_change_watcher(move |_change| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await
        .unwrap();

    let result: Result<(), KernelError> = store
        .transaction(|scoped| async move {
            scoped.set("x", json!(10)).await?;
            scoped.set("y", json!(20)).await?;
            Err(KernelError::new(KernelErrorKind::Other("boom".to_string())))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(store.get("x").await, Some(json!(1)));
    assert_eq!(store.get("y").await, Some(json!(2)));
    assert_eq!(fire_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scenario_6_cycle_detection_fails_without_flag_breaks_with_flag() {
    let a = plugin("a", "1.0.0")
        .unwrap()
        .depends("b", "^1.0.0")
        .unwrap()
        .setup(|_ctx| async { Ok(PluginApi::new()) })
        .build()
        .unwrap();
    let b = plugin("b", "1.0.0")
        .unwrap()
        .depends("a", "^1.0.0")
        .unwrap()
        .setup(|_ctx| async { Ok(PluginApi::new()) })
        .build()
        .unwrap();

    let err = build_and_start(KernelBuilder::new().plugin(a.clone()).plugin(b.clone())).await.unwrap_err();
    assert_eq!(err.code, "CIRCULAR_DEPENDENCY");

    let config = KernelConfig {
        circular_dependencies: true,
        ..KernelConfig::default()
    };
    let kernel = build_and_start(KernelBuilder::new().with_config(config).plugin(a).plugin(b)).await.unwrap();
    assert_eq!(kernel.state("a").await, Some(PluginState::Loaded));
    assert_eq!(kernel.state("b").await, Some(PluginState::Loaded));
}
