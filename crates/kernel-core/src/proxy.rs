//! Proxy compiler & invocation pipeline (§4.4).
//!
//! Target expansion follows a validated, ordered multi-step walk; the
//! interceptor chain itself follows an ordered-handler-list dispatch style
//! with short-circuiting, reused here for `before` short-circuiting on
//! `ctx.skip()`.

use crate::error::{KernelError, ProxyError};
use crate::plugin::api::{ApiArgs, ApiFuture, ApiMethod};
use crate::plugin::context::DependencyApi;
use crate::plugin::PluginDescriptor;
use crate::store::Store;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub const DEFAULT_PATTERN_LENGTH_CAP: usize = 200;

/// Symbolic or concrete proxy target (§4.4 "Target expansion").
#[derive(Debug, Clone)]
pub enum ProxyTarget {
    Plugin(String),
    SelfTarget,
    Star,
    DoubleStar,
}

pub type ConditionFn = Arc<dyn Fn(&InvocationContext) -> bool + Send + Sync>;
pub type DataFactory = Arc<dyn Fn() -> Value + Send + Sync>;
pub type NextFn = Arc<dyn Fn(ApiArgs) -> ApiFuture + Send + Sync>;

pub type BeforeFuture = Pin<Box<dyn Future<Output = Result<InvocationContext, KernelError>> + Send>>;
pub type AfterFuture = Pin<Box<dyn Future<Output = Result<Value, KernelError>> + Send>>;
pub type AroundFuture = Pin<Box<dyn Future<Output = Result<Value, KernelError>> + Send>>;
pub type OnErrorFuture = Pin<Box<dyn Future<Output = Result<Value, KernelError>> + Send>>;

pub type BeforeHook = Arc<dyn Fn(InvocationContext) -> BeforeFuture + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(InvocationContext, Value) -> AfterFuture + Send + Sync>;
pub type AroundHook = Arc<dyn Fn(InvocationContext, NextFn) -> AroundFuture + Send + Sync>;
pub type OnErrorHook = Arc<dyn Fn(InvocationContext, Arc<KernelError>) -> OnErrorFuture + Send + Sync>;

/// One `.proxy(target, config)` registration. `priority` breaks ties in
/// `CompiledMethodProxy`'s wrapper ordering (descending, then registration
/// order). `data_factory`, evaluated fresh per invocation, is the "factory
/// style config" of §9 — it seeds `InvocationContext::data`.
#[derive(Clone)]
pub struct ProxyConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub priority: i64,
    pub pattern_length_cap: usize,
    pub condition: Option<ConditionFn>,
    pub group: Option<String>,
    pub before: Option<BeforeHook>,
    pub around: Option<AroundHook>,
    pub after: Option<AfterHook>,
    pub on_error: Option<OnErrorHook>,
    pub data_factory: Option<DataFactory>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            include: vec!["*".to_string()],
            exclude: Vec::new(),
            priority: 0,
            pattern_length_cap: DEFAULT_PATTERN_LENGTH_CAP,
            condition: None,
            group: None,
            before: None,
            around: None,
            after: None,
            on_error: None,
            data_factory: None,
        }
    }
}

#[derive(Clone)]
pub struct ProxySpec {
    pub target: ProxyTarget,
    pub config: ProxyConfig,
}

/// A proxy registration after target expansion: one concrete target id,
/// the set of plugin ids visible to its interceptors (`ctx.plugins`), and
/// the global registration order used for tie-breaking.
#[derive(Clone)]
pub struct ExpandedProxy {
    pub source_plugin_id: String,
    pub target_plugin_id: String,
    pub visible_ids: Vec<String>,
    pub config: ProxyConfig,
    pub registration_order: usize,
}

/// Expands every descriptor's proxies into concrete `(target, visible_ids)`
/// pairs, once, before any plugin is initialized (§4.4, §9 "'*' vs '**'").
pub fn expand_targets(descriptors: &[PluginDescriptor]) -> Vec<ExpandedProxy> {
    let all_ids: Vec<String> = descriptors.iter().map(|d| d.id.clone()).collect();
    let mut expanded = Vec::new();
    let mut registration_order = 0usize;
    for descriptor in descriptors {
        let own_deps: Vec<String> = descriptor.dependencies.iter().map(|d| d.plugin_id.clone()).collect();
        for proxy in &descriptor.proxies {
            let targets: Vec<String> = match &proxy.target {
                ProxyTarget::Plugin(id) => vec![id.clone()],
                ProxyTarget::SelfTarget => vec![descriptor.id.clone()],
                ProxyTarget::Star => own_deps.clone(),
                ProxyTarget::DoubleStar => all_ids.clone(),
            };
            let visible_ids = match &proxy.target {
                ProxyTarget::Star => own_deps.clone(),
                ProxyTarget::DoubleStar => all_ids.clone(),
                _ => own_deps.clone(),
            };
            for target_plugin_id in targets {
                expanded.push(ExpandedProxy {
                    source_plugin_id: descriptor.id.clone(),
                    target_plugin_id,
                    visible_ids: visible_ids.clone(),
                    config: proxy.config.clone(),
                    registration_order,
                });
                registration_order += 1;
            }
        }
    }
    expanded
}

#[derive(Debug)]
struct CompiledPattern {
    regex: Regex,
}

fn compile_pattern(pattern: &str, cap: usize) -> Result<CompiledPattern, KernelError> {
    if pattern.len() > cap {
        return Err(KernelError::from(ProxyError::PatternTooLong {
            pattern: pattern.to_string(),
            limit: cap,
        }));
    }
    let source = if pattern.starts_with('/') && pattern.ends_with('/') && pattern.len() > 1 {
        pattern[1..pattern.len() - 1].to_string()
    } else {
        glob_to_regex(pattern)
    };
    let regex = Regex::new(&source).map_err(|e| {
        KernelError::from(ProxyError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
    })?;
    Ok(CompiledPattern { regex })
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str("[^.]*"),
            c if "\\.+?()[]{}|^$".contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('$');
    out
}

/// Selects the methods of `method_names` matching `config`'s include/exclude
/// patterns (§4.4 "Method selection").
pub fn select_methods(method_names: &[String], config: &ProxyConfig) -> Result<Vec<String>, KernelError> {
    let includes: Vec<CompiledPattern> = config
        .include
        .iter()
        .map(|p| compile_pattern(p, config.pattern_length_cap))
        .collect::<Result<_, _>>()?;
    let excludes: Vec<CompiledPattern> = config
        .exclude
        .iter()
        .map(|p| compile_pattern(p, config.pattern_length_cap))
        .collect::<Result<_, _>>()?;
    Ok(method_names
        .iter()
        .filter(|name| includes.iter().any(|p| p.regex.is_match(name)))
        .filter(|name| !excludes.iter().any(|p| p.regex.is_match(name)))
        .cloned()
        .collect())
}

/// Per-call state threaded through `before`/`around`/`after`/`onError`
/// (§4.4 "Invocation contract").
#[derive(Clone)]
pub struct InvocationContext {
    pub plugin_name: String,
    pub method: String,
    pub args: ApiArgs,
    pub plugins: HashMap<String, DependencyApi>,
    pub store: Store,
    pub data: Value,
    modified_args: Option<ApiArgs>,
    skip_execution: bool,
    override_result: Option<Value>,
}

impl InvocationContext {
    pub fn new(plugin_name: String, method: String, args: ApiArgs, plugins: HashMap<String, DependencyApi>, store: Store, data: Value) -> Self {
        InvocationContext {
            plugin_name,
            method,
            args,
            plugins,
            store,
            data,
            modified_args: None,
            skip_execution: false,
            override_result: None,
        }
    }

    pub fn modify_args(&mut self, args: ApiArgs) {
        self.modified_args = Some(args);
    }

    pub fn skip(&mut self) {
        self.skip_execution = true;
    }

    pub fn replace(&mut self, value: Value) {
        self.skip_execution = true;
        self.override_result = Some(value);
    }

    pub fn effective_args(&self) -> ApiArgs {
        self.modified_args.clone().unwrap_or_else(|| self.args.clone())
    }
}

/// One resolved `(before|around|after|onError)` contributor to a method's
/// wrapper chain.
#[derive(Clone)]
struct ProxyLayer {
    priority: i64,
    registration_order: usize,
    visible_ids: Vec<String>,
    condition: Option<ConditionFn>,
    data_factory: Option<DataFactory>,
    before: Option<BeforeHook>,
    around: Option<AroundHook>,
    after: Option<AfterHook>,
    on_error: Option<OnErrorHook>,
}

/// The compiled wrapper chain for one `(plugin_id, method_name)` pair,
/// sorted by priority descending, ties by registration order (§3 "Proxy
/// metadata").
#[derive(Clone, Default)]
pub struct CompiledMethodProxy {
    layers: Vec<ProxyLayer>,
}

impl CompiledMethodProxy {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Builds the compiled wrapper table for every method of `method_names`
/// that a plugin's extended API exposes, given the already target-expanded
/// proxy registrations targeting that plugin (§4.4 "Compilation").
pub fn compile_for_plugin(
    target_plugin_id: &str,
    method_names: &[String],
    expanded: &[ExpandedProxy],
) -> Result<HashMap<String, CompiledMethodProxy>, KernelError> {
    let applicable: Vec<&ExpandedProxy> = expanded
        .iter()
        .filter(|p| p.target_plugin_id == target_plugin_id)
        .collect();

    let mut table: HashMap<String, CompiledMethodProxy> = HashMap::new();
    for proxy in applicable {
        let matched = select_methods(method_names, &proxy.config)?;
        for method_name in matched {
            let layer = ProxyLayer {
                priority: proxy.config.priority,
                registration_order: proxy.registration_order,
                visible_ids: proxy.visible_ids.clone(),
                condition: proxy.config.condition.clone(),
                data_factory: proxy.config.data_factory.clone(),
                before: proxy.config.before.clone(),
                around: proxy.config.around.clone(),
                after: proxy.config.after.clone(),
                on_error: proxy.config.on_error.clone(),
            };
            table.entry(method_name).or_default().layers.push(layer);
        }
    }
    for compiled in table.values_mut() {
        compiled
            .layers
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.registration_order.cmp(&b.registration_order)));
    }
    Ok(table)
}

/// Resolves the `plugins` map visible to a layer at call time by reading
/// current, already-loaded dependency APIs through `lookup`.
#[async_trait::async_trait]
pub trait PluginLookup: Send + Sync {
    async fn dependency_api(&self, id: &str) -> Option<DependencyApi>;
}

async fn build_plugins_map(ids: &[String], lookup: &dyn PluginLookup) -> HashMap<String, DependencyApi> {
    let mut map = HashMap::new();
    for id in ids {
        if let Some(api) = lookup.dependency_api(id).await {
            map.insert(id.clone(), api);
        }
    }
    map
}

/// Wraps `original` with `compiled`'s interceptor chain, implementing the
/// seven-step invocation contract of §4.4.
pub fn wrap_method(
    plugin_id: String,
    method_name: String,
    original: ApiMethod,
    compiled: CompiledMethodProxy,
    store: Store,
    lookup: Arc<dyn PluginLookup>,
) -> ApiMethod {
    Arc::new(move |args: ApiArgs| {
        let plugin_id = plugin_id.clone();
        let method_name = method_name.clone();
        let original = original.clone();
        let compiled = compiled.clone();
        let store = store.clone();
        let lookup = lookup.clone();
        Box::pin(async move {
            invoke(plugin_id, method_name, args, original, compiled, store, lookup).await
        })
    })
}

async fn invoke(
    plugin_id: String,
    method_name: String,
    args: ApiArgs,
    original: ApiMethod,
    compiled: CompiledMethodProxy,
    store: Store,
    lookup: Arc<dyn PluginLookup>,
) -> Result<Value, KernelError> {
    let layers = compiled.layers;
    let visible_ids: Vec<String> = layers.first().map(|l| l.visible_ids.clone()).unwrap_or_default();
    let plugins = build_plugins_map(&visible_ids, lookup.as_ref()).await;
    let data = layers
        .iter()
        .find_map(|l| l.data_factory.as_ref())
        .map(|f| f())
        .unwrap_or(Value::Null);

    let mut ctx = InvocationContext::new(plugin_id.clone(), method_name.clone(), args, plugins, store, data);

    // Step 3: run `before` hooks in priority order, honoring `condition`.
    for layer in layers.iter().filter(|l| l.before.is_some()) {
        if let Some(cond) = &layer.condition {
            if !cond(&ctx) {
                continue;
            }
        }
        let hook = layer.before.clone().unwrap();
        ctx = hook(ctx).await?;
        if ctx.skip_execution {
            break;
        }
    }

    // Steps 4-5: effective args, then the method body (via `around` if any).
    let result = if ctx.skip_execution {
        Ok(ctx.override_result.clone().unwrap_or(Value::Null))
    } else {
        let effective_args = ctx.effective_args();
        if let Some(layer) = layers.iter().find(|l| l.around.is_some()) {
            let hook = layer.around.clone().unwrap();
            let next: NextFn = Arc::new(move |a| original(a));
            hook(ctx.clone(), next).await
        } else {
            original(effective_args).await
        }
    };

    // Step 6: thread the result through `after` hooks.
    let result = match result {
        Ok(mut value) => {
            for layer in layers.iter().filter(|l| l.after.is_some()) {
                let hook = layer.after.clone().unwrap();
                value = hook(ctx.clone(), value).await?;
            }
            Ok(value)
        }
        Err(err) => Err(err),
    };

    // Step 7: on error, walk `onError` handlers in priority order.
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            let err = Arc::new(err);
            for layer in layers.iter().filter(|l| l.on_error.is_some()) {
                let hook = layer.on_error.clone().unwrap();
                if let Ok(value) = hook(ctx.clone(), err.clone()).await {
                    return Ok(value);
                }
            }
            Err(Arc::try_unwrap(err).unwrap_or_else(|e| KernelError::from(ProxyError::Unhandled {
                plugin_id: plugin_id.clone(),
                method: method_name.clone(),
                message: e.to_string(),
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_excludes_dots() {
        let pattern = compile_pattern("math.*", 200).unwrap();
        assert!(pattern.regex.is_match("math.add"));
        assert!(!pattern.regex.is_match("math.sub.extra"));
    }

    #[test]
    fn pattern_over_cap_is_rejected() {
        let long_pattern = "a".repeat(201);
        let err = compile_pattern(&long_pattern, 200).unwrap_err();
        assert_eq!(err.code, "PROXY_PATTERN_TOO_LONG");
    }

    #[test]
    fn select_methods_honours_include_and_exclude() {
        let mut config = ProxyConfig::default();
        config.include = vec!["*".to_string()];
        config.exclude = vec!["internal_*".to_string()];
        let methods = vec!["add".to_string(), "internal_reset".to_string()];
        let selected = select_methods(&methods, &config).unwrap();
        assert_eq!(selected, vec!["add".to_string()]);
    }

    struct NoopLookup;

    #[async_trait::async_trait]
    impl PluginLookup for NoopLookup {
        async fn dependency_api(&self, _id: &str) -> Option<DependencyApi> {
            None
        }
    }

    fn test_store() -> Store {
        Store::new(Vec::new(), crate::store::StoreOptions::default())
    }

    fn counting_original() -> (ApiMethod, Arc<std::sync::atomic::AtomicUsize>) {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = calls.clone();
        let method: ApiMethod = Arc::new(move |args: ApiArgs| {
            counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::pin(async move { Ok(Value::from(args.len())) })
        });
        (method, calls)
    }

    #[tokio::test]
    async fn before_hook_replace_short_circuits_without_calling_original() {
        let (original, calls) = counting_original();
        let before: BeforeHook = Arc::new(|mut ctx: InvocationContext| {
            Box::pin(async move {
                ctx.replace(Value::from("cached"));
                Ok(ctx)
            })
        });
        let layer = ProxyLayer {
            priority: 0,
            registration_order: 0,
            visible_ids: Vec::new(),
            condition: None,
            data_factory: None,
            before: Some(before),
            around: None,
            after: None,
            on_error: None,
        };
        let compiled = CompiledMethodProxy { layers: vec![layer] };
        let result = invoke(
            "target".to_string(),
            "get".to_string(),
            vec![Value::from(1)],
            original,
            compiled,
            test_store(),
            Arc::new(NoopLookup),
        )
        .await
        .unwrap();
        assert_eq!(result, Value::from("cached"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn around_hook_wraps_the_original_call() {
        let (original, calls) = counting_original();
        let around: AroundHook = Arc::new(|ctx: InvocationContext, next: NextFn| {
            Box::pin(async move {
                let inner = next(ctx.effective_args()).await?;
                Ok(Value::from(format!("wrapped({inner})")))
            })
        });
        let layer = ProxyLayer {
            priority: 0,
            registration_order: 0,
            visible_ids: Vec::new(),
            condition: None,
            data_factory: None,
            before: None,
            around: Some(around),
            after: None,
            on_error: None,
        };
        let compiled = CompiledMethodProxy { layers: vec![layer] };
        let result = invoke(
            "target".to_string(),
            "add".to_string(),
            vec![Value::from(1), Value::from(2)],
            original,
            compiled,
            test_store(),
            Arc::new(NoopLookup),
        )
        .await
        .unwrap();
        assert_eq!(result, Value::from("wrapped(2)"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
