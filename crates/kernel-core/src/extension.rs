//! Extension merger (§4.3).
//!
//! Follows a registration-order, warn-and-skip-on-bad-input idiom akin to
//! an ordered event-handler iteration.

use crate::plugin::api::PluginApi;
use std::sync::Arc;

/// One registered `.extend(target, fn)` call: `extension_fn` is applied to
/// the target plugin's current API and the result shallow-merged in.
#[derive(Clone)]
pub struct ExtensionSpec {
    pub target_plugin_id: String,
    pub extension_fn: Arc<dyn Fn(&PluginApi) -> PluginApi + Send + Sync>,
}

/// Applies every extension targeting `plugin_id`, in registration order, to
/// `api`. Extensions may override existing methods; the original is lost
/// (proxies exist for layering instead).
pub fn apply_extensions(api: &mut PluginApi, plugin_id: &str, extensions: &[ExtensionSpec]) {
    for ext in extensions.iter().filter(|e| e.target_plugin_id == plugin_id) {
        let partial = (ext.extension_fn)(api);
        if partial.is_empty() {
            tracing::warn!(plugin_id, "extension produced an empty API, skipping");
            continue;
        }
        api.merge(partial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::api::sync_method;
    use serde_json::json;

    #[test]
    fn extensions_apply_in_registration_order_and_override() {
        let mut api = PluginApi::new().with_value("value", json!(1));
        let extensions = vec![
            ExtensionSpec {
                target_plugin_id: "math".to_string(),
                extension_fn: Arc::new(|_api| PluginApi::new().with_value("value", json!(2))),
            },
            ExtensionSpec {
                target_plugin_id: "math".to_string(),
                extension_fn: Arc::new(|_api| {
                    PluginApi::new().with_method("extra", sync_method(|_| Ok(json!("ok"))))
                }),
            },
        ];
        apply_extensions(&mut api, "math", &extensions);
        assert_eq!(api.value("value"), Some(&json!(2)));
        assert!(api.method("extra").is_some());
    }
}
