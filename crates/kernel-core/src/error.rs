//! Structured error taxonomy for the kernel.
//!
//! Every subsystem defines its own `thiserror` enum. [`KernelError`] wraps a
//! subsystem error and fills in the category/severity/recoverable fields a
//! caller needs without inspecting the subsystem variant itself.

use std::fmt;
use std::time::SystemTime;

/// High-level classification of an error's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Kernel,
    Plugin,
    Configuration,
    Dependency,
    Validation,
    Network,
    Filesystem,
    Security,
    Performance,
    Memory,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Kernel => "kernel",
            ErrorCategory::Plugin => "plugin",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network",
            ErrorCategory::Filesystem => "filesystem",
            ErrorCategory::Security => "security",
            ErrorCategory::Performance => "performance",
            ErrorCategory::Memory => "memory",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Severity of an error, independent of its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Dependency resolution failures (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("missing required dependency '{dependency}' of '{plugin_id}'")]
    MissingDependency {
        plugin_id: String,
        dependency: String,
    },

    #[error("{dependency} (required {required}, found {found}, required by {plugin_id})")]
    VersionConflict {
        plugin_id: String,
        dependency: String,
        required: String,
        found: String,
    },

    #[error("circular dependency: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

/// Registration / state-machine failures (§4.2).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin '{0}' is already registered")]
    DuplicateRegistration(String),

    #[error("plugin '{0}' is not registered")]
    UnknownPlugin(String),

    #[error("invalid descriptor for '{plugin_id}': {message}")]
    InvalidDescriptor { plugin_id: String, message: String },

    #[error("invalid state transition for '{plugin_id}': {from:?} -> {to:?}")]
    InvalidTransition {
        plugin_id: String,
        from: crate::plugin::instance::PluginState,
        to: crate::plugin::instance::PluginState,
    },
}

/// Extension merge failures (§4.3). Most extension problems are warnings,
/// not errors, but a few conditions are hard failures.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("extension target '{0}' is not registered")]
    UnknownTarget(String),
}

/// Proxy compilation / invocation failures (§4.4).
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("proxy pattern '{pattern}' exceeds the {limit}-character cap")]
    PatternTooLong { pattern: String, limit: usize },

    #[error("invalid proxy pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("proxy target '{0}' is not registered")]
    UnknownTarget(String),

    #[error("method '{plugin_id}.{method}' raised an unhandled error: {message}")]
    Unhandled {
        plugin_id: String,
        method: String,
        message: String,
    },
}

/// Reactive store failures (§4.5).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("watcher limit exceeded (max {max})")]
    WatcherLimit { max: usize },

    #[error("watcher limit for key '{key}' exceeded (max {max})")]
    WatcherLimitPerKey { key: String, max: usize },

    #[error("nested notification depth exceeded {max}")]
    CycleDetected { max: usize },

    #[error("transaction rollback failed: {0}")]
    TransactionFailed(String),

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("no transaction or batch is currently open")]
    NoActiveScope,
}

/// Lifecycle failures (§4.6).
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("setup failed for plugin '{plugin_id}': {message}")]
    SetupFailed {
        plugin_id: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("hook '{hook}' failed for plugin '{plugin_id}': {message}")]
    HookFailed {
        plugin_id: String,
        hook: &'static str,
        message: String,
    },

    #[error("initialization of plugin '{plugin_id}' timed out after {timeout_ms}ms")]
    Timeout { plugin_id: String, timeout_ms: u64 },

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),
}

/// Subsystem-specific error, the payload carried by [`KernelError`].
#[derive(Debug, thiserror::Error)]
pub enum KernelErrorKind {
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Extension(#[from] ExtensionError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("kernel initialization failed: {0}")]
    Initialization(String),
    #[error("{0}")]
    Other(String),
}

/// The single error type returned by the public kernel API.
///
/// Wraps a [`KernelErrorKind`] with the structured fields §7 requires:
/// machine-readable `code`, `category`, `severity`, `recoverable`, a
/// `timestamp`, and optional `plugin_id`/`context`.
#[derive(Debug)]
pub struct KernelError {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub recoverable: bool,
    pub timestamp: SystemTime,
    pub plugin_id: Option<String>,
    pub context: Option<String>,
    pub kind: KernelErrorKind,
    pub cause: Option<Box<KernelError>>,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.category, self.code, self.kind)
    }
}

impl std::error::Error for KernelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl KernelError {
    pub fn new(kind: KernelErrorKind) -> Self {
        let (code, category, severity, recoverable) = classify(&kind);
        KernelError {
            code,
            category,
            severity,
            recoverable,
            timestamp: SystemTime::now(),
            plugin_id: None,
            context: None,
            kind,
            cause: None,
        }
    }

    pub fn with_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_cause(mut self, cause: KernelError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Wraps `self` as the cause of a fresh `KernelInitializationError`,
    /// matching the §7 propagation rule for lifecycle failures.
    pub fn into_initialization_error(self, plugin_id: impl Into<String>) -> KernelError {
        let plugin_id = plugin_id.into();
        let message = self.to_string();
        KernelError::new(KernelErrorKind::Initialization(message))
            .with_plugin(plugin_id)
            .with_cause(self)
    }
}

fn classify(kind: &KernelErrorKind) -> (&'static str, ErrorCategory, ErrorSeverity, bool) {
    use KernelErrorKind::*;
    match kind {
        Resolver(ResolverError::MissingDependency { .. }) => {
            ("MISSING_DEPENDENCY", ErrorCategory::Dependency, ErrorSeverity::High, false)
        }
        Resolver(ResolverError::VersionConflict { .. }) => {
            ("VERSION_CONFLICT", ErrorCategory::Dependency, ErrorSeverity::High, false)
        }
        Resolver(ResolverError::CircularDependency { .. }) => {
            ("CIRCULAR_DEPENDENCY", ErrorCategory::Dependency, ErrorSeverity::High, false)
        }
        Registry(RegistryError::DuplicateRegistration(_)) => {
            ("DUPLICATE_REGISTRATION", ErrorCategory::Plugin, ErrorSeverity::Medium, false)
        }
        Registry(RegistryError::UnknownPlugin(_)) => {
            ("UNKNOWN_PLUGIN", ErrorCategory::Plugin, ErrorSeverity::Medium, true)
        }
        Registry(RegistryError::InvalidDescriptor { .. }) => {
            ("INVALID_DESCRIPTOR", ErrorCategory::Validation, ErrorSeverity::Medium, false)
        }
        Registry(RegistryError::InvalidTransition { .. }) => {
            ("INVALID_STATE_TRANSITION", ErrorCategory::Kernel, ErrorSeverity::High, false)
        }
        Extension(ExtensionError::UnknownTarget(_)) => {
            ("EXTENSION_UNKNOWN_TARGET", ErrorCategory::Plugin, ErrorSeverity::Low, true)
        }
        Proxy(ProxyError::PatternTooLong { .. }) => {
            ("PROXY_PATTERN_TOO_LONG", ErrorCategory::Validation, ErrorSeverity::Medium, false)
        }
        Proxy(ProxyError::InvalidPattern { .. }) => {
            ("PROXY_INVALID_PATTERN", ErrorCategory::Validation, ErrorSeverity::Medium, false)
        }
        Proxy(ProxyError::UnknownTarget(_)) => {
            ("PROXY_UNKNOWN_TARGET", ErrorCategory::Plugin, ErrorSeverity::Medium, true)
        }
        Proxy(ProxyError::Unhandled { .. }) => {
            ("PROXY_UNHANDLED", ErrorCategory::Plugin, ErrorSeverity::High, true)
        }
        Store(StoreError::WatcherLimit { .. }) => {
            ("STORE_WATCHER_LIMIT", ErrorCategory::Performance, ErrorSeverity::Medium, true)
        }
        Store(StoreError::WatcherLimitPerKey { .. }) => {
            ("STORE_WATCHER_LIMIT", ErrorCategory::Performance, ErrorSeverity::Medium, true)
        }
        Store(StoreError::CycleDetected { .. }) => {
            ("STORE_CYCLE_DETECTED", ErrorCategory::Kernel, ErrorSeverity::High, true)
        }
        Store(StoreError::TransactionFailed(_)) => {
            ("STORE_TRANSACTION_FAILED", ErrorCategory::Kernel, ErrorSeverity::Critical, false)
        }
        Store(StoreError::InvalidKey(_)) => {
            ("STORE_INVALID_KEY", ErrorCategory::Validation, ErrorSeverity::Low, true)
        }
        Store(StoreError::NoActiveScope) => {
            ("STORE_NO_ACTIVE_SCOPE", ErrorCategory::Kernel, ErrorSeverity::Low, true)
        }
        Lifecycle(LifecycleError::SetupFailed { .. }) => {
            ("LIFECYCLE_SETUP_FAILED", ErrorCategory::Plugin, ErrorSeverity::High, false)
        }
        Lifecycle(LifecycleError::HookFailed { .. }) => {
            ("LIFECYCLE_HOOK_FAILED", ErrorCategory::Plugin, ErrorSeverity::High, false)
        }
        Lifecycle(LifecycleError::Timeout { .. }) => {
            ("LIFECYCLE_TIMEOUT", ErrorCategory::Performance, ErrorSeverity::High, false)
        }
        Lifecycle(LifecycleError::UnknownPlugin(_)) => {
            ("UNKNOWN_PLUGIN", ErrorCategory::Plugin, ErrorSeverity::Medium, true)
        }
        Initialization(_) => {
            ("KERNEL_INITIALIZATION_ERROR", ErrorCategory::Kernel, ErrorSeverity::Critical, false)
        }
        Other(_) => ("UNKNOWN", ErrorCategory::Unknown, ErrorSeverity::Medium, true),
    }
}

macro_rules! impl_from_subsystem {
    ($variant:ident, $err:ty) => {
        impl From<$err> for KernelError {
            fn from(e: $err) -> Self {
                KernelError::new(KernelErrorKind::$variant(e))
            }
        }
    };
}

impl_from_subsystem!(Resolver, ResolverError);
impl_from_subsystem!(Registry, RegistryError);
impl_from_subsystem!(Extension, ExtensionError);
impl_from_subsystem!(Proxy, ProxyError);
impl_from_subsystem!(Store, StoreError);
impl_from_subsystem!(Lifecycle, LifecycleError);

pub type Result<T> = std::result::Result<T, KernelError>;
