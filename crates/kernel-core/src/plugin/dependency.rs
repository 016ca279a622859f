//! Declared dependency of one plugin on another.

use crate::version::VersionRange;
use std::fmt;

/// One declared dependency edge: `dependent` requires `plugin_id` to satisfy
/// `version_range`, unless `optional` is set.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub plugin_id: String,
    pub version_range: VersionRange,
    pub optional: bool,
}

impl Dependency {
    pub fn required(plugin_id: impl Into<String>, version_range: VersionRange) -> Self {
        Dependency {
            plugin_id: plugin_id.into(),
            version_range,
            optional: false,
        }
    }

    pub fn optional(plugin_id: impl Into<String>, version_range: VersionRange) -> Self {
        Dependency {
            plugin_id: plugin_id.into(),
            version_range,
            optional: true,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.plugin_id,
            self.version_range,
            if self.optional { " (optional)" } else { "" }
        )
    }
}
