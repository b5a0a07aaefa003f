use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::gpu::DebugSeverity;

/// Diagnostics settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Debug", inline)]
#[serde(default)]
pub struct DebugOptions {
    /// Device messages below this severity are dropped.
    #[schemars(title = "Minimum Severity")]
    pub level: DebugSeverity,
    /// Warn when a particle buffer has no block of the same name.
    #[schemars(title = "Log Unresolved Bindings")]
    pub log_unresolved_bindings: bool,
    /// Device messages kept for inspection.
    #[schemars(skip)]
    pub retain_messages: usize,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            level: DebugSeverity::Low,
            log_unresolved_bindings: true,
            retain_messages: 256,
        }
    }
}
