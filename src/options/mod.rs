//! Engine options with TOML preset support.
//!
//! Options serialize to/from TOML. Every section uses `#[serde(default)]`
//! so partial files (e.g. only overriding `[debug]`) work.

mod debug;
mod render;
mod timing;

use std::path::Path;

pub use debug::DebugOptions;
pub use render::RenderOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use timing::TimingOptions;

use crate::error::EngineError;

/// Top-level options container.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema,
)]
#[serde(default)]
pub struct EngineOptions {
    /// Frame and draw defaults.
    pub render: RenderOptions,
    /// Diagnostics.
    pub debug: DebugOptions,
    /// Frame pacing.
    pub timing: TimingOptions,
}

impl EngineOptions {
    /// Generate JSON Schema describing the exposed options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(EngineOptions)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid TOML.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(EngineError::Io)?;
        toml::from_str(&content)
            .map_err(|e| EngineError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// Fails when serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(EngineError::Io)?;
        }
        std::fs::write(path, content).map_err(EngineError::Io)
    }

    /// List available preset names (TOML file stems) in a directory.
    #[must_use]
    pub fn list_presets(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) =
                        path.file_stem().and_then(|s| s.to_str())
                    {
                        names.push(stem.to_owned());
                    }
                }
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::DebugSeverity;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = EngineOptions::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: EngineOptions = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[debug]
level = "high"

[timing]
target_fps = 60
"#;
        let opts: EngineOptions = toml::from_str(toml_str).unwrap();
        assert_eq!(opts.debug.level, DebugSeverity::High);
        assert_eq!(opts.timing.target_fps, 60);
        assert!(opts.debug.log_unresolved_bindings);
        assert_eq!(opts.render.default_patch_size, 3);
        assert_eq!(opts.render.default_point_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn save_load_and_list_presets() {
        let dir = std::env::temp_dir()
            .join(format!("nebula-options-{}", std::process::id()));
        let mut opts = EngineOptions::default();
        opts.render.depth_test = false;
        opts.render.clear_color = [0.1, 0.2, 0.3, 1.0];
        opts.save(&dir.join("dim.toml")).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        assert_eq!(EngineOptions::load(&dir.join("dim.toml")).unwrap(), opts);
        assert_eq!(EngineOptions::list_presets(&dir), vec!["dim".to_owned()]);
        assert!(matches!(
            EngineOptions::load(&dir.join("missing.toml")),
            Err(EngineError::Io(_))
        ));

        std::fs::write(dir.join("broken.toml"), "[render\n").unwrap();
        assert!(matches!(
            EngineOptions::load(&dir.join("broken.toml")),
            Err(EngineError::OptionsParse(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(EngineOptions::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();
        assert!(props.contains_key("render"));
        assert!(props.contains_key("debug"));
        assert!(props.contains_key("timing"));

        let render = &props["render"]["properties"];
        assert!(render.get("default_patch_size").is_some());
        assert!(render.get("clear_color").is_none());
        let debug = &props["debug"]["properties"];
        assert!(debug.get("log_unresolved_bindings").is_some());
        assert!(debug.get("retain_messages").is_none());
    }
}
