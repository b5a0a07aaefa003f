use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Frame and draw defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Render", inline)]
#[serde(default)]
pub struct RenderOptions {
    /// Depth-test particle draws.
    #[schemars(title = "Depth Test")]
    pub depth_test: bool,
    /// Color the target is cleared to at the start of a frame.
    #[schemars(skip)]
    pub clear_color: [f32; 4],
    /// Vertices per patch for newly created tessellated programs.
    #[schemars(title = "Patch Size", range(min = 1, max = 32))]
    pub default_patch_size: u32,
    /// Color of the built-in point program.
    #[schemars(skip)]
    pub default_point_color: [f32; 4],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            depth_test: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            default_patch_size: 3,
            default_point_color: [1.0, 0.0, 0.0, 1.0],
        }
    }
}
