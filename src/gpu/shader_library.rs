use std::path::Path;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor, ShaderLanguage,
    ShaderType,
};
use rustc_hash::FxHashMap;

/// Named WGSL sources with `#import` composition via naga-oil.
///
/// Sources are addressed by logical name. A source that declares
/// `#define_import_path` is also registered as a composable module, so
/// later sources can pull it in with `#import`. Composition produces
/// `naga::Module` IR directly.
pub struct ShaderLibrary {
    composer: Composer,
    sources: FxHashMap<String, String>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLibrary {
    /// Empty library.
    #[must_use]
    pub fn new() -> Self {
        Self {
            composer: Composer::default(),
            sources: FxHashMap::default(),
        }
    }

    /// Register `text` under `name`, replacing any earlier source of that
    /// name.
    ///
    /// # Errors
    ///
    /// Returns the composer diagnostic when a composable module fails to
    /// parse.
    pub fn add_source(&mut self, name: &str, text: &str) -> Result<(), String> {
        if text.contains("#define_import_path") {
            let registered = self
                .composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: text,
                    file_path: name,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map(|_| ());
            if let Err(e) = registered {
                return Err(e.emit_to_string(&self.composer));
            }
        }
        if self.sources.insert(name.to_owned(), text.to_owned()).is_some() {
            log::debug!("ShaderLibrary: replaced source \"{name}\"");
        }
        Ok(())
    }

    /// Register a file under `name`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not compose.
    pub fn add_source_file(&mut self, path: &Path, name: &str) -> Result<(), String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        self.add_source(name, &text)
    }

    /// Register every `*.wgsl` file below `dir`, named
    /// `prefix` + path relative to `dir` (with `/` separators).
    ///
    /// Returns the number of sources added.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable directory or file.
    pub fn add_source_directory(&mut self, dir: &Path, prefix: &str) -> Result<usize, String> {
        let mut files = Vec::new();
        collect_wgsl_files(dir, &mut files)?;
        files.sort();
        for path in &files {
            let relative = path.strip_prefix(dir).unwrap_or(path);
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            self.add_source_file(path, &format!("{prefix}{name}"))?;
        }
        log::info!(
            "ShaderLibrary: added {} sources from {}",
            files.len(),
            dir.display()
        );
        Ok(files.len())
    }

    /// Source text registered under `name`.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&str> {
        let source = self.sources.get(name).map(String::as_str);
        if source.is_none() {
            log::warn!("ShaderLibrary: no source named \"{name}\"");
        }
        source
    }

    /// Whether a source is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Compose `source` (which may `#import` registered modules) into IR.
    ///
    /// # Errors
    ///
    /// Returns the parser or composer diagnostic.
    pub fn compose(&mut self, source: &str, file_path: &str) -> Result<naga::Module, String> {
        if !source.contains("#import") {
            return naga::front::wgsl::parse_str(source)
                .map_err(|e| e.emit_to_string(source));
        }
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source,
                file_path,
                shader_type: ShaderType::Wgsl,
                ..Default::default()
            })
            .map_err(|e| e.emit_to_string(&self.composer))
    }
}

fn collect_wgsl_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("{}: {e}", dir.display()))?;
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.is_dir() {
            collect_wgsl_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "wgsl") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOISE: &str = r"
#define_import_path nebula::noise

fn hash(x: u32) -> f32 {
    return f32((x * 747796405u) >> 9u) / 8388608.0;
}
";

    const SHADER: &str = r"
#import nebula::noise::hash

@group(0) @binding(0) var<storage, read_write> jitter: array<f32>;

@compute @workgroup_size(32)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    jitter[id.x] = hash(id.x);
}
";

    #[test]
    fn imports_resolve_against_registered_modules() {
        let mut library = ShaderLibrary::new();
        library.add_source("noise.wgsl", NOISE).unwrap();
        let module = library.compose(SHADER, "jitter.wgsl").unwrap();
        assert_eq!(module.entry_points.len(), 1);
        assert_eq!(module.entry_points[0].name, "main");
    }

    #[test]
    fn plain_sources_parse_without_composer() {
        let mut library = ShaderLibrary::new();
        let module = library
            .compose("@compute @workgroup_size(1) fn main() {}", "inline")
            .unwrap();
        assert_eq!(module.entry_points[0].workgroup_size, [1, 1, 1]);
    }

    #[test]
    fn parse_errors_are_reported() {
        let mut library = ShaderLibrary::new();
        let err = library.compose("fn main( {", "broken").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn sources_are_looked_up_by_name() {
        let mut library = ShaderLibrary::new();
        library.add_source("a.wgsl", "fn a() {}").unwrap();
        assert_eq!(library.source("a.wgsl"), Some("fn a() {}"));
        assert!(library.source("b.wgsl").is_none());
    }

    #[test]
    fn directories_are_loaded_recursively() {
        let dir = std::env::temp_dir().join("nebula_shader_library_test");
        let nested = dir.join("particles");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.join("common.wgsl"), "fn common() {}").unwrap();
        std::fs::write(nested.join("update.wgsl"), "fn update() {}").unwrap();
        std::fs::write(nested.join("notes.txt"), "ignored").unwrap();

        let mut library = ShaderLibrary::new();
        let added = library.add_source_directory(&dir, "shaders/").unwrap();
        assert_eq!(added, 2);
        assert!(library.contains("shaders/common.wgsl"));
        assert!(library.contains("shaders/particles/update.wgsl"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
