//! Engine configuration.
//!
//! Use [`EngineBuilder`] to describe where inputs come from, where outputs go
//! and how the engine behaves between builds.

use std::path::PathBuf;
use std::sync::Arc;

use crate::document::{DefaultDocumentFactory, DocumentFactory};
use crate::engine::Engine;
use crate::fs::{FileSystem, PhysicalFileSystem};
use crate::settings::Settings;
use crate::value::Value;

/// What to delete from the output directory around a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanMode {
    /// Leave the output directory alone.
    None,
    /// Delete everything in the output directory before the build.
    Full,
    /// After a successful build, delete output files the build neither wrote
    /// nor skipped as unchanged.
    #[default]
    Unwritten,
}

/// Runtime options of an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Input roots, searched in order.
    pub input_paths: Vec<PathBuf>,
    /// Output root.
    pub output_path: PathBuf,
    /// Temp root, emptied before every build.
    pub temp_path: PathBuf,
    /// Output cleaning behavior.
    pub clean_mode: CleanMode,
    /// Worker threads for phase and per-document parallelism.
    /// `0` uses one thread per available core.
    pub max_threads: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            input_paths: vec![PathBuf::from("input")],
            output_path: PathBuf::from("output"),
            temp_path: PathBuf::from("temp"),
            clean_mode: CleanMode::default(),
            max_threads: 0,
        }
    }
}

/// Builder for [`Engine`].
///
/// # Example
///
/// ```
/// use docpipe::{CleanMode, EngineBuilder};
///
/// let engine = EngineBuilder::new()
///     .input_path("site")
///     .output_path("public")
///     .clean_mode(CleanMode::Full)
///     .setting("title", "My Site")
///     .build()
///     .unwrap();
/// assert_eq!(engine.settings().get_as::<String>("title").as_deref(), Some("My Site"));
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    input_paths: Vec<PathBuf>,
    output_path: Option<PathBuf>,
    temp_path: Option<PathBuf>,
    clean_mode: Option<CleanMode>,
    max_threads: Option<usize>,
    settings: Settings,
    file_system: Option<Arc<dyn FileSystem>>,
    factory: Option<Arc<dyn DocumentFactory>>,
}

impl EngineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input root. Defaults to `input` if none is added.
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_paths.push(path.into());
        self
    }

    /// Set the output root. Default: `output`.
    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Set the temp root. Default: `temp`.
    pub fn temp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_path = Some(path.into());
        self
    }

    /// Set the clean mode. Default: [`CleanMode::Unwritten`].
    pub fn clean_mode(mut self, mode: CleanMode) -> Self {
        self.clean_mode = Some(mode);
        self
    }

    /// Limit worker threads. Default: one per core.
    pub fn max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self
    }

    /// Add one setting.
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key, value);
        self
    }

    /// Merge a settings store; later entries override earlier ones.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Settings::from(self.settings.merged(&settings));
        self
    }

    /// Use a custom file system instead of the physical one built from the
    /// configured paths.
    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Use a custom document factory.
    pub fn document_factory(mut self, factory: Arc<dyn DocumentFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Resolve the options without building an engine.
    pub fn options(&self) -> EngineOptions {
        let defaults = EngineOptions::default();
        EngineOptions {
            input_paths: if self.input_paths.is_empty() {
                defaults.input_paths
            } else {
                self.input_paths.clone()
            },
            output_path: self.output_path.clone().unwrap_or(defaults.output_path),
            temp_path: self.temp_path.clone().unwrap_or(defaults.temp_path),
            clean_mode: self.clean_mode.unwrap_or(defaults.clean_mode),
            max_threads: self.max_threads.unwrap_or(defaults.max_threads),
        }
    }

    /// Build the engine.
    ///
    /// Fails only if the worker pool cannot be created.
    pub fn build(self) -> crate::Result<Engine> {
        let options = self.options();
        let fs = self.file_system.unwrap_or_else(|| {
            Arc::new(PhysicalFileSystem::new(
                options.input_paths.clone(),
                options.output_path.clone(),
                options.temp_path.clone(),
            ))
        });
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DefaultDocumentFactory));
        Engine::from_parts(options, self.settings, fs, factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = EngineBuilder::new().options();
        assert_eq!(options.input_paths, vec![PathBuf::from("input")]);
        assert_eq!(options.clean_mode, CleanMode::Unwritten);
        assert_eq!(options.max_threads, 0);
    }

    #[test]
    fn test_builder_overrides() {
        let options = EngineBuilder::new()
            .input_path("a")
            .input_path("b")
            .output_path("out")
            .clean_mode(CleanMode::None)
            .max_threads(2)
            .options();
        assert_eq!(options.input_paths.len(), 2);
        assert_eq!(options.output_path, PathBuf::from("out"));
        assert_eq!(options.clean_mode, CleanMode::None);
        assert_eq!(options.max_threads, 2);
    }

    #[test]
    fn test_settings_merge() {
        let builder = EngineBuilder::new()
            .setting("a", 1)
            .settings(Settings::new().with("a", 2).with("b", 3));
        assert_eq!(builder.settings.get_as::<i64>("a"), Some(2));
        assert_eq!(builder.settings.get_as::<i64>("b"), Some(3));
    }
}
