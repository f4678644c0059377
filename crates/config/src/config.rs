use std::{
    fs,
    ops::AddAssign,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use mmbridge_core::{
    adapter::{BackendKind, CallContext},
    runtime::{DeviceKind, Precision, prepare_device_and_dtype},
    vision::{FetchOptions, TilingConfig},
};
use serde::{Deserialize, Serialize};

use crate::paths::default_config_path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub tiling: TilingConfig,
    pub inference: InferenceSettings,
    pub layout: LayoutSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::InternVl2,
            tiling: TilingConfig::default(),
            inference: InferenceSettings::default(),
            layout: LayoutSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub device: DeviceKind,
    pub device_ordinal: usize,
    pub precision: Option<Precision>,
    /// Registered chat template used by the bundled tokenizer.
    pub template: String,
    pub max_new_tokens: usize,
    pub use_cache: bool,
    /// Unset keeps each backend's own logging default.
    pub quiet: Option<bool>,
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            device: DeviceKind::Cpu,
            device_ordinal: 0,
            precision: None,
            template: "chatml".to_string(),
            max_new_tokens: 512,
            use_cache: true,
            quiet: None,
            fetch_timeout_secs: Some(30),
        }
    }
}

impl InferenceSettings {
    /// Open the configured device and build the per-call settings.
    pub fn call_context(&self) -> Result<CallContext> {
        let (device, dtype) =
            prepare_device_and_dtype(self.device, self.device_ordinal, self.precision)?;
        Ok(CallContext {
            device,
            dtype,
            max_new_tokens: self.max_new_tokens,
            use_cache: self.use_cache,
            quiet: self.quiet,
            fetch: FetchOptions {
                timeout: self.fetch_timeout_secs.map(Duration::from_secs),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub model: String,
    pub units: usize,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            model: "InternVL2-8B".to_string(),
            units: 1,
        }
    }
}

impl AppConfig {
    /// Read the file at `path` (or the default location), writing defaults
    /// first when it does not exist yet.
    pub fn load_or_init(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if !path.exists() {
            let cfg = AppConfig::default();
            save_config(&path, &cfg)?;
            return Ok((cfg, path));
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse configuration at {}", path.display()))?;
        Ok((cfg, path))
    }

    pub fn load_with_overrides(overrides: ConfigOverrides) -> Result<(Self, PathBuf)> {
        let config_path_override = overrides.config_path.clone();
        let (mut config, path) = Self::load_or_init(config_path_override.as_deref())?;
        config += overrides;
        config.validate()?;
        Ok((config, path))
    }

    pub fn validate(&self) -> Result<()> {
        self.tiling
            .validate()
            .context("configured tiling bounds are unusable")?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }

        let tiling = &overrides.tiling;
        if let Some(tile_size) = tiling.tile_size {
            self.tiling.tile_size = tile_size;
        }
        if let Some(min_tiles) = tiling.min_tiles {
            self.tiling.min_tiles = min_tiles;
        }
        if let Some(max_tiles) = tiling.max_tiles {
            self.tiling.max_tiles = max_tiles;
        }
        if let Some(use_thumbnail) = tiling.use_thumbnail {
            self.tiling.use_thumbnail = use_thumbnail;
        }

        let inference = &overrides.inference;
        if let Some(device) = inference.device {
            self.inference.device = device;
        }
        if let Some(ordinal) = inference.device_ordinal {
            self.inference.device_ordinal = ordinal;
        }
        if inference.precision.is_some() {
            self.inference.precision = inference.precision;
        }
        if let Some(template) = inference.template.as_ref() {
            self.inference.template = template.clone();
        }
        if let Some(max_new_tokens) = inference.max_new_tokens {
            self.inference.max_new_tokens = max_new_tokens;
        }
        if let Some(use_cache) = inference.use_cache {
            self.inference.use_cache = use_cache;
        }
        if inference.quiet.is_some() {
            self.inference.quiet = inference.quiet;
        }
        if inference.fetch_timeout_secs.is_some() {
            self.inference.fetch_timeout_secs = inference.fetch_timeout_secs;
        }

        if let Some(model) = overrides.layout.model.as_ref() {
            self.layout.model = model.clone();
        }
        if let Some(units) = overrides.layout.units {
            self.layout.units = units;
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub tiling: TilingOverride,
    pub inference: InferenceOverride,
    pub layout: LayoutOverride,
}

#[derive(Debug, Default, Clone)]
pub struct TilingOverride {
    pub tile_size: Option<u32>,
    pub min_tiles: Option<u32>,
    pub max_tiles: Option<u32>,
    pub use_thumbnail: Option<bool>,
}

#[derive(Debug, Default, Clone)]
pub struct InferenceOverride {
    pub device: Option<DeviceKind>,
    pub device_ordinal: Option<usize>,
    pub precision: Option<Precision>,
    pub template: Option<String>,
    pub max_new_tokens: Option<usize>,
    pub use_cache: Option<bool>,
    pub quiet: Option<bool>,
    pub fetch_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone)]
pub struct LayoutOverride {
    pub model: Option<String>,
    pub units: Option<usize>,
}

pub trait ConfigOverride {
    fn apply(self, config: &mut AppConfig);
}

impl ConfigOverride for ConfigOverrides {
    fn apply(self, config: &mut AppConfig) {
        config.apply_overrides(&self);
    }
}

impl<'a> ConfigOverride for &'a ConfigOverrides {
    fn apply(self, config: &mut AppConfig) {
        config.apply_overrides(self);
    }
}

impl<O: ConfigOverride> AddAssign<O> for AppConfig {
    fn add_assign(&mut self, rhs: O) {
        rhs.apply(self);
    }
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)
        .with_context(|| format!("failed to write configuration to {}", path.display()))
}
