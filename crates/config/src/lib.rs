pub mod config;
pub mod paths;

pub use config::{
    AppConfig, ConfigOverride, ConfigOverrides, InferenceOverride, InferenceSettings,
    LayoutOverride, LayoutSettings, TilingOverride, save_config,
};
pub use paths::{CONFIG_DIR_ENV, CONFIG_FILE_NAME, default_config_dir, default_config_path};
