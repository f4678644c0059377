use std::{env, path::PathBuf};

pub const CONFIG_DIR_ENV: &str = "MMBRIDGE_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "config.toml";

const APP_NAME: &str = "mmbridge";

/// `$MMBRIDGE_CONFIG_DIR`, else the platform config directory.
pub fn default_config_dir() -> PathBuf {
    env::var(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::config_dir()
                .unwrap_or_else(|| fallback_home(".config"))
                .join(APP_NAME)
        })
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}

fn fallback_home(component: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(component)
}
