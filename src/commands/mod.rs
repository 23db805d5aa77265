pub mod discover;
pub mod inspect;

use anyhow::Result;
use intraday_patterns::Config;
use tracing::info;

/// Load the config file if one was given, otherwise defaults plus env overrides
pub fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            info!("Loading config from: {}", path);
            Config::from_file(path)?
        }
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };
    Ok(config)
}
