mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{LogSettings, RelaySettings, ServerSettings, Settings};

/// Default location of the optional TOML config file (extension optional).
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Prefix of environment overrides, e.g. `RELAY_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "RELAY";

/// Loads configuration from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads the configuration from `path` (optional) and `RELAY_*` environment
/// variables, then merges it over `Settings::default()`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
