mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{BusSettings, LogSettings, ServerSettings, Settings, TransportSettings};

/// Prefix for environment overrides, e.g. `RECORDCAST__BUS__SUBSCRIBER_BUFFER=32`.
pub const ENV_PREFIX: &str = "RECORDCAST";

/// Loads the configuration from `config/default` (if present) and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the file named `path` (any extension the
/// `config` crate understands, optional) and the environment, then merges it
/// over the defaults. A bare `PORT` variable overrides `server.port`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("server.port", std::env::var("PORT").ok())?;

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_into(Settings::default()))
}
