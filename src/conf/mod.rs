//! Provides application configuration options.
//!
//! Configuration options can be parsed from config files in TOML format and
//! overridden with `MEDEA_ENDPOINT_*` environment variables.

pub mod log;
pub mod media;
pub mod rtc;
pub mod simulcast;

use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[doc(inline)]
pub use self::{
    log::Log,
    media::Media,
    rtc::{IceServer, IceTransportPolicy, Rtc},
    simulcast::Simulcast,
};

/// CLI argument that is responsible for holding application configuration
/// file path.
static APP_CONF_PATH_CMD_ARG_NAME: &str = "--conf";

/// Environment variable that is responsible for holding application
/// configuration file path.
static APP_CONF_PATH_ENV_VAR_NAME: &str = "MEDEA_ENDPOINT_CONF";

/// Prefix of the environment variables overriding configuration options.
static APP_CONF_ENV_PREFIX: &str = "MEDEA_ENDPOINT";

/// Holds application config.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Conf {
    /// Peer connection settings.
    pub rtc: Rtc,

    /// Allowed kinds of published media.
    pub media: Media,

    /// Simulcast settings of published video.
    pub simulcast: Simulcast,

    /// Logging settings.
    pub log: Log,
}

impl Conf {
    /// Creates new [`Conf`] and applies values from such sources
    /// and in that order:
    /// - default values;
    /// - configuration file, the name of which is given as a command line
    ///   parameter or environment variable;
    /// - environment variables.
    ///
    /// # Errors
    ///
    /// Errors if parsing fails.
    pub fn parse() -> Result<Self, ConfigError> {
        let mut cfg = Config::new();

        if let Some(path) = get_conf_file_name(
            env::var(APP_CONF_PATH_ENV_VAR_NAME),
            env::args(),
        ) {
            cfg.merge(File::with_name(&path))?;
        }

        cfg.merge(
            Environment::with_prefix(APP_CONF_ENV_PREFIX).separator("__"),
        )?;

        cfg.try_into()
    }
}

/// Returns the path to a configuration file, if it's set via CLI `args`
/// or via the provided environment variable.
fn get_conf_file_name<T>(
    env_var: Result<String, env::VarError>,
    cmd_args: T,
) -> Option<String>
where
    T: IntoIterator<Item = String>,
{
    if let Ok(path) = env_var {
        if !path.is_empty() {
            return Some(path);
        }
    }
    let mut args = cmd_args
        .into_iter()
        .skip_while(|arg| arg != APP_CONF_PATH_CMD_ARG_NAME);
    args.next()?;
    args.next().filter(|path| !path.is_empty())
}

/// Parses [`Conf`] with the provided environment variables set for the
/// duration of parsing only.
#[cfg(test)]
#[macro_export]
macro_rules! overrided_by_env_conf {
    ($($env:expr => $value:expr),+ $(,)?) => {{
        $(::std::env::set_var($env, $value);)+
        let conf = $crate::conf::Conf::parse().unwrap();
        $(::std::env::remove_var($env);)+
        conf
    }};
}
