//! Server configuration.
//!
//! The server starts with built-in defaults; a YAML file given on the
//! command line overrides them.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, io};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {err}")]
    Io { path: PathBuf, err: io::Error },
    #[error("cannot parse {path}: {err}")]
    Parse {
        path: PathBuf,
        err: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the listener binds, `host:port`.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Directory the registries are loaded from and saved to.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Optional file whose contents replace the built-in welcome banner.
    #[serde(default)]
    pub banner_file: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0:8989".to_owned()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            data_dir: default_data_dir(),
            banner_file: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_owned(),
            err,
        })?;
        serde_yaml::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.to_owned(),
            err,
        })
    }

    /// The banner shown by the outside menu: the configured file if it is
    /// readable, the built-in text otherwise.
    pub fn banner(&self) -> String {
        if let Some(path) = &self.banner_file {
            match fs::read_to_string(path) {
                Ok(text) => return text.trim_end().to_owned(),
                Err(err) => log::warn!("Failed to read {:?}: {}", path, err),
            }
        }
        crate::lines::BANNER.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = serde_yaml::from_str("bind: 127.0.0.1:7000").unwrap();
        assert_eq!(config.bind, "127.0.0.1:7000");
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert!(config.banner_file.is_none());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Config>("listen: nope").is_err());
    }
}
