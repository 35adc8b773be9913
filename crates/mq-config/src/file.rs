//! Optional TOML configuration file layer.

use std::fs;
use std::io;

use camino::Utf8Path;
use serde::Deserialize;

use crate::{ConfigError, LogFormat, SocketEndpoint};

/// Settings read from a configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) daemon_socket: Option<SocketEndpoint>,
    pub(crate) log_filter: Option<String>,
    pub(crate) log_format: Option<LogFormat>,
    pub(crate) cpu_budget: Option<usize>,
}

impl FileConfig {
    /// Reads the file at `path`.
    ///
    /// A missing file yields the empty layer unless `required` is set.
    pub(crate) fn read(path: &Utf8Path, required: bool) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }
}
