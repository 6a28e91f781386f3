use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config {}", path.display())]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {}", path.display())]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: Pipeline,
}

/// Sizing of the probe pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    /// Concurrent probe workers shared by every frequency tier
    pub workers: usize,
    pub job_queue_capacity: usize,
    pub result_queue_capacity: usize,
    /// Per-probe deadline; probes may hang forever when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout_seconds: Option<u64>,
    /// How long workers may keep draining after cancellation before they are
    /// aborted; unbounded when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_timeout_seconds: Option<u64>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            workers: 10,
            job_queue_capacity: 100,
            result_queue_capacity: 100,
            probe_timeout_seconds: None,
            drain_timeout_seconds: None,
        }
    }
}

impl Pipeline {
    pub fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout_seconds.map(Duration::from_secs)
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_seconds.map(Duration::from_secs)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// The file a config is read from and written to: an explicit path with a
/// `.toml` extension, or the default location.
pub fn resolve_config_path(optional_path: Option<&path::Path>) -> Result<path::PathBuf, Error> {
    match optional_path {
        Some(path) => Ok(normalize_toml_path(path)),
        None => default_config_path(),
    }
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/observer.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uppe/observer.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };
        let seconds = |value: Option<u64>| value.map_or_else(|| "none".to_string(), |s| format!("{s}s"));

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Observer Configuration:")?;
        write_title_1(f, "Pipeline")?;
        write_1(f, "Workers", &self.pipeline.workers)?;
        write_1(f, "Job Queue Capacity", &self.pipeline.job_queue_capacity)?;
        write_1(f, "Result Queue Capacity", &self.pipeline.result_queue_capacity)?;
        write_1(f, "Probe Timeout", &seconds(self.pipeline.probe_timeout_seconds))?;
        write_1(f, "Drain Timeout", &seconds(self.pipeline.drain_timeout_seconds))?;

        Ok(())
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one the default location is
    /// tried, and defaults are used when nothing is there.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        match optional_path {
            Some(path) => Self::read(&normalize_toml_path(path.as_ref())),
            None => Self::load_or_default(&default_config_path()?),
        }
    }

    /// Load `path`, or defaults when no file exists there yet.
    pub fn load_or_default(path: &path::Path) -> Result<Self, Error> {
        if path.exists() {
            Self::read(path)
        } else {
            Ok(Self::default())
        }
    }

    fn read(path: &path::Path) -> Result<Self, Error> {
        let raw_string =
            fs::read_to_string(path).map_err(|source| Error::ReadFailed { path: path.to_path_buf(), source })?;
        Self::from_toml(&raw_string)
    }

    pub fn from_toml(raw: &str) -> Result<Self, Error> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }
}
