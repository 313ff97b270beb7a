use std::env::current_exe;
use std::path::PathBuf;
use std::str;
use directories_next::ProjectDirs;
use log::{debug, info, warn};
use serde_json;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to <exe>.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // F:\stress-monitor.exe => F:\stress-monitor.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to stress-monitor.json in an os dependent standard directory, such as %AppData% on
// windows.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "mirolab", "stress-monitor").map(|dirs| {
        dirs.config_dir().join("stress-monitor.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        match std::fs::metadata(&path) {
            Ok(attr) if attr.is_file() => return Ok(path),
            Ok(_) => {},
            Err(err) => {
                debug!("No portable config at {}; Using local path instead. ({})", path.to_string_lossy(), err);
            },
        }
    }

    get_local_config_path().ok_or(ConfigError::NoConfigPath)
}

#[derive(Debug, Clone)]
pub struct ConfigIO {
    path: PathBuf,
}

impl ConfigIO {
    /// Uses `explicit` when given, otherwise the portable or per-user config file.
    pub fn locate(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path,
            None => get_config_path()?,
        };
        Ok(ConfigIO { path })
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = File::open(&self.path).await?;
        info!("Reading config file {}", self.path.to_string_lossy());

        let mut content = vec![];
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;

        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`ConfigIO::read`], but a missing file yields the defaults.
    pub async fn read_or_default(&self) -> Result<Config, ConfigError> {
        match self.read().await {
            Ok(config) => Ok(config),
            Err(err) if err.is_file_not_found_error() => {
                info!("Config file {} not found, using defaults", self.path.to_string_lossy());
                Ok(Config::default())
            },
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let io = ConfigIO::locate(Some(dir.path().join("absent.json"))).unwrap();

        assert!(io.read().await.unwrap_err().is_file_not_found_error());
        assert_eq!(io.read_or_default().await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn reads_camel_case_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"aggregateIntervalSecs": 30, "liveWindow": 60}}"#).unwrap();

        let io = ConfigIO::locate(Some(file.path().to_path_buf())).unwrap();
        let config = io.read_or_default().await.unwrap();
        assert_eq!(config.aggregate_interval_secs, 30);
        assert_eq!(config.live_window, 60);
        assert_eq!(config.scan_timeout_secs, 5);
    }

    #[tokio::test]
    async fn empty_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let io = ConfigIO::locate(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(io.read().await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn invalid_config_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"scanTimeoutSecs": 0}}"#).unwrap();
        let io = ConfigIO::locate(Some(file.path().to_path_buf())).unwrap();
        assert!(matches!(io.read_or_default().await, Err(ConfigError::InvalidValue { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let io = ConfigIO::locate(Some(file.path().to_path_buf())).unwrap();
        assert!(matches!(io.read_or_default().await, Err(ConfigError::JsonError { .. })));
    }
}
