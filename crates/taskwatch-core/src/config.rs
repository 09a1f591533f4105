//! Layered configuration: CLI flags > environment > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{Config, CoreError};

pub const ENV_URL: &str = "TASKWATCH_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "TASKWATCH_POLL_INTERVAL_MS";
pub const ENV_TIMEOUT: &str = "TASKWATCH_TIMEOUT";
pub const ENV_CONNECT_TIMEOUT: &str = "TASKWATCH_CONNECT_TIMEOUT";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the file at `path`, or the default location if `path` is `None`.
    ///
    /// A missing default file is not an error; an explicitly named one is.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, CoreError> {
        match path {
            Some(p) => Self::load(p),
            None => match default_config_path() {
                Some(p) if p.exists() => Self::load(&p),
                _ => Ok(Self::default()),
            },
        }
    }
}

/// `$XDG_CONFIG_HOME/taskwatch/config.toml` or the platform equivalent.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("taskwatch").join("config.toml"))
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

impl Config {
    /// Resolve the effective configuration.
    ///
    /// `env` looks up an environment variable; binaries pass
    /// `|k| std::env::var(k).ok()` after loading `.env`.
    pub fn resolve(
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
        file: FileConfig,
    ) -> Result<Self, CoreError> {
        let defaults = Config::default();

        let env_u64 = |key: &str| -> Result<Option<u64>, CoreError> {
            match env(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| CoreError::Config(format!("{key}: not a number: {v:?}"))),
                None => Ok(None),
            }
        };

        let base_url = overrides
            .base_url
            .or_else(|| env(ENV_URL))
            .or(file.base_url)
            .unwrap_or(defaults.base_url);

        let poll_interval = match overrides
            .poll_interval_ms
            .or(env_u64(ENV_POLL_INTERVAL_MS)?)
            .or(file.poll_interval_ms)
        {
            Some(ms) => Duration::from_millis(ms),
            None => defaults.poll_interval,
        };

        let request_timeout = overrides
            .timeout_secs
            .or(env_u64(ENV_TIMEOUT)?)
            .or(file.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let connect_timeout = overrides
            .connect_timeout_secs
            .or(env_u64(ENV_CONNECT_TIMEOUT)?)
            .or(file.connect_timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);

        let config = Config {
            base_url: normalize_base_url(&base_url)?,
            poll_interval,
            request_timeout,
            connect_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.poll_interval.is_zero() {
            return Err(CoreError::Config("poll interval must be > 0".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(CoreError::Config("request timeout must be > 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(CoreError::Config("connect timeout must be > 0".into()));
        }
        Ok(())
    }
}

fn normalize_base_url(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(CoreError::Config(format!(
            "base URL must start with http:// or https://, got {raw:?}"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::resolve(Overrides::default(), no_env, FileConfig::default()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let file = FileConfig {
            base_url: Some("http://file:1".into()),
            poll_interval_ms: Some(300),
            timeout_secs: Some(7),
            connect_timeout_secs: None,
        };
        let env = |k: &str| match k {
            ENV_URL => Some("http://env:2/".to_string()),
            ENV_POLL_INTERVAL_MS => Some("200".to_string()),
            _ => None,
        };
        let overrides = Overrides {
            poll_interval_ms: Some(100),
            ..Overrides::default()
        };

        let config = Config::resolve(overrides, env, file).unwrap();
        assert_eq!(config.base_url, "http://env:2");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.connect_timeout, Config::default().connect_timeout);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let overrides = Overrides {
            poll_interval_ms: Some(0),
            ..Overrides::default()
        };
        let err = Config::resolve(overrides, no_env, FileConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let env = |k: &str| (k == ENV_CONNECT_TIMEOUT).then(|| "0".to_string());
        let err = Config::resolve(Overrides::default(), env, FileConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Config(msg) if msg.contains("connect timeout")));
    }

    #[test]
    fn bad_env_number_is_rejected() {
        let env = |k: &str| (k == ENV_TIMEOUT).then(|| "soon".to_string());
        let err = Config::resolve(Overrides::default(), env, FileConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Config(msg) if msg.contains(ENV_TIMEOUT)));
    }

    #[test]
    fn base_url_needs_scheme() {
        let overrides = Overrides {
            base_url: Some("localhost:8000".into()),
            ..Overrides::default()
        };
        assert!(Config::resolve(overrides, no_env, FileConfig::default()).is_err());
    }

    #[test]
    fn file_config_parses_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "base_url = \"https://api.example\"\npoll_interval_ms = 500\n",
        )
        .unwrap();

        let file = FileConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(file.base_url.as_deref(), Some("https://api.example"));
        assert_eq!(file.poll_interval_ms, Some(500));
        assert_eq!(file.timeout_secs, None);
    }

    #[test]
    fn file_config_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "url = \"x\"\n").unwrap();
        assert!(matches!(
            FileConfig::load(&path),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = FileConfig::load_or_default(Some(Path::new("/no/such/config.toml"))).unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
